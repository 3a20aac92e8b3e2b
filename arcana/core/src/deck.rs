//! Deck Provider
//!
//! Holds the fixed 22-card major arcana catalog and deals a freshly shuffled
//! working set of card instances for every new session.
//!
//! A card instance carries an opaque [`InstanceToken`]. Surfaces use it to tie
//! their own card element to the logical card; the core never sees the
//! element itself.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::Language;
use crate::selection::Position;

/// Number of cards in the major arcana
pub const MAJOR_ARCANA_COUNT: usize = 22;

/// An immutable card identity from the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CardIdentity {
    /// Arcanum number (0 = The Fool, 21 = The World)
    pub number: u8,
    /// Card name in the catalog's language
    pub name: &'static str,
}

const fn card(number: u8, name: &'static str) -> CardIdentity {
    CardIdentity { number, name }
}

const MAJOR_ARCANA_ZH: [CardIdentity; MAJOR_ARCANA_COUNT] = [
    card(0, "愚者"),
    card(1, "魔術師"),
    card(2, "女祭司"),
    card(3, "皇后"),
    card(4, "皇帝"),
    card(5, "教皇"),
    card(6, "戀人"),
    card(7, "戰車"),
    card(8, "力量"),
    card(9, "隱士"),
    card(10, "命運之輪"),
    card(11, "正義"),
    card(12, "倒吊人"),
    card(13, "死神"),
    card(14, "節制"),
    card(15, "惡魔"),
    card(16, "塔"),
    card(17, "星星"),
    card(18, "月亮"),
    card(19, "太陽"),
    card(20, "審判"),
    card(21, "世界"),
];

const MAJOR_ARCANA_EN: [CardIdentity; MAJOR_ARCANA_COUNT] = [
    card(0, "The Fool"),
    card(1, "The Magician"),
    card(2, "The High Priestess"),
    card(3, "The Empress"),
    card(4, "The Emperor"),
    card(5, "The Hierophant"),
    card(6, "The Lovers"),
    card(7, "The Chariot"),
    card(8, "Strength"),
    card(9, "The Hermit"),
    card(10, "Wheel of Fortune"),
    card(11, "Justice"),
    card(12, "The Hanged Man"),
    card(13, "Death"),
    card(14, "Temperance"),
    card(15, "The Devil"),
    card(16, "The Tower"),
    card(17, "The Star"),
    card(18, "The Moon"),
    card(19, "The Sun"),
    card(20, "Judgement"),
    card(21, "The World"),
];

/// The major arcana catalog for a language
#[must_use]
pub fn major_arcana(language: Language) -> &'static [CardIdentity; MAJOR_ARCANA_COUNT] {
    match language {
        Language::TraditionalChinese => &MAJOR_ARCANA_ZH,
        Language::English => &MAJOR_ARCANA_EN,
    }
}

/// Opaque per-instance token, unique within a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceToken(pub Uuid);

impl InstanceToken {
    /// Generate a fresh random token
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(uuid::Builder::from_random_bytes(rng.gen()).into_uuid())
    }
}

impl Default for InstanceToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for InstanceToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A card as it occurs in one session's working set
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CardInstance {
    /// Which catalog card this is
    pub identity: CardIdentity,
    /// Correlation token for the surface
    pub token: InstanceToken,
    revealed: bool,
    position: Option<Position>,
}

impl CardInstance {
    /// Create a face-down instance
    #[must_use]
    pub fn new(identity: CardIdentity, token: InstanceToken) -> Self {
        Self {
            identity,
            token,
            revealed: false,
            position: None,
        }
    }

    /// Card name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.identity.name
    }

    /// Whether the card has been turned face up
    #[must_use]
    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    /// Spread position, only ever set in the three-card spread
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Turn the card face up. Identity and position are frozen afterwards.
    pub(crate) fn reveal(&mut self, position: Option<Position>) {
        if self.revealed {
            return;
        }
        self.revealed = true;
        self.position = position;
    }
}

/// Deals shuffled working sets from the catalog
#[derive(Clone, Copy, Debug, Default)]
pub struct DeckProvider {
    language: Language,
}

impl DeckProvider {
    /// Create a provider for a language
    #[must_use]
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Catalog language
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Deal a uniformly shuffled working set with fresh instance tokens
    #[must_use]
    pub fn new_working_set(&self) -> Vec<CardInstance> {
        self.new_working_set_with(&mut rand::thread_rng())
    }

    /// Deal a working set using the given RNG
    pub fn new_working_set_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<CardInstance> {
        let mut identities = *major_arcana(self.language);
        // Fisher-Yates
        identities.shuffle(rng);
        identities
            .into_iter()
            .map(|identity| CardInstance::new(identity, InstanceToken::from_rng(rng)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_catalog_names_unique() {
        for language in [Language::TraditionalChinese, Language::English] {
            let names: HashSet<_> = major_arcana(language).iter().map(|c| c.name).collect();
            assert_eq!(names.len(), MAJOR_ARCANA_COUNT);
        }
    }

    #[test]
    fn test_catalog_numbers_in_order() {
        for (i, card) in MAJOR_ARCANA_ZH.iter().enumerate() {
            assert_eq!(usize::from(card.number), i);
            assert_eq!(MAJOR_ARCANA_EN[i].number, card.number);
        }
        assert_eq!(MAJOR_ARCANA_ZH[0].name, "愚者");
        assert_eq!(MAJOR_ARCANA_EN[21].name, "The World");
    }

    #[test]
    fn test_working_set_is_fresh() {
        let set = DeckProvider::new(Language::English).new_working_set();
        assert_eq!(set.len(), MAJOR_ARCANA_COUNT);
        assert!(set.iter().all(|c| !c.is_revealed() && c.position().is_none()));

        let tokens: HashSet<_> = set.iter().map(|c| c.token).collect();
        assert_eq!(tokens.len(), MAJOR_ARCANA_COUNT);
    }

    #[test]
    fn test_every_identity_exactly_once() {
        let set = DeckProvider::default().new_working_set();
        let mut numbers: Vec<u8> = set.iter().map(|c| c.identity.number).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (0..22).collect::<Vec<u8>>());
    }

    #[test]
    fn test_two_working_sets_differ() {
        let provider = DeckProvider::default();
        let first: Vec<u8> = provider.new_working_set().iter().map(|c| c.identity.number).collect();
        let second: Vec<u8> = provider.new_working_set().iter().map(|c| c.identity.number).collect();
        // 1 / 22! chance of a false failure
        assert_ne!(first, second);
    }

    #[test]
    fn test_seeded_working_set_is_reproducible() {
        let provider = DeckProvider::new(Language::English);
        let a = provider.new_working_set_with(&mut StdRng::seed_from_u64(7));
        let b = provider.new_working_set_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_is_roughly_uniform() {
        // Where The Fool lands across many deals should cover every slot.
        let provider = DeckProvider::new(Language::English);
        let mut rng = StdRng::seed_from_u64(42);
        let mut slots = [0usize; MAJOR_ARCANA_COUNT];
        for _ in 0..4400 {
            let set = provider.new_working_set_with(&mut rng);
            let slot = set.iter().position(|c| c.identity.number == 0).unwrap();
            slots[slot] += 1;
        }
        // Expected 200 per slot
        assert!(slots.iter().all(|&n| (120..=280).contains(&n)), "{slots:?}");
    }

    #[test]
    fn test_reveal_freezes_position() {
        let mut card = CardInstance::new(MAJOR_ARCANA_EN[3], InstanceToken::new());
        card.reveal(Some(Position::Past));
        card.reveal(Some(Position::Future));
        assert!(card.is_revealed());
        assert_eq!(card.position(), Some(Position::Past));
    }

    #[test]
    fn test_token_round_trips_through_text() {
        let token = InstanceToken::new();
        let parsed: InstanceToken = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
    }
}
