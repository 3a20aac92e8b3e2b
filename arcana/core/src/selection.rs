//! Selection State Machine
//!
//! Tracks the spread mode, the dealt working set and the cards the user turned
//! over, in click order.
//!
//! ```text
//!   Idle ──start(mode)──▶ AwaitingSelection ──(required reached)──▶ SelectionComplete
//!     ▲                        │      ▲                                   │
//!     └────────────────────────┴──────┴───────── start(mode) ─────────────┘
//! ```
//!
//! Invalid selections are not errors. They come back as
//! [`SelectOutcome::Ignored`] and leave the state untouched.

use serde::{Deserialize, Serialize};

use crate::deck::{CardInstance, DeckProvider, InstanceToken};

/// Spread type chosen by the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpreadMode {
    /// One card, no positions
    #[default]
    Single,
    /// Three cards: past, present, future
    ThreeCard,
}

impl SpreadMode {
    /// How many cards the spread needs
    #[must_use]
    pub fn required_count(self) -> usize {
        match self {
            Self::Single => 1,
            Self::ThreeCard => 3,
        }
    }

    /// Whether selections get a position
    #[must_use]
    pub fn assigns_positions(self) -> bool {
        matches!(self, Self::ThreeCard)
    }

    /// Position for the n-th selection (0-based), if the mode assigns them
    #[must_use]
    pub fn position_for(self, ordinal: usize) -> Option<Position> {
        if !self.assigns_positions() {
            return None;
        }
        match ordinal {
            0 => Some(Position::Past),
            1 => Some(Position::Present),
            2 => Some(Position::Future),
            _ => None,
        }
    }
}

/// Position of a card in the three-card spread
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Position {
    /// First card drawn
    Past,
    /// Second card drawn
    Present,
    /// Third card drawn
    Future,
}

/// Phase of the selection state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPhase {
    /// No session started yet
    #[default]
    Idle,
    /// Waiting for the user to turn cards over
    AwaitingSelection,
    /// Required number of cards chosen; remaining cards are inert
    SelectionComplete,
}

/// Why a selection was ignored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The machine is not awaiting a selection (idle or already complete)
    NotAwaitingSelection,
    /// The token is not part of this session's working set
    UnknownCard,
    /// The card is already face up
    AlreadyRevealed,
    /// The spread already has all its cards
    QuotaReached,
}

/// Result of a selection attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Card turned over, more are needed
    Selected {
        /// The revealed card
        card: CardInstance,
        /// Cards still to choose
        remaining: usize,
    },
    /// Card turned over and the spread is now complete
    Completed {
        /// The revealed card
        card: CardInstance,
    },
    /// Nothing happened
    Ignored(IgnoreReason),
}

/// Card selection state for one session
#[derive(Clone, Debug, Default)]
pub struct Selection {
    mode: SpreadMode,
    phase: SelectionPhase,
    cards: Vec<CardInstance>,
    /// Indices into `cards`, in click order
    ordered: Vec<usize>,
}

impl Selection {
    /// Start a selection with a fresh working set from the provider
    #[must_use]
    pub fn start(mode: SpreadMode, deck: &DeckProvider) -> Self {
        Self::with_cards(mode, deck.new_working_set())
    }

    /// Start a selection over an explicit working set
    #[must_use]
    pub fn with_cards(mode: SpreadMode, cards: Vec<CardInstance>) -> Self {
        Self {
            mode,
            phase: SelectionPhase::AwaitingSelection,
            cards,
            ordered: Vec::with_capacity(mode.required_count()),
        }
    }

    /// Active spread mode
    #[must_use]
    pub fn mode(&self) -> SpreadMode {
        self.mode
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    /// Cards required by the spread
    #[must_use]
    pub fn required_count(&self) -> usize {
        self.mode.required_count()
    }

    /// Cards chosen so far
    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the spread has all its cards
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == SelectionPhase::SelectionComplete
    }

    /// The whole working set, in dealt order
    #[must_use]
    pub fn cards(&self) -> &[CardInstance] {
        &self.cards
    }

    /// Chosen cards, in click order
    pub fn ordered_selections(&self) -> impl Iterator<Item = &CardInstance> + '_ {
        self.ordered.iter().map(|&i| &self.cards[i])
    }

    /// Turn over the card with the given token
    pub fn select(&mut self, token: InstanceToken) -> SelectOutcome {
        if self.phase != SelectionPhase::AwaitingSelection {
            return SelectOutcome::Ignored(IgnoreReason::NotAwaitingSelection);
        }
        let required = self.required_count();
        if self.ordered.len() >= required {
            return SelectOutcome::Ignored(IgnoreReason::QuotaReached);
        }
        let Some(index) = self.cards.iter().position(|c| c.token == token) else {
            return SelectOutcome::Ignored(IgnoreReason::UnknownCard);
        };
        if self.cards[index].is_revealed() {
            return SelectOutcome::Ignored(IgnoreReason::AlreadyRevealed);
        }

        let position = self.mode.position_for(self.ordered.len());
        self.cards[index].reveal(position);
        self.ordered.push(index);

        let card = self.cards[index].clone();
        if self.ordered.len() == required {
            self.phase = SelectionPhase::SelectionComplete;
            SelectOutcome::Completed { card }
        } else {
            SelectOutcome::Selected {
                card,
                remaining: required - self.ordered.len(),
            }
        }
    }
}
