//! Conductor Messages
//!
//! Messages sent from the Conductor to reading surfaces. A surface renders
//! what it is told: face-down cards, reveals, the interpretation, chat turns,
//! control state and notices. It holds no reading logic of its own.
//!
//! Card names travel down only in [`ConductorMessage::CardRevealed`] and later;
//! [`ConductorMessage::SessionStarted`] carries opaque tokens only.

use serde::{Deserialize, Serialize};

use crate::deck::{CardInstance, InstanceToken};
use crate::language::Language;
use crate::selection::{Position, SpreadMode};

/// Messages from Conductor to a reading surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorMessage {
    // ============================================
    // Card Selection
    // ============================================
    /// A new session dealt a face-down working set
    SessionStarted {
        /// The new session
        session_id: SessionId,
        /// Active spread
        mode: SpreadMode,
        /// Cards to choose
        required_count: usize,
        /// Face-down cards, in dealt order
        cards: Vec<InstanceToken>,
    },

    /// Instruction line for the user
    Instruction {
        /// Text to show
        text: String,
    },

    /// A card was turned face up
    CardRevealed {
        /// The revealed card
        card: RevealedCard,
        /// Cards still to choose
        remaining: usize,
    },

    /// The spread has all its cards; the rest of the deck is inert
    SelectionComplete {
        /// Chosen cards, in click order
        cards: Vec<RevealedCard>,
    },

    // ============================================
    // Interpretation
    // ============================================
    /// The interpretation request was sent
    InterpretationStarted {
        /// Status line to show while waiting
        status: String,
    },

    /// The interpretation arrived
    Interpretation {
        /// Raw text
        content: String,
        /// Formatted markup
        markup: String,
    },

    /// The interpretation request failed; start a new session to retry
    InterpretationFailed {
        /// User-visible message
        message: String,
    },

    // ============================================
    // Chat
    // ============================================
    /// The follow-up chat is open
    ChatAvailable,

    /// The follow-up chat could not be opened for this session
    ChatUnavailable {
        /// User-visible reason
        reason: String,
    },

    /// A new chat turn
    Turn {
        /// Turn identifier
        id: MessageId,
        /// Who the turn belongs to
        role: TurnRole,
        /// Raw text
        content: String,
        /// Formatted markup
        markup: String,
        /// Whether more content will follow
        streaming: bool,
    },

    /// A streaming turn's content so far
    TurnUpdated {
        /// Turn identifier
        id: MessageId,
        /// Accumulated text
        content: String,
        /// Markup of the accumulated text
        markup: String,
    },

    /// A streaming turn finished
    TurnCompleted {
        /// Turn identifier
        id: MessageId,
        /// Final text
        content: String,
        /// Final markup
        markup: String,
    },

    /// Enable or disable the message input
    SendControl {
        /// Whether sending is allowed
        enabled: bool,
    },

    /// Transient status line for a chat reply in progress
    Status {
        /// Text to show, `None` clears the line
        text: Option<String>,
    },

    /// Lock or unlock the spread selector
    ModeSelectorLocked {
        /// Whether the selector is locked
        locked: bool,
    },

    // ============================================
    // System Messages
    // ============================================
    /// Conductor state change
    State {
        /// The new state
        state: ConductorState,
    },

    /// User notification
    Notify {
        /// Notification level
        level: NotifyLevel,
        /// Title (optional)
        title: Option<String>,
        /// Message content
        message: String,
    },

    /// Acknowledgment of received event
    Ack {
        /// Event ID being acknowledged
        event_id: EventId,
    },

    /// Request surface to quit
    Quit {
        /// Optional goodbye message
        message: Option<String>,
    },
}

/// A face-up card as shown to the surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedCard {
    /// Instance token of the card
    pub token: InstanceToken,
    /// Arcanum number
    pub number: u8,
    /// Card name
    pub name: String,
    /// Spread position (three-card spread only)
    pub position: Option<Position>,
    /// Position label in the working language
    pub position_label: Option<String>,
}

impl RevealedCard {
    /// Describe a revealed instance
    #[must_use]
    pub fn from_instance(card: &CardInstance, language: Language) -> Self {
        Self {
            token: card.token,
            number: card.identity.number,
            name: card.name().to_string(),
            position: card.position(),
            position_label: card
                .position()
                .map(|p| language.position_label(p).to_string()),
        }
    }
}

/// Message identifier (also identifies chat turns)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("turn_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Event identifier (for acks)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a new unique event ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("evt_{id}"))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Reading session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    ///
    /// Uses an atomic counter combined with timestamp to ensure uniqueness
    /// even when multiple sessions are created in the same millisecond.
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(format!("reading_{timestamp}_{count}"))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a chat turn belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnRole {
    /// The user's message
    User,
    /// The reader's reply
    Assistant,
    /// A failed send
    Error,
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
}

/// Conductor operational states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorState {
    /// Starting up, no session yet
    Initializing,
    /// Waiting for user input
    Ready,
    /// Interpretation request in flight
    Interpreting,
    /// Streaming a chat reply
    Responding,
    /// Shutting down
    ShuttingDown,
}

impl ConductorState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Initializing => "Starting up...",
            Self::Ready => "Ready",
            Self::Interpreting => "Interpreting...",
            Self::Responding => "Responding...",
            Self::ShuttingDown => "Shutting down...",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{major_arcana, CardInstance};

    #[test]
    fn test_message_id_unique() {
        let id1 = MessageId::new();
        let id2 = MessageId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("reading_"));
    }

    #[test]
    fn test_conductor_state_description() {
        assert_eq!(ConductorState::Ready.description(), "Ready");
        assert_eq!(ConductorState::Interpreting.description(), "Interpreting...");
    }

    #[test]
    fn test_face_down_card_has_no_name() {
        let card = CardInstance::new(major_arcana(Language::English)[0], InstanceToken::new());
        let revealed = RevealedCard::from_instance(&card, Language::English);
        assert_eq!(revealed.name, "The Fool");
        assert_eq!(revealed.position_label, None);
    }

    #[test]
    fn test_message_serde() {
        let msg = ConductorMessage::SendControl { enabled: false };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ConductorMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
