//! Surface Events
//!
//! Events sent from a reading surface to the Conductor. A surface reports what
//! the user did (picked a spread, turned a card, asked for the reading, typed a
//! question) and the Conductor decides what it means.

use serde::{Deserialize, Serialize};

use crate::deck::InstanceToken;
use crate::messages::EventId;
use crate::selection::SpreadMode;

/// Events from a reading surface to the Conductor
///
/// Every event carries an [`EventId`] and is acknowledged with
/// [`crate::messages::ConductorMessage::Ack`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceEvent {
    /// Surface connected to Conductor
    Connected {
        /// Event ID for acknowledgment
        event_id: EventId,
    },

    /// User picked a spread; starts a new session
    StartSession {
        /// Event ID for acknowledgment
        event_id: EventId,
        /// Spread to deal
        mode: SpreadMode,
    },

    /// User clicked a face-down card
    SelectCard {
        /// Event ID for acknowledgment
        event_id: EventId,
        /// Token of the clicked card
        token: InstanceToken,
    },

    /// User asked for the interpretation
    RequestInterpretation {
        /// Event ID for acknowledgment
        event_id: EventId,
    },

    /// User submitted a chat message
    SendMessage {
        /// Event ID for acknowledgment
        event_id: EventId,
        /// The message content
        content: String,
    },

    /// User requested quit
    QuitRequested {
        /// Event ID for acknowledgment
        event_id: EventId,
    },
}

impl SurfaceEvent {
    /// Generate a new event ID for this event
    pub fn new_event_id() -> EventId {
        EventId::new()
    }

    /// Start a session with the given spread
    #[must_use]
    pub fn start_session(mode: SpreadMode) -> Self {
        Self::StartSession {
            event_id: Self::new_event_id(),
            mode,
        }
    }

    /// Select a card
    #[must_use]
    pub fn select_card(token: InstanceToken) -> Self {
        Self::SelectCard {
            event_id: Self::new_event_id(),
            token,
        }
    }

    /// Ask for the interpretation
    #[must_use]
    pub fn request_interpretation() -> Self {
        Self::RequestInterpretation {
            event_id: Self::new_event_id(),
        }
    }

    /// Send a chat message
    pub fn send_message(content: impl Into<String>) -> Self {
        Self::SendMessage {
            event_id: Self::new_event_id(),
            content: content.into(),
        }
    }

    /// Get the event ID
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::Connected { event_id }
            | Self::StartSession { event_id, .. }
            | Self::SelectCard { event_id, .. }
            | Self::RequestInterpretation { event_id }
            | Self::SendMessage { event_id, .. }
            | Self::QuitRequested { event_id } => event_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_unique() {
        let a = SurfaceEvent::request_interpretation();
        let b = SurfaceEvent::request_interpretation();
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn test_event_serialization() {
        let event = SurfaceEvent::start_session(SpreadMode::ThreeCard);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("threeCard"));

        let parsed: SurfaceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
