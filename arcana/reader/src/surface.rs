//! Line-oriented reading surface
//!
//! Turns typed lines into [`SurfaceEvent`]s and prints [`ConductorMessage`]s as
//! plain text. Streamed replies are printed fragment by fragment.

use std::io::Write;

use arcana_core::{
    ConductorMessage, InstanceToken, MessageId, NotifyLevel, RevealedCard, SpreadMode,
    SurfaceEvent, TurnRole,
};

pub const HELP: &str = "\
Commands:
  /single      start a single card reading
  /three       start a three card reading (past, present, future)
  /pick N      turn over card N (1-22)
  /read        ask for the interpretation
  /help        show this help
  /quit        leave
Anything else is sent to the reader once the interpretation is in.";

/// A parsed input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start(SpreadMode),
    Pick(usize),
    Interpret,
    Help,
    Quit,
    Say(String),
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Say(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("single"), None) => Self::Start(SpreadMode::Single),
            (Some("three"), None) => Self::Start(SpreadMode::ThreeCard),
            (Some("pick"), Some(n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Self::Pick(n),
                _ => Self::Unknown(line.to_string()),
            },
            (Some("read"), None) => Self::Interpret,
            (Some("help"), None) => Self::Help,
            (Some("quit" | "exit"), None) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// What the terminal knows about the reading on screen
#[derive(Debug, Default)]
pub struct Surface {
    /// Face-down cards in dealt order
    cards: Vec<InstanceToken>,
    /// Turn being streamed and how much of it is printed
    streaming: Option<(MessageId, usize)>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate an input line into an event for the Conductor
    pub fn event_for(&self, command: Command, out: &mut impl Write) -> Option<SurfaceEvent> {
        match command {
            Command::Start(mode) => Some(SurfaceEvent::start_session(mode)),
            Command::Pick(n) => match n.checked_sub(1).and_then(|i| self.cards.get(i)) {
                Some(token) => Some(SurfaceEvent::select_card(*token)),
                None => {
                    let _ = writeln!(out, "There is no card {n}; pick 1-{}.", self.cards.len());
                    None
                }
            },
            Command::Interpret => Some(SurfaceEvent::request_interpretation()),
            Command::Quit => Some(SurfaceEvent::QuitRequested {
                event_id: SurfaceEvent::new_event_id(),
            }),
            Command::Say(text) => Some(SurfaceEvent::send_message(text)),
            Command::Help => {
                let _ = writeln!(out, "{HELP}");
                None
            }
            Command::Unknown(line) => {
                let _ = writeln!(out, "Unknown command: {line} (try /help)");
                None
            }
            Command::Empty => None,
        }
    }

    /// Print a message; returns true once the Conductor has said goodbye
    pub fn render(&mut self, msg: &ConductorMessage, out: &mut impl Write) -> bool {
        let written = match msg {
            ConductorMessage::SessionStarted {
                mode,
                cards,
                session_id,
                ..
            } => {
                self.cards.clone_from(cards);
                self.streaming = None;
                tracing::debug!(session_id = %session_id, "Rendering new session");
                writeln!(out, "\n== {mode:?} reading: {} cards face down ==", cards.len())
            }
            ConductorMessage::Instruction { text } => writeln!(out, "{text}"),
            ConductorMessage::CardRevealed { card, .. } => {
                writeln!(out, "  turned over {}", describe(card))
            }
            ConductorMessage::SelectionComplete { cards } => {
                let names: Vec<String> = cards.iter().map(describe).collect();
                writeln!(out, "Your spread: {}", names.join(", "))
            }
            ConductorMessage::InterpretationStarted { status } => writeln!(out, "{status}"),
            ConductorMessage::Interpretation { content, .. } => {
                writeln!(out, "\n{content}\n")
            }
            ConductorMessage::InterpretationFailed { message } => writeln!(out, "{message}"),
            ConductorMessage::ChatAvailable => {
                writeln!(out, "(ask a follow-up question, or /single or /three to start over)")
            }
            ConductorMessage::ChatUnavailable { reason } => writeln!(out, "{reason}"),
            ConductorMessage::Turn {
                id,
                role,
                content,
                streaming,
                ..
            } => match role {
                TurnRole::User => Ok(()),
                TurnRole::Assistant if *streaming => {
                    self.streaming = Some((id.clone(), 0));
                    write!(out, "reader> ")
                }
                TurnRole::Assistant => writeln!(out, "reader> {content}"),
                TurnRole::Error => writeln!(out, "! {content}"),
            },
            ConductorMessage::TurnUpdated { id, content, .. } => self.print_new_text(id, content, out),
            ConductorMessage::TurnCompleted { id, content, .. } => {
                let result = self.print_new_text(id, content, out);
                if self.streaming.as_ref().is_some_and(|(current, _)| current == id) {
                    self.streaming = None;
                    result.and_then(|()| writeln!(out))
                } else {
                    result
                }
            }
            ConductorMessage::Notify { level, message, .. } => {
                let tag = match level {
                    NotifyLevel::Info => "note",
                    NotifyLevel::Warning => "warning",
                    NotifyLevel::Error => "error",
                };
                writeln!(out, "[{tag}] {message}")
            }
            ConductorMessage::Quit { message } => {
                if let Some(message) = message {
                    let _ = writeln!(out, "{message}");
                }
                let _ = out.flush();
                return true;
            }
            ConductorMessage::Status { text: Some(text) } => writeln!(out, "{text}"),
            ConductorMessage::SendControl { .. }
            | ConductorMessage::Status { text: None }
            | ConductorMessage::ModeSelectorLocked { .. }
            | ConductorMessage::State { .. }
            | ConductorMessage::Ack { .. } => Ok(()),
        };

        if let Err(e) = written.and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "Failed to write to terminal");
        }
        false
    }

    /// Print the part of a streamed turn not on screen yet
    fn print_new_text(
        &mut self,
        id: &MessageId,
        content: &str,
        out: &mut impl Write,
    ) -> std::io::Result<()> {
        match self.streaming.as_mut() {
            Some((current, printed)) if current == id => {
                let fresh = content.get(*printed..).unwrap_or_default();
                *printed = content.len();
                write!(out, "{fresh}")
            }
            _ => Ok(()),
        }
    }
}

fn describe(card: &RevealedCard) -> String {
    match &card.position_label {
        Some(label) => format!("{} ({label})", card.name),
        None => card.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/single"), Command::Start(SpreadMode::Single));
        assert_eq!(Command::parse("  /three "), Command::Start(SpreadMode::ThreeCard));
        assert_eq!(Command::parse("/pick 7"), Command::Pick(7));
        assert_eq!(Command::parse("/read"), Command::Interpret);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(
            Command::parse("What about love?"),
            Command::Say("What about love?".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_bad_picks() {
        assert!(matches!(Command::parse("/pick 0"), Command::Unknown(_)));
        assert!(matches!(Command::parse("/pick x"), Command::Unknown(_)));
        assert!(matches!(Command::parse("/pick"), Command::Unknown(_)));
    }

    #[test]
    fn test_pick_maps_to_dealt_token() {
        let mut surface = Surface::new();
        let tokens: Vec<InstanceToken> = (0..22).map(|_| InstanceToken::new()).collect();
        let mut out = Vec::new();
        surface.render(
            &ConductorMessage::SessionStarted {
                session_id: arcana_core::SessionId::new(),
                mode: SpreadMode::Single,
                required_count: 1,
                cards: tokens.clone(),
            },
            &mut out,
        );

        let event = surface.event_for(Command::Pick(3), &mut out).unwrap();
        assert!(matches!(event, SurfaceEvent::SelectCard { token, .. } if token == tokens[2]));
        assert!(surface.event_for(Command::Pick(23), &mut out).is_none());
        assert!(surface.event_for(Command::Pick(0), &mut out).is_none());
        assert!(String::from_utf8(out).unwrap().contains("There is no card 0; pick 1-22."));
    }

    #[test]
    fn test_status_line_shown_and_cleared_quietly() {
        let mut surface = Surface::new();
        let mut out = Vec::new();

        let status = ConductorMessage::Status {
            text: Some("The reader is thinking...".to_string()),
        };
        assert!(!surface.render(&status, &mut out));
        assert!(!surface.render(&ConductorMessage::Status { text: None }, &mut out));

        assert_eq!(String::from_utf8(out).unwrap(), "The reader is thinking...\n");
    }

    #[test]
    fn test_streamed_turn_printed_incrementally() {
        let mut surface = Surface::new();
        let mut out = Vec::new();
        let id = MessageId::new();

        surface.render(
            &ConductorMessage::Turn {
                id: id.clone(),
                role: TurnRole::Assistant,
                content: String::new(),
                markup: String::new(),
                streaming: true,
            },
            &mut out,
        );
        for content in ["The ", "The Star ", "The Star shines."] {
            surface.render(
                &ConductorMessage::TurnUpdated {
                    id: id.clone(),
                    content: content.to_string(),
                    markup: String::new(),
                },
                &mut out,
            );
        }
        surface.render(
            &ConductorMessage::TurnCompleted {
                id,
                content: "The Star shines.".to_string(),
                markup: String::new(),
            },
            &mut out,
        );

        assert_eq!(String::from_utf8(out).unwrap(), "reader> The Star shines.\n");
    }

    #[test]
    fn test_quit_ends_rendering() {
        let mut surface = Surface::new();
        let mut out = Vec::new();
        assert!(surface.render(
            &ConductorMessage::Quit {
                message: Some("Goodbye!".to_string())
            },
            &mut out
        ));
    }
}
