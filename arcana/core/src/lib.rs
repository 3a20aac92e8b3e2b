//! Arcana Core - Headless Tarot Reading
//!
//! This crate drives a tarot reading completely independent of any UI: the
//! user picks a spread, turns over face-down cards, receives a generated
//! interpretation and then asks follow-up questions in a streaming chat.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Reading Surfaces                         │
//! │   ┌──────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │   │ Browser page │   │ arcana-reader│   │  Test harness   │   │
//! │   └──────┬───────┘   └──────┬───────┘   └────────┬────────┘   │
//! │          └──────────────────┴────────────────────┘            │
//! │                    SurfaceEvent (up)                          │
//! │                  ConductorMessage (down)                      │
//! └──────────────────────────────┼───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                        ARCANA CORE                            │
//! │  ┌───────────────────────────┴─────────────────────────────┐  │
//! │  │                       Conductor                          │  │
//! │  │  ┌──────────┐  ┌───────────────┐  ┌──────┐  ┌─────────┐ │  │
//! │  │  │ Deck +   │  │ Interpretation│  │ Chat │  │ Backend │ │  │
//! │  │  │ Selection│  │   Requester   │  │      │  │  (LLM)  │ │  │
//! │  │  └──────────┘  └───────────────┘  └──────┘  └─────────┘ │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use arcana_core::{backend::GeminiBackend, Conductor, ReaderConfig, SpreadMode, SurfaceEvent};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::channel(100);
//!     let mut conductor = Conductor::new(GeminiBackend::from_env(), ReaderConfig::from_env(), tx);
//!     conductor.start().await.unwrap();
//!
//!     conductor
//!         .handle_event(SurfaceEvent::start_session(SpreadMode::ThreeCard))
//!         .await
//!         .unwrap();
//!
//!     loop {
//!         while let Ok(msg) = rx.try_recv() {
//!             // Render message
//!         }
//!         conductor.poll().await;
//!         // Forward user input as SurfaceEvents
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`deck`]: Major arcana catalog and shuffled working sets
//! - [`selection`]: Card selection state machine
//! - [`prompt`]: Interpretation prompt and chat system instruction
//! - [`interpretation`]: The single interpretation request
//! - [`chat`]: Follow-up chat with accumulated history
//! - [`format`]: Generated text to markup
//! - [`session`]: Everything one reading owns
//! - [`conductor`]: Main Conductor struct
//! - [`events`] / [`messages`]: Surface protocol
//! - [`backend`]: Generation backends (Gemini, Ollama)
//! - [`config`]: TOML configuration with environment and CLI overrides

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod chat;
pub mod conductor;
pub mod config;
pub mod deck;
pub mod error;
pub mod events;
pub mod format;
pub mod interpretation;
pub mod language;
pub mod messages;
pub mod prompt;
pub mod selection;
pub mod session;

// Re-exports for convenience
pub use backend::{
    BackendConfig, ChatContent, GenerateRequest, GenerateResponse, GenerationBackend,
    StreamingToken,
};
pub use chat::{ChatHandle, ChatTurn};
pub use conductor::{Conductor, ReaderConfig, DEFAULT_MAX_MESSAGE_CHARS, DEFAULT_MODEL};
pub use deck::{CardIdentity, CardInstance, DeckProvider, InstanceToken, MAJOR_ARCANA_COUNT};
pub use error::ReadingError;
pub use events::SurfaceEvent;
pub use format::format_markup;
pub use interpretation::{request_interpretation, Interpretation};
pub use language::Language;
pub use messages::{
    ConductorMessage, ConductorState, EventId, MessageId, NotifyLevel, RevealedCard, SessionId,
    TurnRole,
};
pub use selection::{IgnoreReason, Position, SelectOutcome, Selection, SelectionPhase, SpreadMode};
pub use session::{ChatState, InterpretationState, ReadingSession};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ArcanaConfig, ArcanaToml,
    BackendKind, ConfigError, ConfigOverrides, ConfigSource, DEFAULT_OLLAMA_MODEL,
};
