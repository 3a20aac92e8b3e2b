//! Conductor - The Reading Orchestrator
//!
//! The Conductor drives a tarot reading from dealing the cards to the last
//! follow-up answer:
//! - card selection through the session's state machine
//! - the interpretation request, once the spread is complete
//! - the follow-up chat and its streamed replies
//! - everything the surface is told to show
//!
//! It is UI-agnostic. A browser page, a terminal reader or a test harness talks
//! to it through:
//! - `SurfaceEvent`: what the user did, received FROM the surface
//! - `ConductorMessage`: what to show, sent TO the surface
//!
//! All state changes happen in [`Conductor::handle_event`] and
//! [`Conductor::poll`]. The interpretation request and reply streams run on
//! their own tasks; `poll` picks up whatever they delivered.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{ChatContent, GenerationBackend, StreamingToken};
use crate::chat::ChatHandle;
use crate::deck::{DeckProvider, InstanceToken};
use crate::error::ReadingError;
use crate::events::SurfaceEvent;
use crate::format::format_markup;
use crate::interpretation::{InterpretationOutcome, PendingInterpretation};
use crate::language::Language;
use crate::messages::{
    ConductorMessage, ConductorState, EventId, MessageId, NotifyLevel, RevealedCard, SessionId,
    TurnRole,
};
use crate::prompt::{
    build_interpretation_prompt, build_system_instruction, card_details, seed_user_message,
};
use crate::selection::{SelectOutcome, SelectionPhase, SpreadMode};
use crate::session::{ChatState, ReadingSession};

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-04-17";

/// Default limit for a single chat message, in characters
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 4000;

/// Reading configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Model for the interpretation and the chat
    pub model: String,
    /// Working language
    pub language: Language,
    /// Request the interpretation as soon as the spread is complete
    pub auto_interpret: bool,
    /// Longest chat message accepted, in characters
    pub max_message_chars: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            language: Language::default(),
            auto_interpret: false,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

impl ReaderConfig {
    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            model: std::env::var("ARCANA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            language: std::env::var("ARCANA_LANGUAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            auto_interpret: std::env::var("ARCANA_AUTO_INTERPRET")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
            max_message_chars: std::env::var("ARCANA_MAX_MESSAGE_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_MAX_MESSAGE_CHARS),
        }
    }
}

/// The Conductor - headless reading orchestrator
pub struct Conductor {
    /// Configuration
    config: ReaderConfig,
    /// Generation backend
    backend: Arc<dyn GenerationBackend>,
    /// Deals working sets in the configured language
    deck: DeckProvider,
    /// Current reading
    session: ReadingSession,
    /// Current operational state
    state: ConductorState,
    /// Channel to send messages to the surface
    tx: mpsc::Sender<ConductorMessage>,
}

impl Conductor {
    /// Create a new Conductor with the given backend
    pub fn new(
        backend: impl GenerationBackend + 'static,
        config: ReaderConfig,
        tx: mpsc::Sender<ConductorMessage>,
    ) -> Self {
        Self::with_shared_backend(Arc::new(backend), config, tx)
    }

    /// Create a new Conductor over an already shared backend
    pub fn with_shared_backend(
        backend: Arc<dyn GenerationBackend>,
        config: ReaderConfig,
        tx: mpsc::Sender<ConductorMessage>,
    ) -> Self {
        let deck = DeckProvider::new(config.language);
        Self {
            config,
            backend,
            deck,
            session: ReadingSession::with_selection(deck.language(), Default::default()),
            state: ConductorState::Initializing,
            tx,
        }
    }

    /// Get the session ID
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// Get the current reading
    pub fn session(&self) -> &ReadingSession {
        &self.session
    }

    /// Get current state
    pub fn state(&self) -> ConductorState {
        self.state
    }

    /// Get configuration
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Start the Conductor
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.set_state(ConductorState::Initializing).await;

        if !self.backend.health_check().await {
            tracing::warn!(backend = self.backend.name(), "Backend health check failed");
            self.notify(
                NotifyLevel::Warning,
                "Generation service not reachable - the reading may fail",
            )
            .await;
        }

        self.set_state(ConductorState::Ready).await;
        Ok(())
    }

    /// Handle an event from the surface
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> anyhow::Result<()> {
        if self.session.is_ended() {
            tracing::debug!(event_id = ?event.event_id(), "Reader shut down, event ignored");
            self.ack(event.event_id().clone()).await;
            return Ok(());
        }

        match event {
            SurfaceEvent::Connected { event_id } => {
                self.ack(event_id).await;
                self.send(ConductorMessage::State { state: self.state })
                    .await;

                // Deal the default spread so there is something to pick from
                if self.session.selection().phase() == SelectionPhase::Idle {
                    self.start_session(SpreadMode::default()).await;
                }
            }

            SurfaceEvent::StartSession { event_id, mode } => {
                self.ack(event_id).await;
                self.start_session(mode).await;
            }

            SurfaceEvent::SelectCard { event_id, token } => {
                self.ack(event_id).await;
                self.select_card(token).await;
            }

            SurfaceEvent::RequestInterpretation { event_id } => {
                self.ack(event_id).await;
                self.request_interpretation().await;
            }

            SurfaceEvent::SendMessage { event_id, content } => {
                self.ack(event_id).await;
                self.send_message(&content).await;
            }

            SurfaceEvent::QuitRequested { event_id } => {
                self.ack(event_id).await;
                self.shutdown().await?;
            }
        }

        Ok(())
    }

    /// Apply whatever background work has delivered
    ///
    /// Call this regularly. Returns true if there was activity.
    pub async fn poll(&mut self) -> bool {
        if self.session.is_ended() {
            return false;
        }

        let mut activity = false;

        if let Some(outcome) = self.session.poll_interpretation() {
            self.handle_interpretation(outcome).await;
            activity = true;
        }

        if self.poll_streaming().await {
            activity = true;
        }

        activity
    }

    /// Start a new reading, discarding the current one
    pub async fn start_session(&mut self, mode: SpreadMode) {
        self.session.end();
        self.session = ReadingSession::start(mode, &self.deck);

        tracing::info!(
            session_id = %self.session.id,
            mode = ?mode,
            "Reading session started"
        );

        let cards: Vec<InstanceToken> = self
            .session
            .selection()
            .cards()
            .iter()
            .map(|c| c.token)
            .collect();

        self.send(ConductorMessage::SessionStarted {
            session_id: self.session.id.clone(),
            mode,
            required_count: mode.required_count(),
            cards,
        })
        .await;
        self.send(ConductorMessage::Instruction {
            text: self.config.language.start_instruction(mode),
        })
        .await;
        self.send(ConductorMessage::ModeSelectorLocked { locked: false })
            .await;
        self.send(ConductorMessage::SendControl { enabled: false })
            .await;

        if self.state != ConductorState::Ready {
            self.set_state(ConductorState::Ready).await;
        }
    }

    /// Turn over a card
    async fn select_card(&mut self, token: InstanceToken) {
        let language = self.config.language;

        match self.session.select(token) {
            SelectOutcome::Selected { card, remaining } => {
                tracing::debug!(session_id = %self.session.id, token = %token, remaining, "Card revealed");
                self.send(ConductorMessage::CardRevealed {
                    card: RevealedCard::from_instance(&card, language),
                    remaining,
                })
                .await;
                self.send(ConductorMessage::Instruction {
                    text: language.remaining_instruction(remaining),
                })
                .await;
            }

            SelectOutcome::Completed { card } => {
                tracing::debug!(session_id = %self.session.id, token = %token, "Selection complete");
                self.send(ConductorMessage::CardRevealed {
                    card: RevealedCard::from_instance(&card, language),
                    remaining: 0,
                })
                .await;

                let cards = self
                    .session
                    .selected_cards()
                    .into_iter()
                    .map(|c| RevealedCard::from_instance(c, language))
                    .collect();
                self.send(ConductorMessage::SelectionComplete { cards }).await;
                self.send(ConductorMessage::Instruction {
                    text: language.complete_instruction().to_string(),
                })
                .await;

                if self.config.auto_interpret {
                    self.request_interpretation().await;
                }
            }

            SelectOutcome::Ignored(reason) => {
                tracing::debug!(
                    session_id = %self.session.id,
                    token = %token,
                    reason = ?reason,
                    "Selection ignored"
                );
            }
        }
    }

    /// Send the interpretation request for the completed spread
    async fn request_interpretation(&mut self) {
        let language = self.config.language;

        if !self.session.selection().is_complete() {
            self.notify(NotifyLevel::Info, language.incomplete_selection_notice())
                .await;
            return;
        }
        if self.session.interpretation_requested() {
            tracing::debug!(session_id = %self.session.id, "Interpretation already requested");
            return;
        }

        let prompt = build_interpretation_prompt(
            language,
            self.session.mode(),
            &self.session.selected_cards(),
        );
        let pending = PendingInterpretation::spawn(
            Arc::clone(&self.backend),
            self.config.model.clone(),
            prompt,
            self.session.id.clone(),
        );
        self.session.begin_interpretation(pending);

        tracing::info!(
            session_id = %self.session.id,
            model = %self.config.model,
            "Interpretation requested"
        );

        self.send(ConductorMessage::ModeSelectorLocked { locked: true })
            .await;
        self.send(ConductorMessage::InterpretationStarted {
            status: language.interpreting_status().to_string(),
        })
        .await;
        self.set_state(ConductorState::Interpreting).await;
    }

    /// Apply a delivered interpretation outcome
    async fn handle_interpretation(&mut self, outcome: InterpretationOutcome) {
        let language = self.config.language;

        if outcome.session_id != self.session.id {
            tracing::debug!(
                session_id = %outcome.session_id,
                current = %self.session.id,
                "Discarding interpretation for a superseded session"
            );
            return;
        }

        match outcome.result {
            Ok(interpretation) => {
                self.send(ConductorMessage::Interpretation {
                    content: interpretation.text().to_string(),
                    markup: interpretation.markup(language),
                })
                .await;

                let opened = self.open_chat(interpretation.text());
                self.session.set_interpretation(interpretation);

                match opened {
                    Ok(chat) => {
                        self.session.open_chat(chat);
                        self.send(ConductorMessage::ChatAvailable).await;
                        self.send(ConductorMessage::SendControl { enabled: true })
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %self.session.id, error = %e, "Chat initialization failed");
                        self.session.mark_chat_unavailable();
                        self.send(ConductorMessage::ChatUnavailable {
                            reason: language.chat_init_failed().to_string(),
                        })
                        .await;
                        self.notify(NotifyLevel::Error, language.chat_init_failed())
                            .await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session.id, error = %e, "Interpretation failed");
                self.session.fail_interpretation();
                let message = language.interpretation_failed(&e.detail());
                self.send(ConductorMessage::InterpretationFailed {
                    message: message.clone(),
                })
                .await;
                self.notify(NotifyLevel::Error, &message).await;
            }
        }

        self.send(ConductorMessage::ModeSelectorLocked { locked: false })
            .await;
        self.set_state(ConductorState::Ready).await;
    }

    /// Open the follow-up chat seeded with the interpretation
    fn open_chat(&self, interpretation: &str) -> Result<ChatHandle, ReadingError> {
        let language = self.config.language;
        let cards = self.session.selected_cards();
        let details = card_details(language, &cards);
        let system =
            build_system_instruction(language, self.session.mode(), &details, interpretation);
        let history = vec![
            ChatContent::user(seed_user_message(language, &details)),
            ChatContent::model(interpretation),
        ];

        ChatHandle::open(
            Arc::clone(&self.backend),
            self.config.model.clone(),
            system,
            history,
        )
    }

    /// Send a chat message and start streaming the reply
    async fn send_message(&mut self, content: &str) {
        let language = self.config.language;
        let message = content.trim();
        if message.is_empty() {
            return;
        }

        let chat = match self.session.chat_state() {
            ChatState::Open(chat) => chat.clone(),
            ChatState::Closed | ChatState::Unavailable => {
                tracing::debug!(session_id = %self.session.id, "No chat open, message ignored");
                return;
            }
        };
        if self.session.is_streaming() {
            tracing::debug!(session_id = %self.session.id, "Reply in flight, message ignored");
            return;
        }

        let length = message.chars().count();
        if length > self.config.max_message_chars {
            tracing::warn!(length, max = self.config.max_message_chars, "Rejected chat message");
            self.notify(
                NotifyLevel::Warning,
                &language.message_too_long(self.config.max_message_chars),
            )
            .await;
            return;
        }

        let user_turn = self.session.add_turn(TurnRole::User, message).clone();
        self.send(ConductorMessage::Turn {
            id: user_turn.id,
            role: TurnRole::User,
            markup: format_markup(language, &user_turn.text),
            content: user_turn.text,
            streaming: false,
        })
        .await;
        self.send(ConductorMessage::SendControl { enabled: false })
            .await;
        self.send(ConductorMessage::Status {
            text: Some(language.thinking_status().to_string()),
        })
        .await;
        self.set_state(ConductorState::Responding).await;

        match chat.send_stream(message).await {
            Ok(rx) => {
                let id = self.session.start_assistant_response(rx);
                self.send(ConductorMessage::Turn {
                    id,
                    role: TurnRole::Assistant,
                    content: String::new(),
                    markup: format_markup(language, ""),
                    streaming: true,
                })
                .await;
            }
            Err(e) => self.fail_send(&e).await,
        }
    }

    /// Apply streamed reply fragments
    ///
    /// Returns true if there was activity.
    async fn poll_streaming(&mut self) -> bool {
        let tokens = self.session.drain_stream();
        if tokens.is_empty() {
            return false;
        }

        let language = self.config.language;
        for token in tokens {
            match token {
                StreamingToken::Token(text) => {
                    let update = self
                        .session
                        .append_streaming(&text)
                        .map(|turn| (turn.id.clone(), turn.text.clone()));
                    if let Some((id, content)) = update {
                        self.send(ConductorMessage::TurnUpdated {
                            id,
                            markup: format_markup(language, &content),
                            content,
                        })
                        .await;
                    }
                }

                StreamingToken::Complete { message } => {
                    let nothing_streamed = self
                        .session
                        .turns()
                        .last()
                        .is_some_and(|t| t.streaming && t.text.is_empty());
                    if nothing_streamed {
                        self.session.append_streaming(&message);
                    }
                    self.finish_streaming_turn().await;
                    self.send(ConductorMessage::Status { text: None }).await;
                    self.send(ConductorMessage::SendControl { enabled: true })
                        .await;
                    self.set_state(ConductorState::Ready).await;
                }

                StreamingToken::Error(error) => {
                    // The partial reply stays as it is
                    self.finish_streaming_turn().await;
                    self.fail_send(&ReadingError::ChatSend(error)).await;
                }
            }
        }

        true
    }

    /// Close the streaming turn and tell the surface its final content
    async fn finish_streaming_turn(&mut self) {
        let language = self.config.language;
        let finished = self
            .session
            .complete_streaming()
            .map(|turn| (turn.id.clone(), turn.text.clone()));
        if let Some((id, content)) = finished {
            self.send(ConductorMessage::TurnCompleted {
                id,
                markup: format_markup(language, &content),
                content,
            })
            .await;
        }
    }

    /// Record a failed send as an error turn and re-enable sending
    async fn fail_send(&mut self, error: &ReadingError) {
        let language = self.config.language;
        tracing::warn!(session_id = %self.session.id, error = %error, "Chat message failed");

        let text = language.send_failed(&error.detail());
        let id: MessageId = self.session.add_turn(TurnRole::Error, text.clone()).id.clone();
        self.send(ConductorMessage::Turn {
            id,
            role: TurnRole::Error,
            markup: format_markup(language, &text),
            content: text,
            streaming: false,
        })
        .await;
        self.send(ConductorMessage::Status { text: None }).await;
        self.send(ConductorMessage::SendControl { enabled: true })
            .await;
        self.set_state(ConductorState::Ready).await;
    }

    /// Shutdown the Conductor
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.set_state(ConductorState::ShuttingDown).await;
        self.session.end();

        self.send(ConductorMessage::Quit {
            message: Some("Goodbye!".to_string()),
        })
        .await;

        Ok(())
    }

    /// Set state and notify surface
    async fn set_state(&mut self, state: ConductorState) {
        self.state = state;
        self.send(ConductorMessage::State { state }).await;
    }

    /// Send acknowledgment
    async fn ack(&self, event_id: EventId) {
        self.send(ConductorMessage::Ack { event_id }).await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.send(ConductorMessage::Notify {
            level,
            title: None,
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the surface
    async fn send(&self, msg: ConductorMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}
