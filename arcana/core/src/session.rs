//! Reading Session
//!
//! Everything one reading owns: the dealt cards and the selection, the
//! interpretation (pending or received), the chat handle, the visible chat
//! transcript and the reply being streamed. Starting a new reading replaces the
//! whole session; [`ReadingSession::end`] drops pending work first so nothing
//! from the old reading can reach the new one.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::backend::StreamingToken;
use crate::chat::{ChatHandle, ChatTurn};
use crate::deck::{CardInstance, DeckProvider, InstanceToken};
use crate::interpretation::{Interpretation, InterpretationOutcome, PendingInterpretation};
use crate::language::Language;
use crate::messages::{MessageId, SessionId, TurnRole};
use crate::selection::{SelectOutcome, Selection, SpreadMode};

/// Where the interpretation of a session stands
#[derive(Debug, Default)]
pub enum InterpretationState {
    /// Not requested yet
    #[default]
    NotRequested,
    /// Request in flight
    Pending(PendingInterpretation),
    /// Received
    Ready(Interpretation),
    /// The request failed; a new session is needed to retry
    Failed,
}

/// Whether the follow-up chat can be used
#[derive(Debug, Default)]
pub enum ChatState {
    /// No interpretation yet
    #[default]
    Closed,
    /// Open and usable
    Open(ChatHandle),
    /// Opening failed; stays unavailable for this session
    Unavailable,
}

/// One reading, from dealing the cards to the last chat turn
#[derive(Debug)]
pub struct ReadingSession {
    /// Unique session ID
    pub id: SessionId,
    language: Language,
    selection: Selection,
    interpretation: InterpretationState,
    chat: ChatState,
    turns: Vec<ChatTurn>,
    /// Reply stream in flight
    streaming_rx: Option<mpsc::Receiver<StreamingToken>>,
    /// Assistant turn the stream fills
    streaming_turn: Option<MessageId>,
    ended: bool,
}

impl Default for ReadingSession {
    fn default() -> Self {
        Self::with_selection(Language::default(), Selection::default())
    }
}

impl ReadingSession {
    /// Deal a new reading
    #[must_use]
    pub fn start(mode: SpreadMode, deck: &DeckProvider) -> Self {
        Self::with_selection(deck.language(), Selection::start(mode, deck))
    }

    /// A session over an existing selection
    #[must_use]
    pub fn with_selection(language: Language, selection: Selection) -> Self {
        Self {
            id: SessionId::new(),
            language,
            selection,
            interpretation: InterpretationState::NotRequested,
            chat: ChatState::Closed,
            turns: Vec::new(),
            streaming_rx: None,
            streaming_turn: None,
            ended: false,
        }
    }

    /// Working language
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Active spread
    #[must_use]
    pub fn mode(&self) -> SpreadMode {
        self.selection.mode()
    }

    /// Card selection state
    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Turn over a card
    pub fn select(&mut self, token: InstanceToken) -> SelectOutcome {
        self.selection.select(token)
    }

    /// Chosen cards, in click order
    #[must_use]
    pub fn selected_cards(&self) -> Vec<&CardInstance> {
        self.selection.ordered_selections().collect()
    }

    // ============================================
    // Interpretation
    // ============================================

    /// Interpretation state
    #[must_use]
    pub fn interpretation_state(&self) -> &InterpretationState {
        &self.interpretation
    }

    /// The received interpretation
    #[must_use]
    pub fn interpretation(&self) -> Option<&Interpretation> {
        match &self.interpretation {
            InterpretationState::Ready(interpretation) => Some(interpretation),
            _ => None,
        }
    }

    /// Whether an interpretation was already asked for in this session
    #[must_use]
    pub fn interpretation_requested(&self) -> bool {
        !matches!(self.interpretation, InterpretationState::NotRequested)
    }

    /// Track an interpretation request
    pub fn begin_interpretation(&mut self, pending: PendingInterpretation) {
        self.interpretation = InterpretationState::Pending(pending);
    }

    /// Take the interpretation outcome if it has arrived
    pub fn poll_interpretation(&mut self) -> Option<InterpretationOutcome> {
        match &mut self.interpretation {
            InterpretationState::Pending(pending) => pending.try_take(),
            _ => None,
        }
    }

    /// Record the interpretation
    pub fn set_interpretation(&mut self, interpretation: Interpretation) {
        self.interpretation = InterpretationState::Ready(interpretation);
    }

    /// Record a failed request
    pub fn fail_interpretation(&mut self) {
        self.interpretation = InterpretationState::Failed;
    }

    // ============================================
    // Chat
    // ============================================

    /// The open chat
    #[must_use]
    pub fn chat(&self) -> Option<&ChatHandle> {
        match &self.chat {
            ChatState::Open(chat) => Some(chat),
            _ => None,
        }
    }

    /// Chat state
    #[must_use]
    pub fn chat_state(&self) -> &ChatState {
        &self.chat
    }

    /// Record the opened chat
    pub fn open_chat(&mut self, chat: ChatHandle) {
        self.chat = ChatState::Open(chat);
    }

    /// Record that the chat could not be opened
    pub fn mark_chat_unavailable(&mut self) {
        self.chat = ChatState::Unavailable;
    }

    /// Visible chat transcript
    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Append a finished turn
    pub fn add_turn(&mut self, role: TurnRole, text: impl Into<String>) -> &ChatTurn {
        self.turns.push(ChatTurn::new(role, text));
        &self.turns[self.turns.len() - 1]
    }

    /// Start filling an assistant turn from a reply stream
    pub fn start_assistant_response(&mut self, rx: mpsc::Receiver<StreamingToken>) -> MessageId {
        let turn = ChatTurn::streaming_assistant();
        let id = turn.id.clone();
        self.turns.push(turn);
        self.streaming_rx = Some(rx);
        self.streaming_turn = Some(id.clone());
        id
    }

    /// Whether a reply is streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming_rx.is_some()
    }

    /// Collect the tokens that have arrived, up to a terminal one
    ///
    /// A stream that closes without a terminal token yields an `Error`.
    pub fn drain_stream(&mut self) -> Vec<StreamingToken> {
        let Some(rx) = self.streaming_rx.as_mut() else {
            return Vec::new();
        };

        let mut collected = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(token) => {
                    let terminal = token.is_terminal();
                    collected.push(token);
                    if terminal {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    collected.push(StreamingToken::Error(
                        "stream closed before the reply completed".to_string(),
                    ));
                    break;
                }
            }
        }
        collected
    }

    /// Append a fragment to the streaming turn
    pub fn append_streaming(&mut self, text: &str) -> Option<&ChatTurn> {
        let id = self.streaming_turn.as_ref()?;
        let turn = self.turns.iter_mut().find(|t| &t.id == id)?;
        turn.append(text);
        Some(turn)
    }

    /// Finish the streaming turn and release the stream
    ///
    /// The turn keeps whatever text it has; a failed reply stays visible as-is.
    pub fn complete_streaming(&mut self) -> Option<&ChatTurn> {
        self.streaming_rx = None;
        let id = self.streaming_turn.take()?;
        let turn = self.turns.iter_mut().find(|t| t.id == id)?;
        turn.complete();
        Some(turn)
    }

    // ============================================
    // Lifecycle
    // ============================================

    /// Whether the session was ended
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// End the session, dropping pending work
    ///
    /// Aborts a pending interpretation and drops the reply stream, which stops
    /// its forwarding task.
    pub fn end(&mut self) {
        if let InterpretationState::Pending(_) = self.interpretation {
            self.interpretation = InterpretationState::NotRequested;
        }
        self.streaming_rx = None;
        if let Some(id) = self.streaming_turn.take() {
            if let Some(turn) = self.turns.iter_mut().find(|t| t.id == id) {
                turn.complete();
            }
        }
        self.ended = true;
        tracing::debug!(session_id = %self.id, "Reading session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_awaiting_selection() {
        let session = ReadingSession::start(SpreadMode::ThreeCard, &DeckProvider::default());
        assert_eq!(session.mode(), SpreadMode::ThreeCard);
        assert_eq!(session.selection().cards().len(), 22);
        assert!(!session.interpretation_requested());
        assert!(session.chat().is_none());
        assert!(session.turns().is_empty());
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let deck = DeckProvider::default();
        let a = ReadingSession::start(SpreadMode::Single, &deck);
        let b = ReadingSession::start(SpreadMode::Single, &deck);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_streaming_turn_lifecycle() {
        let mut session = ReadingSession::default();
        let (tx, rx) = mpsc::channel(8);
        let id = session.start_assistant_response(rx);
        assert!(session.is_streaming());

        tx.send(StreamingToken::Token("Hel".into())).await.unwrap();
        tx.send(StreamingToken::Token("lo".into())).await.unwrap();
        tx.send(StreamingToken::Complete {
            message: "Hello".into(),
        })
        .await
        .unwrap();

        let tokens = session.drain_stream();
        assert_eq!(tokens.len(), 3);
        for token in &tokens {
            if let StreamingToken::Token(text) = token {
                session.append_streaming(text);
            }
        }
        let turn = session.complete_streaming().unwrap();
        assert_eq!(turn.id, id);
        assert_eq!(turn.text, "Hello");
        assert!(!turn.streaming);
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_closed_stream_reports_error() {
        let mut session = ReadingSession::default();
        let (tx, rx) = mpsc::channel(8);
        session.start_assistant_response(rx);
        tx.send(StreamingToken::Token("partial".into())).await.unwrap();
        drop(tx);

        let tokens = session.drain_stream();
        assert_eq!(tokens.len(), 2);
        assert!(matches!(tokens[1], StreamingToken::Error(_)));
    }

    #[tokio::test]
    async fn test_end_drops_stream() {
        let mut session = ReadingSession::default();
        let (tx, rx) = mpsc::channel(8);
        session.start_assistant_response(rx);

        session.end();
        assert!(session.is_ended());
        assert!(!session.is_streaming());
        assert!(tx.is_closed());
        assert!(session.turns().iter().all(|t| !t.streaming));
    }

    #[test]
    fn test_add_turn() {
        let mut session = ReadingSession::default();
        let turn = session.add_turn(TurnRole::User, "Tell me more");
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(session.turns().len(), 1);
    }
}
