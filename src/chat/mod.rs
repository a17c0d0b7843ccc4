//! Chat driver: runs one conversational turn against a session.
//!
//! A turn walks `Idle → RecordingUser → AwaitingModel → RecordingAssistant → Idle`:
//! the user message is recorded, a [`ModelAdapter`] is built from the session's
//! *current* system prompt, the raw user text is sent, and the reply (or the
//! `"Error: ..."` text of a failure) is recorded as the assistant message.
//! Every turn therefore appends exactly two messages.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::{ChatModel, ModelAdapter};
use crate::session::{Message, Session};

/// Phases of a single turn, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    RecordingUser,
    AwaitingModel,
    RecordingAssistant,
}

/// What a completed turn appended as the assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: Message,
    /// `true` when `reply` carries an error text instead of a model completion.
    pub failed: bool,
}

/// One user action on the chat page: the editor's current prompt and/or a
/// submitted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatEvent {
    pub system_prompt: Option<String>,
    pub message: Option<String>,
}

impl ChatEvent {
    /// A message submission with no prompt edit.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            message: Some(text.into()),
        }
    }

    /// Attaches the editor's current prompt text.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Result of [`ChatDriver::handle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// Whether the event replaced the session's system prompt.
    pub prompt_changed: bool,
    /// The turn that ran, or `None` when the message was absent or blank.
    pub turn: Option<TurnOutcome>,
}

/// Orchestrates turns. One driver serves every session of the process.
///
/// The driver holds no per-session state; callers pass the locked
/// [`Session`] in, which keeps turns of one session strictly sequential.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use wellbeing_chat::chat::{ChatDriver, ChatEvent};
/// use wellbeing_chat::llm::GeminiClient;
/// use wellbeing_chat::session::Session;
///
/// # async fn demo() {
/// let driver = ChatDriver::new(Arc::new(GeminiClient::new("key")));
/// let mut session = Session::new();
///
/// let outcome = driver
///     .handle(&mut session, ChatEvent::message("hello").with_system_prompt("Be kind."))
///     .await;
/// assert!(outcome.prompt_changed);
/// assert_eq!(session.transcript().len(), 2);
/// # }
/// ```
#[derive(Clone)]
pub struct ChatDriver {
    model: Arc<dyn ChatModel>,
}

impl ChatDriver {
    /// A driver sending every turn to `model`.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Applies a user action: the prompt edit first (value-compared), then a
    /// turn if the message has any non-whitespace content.
    ///
    /// # Arguments
    ///
    /// - `session`: the caller's session, locked for the duration of the call.
    /// - `event`: the editor's current prompt and the submitted message.
    ///
    /// # Returns
    ///
    /// Whether the prompt changed, and the turn's outcome if one ran.
    pub async fn handle(&self, session: &mut Session, event: ChatEvent) -> EventOutcome {
        session.touch();

        let prompt_changed = event
            .system_prompt
            .as_deref()
            .is_some_and(|prompt| session.update_system_prompt(prompt));
        if prompt_changed {
            debug!(chars = session.system_prompt().len(), "system prompt updated");
        }

        let turn = match event.message {
            Some(text) if !text.trim().is_empty() => Some(self.turn(session, text).await),
            _ => None,
        };

        EventOutcome {
            prompt_changed,
            turn,
        }
    }

    /// Runs one full turn for `text`. The text is recorded and sent unmodified.
    ///
    /// Model failures do not propagate: they become an assistant message of
    /// the form `"Error: <message>"` and the outcome is marked `failed`. The
    /// transcript grows by exactly two messages in every case.
    pub async fn turn(&self, session: &mut Session, text: impl Into<String>) -> TurnOutcome {
        let text = text.into();
        let mut state = TurnState::Idle;

        advance(&mut state, TurnState::RecordingUser);
        session.record(Message::user(text.clone()));

        advance(&mut state, TurnState::AwaitingModel);
        let adapter = ModelAdapter::new(Arc::clone(&self.model), session.system_prompt());
        let result = adapter.generate(&text).await;

        advance(&mut state, TurnState::RecordingAssistant);
        let (reply, failed) = match result {
            Ok(completion) => (Message::assistant(completion), false),
            Err(e) => {
                warn!(model = adapter.model_name(), error = %e, "model call failed");
                (Message::assistant(e.to_reply()), true)
            }
        };
        session.record(reply.clone());
        session.touch();

        advance(&mut state, TurnState::Idle);
        TurnOutcome { reply, failed }
    }
}

fn advance(state: &mut TurnState, next: TurnState) {
    debug!(from = ?*state, to = ?next, "turn state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::LlmError;
    use crate::session::{DEFAULT_SYSTEM_PROMPT, Role};

    /// Replays canned results and records every call.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn with(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, system_instruction: &str, text: &str) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((system_instruction.to_owned(), text.to_owned()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("echo: {text}")))
        }
    }

    #[tokio::test]
    async fn hello_gets_hi_there() {
        let model = Scripted::with(vec![Ok("hi there".into())]);
        let driver = ChatDriver::new(model.clone());
        let mut session = Session::new();

        let outcome = driver.turn(&mut session, "hello").await;

        assert!(!outcome.failed);
        assert_eq!(
            session.transcript(),
            &[Message::user("hello"), Message::assistant("hi there")]
        );
        assert_eq!(
            model.calls(),
            vec![(DEFAULT_SYSTEM_PROMPT.to_owned(), "hello".to_owned())]
        );
    }

    #[tokio::test]
    async fn provider_failure_becomes_error_reply() {
        let model = Scripted::with(vec![Err(LlmError::Other("connection reset".into()))]);
        let driver = ChatDriver::new(model);
        let mut session = Session::new();

        let outcome = driver.turn(&mut session, "ping").await;

        assert!(outcome.failed);
        assert_eq!(
            session.transcript(),
            &[Message::user("ping"), Message::assistant("Error: connection reset")]
        );
    }

    #[tokio::test]
    async fn n_turns_give_2n_alternating_messages() {
        let model = Scripted::with(vec![
            Ok("one".into()),
            Err(LlmError::Api {
                status: 503,
                message: "overloaded".into(),
            }),
            Ok("three".into()),
        ]);
        let driver = ChatDriver::new(model);
        let mut session = Session::new();

        for text in ["a", "b", "c", "d"] {
            driver.turn(&mut session, text).await;
        }

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 8);
        for (i, message) in transcript.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(message.role, expected, "message {i}");
        }
        assert_eq!(transcript[3].content, "Error: 503 overloaded");
        assert_eq!(transcript[7].content, "echo: d");
    }

    #[tokio::test]
    async fn prompt_edit_applies_to_next_call() {
        let model = Scripted::with(vec![]);
        let driver = ChatDriver::new(model.clone());
        let mut session = Session::new();

        driver.handle(&mut session, ChatEvent::message("first")).await;
        let outcome = driver
            .handle(
                &mut session,
                ChatEvent::message("second").with_system_prompt("Answer in one word."),
            )
            .await;

        assert!(outcome.prompt_changed);
        let calls = model.calls();
        assert_eq!(calls[0].0, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(calls[1], ("Answer in one word.".to_owned(), "second".to_owned()));
    }

    #[tokio::test]
    async fn unchanged_prompt_is_not_a_change() {
        let driver = ChatDriver::new(Scripted::with(vec![]));
        let mut session = Session::new();
        let outcome = driver
            .handle(
                &mut session,
                ChatEvent::message("hi").with_system_prompt(DEFAULT_SYSTEM_PROMPT),
            )
            .await;
        assert!(!outcome.prompt_changed);
        assert!(outcome.turn.is_some());
    }

    #[tokio::test]
    async fn blank_message_runs_no_turn() {
        let model = Scripted::with(vec![]);
        let driver = ChatDriver::new(model.clone());
        let mut session = Session::new();

        let outcome = driver
            .handle(
                &mut session,
                ChatEvent {
                    system_prompt: Some("Be gentle.".into()),
                    message: Some("   ".into()),
                },
            )
            .await;

        assert!(outcome.prompt_changed);
        assert!(outcome.turn.is_none());
        assert!(session.transcript().is_empty());
        assert!(model.calls().is_empty());
        assert_eq!(session.system_prompt(), "Be gentle.");
    }

    #[tokio::test]
    async fn user_text_is_sent_verbatim() {
        let model = Scripted::with(vec![]);
        let driver = ChatDriver::new(model.clone());
        let mut session = Session::new();
        driver.turn(&mut session, "  **bold**  ").await;
        assert_eq!(model.calls()[0].1, "  **bold**  ");
        assert_eq!(session.transcript()[0].content, "  **bold**  ");
    }
}
