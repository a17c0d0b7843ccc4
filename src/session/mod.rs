//! Conversation sessions: the system prompt and transcript of one browser session.
//!
//! A [`SessionStore`] maps cookie-carried [`SessionId`]s to [`SessionHandle`]s.
//! Each session lives behind its own async mutex; the chat driver holds it
//! for a whole turn so turns of one session never interleave.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

mod middleware;

pub use middleware::{CurrentSession, SessionMiddleware};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "chat_session";

/// The persona every new session starts with.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a well-being officer for the Bengaluru Police. \
Your goal is to provide mental health support, stress management advice, \
and helpful resources to the officers.";

/// Who wrote a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The lowercase wire name, as used in JSON and the page's `data-role`.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry. `content` is raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// A message typed by the person chatting.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// A model reply, or the `"Error: ..."` text standing in for one.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// State of one conversation.
///
/// A session owns the system prompt currently in force and the transcript of
/// everything said so far. The transcript only grows, two messages per turn,
/// and only [`ChatDriver`](crate::chat::ChatDriver) appends to it.
///
/// # Examples
///
/// ```
/// use wellbeing_chat::session::{DEFAULT_SYSTEM_PROMPT, Session};
///
/// let mut session = Session::new();
/// assert_eq!(session.system_prompt(), DEFAULT_SYSTEM_PROMPT);
///
/// assert!(session.update_system_prompt("Answer briefly."));
/// assert!(!session.update_system_prompt("Answer briefly."));
/// assert!(session.transcript().is_empty());
/// ```
#[derive(Debug)]
pub struct Session {
    system_prompt: String,
    transcript: Vec<Message>,
    last_active: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session: default persona, empty transcript.
    pub fn new() -> Self {
        Self::with_system_prompt(DEFAULT_SYSTEM_PROMPT)
    }

    /// A fresh session starting from `system_prompt` instead of the default persona.
    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            transcript: Vec::new(),
            last_active: Instant::now(),
        }
    }

    /// The prompt the next turn will be sent with.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Every message so far, oldest first.
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Replaces the system prompt if `candidate` differs from the current value.
    ///
    /// The comparison is by value, so resubmitting the editor unchanged is not
    /// an edit. The transcript is left alone either way.
    ///
    /// # Arguments
    ///
    /// - `candidate`: the editor's current text, taken verbatim.
    ///
    /// # Returns
    ///
    /// `true` if the prompt was replaced.
    pub fn update_system_prompt(&mut self, candidate: &str) -> bool {
        if self.system_prompt == candidate {
            return false;
        }
        self.system_prompt = candidate.to_owned();
        true
    }

    /// Appends to the transcript. Only the chat driver records messages.
    pub(crate) fn record(&mut self, message: Message) {
        self.transcript.push(message);
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Time since the session was last used.
    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }
}

/// Opaque session identifier (a random UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A new random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Shared, lockable access to one session.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// All live sessions of this process. Cloning shares the same map.
///
/// The map itself sits behind a short-lived `std::sync::Mutex`; it is never
/// held across an `.await`. Each session has its own async mutex, which the
/// chat driver holds for a whole turn.
///
/// # Examples
///
/// ```
/// use wellbeing_chat::session::SessionStore;
///
/// let store = SessionStore::new();
/// let (id, _, created) = store.get_or_create(None);
/// assert!(created);
///
/// let (same, _, created) = store.get_or_create(Some(id));
/// assert_eq!(same, id);
/// assert!(!created);
///
/// assert!(store.end(&id));
/// assert!(store.is_empty());
/// ```
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
}

impl SessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `id`, creating a fresh one when `id` is absent
    /// or unknown.
    ///
    /// A new session starts with [`DEFAULT_SYSTEM_PROMPT`] and an empty
    /// transcript. An existing session is returned as it is (never
    /// reinitialized) and its idle clock is reset, so a visit that only reads
    /// the page still keeps the session alive.
    ///
    /// # Arguments
    ///
    /// - `id`: the identifier presented by the client, if any.
    ///
    /// # Returns
    ///
    /// The session's id (a new one if `id` was absent or unknown), its handle,
    /// and `true` when the session was created by this call.
    pub fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, SessionHandle, bool) {
        let mut sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = id {
            if let Some(handle) = sessions.get(&id) {
                // A locked session has a turn in flight and is not idle anyway.
                if let Ok(mut session) = handle.try_lock() {
                    session.touch();
                }
                return (id, Arc::clone(handle), false);
            }
        }

        let id = SessionId::generate();
        let handle: SessionHandle = Arc::new(tokio::sync::Mutex::new(Session::new()));
        sessions.insert(id, Arc::clone(&handle));
        debug!(session = %id, live = sessions.len(), "session created");
        (id, handle, true)
    }

    /// Looks up a live session without creating one.
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Ends a session, dropping its prompt and transcript. Returns whether it existed.
    pub fn end(&self, id: &SessionId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Ends every session idle for longer than `ttl`.
    ///
    /// Sessions with a turn in flight are locked and therefore never idle.
    ///
    /// # Returns
    ///
    /// How many sessions were ended.
    pub fn reap_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.idle_for() <= ttl,
            Err(_) => true,
        });
        let reaped = before - sessions.len();
        if reaped > 0 {
            info!(reaped, live = sessions.len(), "idle sessions ended");
        }
        reaped
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` if no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_uses_default_persona() {
        let session = Session::new();
        assert_eq!(session.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert!(session.transcript().is_empty());
        assert!(DEFAULT_SYSTEM_PROMPT.starts_with("You are a well-being officer for the Bengaluru Police. Your goal"));
        assert!(DEFAULT_SYSTEM_PROMPT.ends_with("helpful resources to the officers."));
    }

    #[test]
    fn prompt_update_is_value_compared() {
        let mut session = Session::new();
        assert!(!session.update_system_prompt(&DEFAULT_SYSTEM_PROMPT.to_owned()));
        assert!(session.update_system_prompt("Be brief."));
        assert_eq!(session.system_prompt(), "Be brief.");
        assert!(!session.update_system_prompt("Be brief."));
    }

    #[test]
    fn store_initializes_once_per_session() {
        let store = SessionStore::new();
        let (id, handle, created) = store.get_or_create(None);
        assert!(created);
        handle.try_lock().unwrap().update_system_prompt("custom");

        let (same_id, again, created) = store.get_or_create(Some(id));
        assert!(!created);
        assert_eq!(same_id, id);
        assert_eq!(again.try_lock().unwrap().system_prompt(), "custom");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_id_gets_a_new_session() {
        let store = SessionStore::new();
        let stale = SessionId::generate();
        let (id, _, created) = store.get_or_create(Some(stale));
        assert!(created);
        assert_ne!(id, stale);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::new();
        let (_, a, _) = store.get_or_create(None);
        let (_, b, _) = store.get_or_create(None);
        a.try_lock().unwrap().record(Message::user("only in a"));
        assert!(b.try_lock().unwrap().transcript().is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn end_drops_state() {
        let store = SessionStore::new();
        let (id, _, _) = store.get_or_create(None);
        assert!(store.end(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.end(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn reap_skips_busy_and_fresh_sessions() {
        let store = SessionStore::new();
        let (_, idle, _) = store.get_or_create(None);
        let (_, busy, _) = store.get_or_create(None);
        std::thread::sleep(Duration::from_millis(20));
        let (fresh_id, _, _) = store.get_or_create(None);

        let _turn = busy.try_lock().unwrap();
        drop(idle);
        let reaped = store.reap_idle(Duration::from_millis(10));
        assert_eq!(reaped, 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(&fresh_id).is_some());
    }

    #[test]
    fn revisiting_a_session_keeps_it_alive() {
        let store = SessionStore::new();
        let (id, _, _) = store.get_or_create(None);
        std::thread::sleep(Duration::from_millis(30));

        let (_, handle, created) = store.get_or_create(Some(id));
        assert!(!created);
        assert!(handle.try_lock().unwrap().idle_for() < Duration::from_millis(30));
        assert_eq!(store.reap_idle(Duration::from_millis(25)), 0);
        assert!(store.get(&id).is_some());
    }

    #[test]
    fn session_id_round_trips_through_text() {
        let id = SessionId::generate();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn message_serializes_lowercase_role() {
        let json = serde_json::to_string(&Message::assistant("hi there")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi there"}"#);
    }
}
