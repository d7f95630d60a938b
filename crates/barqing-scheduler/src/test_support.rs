//! Hand-written collaborators for unit tests.

use async_trait::async_trait;
use barqing_core::error::{BarqingError, Result};
use barqing_core::traits::{Channel, ChatApi, SessionStore};
use barqing_core::types::{CommandSpec, Conversation, Destination, LatestMessage, UserSession};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn conv(id: &str, msg_id: &str, author_id: &str, author_name: &str, content: &str) -> Conversation {
    Conversation {
        id: id.into(),
        latest: Some(LatestMessage {
            id: msg_id.into(),
            author_id: author_id.into(),
            author_name: author_name.into(),
            content: content.into(),
        }),
    }
}

/// Remote API whose state the test sets directly.
pub struct ScriptedApi {
    self_id: String,
    chats: Mutex<Vec<Conversation>>,
    failing_self_id: AtomicUsize,
    failing_chats: AtomicUsize,
    pub self_id_calls: AtomicUsize,
    pub chats_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.into(),
            chats: Mutex::new(Vec::new()),
            failing_self_id: AtomicUsize::new(0),
            failing_chats: AtomicUsize::new(0),
            self_id_calls: AtomicUsize::new(0),
            chats_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_chats(&self, chats: Vec<Conversation>) {
        *self.chats.lock().unwrap() = chats;
    }

    pub fn fail_chats(&self, times: usize) {
        self.failing_chats.store(times, Ordering::SeqCst);
    }

    pub fn fail_self_id(&self, times: usize) {
        self.failing_self_id.store(times, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn self_id(&self, _credential: &str) -> Result<String> {
        self.self_id_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_self_id) {
            return Err(BarqingError::Api { status: 500, body: "boom".into() });
        }
        Ok(self.self_id.clone())
    }

    async fn conversations(&self, _credential: &str) -> Result<Vec<Conversation>> {
        self.chats_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_chats) {
            return Err(BarqingError::Api { status: 502, body: "bad gateway".into() });
        }
        Ok(self.chats.lock().unwrap().clone())
    }
}

/// Channel that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(Destination, String)>>,
    pub commands: Mutex<Vec<CommandSpec>>,
    pub fail_sends: AtomicBool,
    pub fail_register: AtomicBool,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<(Destination, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(BarqingError::Channel("setMyCommands: 401".into()));
        }
        self.commands.lock().unwrap().extend_from_slice(commands);
        Ok(())
    }

    async fn send_text(&self, destination: Destination, text: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BarqingError::Channel("blocked by user".into()));
        }
        self.sent.lock().unwrap().push((destination, text.to_string()));
        Ok(())
    }
}

/// In-memory store; `put` stages, `sync` commits.
#[derive(Default)]
pub struct MemoryStore {
    pub committed: Mutex<HashMap<String, UserSession>>,
    staged: Mutex<HashMap<String, UserSession>>,
    pub syncs: AtomicUsize,
}

impl MemoryStore {
    pub fn with_sessions(sessions: Vec<UserSession>) -> Self {
        let store = Self::default();
        {
            let mut committed = store.committed.lock().unwrap();
            for s in sessions {
                committed.insert(s.store_key(), s);
            }
        }
        store
    }

    pub fn committed(&self, key: &str) -> Option<UserSession> {
        self.committed.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<(String, UserSession)>> {
        Ok(self
            .committed
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn put(&self, key: &str, session: &UserSession) -> Result<()> {
        self.staged.lock().unwrap().insert(key.to_string(), session.clone());
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let staged: Vec<_> = self.staged.lock().unwrap().drain().collect();
        self.committed.lock().unwrap().extend(staged);
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
