//! Session registry: owns every user session and its refresher task,
//! and turns user commands into state changes.
//!
//! Per user: no session → (login) → active ⇄ (start/stop) inactive.
//! There is no way back to "no session".

use std::collections::HashMap;
use std::sync::Arc;

use barqing_core::traits::{ChatApi, SessionStore};
use barqing_core::types::{Command, Destination, UserSession};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::queue::DeliveryQueue;
use crate::refresher::{Refresher, SharedSession};
use crate::retry::RetryPolicy;

pub const REPLY_RECEIVING: &str = "receiving messages";
pub const REPLY_NOT_RECEIVING: &str = "not receiving messages anymore";
pub const REPLY_NOT_LOGGED_IN: &str = "you haven't logged in yet";

struct RefresherHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct SessionEntry {
    session: SharedSession,
    refresher: Option<RefresherHandle>,
}

/// All user sessions, keyed by their notification destination.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Destination, SessionEntry>>,
    api: Arc<dyn ChatApi>,
    store: Arc<dyn SessionStore>,
    queue: DeliveryQueue,
    policy: RetryPolicy,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Arc<dyn SessionStore>,
        queue: DeliveryQueue,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            api,
            store,
            queue,
            policy,
        }
    }

    /// Registry pre-filled with every stored session. Refreshers are not
    /// started yet, see [`SessionRegistry::start_all`].
    pub async fn load(
        api: Arc<dyn ChatApi>,
        store: Arc<dyn SessionStore>,
        queue: DeliveryQueue,
        policy: RetryPolicy,
    ) -> barqing_core::Result<Self> {
        let stored = store.load_all().await?;
        let registry = Self::new(api, store, queue, policy);
        {
            let mut sessions = registry.sessions.lock().await;
            for (key, session) in stored {
                if key != session.store_key() {
                    tracing::warn!(
                        "⚠️ Session stored under '{key}' belongs to {}",
                        session.notify_destination
                    );
                }
                sessions.insert(
                    session.notify_destination,
                    SessionEntry {
                        session: Arc::new(Mutex::new(session)),
                        refresher: None,
                    },
                );
            }
            tracing::info!("📂 Loaded {} sessions", sessions.len());
        }
        Ok(registry)
    }

    /// Start a refresher for every session that has none.
    pub async fn start_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for entry in sessions.values_mut() {
            if entry.refresher.is_none() {
                entry.refresher = Some(self.spawn_refresher(entry.session.clone()));
            }
        }
    }

    fn spawn_refresher(&self, session: SharedSession) -> RefresherHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let refresher = Refresher::new(session, self.api.clone(), self.queue.clone(), self.policy);
        let task = tokio::spawn(refresher.run(stop_rx));
        RefresherHandle { stop_tx, task }
    }

    /// Apply a command from `destination`. Returns the reply to send, if any.
    pub async fn handle(&self, destination: Destination, command: Command) -> Option<String> {
        match command {
            Command::Login(credential) => self.login(destination, &credential).await,
            Command::Start => self.set_active(destination, true).await,
            Command::Stop => self.set_active(destination, false).await,
        }
    }

    async fn login(&self, destination: Destination, credential: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&destination) {
            tracing::debug!("Login from {destination} ignored, already logged in");
            return None;
        }

        let session = UserSession::new(credential, destination);
        if let Err(e) = self.persist(&session).await {
            tracing::warn!("⚠️ Could not persist new session {destination}: {e}");
        }

        let shared = Arc::new(Mutex::new(session));
        let refresher = self.spawn_refresher(shared.clone());
        sessions.insert(
            destination,
            SessionEntry {
                session: shared,
                refresher: Some(refresher),
            },
        );
        tracing::info!("🔑 New session for {destination}");
        Some(REPLY_RECEIVING.into())
    }

    async fn persist(&self, session: &UserSession) -> barqing_core::Result<()> {
        self.store.put(&session.store_key(), session).await?;
        self.store.sync().await
    }

    async fn set_active(&self, destination: Destination, active: bool) -> Option<String> {
        let session = {
            let sessions = self.sessions.lock().await;
            match sessions.get(&destination) {
                Some(entry) => entry.session.clone(),
                None => return Some(REPLY_NOT_LOGGED_IN.into()),
            }
        };
        session.lock().await.active = active;
        tracing::info!(
            "{} Session {destination} {}",
            if active { "▶️" } else { "⏸️" },
            if active { "active" } else { "inactive" }
        );
        let reply = if active { REPLY_RECEIVING } else { REPLY_NOT_RECEIVING };
        Some(reply.to_string())
    }

    /// Write every session to the store. Returns how many were written.
    pub async fn flush(&self) -> barqing_core::Result<usize> {
        let shared: Vec<SharedSession> = {
            let sessions = self.sessions.lock().await;
            sessions.values().map(|e| e.session.clone()).collect()
        };
        for session in &shared {
            let snapshot = session.lock().await.clone();
            self.store.put(&snapshot.store_key(), &snapshot).await?;
        }
        self.store.sync().await?;
        Ok(shared.len())
    }

    /// Stop every refresher and wait for it to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<RefresherHandle> = {
            let mut sessions = self.sessions.lock().await;
            sessions.values_mut().filter_map(|e| e.refresher.take()).collect()
        };
        let count = handles.len();
        for handle in &handles {
            handle.stop_tx.send(true).ok();
        }
        for handle in handles {
            if let Err(e) = handle.task.await {
                tracing::warn!("⚠️ Refresher task ended abnormally: {e}");
            }
        }
        tracing::info!("🛑 Stopped {count} refreshers");
    }

    /// Snapshot of one user's session.
    #[cfg(test)]
    pub(crate) async fn session(&self, destination: Destination) -> Option<UserSession> {
        let shared = {
            let sessions = self.sessions.lock().await;
            sessions.get(&destination)?.session.clone()
        };
        let snapshot = shared.lock().await.clone();
        Some(snapshot)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Number of refresher tasks currently owned.
    #[cfg(test)]
    pub(crate) async fn running_refreshers(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|e| e.refresher.is_some())
            .count()
    }
}
