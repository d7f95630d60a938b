//! Refresher: polls the remote chat API for one user and queues a
//! notification for every genuinely new message.

use std::sync::Arc;

use barqing_core::traits::ChatApi;
use barqing_core::types::{ChatState, Conversation, Notification, UserSession};
use tokio::sync::{Mutex, watch};

use crate::queue::DeliveryQueue;
use crate::retry::RetryPolicy;

/// A session shared between its refresher, the command handler and the flush task.
pub type SharedSession = Arc<Mutex<UserSession>>;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session inactive, nothing polled.
    Skipped,
    /// The conversations query failed; state untouched.
    Failed,
    /// Conversations diffed, `notified` notifications queued.
    Polled { notified: usize },
}

/// Drives one user's session.
pub struct Refresher {
    session: SharedSession,
    api: Arc<dyn ChatApi>,
    queue: DeliveryQueue,
    policy: RetryPolicy,
    consecutive_failures: u32,
}

impl Refresher {
    pub fn new(
        session: SharedSession,
        api: Arc<dyn ChatApi>,
        queue: DeliveryQueue,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            session,
            api,
            queue,
            policy,
            consecutive_failures: 0,
        }
    }

    /// Tick until `stop` flips (or its sender is dropped).
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let destination = self.session.lock().await.notify_destination;
        tracing::info!("🔄 Refresher started for {destination}");

        while !*stop.borrow() {
            let outcome = self.tick().await;
            tracing::debug!("Refresher {destination}: {outcome:?}");

            let delay = self.policy.delay_after(self.consecutive_failures);
            tokio::select! {
                _ = stop.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!("⏹️ Refresher stopped for {destination}");
    }

    /// One polling cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let (active, credential, needs_identity) = {
            let session = self.session.lock().await;
            (
                session.active,
                session.credential.clone(),
                session.resolved_self_id.is_none(),
            )
        };
        if !active {
            return TickOutcome::Skipped;
        }

        if needs_identity {
            self.resolve_self_id(&credential).await;
        }

        let conversations = match self.api.conversations(&credential).await {
            Ok(c) => c,
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                tracing::warn!(
                    "⚠️ Chats query failed (attempt {}): {e}",
                    self.consecutive_failures
                );
                return TickOutcome::Failed;
            }
        };
        self.consecutive_failures = 0;

        // check and diff under one lock so a concurrent /stop cannot slip in between
        let notifications = {
            let mut session = self.session.lock().await;
            if !session.active {
                return TickOutcome::Skipped;
            }
            diff(&mut session, &conversations)
        };

        let notified = notifications.len();
        for notification in notifications {
            if let Err(e) = self.queue.put(notification) {
                tracing::warn!("⚠️ Dropping notification: {e}");
            }
        }
        TickOutcome::Polled { notified }
    }

    /// Best effort: on failure the diff runs without self-filtering
    /// and resolution is tried again next tick.
    async fn resolve_self_id(&self, credential: &str) {
        match self.api.self_id(credential).await {
            Ok(id) => {
                let mut session = self.session.lock().await;
                if session.resolved_self_id.is_none() {
                    tracing::info!(
                        "🪪 Resolved self id {id} for {}",
                        session.notify_destination
                    );
                    session.resolved_self_id = Some(id);
                }
            }
            Err(e) => tracing::warn!("⚠️ Identity query failed: {e}"),
        }
    }
}

/// Compare the reported conversations against the session's baselines,
/// advance them, and return the notifications due.
///
/// - first sighting of a conversation only records the baseline
/// - a changed latest message advances the baseline and notifies,
///   unless the user wrote it themselves
pub fn diff(session: &mut UserSession, conversations: &[Conversation]) -> Vec<Notification> {
    let mut notifications = Vec::new();

    for conversation in conversations {
        let Some(latest) = &conversation.latest else {
            continue;
        };

        let Some(state) = session.conversations.get_mut(&conversation.id) else {
            session.conversations.insert(
                conversation.id.clone(),
                ChatState::new(&conversation.id, &latest.id),
            );
            continue;
        };

        if state.last_seen_message_id == latest.id {
            continue;
        }
        state.last_seen_message_id = latest.id.clone();

        if session.resolved_self_id.as_deref() == Some(latest.author_id.as_str()) {
            continue;
        }
        notifications.push(Notification::new_message(
            session.notify_destination,
            &latest.author_name,
            &latest.content,
        ));
    }

    notifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::delivery_queue;
    use crate::test_support::{ScriptedApi, conv};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn session_with(baselines: &[(&str, &str)]) -> UserSession {
        let mut s = UserSession::new("tok", 42);
        s.resolved_self_id = Some("me".into());
        for (c, m) in baselines {
            s.conversations.insert(c.to_string(), ChatState::new(c, m));
        }
        s
    }

    #[test]
    fn test_new_message_notifies_and_advances_baseline() {
        let mut s = session_with(&[("c1", "m1")]);
        let out = diff(&mut s, &[conv("c1", "m2", "alex", "Alex", "hello")]);
        assert_eq!(out, vec![Notification::new_message(42, "Alex", "hello")]);
        assert_eq!(s.conversations["c1"].last_seen_message_id, "m2");
    }

    #[test]
    fn test_unchanged_poll_is_idempotent() {
        let mut s = session_with(&[("c1", "m1")]);
        let chats = [conv("c1", "m2", "alex", "Alex", "hello")];
        assert_eq!(diff(&mut s, &chats).len(), 1);
        assert!(diff(&mut s, &chats).is_empty());
    }

    #[test]
    fn test_first_observation_is_silent() {
        let mut s = session_with(&[]);
        let out = diff(&mut s, &[conv("c9", "m50", "alex", "Alex", "old history")]);
        assert!(out.is_empty());
        assert_eq!(s.conversations["c9"], ChatState::new("c9", "m50"));
    }

    #[test]
    fn test_self_authored_message_is_filtered_but_baseline_moves() {
        let mut s = session_with(&[("c1", "m1")]);
        let out = diff(&mut s, &[conv("c1", "m2", "me", "Me", "my reply")]);
        assert!(out.is_empty());
        assert_eq!(s.conversations["c1"].last_seen_message_id, "m2");
    }

    #[test]
    fn test_without_self_id_nothing_is_filtered() {
        let mut s = session_with(&[("c1", "m1")]);
        s.resolved_self_id = None;
        let out = diff(&mut s, &[conv("c1", "m2", "me", "Me", "my reply")]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_empty_conversation_is_skipped() {
        let mut s = session_with(&[]);
        let out = diff(&mut s, &[Conversation { id: "c1".into(), latest: None }]);
        assert!(out.is_empty());
        assert!(s.conversations.is_empty());
    }

    #[test]
    fn test_multiple_conversations_in_report_order() {
        let mut s = session_with(&[("c1", "m1"), ("c2", "n1")]);
        let out = diff(
            &mut s,
            &[
                conv("c1", "m2", "a", "A", "one"),
                conv("c3", "x1", "b", "B", "new chat"),
                conv("c2", "n2", "c", "C", "two"),
            ],
        );
        let rendered: Vec<String> = out.iter().map(|n| n.render()).collect();
        assert_eq!(rendered, vec!["A:\n\none", "C:\n\ntwo"]);
        assert_eq!(s.conversations.len(), 3);
    }

    fn refresher(session: &SharedSession, api: &Arc<ScriptedApi>) -> (Refresher, crate::queue::DeliveryReceiver) {
        let (queue, rx) = delivery_queue();
        let api: Arc<dyn ChatApi> = api.clone();
        (
            Refresher::new(session.clone(), api, queue, RetryPolicy::default()),
            rx,
        )
    }

    #[tokio::test]
    async fn test_tick_scenario_single_notification() {
        let session = Arc::new(Mutex::new(session_with(&[("c1", "m1")])));
        let api = Arc::new(ScriptedApi::new("me"));
        api.set_chats(vec![conv("c1", "m2", "alex", "Alex", "content of m2")]);
        let (mut r, mut rx) = refresher(&session, &api);

        assert_eq!(r.tick().await, TickOutcome::Polled { notified: 1 });
        assert_eq!(
            rx.get().await.unwrap(),
            Notification::new_message(42, "Alex", "content of m2")
        );
        assert!(rx.is_empty());
        assert_eq!(session.lock().await.conversations["c1"].last_seen_message_id, "m2");
    }

    #[tokio::test]
    async fn test_tick_resolves_identity_once() {
        let mut s = session_with(&[]);
        s.resolved_self_id = None;
        let session = Arc::new(Mutex::new(s));
        let api = Arc::new(ScriptedApi::new("me"));
        let (mut r, _rx) = refresher(&session, &api);

        r.tick().await;
        r.tick().await;
        assert_eq!(api.self_id_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.lock().await.resolved_self_id.as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn test_identity_failure_retried_next_tick_without_blocking_poll() {
        let mut s = session_with(&[("c1", "m1")]);
        s.resolved_self_id = None;
        let session = Arc::new(Mutex::new(s));
        let api = Arc::new(ScriptedApi::new("me"));
        api.fail_self_id(1);
        api.set_chats(vec![conv("c1", "m2", "me", "Me", "mine")]);
        let (mut r, _rx) = refresher(&session, &api);

        // identity unknown: own message slips through this once
        assert_eq!(r.tick().await, TickOutcome::Polled { notified: 1 });
        assert_eq!(session.lock().await.resolved_self_id, None);

        api.set_chats(vec![conv("c1", "m3", "me", "Me", "mine again")]);
        assert_eq!(r.tick().await, TickOutcome::Polled { notified: 0 });
        assert_eq!(api.self_id_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_api_failure_leaves_state_untouched() {
        let session = Arc::new(Mutex::new(session_with(&[("c1", "m1")])));
        let api = Arc::new(ScriptedApi::new("me"));
        api.set_chats(vec![conv("c1", "m2", "alex", "Alex", "hi")]);
        api.fail_chats(1);
        let (mut r, mut rx) = refresher(&session, &api);

        assert_eq!(r.tick().await, TickOutcome::Failed);
        assert_eq!(session.lock().await.conversations["c1"].last_seen_message_id, "m1");
        assert!(rx.is_empty());

        // retried unconditionally on the next tick
        assert_eq!(r.tick().await, TickOutcome::Polled { notified: 1 });
        assert!(rx.get().await.is_some());
    }

    #[tokio::test]
    async fn test_inactive_session_skips_and_keeps_baseline() {
        let session = Arc::new(Mutex::new(session_with(&[("c1", "m1")])));
        let api = Arc::new(ScriptedApi::new("me"));
        api.set_chats(vec![conv("c1", "m1", "alex", "Alex", "seen")]);
        let (mut r, rx) = refresher(&session, &api);

        session.lock().await.active = false;
        assert_eq!(r.tick().await, TickOutcome::Skipped);
        assert_eq!(api.chats_calls.load(Ordering::SeqCst), 0);

        session.lock().await.active = true;
        assert_eq!(r.tick().await, TickOutcome::Polled { notified: 0 });
        assert!(rx.is_empty());
        assert_eq!(session.lock().await.conversations["c1"].last_seen_message_id, "m1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval_until_stopped() {
        let session = Arc::new(Mutex::new(session_with(&[])));
        let api = Arc::new(ScriptedApi::new("me"));
        let (r, _rx) = refresher(&session, &api);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(r.run(stop_rx));
        // first tick is immediate, then one every 5s
        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert_eq!(api.chats_calls.load(Ordering::SeqCst), 3);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.chats_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_backs_off_when_ceiling_configured() {
        let session = Arc::new(Mutex::new(session_with(&[])));
        let api = Arc::new(ScriptedApi::new("me"));
        api.fail_chats(usize::MAX);
        let (queue, _rx) = delivery_queue();
        let dyn_api: Arc<dyn ChatApi> = api.clone();
        let policy = RetryPolicy::with_backoff(Duration::from_secs(5), Duration::from_secs(20));
        let r = Refresher::new(session.clone(), dyn_api, queue, policy);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(r.run(stop_rx));
        // ticks at 0, 10, 30 (waits 10, 20, 20 ...)
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(api.chats_calls.load(Ordering::SeqCst), 3);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
