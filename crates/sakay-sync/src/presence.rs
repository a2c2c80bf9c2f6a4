use std::sync::Arc;

use tracing::{error, trace};
use uuid::Uuid;

use sakay_types::{MessageStatus, StoreError};

use crate::engine::EngineInner;
use crate::state::{SyncPhase, TypingTimer};

/// Read acknowledgement and typing indicators, layered on the engine's
/// collection. Obtained from [`crate::SyncEngine::presence`]; cheap to
/// clone, shares the engine's state.
#[derive(Clone)]
pub struct Presence {
    inner: Arc<EngineInner>,
}

impl Presence {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Acknowledge one message: flip it read locally, drop it from its
    /// counterparty's unread entry, persist in the background.
    ///
    /// Local state stands even if persistence fails; the read flag is a
    /// UX signal, so the failure is recorded and logged rather than
    /// rolled back. Unknown ids and the user's own sent messages are a
    /// local no-op and nothing is persisted; only the receiving side
    /// flips the flag.
    pub fn mark_as_read(&self, message_id: i64) {
        let changed = self.inner.shared.update(|state| {
            let Some(user) = state.user else {
                return false;
            };
            let Some(index) = state.messages.iter().position(|m| m.id == message_id) else {
                trace!("presence: mark_as_read for unknown message {message_id}");
                return false;
            };
            if state.messages[index].sender_id() == user {
                trace!("presence: mark_as_read on own message {message_id}");
                return false;
            }
            let counterparty = state.messages[index].counterparty_of(user);
            let message = &mut state.messages[index];
            message.read = true;
            message.status = MessageStatus::Read;
            state.clear_unread(counterparty, message_id);
            true
        });
        if !changed {
            return;
        }

        let engine = self.inner.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.repo.mark_read(message_id).await {
                error!("presence: persisting read flag for {message_id} failed: {err}");
                engine.shared.update_live(|state| {
                    state.last_error = Some(StoreError::Query(err));
                });
            }
        });
    }

    /// Raise or clear the typing flag for one counterparty. Raising
    /// schedules an auto-clear after `typing_ttl`; a repeat signal resets
    /// that clock, it never stacks a second timer.
    pub fn set_typing(&self, counterparty: Uuid, is_typing: bool) {
        if !is_typing {
            self.inner.shared.update(|state| {
                if let Some(timer) = state.typing.remove(&counterparty) {
                    timer.handle.abort();
                }
            });
            return;
        }

        let ttl = self.inner.config.typing_ttl;
        self.inner.shared.update(|state| {
            if state.phase == SyncPhase::TornDown {
                return;
            }
            state.typing_seq += 1;
            let seq = state.typing_seq;
            let engine = self.inner.clone();
            // Deadline fixed here, at the signal; a sleep created inside
            // the task would count from its first poll instead.
            let expiry = tokio::time::sleep(ttl);
            let handle = tokio::spawn(async move {
                expiry.await;
                engine.shared.update_live(|state| {
                    // Only clear our own entry; a fresher signal may have
                    // replaced it while we slept.
                    if state.typing.get(&counterparty).is_some_and(|t| t.seq == seq) {
                        state.typing.remove(&counterparty);
                        trace!("presence: typing flag for {counterparty} expired");
                    }
                });
            });
            if let Some(previous) = state.typing.insert(counterparty, TypingTimer { seq, handle })
            {
                previous.handle.abort();
            }
        });
    }

    pub fn is_typing(&self, counterparty: Uuid) -> bool {
        self.inner
            .shared
            .read(|state| state.typing.contains_key(&counterparty))
    }

    /// Unread messages from one counterparty, 0 when none.
    pub fn unread_count_for(&self, counterparty: Uuid) -> usize {
        self.inner.shared.read(|state| {
            state
                .unread
                .get(&counterparty)
                .map(|ids| ids.len())
                .unwrap_or(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use sakay_backend::AuthProvider;
    use sakay_store::{MESSAGES_TABLE, MessageRepository};
    use sakay_testkit::{MemoryRowStore, ScriptedFeed, StaticAuth};
    use sakay_types::{QueryError, RowChange};

    use crate::config::SyncConfig;
    use crate::engine::{RefreshMode, SyncEngine};

    use super::*;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_u128(n as u128)
    }

    struct Harness {
        engine: SyncEngine,
        store: Arc<MemoryRowStore>,
        feed: Arc<ScriptedFeed>,
    }

    fn harness(user: Uuid) -> Harness {
        harness_with(user, SyncConfig::default())
    }

    fn harness_with(user: Uuid, config: SyncConfig) -> Harness {
        let store = Arc::new(MemoryRowStore::new());
        let feed = Arc::new(ScriptedFeed::new());
        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::signed_in(user));
        let engine = SyncEngine::new(
            MessageRepository::new(store.clone()),
            auth,
            feed.clone(),
            config,
        );
        Harness { engine, store, feed }
    }

    fn row(id: i64, sender: Uuid, to: Uuid) -> Value {
        json!({
            "id": id,
            "rider_id": sender,
            "passenger_id": to,
            "content": format!("message {id}"),
            "created_at": "2026-03-01T10:00:00Z",
            "read": false,
            "message_status": "sent",
        })
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_incoming_message_read_acknowledgement() {
        let sender = uuid(1);
        let me = uuid(2);
        let h = harness(me);
        h.engine.refresh(RefreshMode::Full).await.unwrap();
        settle().await;

        // Row lands in the backend and its insert event reaches us live.
        h.store.seed(MESSAGES_TABLE, vec![row(5, sender, me)]);
        let mut changes = h.engine.changes();
        h.feed
            .push(RowChange::insert(MESSAGES_TABLE, row(5, sender, me)))
            .await;
        changes.changed().await.unwrap();

        let presence = h.engine.presence();
        assert_eq!(presence.unread_count_for(sender), 1);

        presence.mark_as_read(5);
        assert_eq!(presence.unread_count_for(sender), 0);
        let message = &h.engine.messages()[0];
        assert!(message.read);
        assert_eq!(message.status, MessageStatus::Read);

        settle().await;
        let rows = h.store.rows(MESSAGES_TABLE);
        assert_eq!(rows[0]["read"], json!(true));
        assert_eq!(rows[0]["message_status"], json!("read"));
    }

    #[tokio::test]
    async fn test_subscribe_only_board_acknowledges_reads() {
        let sender = uuid(1);
        let me = uuid(2);
        let h = harness(me);

        // Realtime without an initial fetch.
        h.engine.subscribe(me);
        settle().await;

        h.store.seed(MESSAGES_TABLE, vec![row(5, sender, me)]);
        let mut changes = h.engine.changes();
        h.feed
            .push(RowChange::insert(MESSAGES_TABLE, row(5, sender, me)))
            .await;
        changes.changed().await.unwrap();

        let presence = h.engine.presence();
        assert_eq!(presence.unread_count_for(sender), 1);
        presence.mark_as_read(5);
        assert_eq!(presence.unread_count_for(sender), 0);

        settle().await;
        assert_eq!(h.store.rows(MESSAGES_TABLE)[0]["read"], json!(true));
    }

    #[tokio::test]
    async fn test_mark_as_read_unknown_id_does_nothing() {
        let h = harness(uuid(2));
        h.engine.refresh(RefreshMode::Full).await.unwrap();

        h.engine.presence().mark_as_read(99);
        settle().await;
        assert_eq!(h.engine.snapshot().last_error, None);
        assert!(h.store.rows(MESSAGES_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_mark_as_read_skips_own_sent_message() {
        let me = uuid(2);
        let other = uuid(3);
        let h = harness(me);
        let sent = h.engine.send(other, "on my way", None).await.unwrap();

        h.engine.presence().mark_as_read(sent.id);
        settle().await;

        // Only the receiving side flips the flag.
        let message = &h.engine.messages()[0];
        assert!(!message.read);
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(h.store.rows(MESSAGES_TABLE)[0]["read"], json!(false));
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_local_read_state() {
        let me = uuid(2);
        let h = harness(me);
        h.store.seed(MESSAGES_TABLE, vec![row(5, uuid(1), me)]);
        h.engine.refresh(RefreshMode::Full).await.unwrap();

        h.store.fail_next_update("writer offline");
        h.engine.presence().mark_as_read(5);
        assert!(h.engine.messages()[0].read);

        settle().await;
        // Not rolled back, but the failure is observable.
        assert!(h.engine.messages()[0].read);
        assert!(matches!(
            h.engine.snapshot().last_error,
            Some(StoreError::Query(QueryError::Backend(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_expires_without_refresh() {
        let h = harness(uuid(1));
        let presence = h.engine.presence();
        let other = uuid(2);

        presence.set_typing(other, true);
        assert!(presence.is_typing(other));

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(presence.is_typing(other), "ttl not reached yet");

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(!presence.is_typing(other), "expired after the ttl");
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_ttl_counts_from_the_signal() {
        let h = harness(uuid(1));
        let presence = h.engine.presence();
        let other = uuid(2);

        // Advance before the timer task has ever run; the deadline is
        // measured from the signal, not from the task's first poll.
        presence.set_typing(other, true);
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert!(!presence.is_typing(other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_refresh_resets_the_clock() {
        let h = harness(uuid(1));
        let presence = h.engine.presence();
        let other = uuid(2);

        presence.set_typing(other, true);
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        // Refresh at t=2; the original timer would have fired at t=3.
        presence.set_typing(other, true);
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(presence.is_typing(other), "reset, not expired at t=4");

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(!presence.is_typing(other), "expired 3s after the refresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_ttl_is_configurable() {
        let h = harness_with(
            uuid(1),
            SyncConfig::default().with_typing_ttl(Duration::from_secs(10)),
        );
        let presence = h.engine.presence();
        let other = uuid(2);

        presence.set_typing(other, true);
        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(presence.is_typing(other), "outlives the default ttl");

        tokio::time::advance(Duration::from_secs(7)).await;
        settle().await;
        assert!(!presence.is_typing(other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_cleared_explicitly() {
        let h = harness(uuid(1));
        let presence = h.engine.presence();
        let other = uuid(2);

        // Clearing an absent flag is harmless.
        presence.set_typing(other, false);
        assert!(!presence.is_typing(other));

        presence.set_typing(other, true);
        presence.set_typing(other, false);
        assert!(!presence.is_typing(other));

        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(!presence.is_typing(other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_ignored_after_teardown() {
        let h = harness(uuid(1));
        let presence = h.engine.presence();
        let other = uuid(2);

        presence.set_typing(other, true);
        h.engine.teardown();
        assert!(!presence.is_typing(other), "teardown drops live timers");

        presence.set_typing(other, true);
        assert!(!presence.is_typing(other));

        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(!presence.is_typing(other));
    }
}
