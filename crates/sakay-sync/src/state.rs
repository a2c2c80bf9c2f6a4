use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use sakay_types::{Message, StoreError};

/// Where the engine is in its lifecycle. Linear, except the
/// subscribed/backoff loop and the terminal `TornDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Subscribed,
    /// Waiting out the delay after failed subscription attempt `attempt`.
    Backoff { attempt: u32 },
    /// The last connect sequence exhausted its retries. Fetch and send
    /// keep working; realtime delivery is degraded to polling until a
    /// later refresh re-establishes the feed.
    SubscriptionFailed,
    TornDown,
}

/// Point-in-time copy of the engine's observable state. Views either poll
/// this or re-snapshot whenever the engine's revision watch fires.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    /// Newest first; equal timestamps order the later-applied entry first.
    pub messages: Vec<Message>,
    pub phase: SyncPhase,
    /// Most recent recorded failure. Cleared by a successful refresh.
    pub last_error: Option<StoreError>,
    /// Newest `created_at` confirmed by a fetch; incremental refreshes
    /// resume from here.
    pub checkpoint: Option<DateTime<Utc>>,
    /// The identity the board is synced for, once resolved.
    pub user: Option<Uuid>,
    /// Unread message count per counterparty.
    pub unread: HashMap<Uuid, usize>,
    /// Counterparties currently typing.
    pub typing: Vec<Uuid>,
}

impl ChatSnapshot {
    /// The conversation with one counterparty, derived on read. There is
    /// no stored conversation entity.
    pub fn conversation_with(&self, counterparty: Uuid) -> Vec<Message> {
        let Some(user) = self.user else {
            return Vec::new();
        };
        self.messages
            .iter()
            .filter(|message| message.counterparty_of(user) == counterparty)
            .cloned()
            .collect()
    }

    pub fn unread_count_for(&self, counterparty: Uuid) -> usize {
        self.unread.get(&counterparty).copied().unwrap_or(0)
    }
}

/// A scheduled typing auto-clear. The sequence number lets the timer tell
/// whether its entry was replaced by a fresher signal while it slept.
pub(crate) struct TypingTimer {
    pub(crate) seq: u64,
    pub(crate) handle: JoinHandle<()>,
}

/// Everything the engine mutates, behind one lock.
pub(crate) struct BoardState {
    pub(crate) messages: Vec<Message>,
    /// Counterparty id to the ids of their messages not yet acknowledged.
    pub(crate) unread: HashMap<Uuid, HashSet<i64>>,
    /// Counterparty id to the timer that will clear its typing flag.
    pub(crate) typing: HashMap<Uuid, TypingTimer>,
    pub(crate) typing_seq: u64,
    pub(crate) phase: SyncPhase,
    pub(crate) last_error: Option<StoreError>,
    pub(crate) checkpoint: Option<DateTime<Utc>>,
    pub(crate) user: Option<Uuid>,
}

impl BoardState {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            unread: HashMap::new(),
            typing: HashMap::new(),
            typing_seq: 0,
            phase: SyncPhase::Idle,
            last_error: None,
            checkpoint: None,
            user: None,
        }
    }

    /// Insert or replace by id, keeping newest-first order.
    ///
    /// A content-equal overwrite is a true no-op, so re-applying an
    /// at-least-once event neither duplicates nor repositions anything.
    /// A changed version goes in at the head before the stable sort, which
    /// is what makes the later-applied entry win `created_at` ties.
    pub(crate) fn upsert(&mut self, message: Message) {
        if let Some(index) = self.messages.iter().position(|m| m.id == message.id) {
            if self.messages[index] == message {
                return;
            }
            self.messages.remove(index);
        }
        self.messages.insert(0, message);
        sort_newest_first(&mut self.messages);
    }

    /// Full-refresh merge: the fetched rows plus whatever locally-held ids
    /// the fetch did not return. On conflicting ids the fetched version
    /// wins, fields and tie position both.
    pub(crate) fn replace_with(&mut self, fetched: Vec<Message>) {
        let fetched_ids: HashSet<i64> = fetched.iter().map(|m| m.id).collect();
        let mut next = fetched;
        next.extend(self.messages.drain(..).filter(|m| !fetched_ids.contains(&m.id)));
        sort_newest_first(&mut next);
        self.messages = next;
    }

    pub(crate) fn note_unread(&mut self, counterparty: Uuid, id: i64) {
        self.unread.entry(counterparty).or_default().insert(id);
    }

    /// Remove `id` from the counterparty's unread entry, dropping the key
    /// once the entry is empty.
    pub(crate) fn clear_unread(&mut self, counterparty: Uuid, id: i64) {
        if let Some(ids) = self.unread.get_mut(&counterparty) {
            ids.remove(&id);
            if ids.is_empty() {
                self.unread.remove(&counterparty);
            }
        }
    }
}

/// Descending `created_at`. The sort is stable, so whoever put an entry
/// nearer the head decides the order of timestamp ties.
pub(crate) fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// The engine's shared state plus its change-notification side.
///
/// All mutation goes through [`Shared::update`] or [`Shared::update_live`]:
/// one lock acquisition per logical merge, never held across an await, so
/// interleaving tasks can never observe or produce a half-applied merge.
pub(crate) struct Shared {
    state: Mutex<BoardState>,
    revision: watch::Sender<u64>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { state: Mutex::new(BoardState::new()), revision }
    }

    /// Watch that ticks on every mutation. Carries no data; watchers
    /// re-snapshot.
    pub(crate) fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&BoardState) -> R) -> R {
        let state = self.state.lock().expect("board state lock poisoned");
        f(&state)
    }

    /// One atomic read-modify-write, then a revision tick.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut BoardState) -> R) -> R {
        let result = {
            let mut state = self.state.lock().expect("board state lock poisoned");
            f(&mut state)
        };
        self.revision.send_modify(|rev| *rev += 1);
        result
    }

    /// Mutation arriving from a background task (feed pump, reconnect
    /// loop, typing timer). Refused once the board is torn down; the
    /// phase check and the mutation share the lock, so nothing can slip
    /// in after `teardown` has flipped the phase.
    pub(crate) fn update_live(&self, f: impl FnOnce(&mut BoardState)) -> bool {
        let ran = {
            let mut state = self.state.lock().expect("board state lock poisoned");
            if state.phase == SyncPhase::TornDown {
                false
            } else {
                f(&mut state);
                true
            }
        };
        if ran {
            self.revision.send_modify(|rev| *rev += 1);
        }
        ran
    }

    pub(crate) fn snapshot(&self) -> ChatSnapshot {
        self.read(|state| ChatSnapshot {
            messages: state.messages.clone(),
            phase: state.phase,
            last_error: state.last_error.clone(),
            checkpoint: state.checkpoint,
            user: state.user,
            unread: state.unread.iter().map(|(k, v)| (*k, v.len())).collect(),
            typing: state.typing.keys().copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use sakay_types::MessageStatus;

    use super::*;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_u128(n as u128)
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap()
    }

    fn message(id: i64, minute: u32) -> Message {
        Message {
            id,
            rider_id: uuid(1),
            passenger_id: uuid(2),
            content: format!("message {id}"),
            created_at: at(minute),
            read: false,
            status: MessageStatus::Sent,
            ride_id: None,
        }
    }

    fn ids(state: &BoardState) -> Vec<i64> {
        state.messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn test_upsert_orders_newest_first() {
        let mut state = BoardState::new();
        state.upsert(message(1, 5));
        state.upsert(message(2, 20));
        state.upsert(message(3, 10));
        assert_eq!(ids(&state), vec![2, 3, 1]);
    }

    #[test]
    fn test_upsert_dedupes_by_id_last_write_wins() {
        let mut state = BoardState::new();
        state.upsert(message(1, 5));
        let mut edited = message(1, 5);
        edited.content = "edited".into();
        state.upsert(edited);

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "edited");
    }

    #[test]
    fn test_equal_timestamps_order_later_applied_first() {
        let mut state = BoardState::new();
        state.upsert(message(1, 5));
        state.upsert(message(2, 5));
        assert_eq!(ids(&state), vec![2, 1]);
    }

    #[test]
    fn test_reapplying_identical_entry_changes_nothing() {
        let mut state = BoardState::new();
        state.upsert(message(1, 5));
        state.upsert(message(2, 5));
        // Same collection as applying it once: id 1 must not move back
        // to the head.
        state.upsert(message(1, 5));
        assert_eq!(ids(&state), vec![2, 1]);
    }

    #[test]
    fn test_replace_with_keeps_unsuperseded_local_entries() {
        let mut state = BoardState::new();
        state.upsert(message(1, 5));
        let mut local = message(9, 30);
        local.content = "optimistic, not yet fetched".into();
        state.upsert(local);

        let mut fetched_copy = message(1, 5);
        fetched_copy.read = true;
        state.replace_with(vec![message(2, 10), fetched_copy]);

        assert_eq!(ids(&state), vec![9, 2, 1]);
        // Conflicting id: the fetched version's fields won.
        assert!(state.messages[2].read);
    }

    #[test]
    fn test_replace_with_wins_ties_over_local_entries() {
        let mut state = BoardState::new();
        state.upsert(message(1, 5));
        state.replace_with(vec![message(2, 5)]);
        assert_eq!(ids(&state), vec![2, 1]);
    }

    #[test]
    fn test_unread_entry_dropped_once_empty() {
        let mut state = BoardState::new();
        state.note_unread(uuid(1), 5);
        state.note_unread(uuid(1), 6);

        state.clear_unread(uuid(1), 5);
        assert_eq!(state.unread.get(&uuid(1)).map(HashSet::len), Some(1));

        state.clear_unread(uuid(1), 6);
        assert!(!state.unread.contains_key(&uuid(1)));

        // Clearing something never noted is harmless.
        state.clear_unread(uuid(3), 7);
    }

    #[test]
    fn test_snapshot_conversation_grouping() {
        let shared = Shared::new();
        shared.update(|state| {
            state.user = Some(uuid(1));
            state.upsert(message(1, 5)); // 1 <-> 2
            let mut other = message(2, 6);
            other.rider_id = uuid(3);
            other.passenger_id = uuid(1);
            state.upsert(other); // 3 -> 1
        });

        let snapshot = shared.snapshot();
        let with_two: Vec<i64> = snapshot
            .conversation_with(uuid(2))
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(with_two, vec![1]);
        let with_three: Vec<i64> = snapshot
            .conversation_with(uuid(3))
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(with_three, vec![2]);
    }

    #[test]
    fn test_update_live_refused_after_teardown() {
        let shared = Shared::new();
        shared.update(|state| state.phase = SyncPhase::TornDown);

        let ran = shared.update_live(|state| state.upsert(message(1, 5)));
        assert!(!ran);
        assert!(shared.snapshot().messages.is_empty());
    }
}
