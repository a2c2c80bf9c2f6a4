//! The synchronization core.
//!
//! One [`SyncEngine`] per signed-in board merges two sources into a single
//! deduplicated, newest-first message collection: polled repository
//! snapshots (`refresh`) and a live change-feed subscription (`subscribe`).
//! Everything observable lives behind one lock ([`crate::state::Shared`]);
//! feed events are applied serially by a pump task, so a refresh merge and
//! an arriving event can interleave at await points but never corrupt each
//! other.
//!
//! Subscription establishment retries with linear backoff and degrades to
//! polling-on-demand once the attempt budget is spent; fetch and send don't
//! depend on the feed being up.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use sakay_backend::{AuthProvider, ChangeFeed, FeedFilter, FeedLease};
use sakay_store::rows::decode_message;
use sakay_store::{MESSAGES_TABLE, MessageRepository};
use sakay_types::{AuthUser, ChangeOp, Message, RowChange, StoreError};

use crate::config::SyncConfig;
use crate::presence::Presence;
use crate::state::{ChatSnapshot, Shared, SyncPhase};

/// How much history a refresh asks the repository for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Drop the incremental checkpoint and fetch everything.
    Full,
    /// Fetch only rows created strictly after the checkpoint. Without a
    /// checkpoint this fetches everything, but merges instead of
    /// replacing.
    Incremental,
}

/// Handle on the engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        repo: MessageRepository,
        auth: Arc<dyn AuthProvider>,
        feed: Arc<dyn ChangeFeed>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                repo,
                auth,
                feed,
                config,
                shared: Shared::new(),
                lease: Mutex::new(LeaseSlot::Empty),
            }),
        }
    }

    /// Fetch history, merge it in, and (re-)establish the live
    /// subscription. On failure the collection is left exactly as it was;
    /// only the recorded error changes.
    pub async fn refresh(&self, mode: RefreshMode) -> Result<(), StoreError> {
        self.inner.clone().refresh(mode).await
    }

    /// Validate, resolve the sender, insert through the repository, and
    /// merge the stored message into the collection immediately rather
    /// than waiting for the feed echo.
    pub async fn send(
        &self,
        counterparty: Uuid,
        content: &str,
        ride_id: Option<i64>,
    ) -> Result<Message, StoreError> {
        self.inner.send(counterparty, content, ride_id).await
    }

    /// Open the change-feed lease for `user_id` unless one is already held
    /// (no-op guard, not an error) or the board is torn down. `refresh`
    /// calls this itself; it is public for callers that want realtime
    /// without an initial fetch. Once the lease installs, `user_id` is
    /// recorded as the board's identity.
    pub fn subscribe(&self, user_id: Uuid) {
        self.inner.clone().subscribe(user_id);
    }

    /// Release the lease and stop every background task. Idempotent; once
    /// this returns, no feed event or timer mutates the board again.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.shared.snapshot()
    }

    /// The current collection, newest first.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.shared.read(|state| state.messages.clone())
    }

    /// Messages exchanged with one counterparty, derived on read.
    pub fn conversation_with(&self, counterparty: Uuid) -> Vec<Message> {
        self.snapshot().conversation_with(counterparty)
    }

    /// Ticks on every state change; receivers re-snapshot.
    pub fn changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.inner.shared.changes()
    }

    /// Read/typing state layered on this engine's collection.
    pub fn presence(&self) -> Presence {
        Presence::new(self.inner.clone())
    }
}

pub(crate) struct EngineInner {
    pub(crate) repo: MessageRepository,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) feed: Arc<dyn ChangeFeed>,
    pub(crate) config: SyncConfig,
    pub(crate) shared: Shared,
    lease: Mutex<LeaseSlot>,
}

/// At most one subscription per engine, whatever state it is in.
enum LeaseSlot {
    Empty,
    /// A connect loop is running; blocks a second subscribe.
    Connecting(JoinHandle<()>),
    Active(ActiveLease),
}

struct ActiveLease {
    filter: FeedFilter,
    pump: JoinHandle<()>,
}

impl EngineInner {
    async fn refresh(self: Arc<Self>, mode: RefreshMode) -> Result<(), StoreError> {
        let user = self.resolve_user().await?;
        self.shared.update(|state| {
            if state.phase == SyncPhase::Idle {
                state.phase = SyncPhase::Fetching;
            }
        });

        let since = match mode {
            RefreshMode::Full => None,
            RefreshMode::Incremental => self.shared.read(|state| state.checkpoint),
        };
        let started = Utc::now();

        let fetched = match self.repo.list_for_user(user.id, since).await {
            Ok(fetched) => fetched,
            Err(err) => {
                let err = StoreError::Query(err);
                warn!("sync: {mode:?} refresh failed: {err}");
                self.shared.update(|state| {
                    // A first fetch that failed is no longer in flight.
                    if state.phase == SyncPhase::Fetching {
                        state.phase = SyncPhase::Idle;
                    }
                    state.last_error = Some(err.clone());
                });
                return Err(err);
            }
        };

        debug!("sync: {mode:?} refresh fetched {} messages", fetched.len());
        let newest = fetched.first().map(|m| m.created_at);
        self.shared.update(|state| {
            state.user = Some(user.id);
            state.last_error = None;
            match mode {
                RefreshMode::Full => {
                    state.replace_with(fetched);
                    state.checkpoint = Some(newest.unwrap_or(started));
                }
                RefreshMode::Incremental => {
                    // Oldest first, so the newest fetched row is the one
                    // applied last and wins any timestamp tie.
                    for message in fetched.into_iter().rev() {
                        state.upsert(message);
                    }
                    if newest.is_some() {
                        state.checkpoint = newest;
                    }
                }
            }
        });

        self.subscribe(user.id);
        Ok(())
    }

    async fn send(
        &self,
        counterparty: Uuid,
        content: &str,
        ride_id: Option<i64>,
    ) -> Result<Message, StoreError> {
        if content.is_empty() {
            return Err(StoreError::Validation("message content is empty".into()));
        }
        if counterparty.is_nil() {
            return Err(StoreError::Validation("missing counterparty".into()));
        }
        let user = self.resolve_user().await?;

        match self.repo.insert(user.id, counterparty, content, ride_id).await {
            Ok(message) => {
                debug!("sync: sent message {} to {counterparty}", message.id);
                self.shared.update(|state| {
                    state.user = Some(user.id);
                    state.upsert(message.clone());
                });
                Ok(message)
            }
            Err(err) => {
                warn!("sync: send to {counterparty} failed: {err}");
                if !matches!(err, StoreError::Validation(_)) {
                    self.shared.update(|state| state.last_error = Some(err.clone()));
                }
                Err(err)
            }
        }
    }

    /// Resolve the signed-in user, recording the failure if there is none.
    async fn resolve_user(&self) -> Result<AuthUser, StoreError> {
        match self.auth.current_user().await {
            Ok(user) => Ok(user),
            Err(err) => {
                let err = StoreError::Auth(err);
                warn!("sync: no resolvable user: {err}");
                self.shared.update(|state| state.last_error = Some(err.clone()));
                Err(err)
            }
        }
    }

    fn subscribe(self: Arc<Self>, user: Uuid) {
        if self.shared.read(|state| state.phase == SyncPhase::TornDown) {
            return;
        }
        let mut slot = self.lease.lock().expect("lease slot lock poisoned");
        if !matches!(*slot, LeaseSlot::Empty) {
            trace!("sync: subscribe skipped, lease already held");
            return;
        }
        let engine = self.clone();
        let handle = tokio::spawn(engine.connect_loop(user));
        *slot = LeaseSlot::Connecting(handle);
    }

    /// One connect sequence: up to `max_retries` open attempts with linear
    /// backoff between them. Ends in an installed lease or in
    /// `SubscriptionFailed`; a torn-down board ends it early. A later
    /// successful refresh starts a fresh sequence.
    async fn connect_loop(self: Arc<Self>, user: Uuid) {
        let filter = FeedFilter::table_for(MESSAGES_TABLE, user);
        let retries = self.config.max_retries;
        for attempt in 1..=retries {
            if self.shared.read(|state| state.phase == SyncPhase::TornDown) {
                return;
            }
            match self.feed.open(filter.clone()).await {
                Ok(lease) => {
                    self.install(filter, lease, user);
                    return;
                }
                Err(err) => {
                    warn!("sync: subscription attempt {attempt}/{retries} failed: {err}");
                    if attempt < retries {
                        let delay = self.config.retry_delay(attempt);
                        self.shared.update_live(|state| {
                            state.phase = SyncPhase::Backoff { attempt };
                        });
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!("sync: subscription failed after {retries} attempts, degrading to polling");
        self.shared.update_live(|state| {
            state.phase = SyncPhase::SubscriptionFailed;
            state.last_error = Some(StoreError::SubscriptionFailed { attempts: retries });
        });
        // Free the slot so a later refresh can try a new sequence. The
        // handle being dropped is our own.
        let mut slot = self.lease.lock().expect("lease slot lock poisoned");
        if matches!(*slot, LeaseSlot::Connecting(_)) {
            *slot = LeaseSlot::Empty;
        }
    }

    /// Put an opened lease into service: spawn its pump, take the slot,
    /// record the identity, mark the board subscribed. If a teardown raced
    /// us past the slot write, the phase check fails and we release the
    /// lease ourselves.
    fn install(self: Arc<Self>, filter: FeedFilter, lease: FeedLease, user: Uuid) {
        let engine = self.clone();
        let pump = tokio::spawn(engine.pump(lease, user));
        {
            let mut slot = self.lease.lock().expect("lease slot lock poisoned");
            *slot = LeaseSlot::Active(ActiveLease { filter, pump });
        }
        let live = self.shared.update_live(|state| {
            // Subscribe-only callers never ran a fetch; the board still
            // needs its identity for grouping and read acknowledgement.
            state.user = Some(user);
            state.phase = SyncPhase::Subscribed;
        });
        if live {
            info!("sync: live change feed established for {user}");
        } else {
            self.release_lease();
        }
    }

    /// Drain the lease's event stream. If the stream ends while the board
    /// is still live, clear the slot and reconnect with a fresh attempt
    /// budget.
    async fn pump(self: Arc<Self>, mut lease: FeedLease, user: Uuid) {
        while let Some(change) = lease.events.recv().await {
            self.apply_change(user, change);
        }
        if self.shared.read(|state| state.phase == SyncPhase::TornDown) {
            return;
        }
        warn!("sync: change feed stream ended, reconnecting");
        {
            let mut slot = self.lease.lock().expect("lease slot lock poisoned");
            *slot = LeaseSlot::Empty;
        }
        self.subscribe(user);
    }

    /// Apply one feed event under the state lock.
    fn apply_change(&self, user: Uuid, change: RowChange) {
        if change.table != MESSAGES_TABLE {
            trace!("sync: ignoring change on table {}", change.table);
            return;
        }
        if change.op == ChangeOp::Delete {
            trace!("sync: ignoring delete event");
            return;
        }
        let message = match decode_message(&change.row) {
            Ok(message) => message,
            Err(err) => {
                warn!("sync: dropping undecodable {:?} event: {err}", change.op);
                return;
            }
        };
        if !message.involves(user) {
            // The feed filter should prevent this; never let a stranger's
            // row onto the board.
            warn!("sync: dropping event for uninvolved message {}", message.id);
            return;
        }

        self.shared.update_live(|state| {
            let id = message.id;
            let counterparty = message.counterparty_of(user);
            match change.op {
                ChangeOp::Insert => {
                    let unread = message.sender_id() != user && !message.read;
                    trace!("sync: insert event for message {id}");
                    state.upsert(message);
                    if unread {
                        state.note_unread(counterparty, id);
                    }
                }
                ChangeOp::Update => {
                    if !state.messages.iter().any(|m| m.id == id) {
                        trace!("sync: update event for unknown message {id}");
                        return;
                    }
                    if message.read {
                        state.clear_unread(counterparty, id);
                    }
                    state.upsert(message);
                }
                ChangeOp::Delete => unreachable!("filtered above"),
            }
        });
    }

    fn teardown(&self) {
        let already = self.shared.update(|state| {
            if state.phase == SyncPhase::TornDown {
                return true;
            }
            state.phase = SyncPhase::TornDown;
            for (_, timer) in state.typing.drain() {
                timer.handle.abort();
            }
            false
        });
        self.release_lease();
        if !already {
            info!("sync: torn down");
        }
    }

    fn release_lease(&self) {
        let taken = {
            let mut slot = self.lease.lock().expect("lease slot lock poisoned");
            std::mem::replace(&mut *slot, LeaseSlot::Empty)
        };
        match taken {
            LeaseSlot::Empty => {}
            LeaseSlot::Connecting(handle) => handle.abort(),
            LeaseSlot::Active(lease) => {
                lease.pump.abort();
                debug!("sync: released feed lease on {}", lease.filter.table);
            }
        }
    }
}
