use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sakay_backend::{ChangeFeed, FeedFilter, FeedLease};
use sakay_types::{FeedError, RowChange};

/// [`ChangeFeed`] double with scriptable subscription outcomes.
///
/// Each `open` consumes the next scripted failure, or succeeds and retains
/// the sending half so tests can push events into the live lease. `sever`
/// drops that half, which the consumer observes as the stream ending.
pub struct ScriptedFeed {
    inner: Mutex<FeedInner>,
}

#[derive(Default)]
struct FeedInner {
    outcomes: VecDeque<FeedError>,
    always_fail: bool,
    live: Option<mpsc::Sender<RowChange>>,
    opens: u32,
    last_filter: Option<FeedFilter>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self { inner: Mutex::new(FeedInner::default()) }
    }

    /// Fail the next `n` subscription attempts with a channel error.
    pub fn fail_next(&self, n: usize) {
        let mut inner = self.inner.lock().expect("feed lock poisoned");
        for _ in 0..n {
            inner.outcomes.push_back(FeedError::Channel("scripted failure".into()));
        }
    }

    /// Fail every subscription attempt from now on.
    pub fn fail_always(&self) {
        let mut inner = self.inner.lock().expect("feed lock poisoned");
        inner.always_fail = true;
    }

    /// How many times `open` has been called, failures included.
    pub fn opens(&self) -> u32 {
        self.inner.lock().expect("feed lock poisoned").opens
    }

    pub fn last_filter(&self) -> Option<FeedFilter> {
        self.inner.lock().expect("feed lock poisoned").last_filter.clone()
    }

    /// Deliver one event on the live lease. Panics if nothing is
    /// subscribed; a torn-down receiver silently swallows the event,
    /// as the wire would.
    pub async fn push(&self, change: RowChange) {
        let sender = {
            let inner = self.inner.lock().expect("feed lock poisoned");
            inner.live.clone().expect("push with no live subscription")
        };
        let _ = sender.send(change).await;
    }

    /// Kill the live stream. The consumer sees its receiver run dry.
    pub fn sever(&self) {
        let mut inner = self.inner.lock().expect("feed lock poisoned");
        inner.live = None;
    }

    /// True while a lease is open and its receiving half still exists.
    pub fn is_live(&self) -> bool {
        let inner = self.inner.lock().expect("feed lock poisoned");
        inner.live.as_ref().is_some_and(|sender| !sender.is_closed())
    }
}

impl Default for ScriptedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn open(&self, filter: FeedFilter) -> Result<FeedLease, FeedError> {
        let mut inner = self.inner.lock().expect("feed lock poisoned");
        inner.opens += 1;
        inner.last_filter = Some(filter);
        if inner.always_fail {
            return Err(FeedError::Channel("scripted failure".into()));
        }
        if let Some(err) = inner.outcomes.pop_front() {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(64);
        inner.live = Some(tx);
        Ok(FeedLease::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let feed = ScriptedFeed::new();
        feed.fail_next(2);
        let filter = FeedFilter::table_for("messages", Uuid::from_u128(1));

        assert!(feed.open(filter.clone()).await.is_err());
        assert!(feed.open(filter.clone()).await.is_err());
        let mut lease = feed.open(filter.clone()).await.unwrap();
        assert_eq!(feed.opens(), 3);
        assert_eq!(feed.last_filter(), Some(filter));

        feed.push(RowChange::insert("messages", json!({ "id": 1 }))).await;
        let event = lease.events.recv().await.unwrap();
        assert_eq!(event.row["id"], json!(1));
    }

    #[tokio::test]
    async fn test_sever_ends_the_stream() {
        let feed = ScriptedFeed::new();
        let mut lease = feed
            .open(FeedFilter::table_for("messages", Uuid::from_u128(1)))
            .await
            .unwrap();
        assert!(feed.is_live());

        feed.sever();
        assert!(lease.events.recv().await.is_none());
        assert!(!feed.is_live());
    }
}
