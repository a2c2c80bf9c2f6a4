//! Realtime messaging synchronization core.
//!
//! Merges polled repository snapshots and a live change-feed subscription
//! into one deduplicated, newest-first message collection, and derives the
//! per-conversation state (unread counts, typing flags) the UI reads.
//! Collaborators are injected as trait objects, so the whole engine runs
//! against in-memory doubles in tests.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use sakay_backend::{AuthProvider, ChangeFeed};
//! # use sakay_store::MessageRepository;
//! # use sakay_sync::{RefreshMode, SyncConfig, SyncEngine};
//! # async fn wire(
//! #     repo: MessageRepository,
//! #     auth: Arc<dyn AuthProvider>,
//! #     feed: Arc<dyn ChangeFeed>,
//! # ) -> Result<(), sakay_types::StoreError> {
//! let engine = SyncEngine::new(repo, auth, feed, SyncConfig::default());
//! engine.refresh(RefreshMode::Full).await?;
//! let mut changes = engine.changes();
//! while changes.changed().await.is_ok() {
//!     let snapshot = engine.snapshot();
//!     // render snapshot.messages, snapshot.unread, ...
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod presence;
pub mod state;

pub use config::SyncConfig;
pub use engine::{RefreshMode, SyncEngine};
pub use presence::Presence;
pub use state::{ChatSnapshot, SyncPhase};
