//! In-memory doubles for the backend traits, shared by every crate's tests.
//!
//! [`MemoryRowStore`] mimics the hosted row store closely enough that the
//! repositories run unmodified against it; [`ScriptedFeed`] lets a test
//! decide which subscription attempts fail and what events arrive;
//! [`StaticAuth`] is a canned session.

pub mod auth;
pub mod feed;
pub mod rows;

pub use auth::StaticAuth;
pub use feed::ScriptedFeed;
pub use rows::MemoryRowStore;

/// Env-filtered logging for tests that want to watch the sync engine work.
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sakay_sync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
