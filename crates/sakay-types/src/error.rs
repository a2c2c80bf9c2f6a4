use thiserror::Error;

/// No user could be resolved from the auth collaborator. Surfaced to the
/// caller, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no authenticated user")]
    NotSignedIn,
    #[error("session lookup failed: {0}")]
    Session(String),
}

/// A backend row operation failed. Fetch failures leave previously held
/// data intact; stale data beats an empty screen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("backend query failed: {0}")]
    Backend(String),
    #[error("row decode failed: {0}")]
    Decode(String),
}

/// A change-feed subscription attempt or live channel failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("channel error: {0}")]
    Channel(String),
    #[error("subscription timed out")]
    Timeout,
    #[error("feed closed")]
    Closed,
}

/// Umbrella error returned by the store/sync layer.
///
/// All variants are cheap to clone because the sync engine records the most
/// recent error in its observable state for the view layer to poll.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Malformed input, surfaced immediately and never retried.
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The reconnect sequence exhausted its retries. Terminal for the
    /// subscription only: fetch and send keep working without realtime.
    #[error("realtime subscription failed after {attempts} attempts")]
    SubscriptionFailed { attempts: u32 },
}
