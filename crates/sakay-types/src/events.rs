use serde::{Deserialize, Serialize};

/// Row-change kinds delivered by the backend's realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    /// Delivered by real feeds but ignored by this subsystem; row deletion
    /// is a backend-level concern and the client never removes entries.
    Delete,
}

/// One row-change notification from the change feed.
///
/// Delivery is ordered and at-least-once: consumers must tolerate
/// duplicates. `row` is the post-change record as raw JSON; decoding into a
/// model happens at the point of use so one undecodable event does not kill
/// the subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    pub op: ChangeOp,
    pub table: String,
    pub row: serde_json::Value,
}

impl RowChange {
    pub fn insert(table: &str, row: serde_json::Value) -> Self {
        Self { op: ChangeOp::Insert, table: table.to_string(), row }
    }

    pub fn update(table: &str, row: serde_json::Value) -> Self {
        Self { op: ChangeOp::Update, table: table.to_string(), row }
    }
}
