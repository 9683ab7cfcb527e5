use serde::{Deserialize, Serialize};

use crate::state::scoreboard::ScoreboardState;

/// Persisted form of a room: the last accepted state and its version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntity {
    /// Room identifier.
    pub room: String,
    /// Version counter at the time of the save.
    pub version: u64,
    /// RFC 3339 timestamp of the save.
    pub saved_at: String,
    /// Room state.
    pub state: ScoreboardState,
}
