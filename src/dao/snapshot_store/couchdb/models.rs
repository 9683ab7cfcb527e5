use serde::{Deserialize, Serialize};

use crate::{dao::models::SnapshotEntity, state::scoreboard::ScoreboardState};

use super::error::CouchDaoError;

pub const SNAPSHOT_PREFIX: &str = "scoreboard::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSnapshotDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub room: String,
    pub version: u64,
    pub saved_at: String,
    pub state: ScoreboardState,
}

impl From<(SnapshotEntity, Option<String>)> for CouchSnapshotDocument {
    fn from((snapshot, rev): (SnapshotEntity, Option<String>)) -> Self {
        Self {
            id: snapshot_doc_id(&snapshot.room),
            rev,
            room: snapshot.room,
            version: snapshot.version,
            saved_at: snapshot.saved_at,
            state: snapshot.state,
        }
    }
}

impl From<CouchSnapshotDocument> for SnapshotEntity {
    fn from(doc: CouchSnapshotDocument) -> Self {
        SnapshotEntity {
            room: doc.room,
            version: doc.version,
            saved_at: doc.saved_at,
            state: doc.state,
        }
    }
}

pub fn snapshot_doc_id(room: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{room}")
}

pub fn extract_room(doc_id: &str) -> Result<String, CouchDaoError> {
    doc_id
        .strip_prefix(SNAPSHOT_PREFIX)
        .filter(|room| !room.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_ids_round_trip_to_room_names() {
        let id = snapshot_doc_id("salle-2");
        assert_eq!(id, "scoreboard::salle-2");
        assert_eq!(extract_room(&id).unwrap(), "salle-2");
        assert!(extract_room("game::123").is_err());
        assert!(extract_room("scoreboard::").is_err());
    }
}
