mod config;
mod error;
mod models;
mod store;

pub use config::{CouchConfig, CouchCredentials};
pub use error::{CouchDaoError, CouchResult};
pub use store::CouchSnapshotStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        let message = match &err {
            CouchDaoError::Conflict { .. } => "CouchDB kept rejecting the snapshot revision",
            _ => "CouchDB request failed",
        };
        StorageError::unavailable(message.into(), err)
    }
}
