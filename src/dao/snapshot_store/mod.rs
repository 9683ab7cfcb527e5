/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// One JSON file per room.
pub mod file;
/// In-process backend.
pub mod memory;

use std::{io, sync::Arc};

use futures::future::BoxFuture;

use crate::{
    config::StorageBackend,
    dao::{
        models::SnapshotEntity,
        storage::{StorageError, StorageResult},
    },
};

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

/// Durable home of room snapshots. Reads happen once per room, writes are
/// opportunistic and latest-wins.
pub trait SnapshotStore: Send + Sync {
    /// Last saved snapshot of `room`, if any.
    fn load(&self, room: &str) -> BoxFuture<'static, StorageResult<Option<SnapshotEntity>>>;
    /// Overwrite the stored snapshot of `snapshot.room`.
    fn save(&self, snapshot: SnapshotEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Rooms that have a stored snapshot.
    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Cheap liveness probe of the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failure.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Open the store selected by `backend`.
pub async fn connect_store(backend: &StorageBackend) -> StorageResult<Arc<dyn SnapshotStore>> {
    match backend {
        StorageBackend::File(dir) => {
            let store = FileSnapshotStore::open(dir.clone()).await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => Ok(Arc::new(MemorySnapshotStore::new())),
        #[cfg(feature = "couch-store")]
        StorageBackend::Couch => {
            let config = couchdb::CouchConfig::from_env()?;
            let store = couchdb::CouchSnapshotStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "couch-store"))]
        StorageBackend::Couch => Err(StorageError::unavailable(
            "CouchDB backend requested".into(),
            io::Error::other("built without the `couch-store` feature"),
        )),
    }
}

/// Shorthand used by the file store for I/O failures.
pub(crate) fn io_unavailable(message: String, err: io::Error) -> StorageError {
    StorageError::unavailable(message, err)
}
