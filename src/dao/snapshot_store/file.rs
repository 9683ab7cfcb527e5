use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use tokio::fs;

use crate::dao::{
    models::SnapshotEntity,
    snapshot_store::{SnapshotStore, io_unavailable},
    storage::{StorageError, StorageResult},
};

const EXTENSION: &str = "json";

/// Keeps one `<room>.json` file per room inside a directory.
///
/// Room identifiers are restricted to `[A-Za-z0-9_-]` before they reach the store,
/// so they are safe to use as file names.
#[derive(Clone)]
pub struct FileSnapshotStore {
    dir: Arc<PathBuf>,
}

impl FileSnapshotStore {
    /// Create the directory if needed and return a store rooted in it.
    pub async fn open(dir: PathBuf) -> StorageResult<Self> {
        let store = Self { dir: Arc::new(dir) };
        store.ensure_dir().await?;
        Ok(store)
    }

    fn path_for(&self, room: &str) -> PathBuf {
        self.dir.join(format!("{room}.{EXTENSION}"))
    }

    async fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(self.dir.as_ref()).await.map_err(|err| {
            io_unavailable(
                format!("cannot create snapshot directory {}", self.dir.display()),
                err,
            )
        })
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, room: &str) -> BoxFuture<'static, StorageResult<Option<SnapshotEntity>>> {
        let path = self.path_for(room);
        let room = room.to_string();
        Box::pin(async move {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => {
                    return Err(io_unavailable(
                        format!("cannot read {}", path.display()),
                        err,
                    ));
                }
            };
            serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StorageError::Corrupt { room, source })
        })
    }

    fn save(&self, snapshot: SnapshotEntity) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path_for(&snapshot.room);
        Box::pin(async move {
            let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|source| {
                StorageError::Corrupt {
                    room: snapshot.room.clone(),
                    source,
                }
            })?;
            // Write then rename so readers never observe a half-written snapshot.
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, bytes)
                .await
                .map_err(|err| io_unavailable(format!("cannot write {}", tmp.display()), err))?;
            fs::rename(&tmp, &path)
                .await
                .map_err(|err| io_unavailable(format!("cannot replace {}", path.display()), err))
        })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            let mut entries = fs::read_dir(dir.as_ref())
                .await
                .map_err(|err| io_unavailable(format!("cannot list {}", dir.display()), err))?;
            let mut rooms = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| io_unavailable(format!("cannot list {}", dir.display()), err))?
            {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    rooms.push(stem.to_string());
                }
            }
            rooms.sort();
            Ok(rooms)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            let metadata = fs::metadata(dir.as_ref())
                .await
                .map_err(|err| io_unavailable(format!("cannot stat {}", dir.display()), err))?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(io_unavailable(
                    format!("{} is not a directory", dir.display()),
                    std::io::Error::from(ErrorKind::NotADirectory),
                ))
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_dir().await })
    }
}
