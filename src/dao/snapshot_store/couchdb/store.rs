use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::dao::{
    models::SnapshotEntity, snapshot_store::SnapshotStore, storage::StorageResult,
};

use super::{
    config::{CouchConfig, CouchCredentials},
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchSnapshotDocument, END_SUFFIX, SNAPSHOT_PREFIX, extract_room,
        snapshot_doc_id,
    },
};

const ALL_DOCS: &str = "_all_docs";

/// Snapshot store keeping one `scoreboard::<room>` document per room.
#[derive(Clone)]
pub struct CouchSnapshotStore {
    client: Client,
    database_url: Arc<str>,
    credentials: Option<Arc<CouchCredentials>>,
}

impl CouchSnapshotStore {
    /// Build the HTTP client and create the database if it does not exist yet.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            database_url: config.database_url().into(),
            credentials: config.credentials.map(Arc::new),
        };
        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some(creds) => builder.basic_auth(&creds.username, Some(&creds.password)),
            None => builder,
        }
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/{}", self.database_url, path)
    }

    async fn send(&self, builder: RequestBuilder, target: &str) -> CouchResult<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                target: target.to_string(),
                source,
            })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let url = self.database_url.to_string();
        let response = self.send(self.request(Method::GET, &url), &url).await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(database = %url, "creating CouchDB snapshot database");
                let created = self.send(self.request(Method::PUT, &url), &url).await?;
                // 412 means another instance created it first.
                match created.status() {
                    status if status.is_success() => Ok(()),
                    StatusCode::PRECONDITION_FAILED => Ok(()),
                    status => Err(CouchDaoError::Status { target: url, status }),
                }
            }
            status => Err(CouchDaoError::Status { target: url, status }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CouchResult<Option<T>> {
        let url = self.document_url(path);
        let response = self.send(self.request(Method::GET, &url), path).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response
                    .json::<T>()
                    .await
                    .map(Some)
                    .map_err(|source| CouchDaoError::Decode {
                        target: path.to_string(),
                        source,
                    })
            }
            status => Err(CouchDaoError::Status {
                target: path.to_string(),
                status,
            }),
        }
    }

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        Ok(self
            .get_json::<CouchSnapshotDocument>(doc_id)
            .await?
            .and_then(|doc| doc.rev))
    }

    async fn put_snapshot(&self, document: &CouchSnapshotDocument) -> CouchResult<()> {
        let url = self.document_url(&document.id);
        let response = self
            .send(self.request(Method::PUT, &url).json(document), &document.id)
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                doc_id: document.id.clone(),
            }),
            status => Err(CouchDaoError::Status {
                target: document.id.clone(),
                status,
            }),
        }
    }

    /// Write `snapshot`, refreshing the revision once if another writer got there first.
    async fn upsert(&self, snapshot: SnapshotEntity) -> CouchResult<()> {
        let doc_id = snapshot_doc_id(&snapshot.room);
        let rev = self.current_rev(&doc_id).await?;
        let mut document = CouchSnapshotDocument::from((snapshot, rev));

        match self.put_snapshot(&document).await {
            Err(CouchDaoError::Conflict { doc_id }) => {
                warn!(%doc_id, "snapshot revision conflict; retrying with the latest revision");
                document.rev = self.current_rev(&doc_id).await?;
                self.put_snapshot(&document).await
            }
            other => other,
        }
    }

    async fn room_ids(&self) -> CouchResult<Vec<String>> {
        let url = self.document_url(ALL_DOCS);
        let query = [
            ("startkey", format!("\"{SNAPSHOT_PREFIX}\"")),
            ("endkey", format!("\"{SNAPSHOT_PREFIX}{END_SUFFIX}\"")),
        ];
        let response = self
            .send(self.request(Method::GET, &url).query(&query), ALL_DOCS)
            .await?;
        if !response.status().is_success() {
            return Err(CouchDaoError::Status {
                target: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }
        let listing = response
            .json::<AllDocsResponse>()
            .await
            .map_err(|source| CouchDaoError::Decode {
                target: ALL_DOCS.to_string(),
                source,
            })?;

        Ok(listing
            .rows
            .iter()
            .filter_map(|row| match extract_room(&row.id) {
                Ok(room) => Some(room),
                Err(err) => {
                    warn!(error = %err, "skipping unexpected CouchDB document");
                    None
                }
            })
            .collect())
    }
}

impl SnapshotStore for CouchSnapshotStore {
    fn load(&self, room: &str) -> BoxFuture<'static, StorageResult<Option<SnapshotEntity>>> {
        let store = self.clone();
        let doc_id = snapshot_doc_id(room);
        Box::pin(async move {
            let doc = store.get_json::<CouchSnapshotDocument>(&doc_id).await?;
            Ok(doc.map(Into::into))
        })
    }

    fn save(&self, snapshot: SnapshotEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert(snapshot).await.map_err(Into::into) })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        Box::pin(async move { store.room_ids().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url.to_string();
            let response = store.send(store.request(Method::HEAD, &url), &url).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::Status {
                    target: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
