//! Error types of the CouchDB snapshot store.

use reqwest::StatusCode;
use thiserror::Error;

/// Result of a CouchDB store call.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures talking to the CouchDB snapshot database.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// A required configuration variable is unset.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Builder failure.
        #[source]
        source: reqwest::Error,
    },
    /// The request never got a response (connection refused, timeout, ...).
    #[error("CouchDB request to `{target}` failed")]
    Transport {
        /// Requested path.
        target: String,
        /// Client failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered with an unexpected status.
    #[error("CouchDB answered {status} for `{target}`")]
    Status {
        /// Requested path.
        target: String,
        /// Status received.
        status: StatusCode,
    },
    /// Another writer updated the room document between our read and our write.
    #[error("snapshot document `{doc_id}` was updated concurrently")]
    Conflict {
        /// Contended document.
        doc_id: String,
    },
    /// The response body did not have the expected shape.
    #[error("failed to decode CouchDB response for `{target}`")]
    Decode {
        /// Requested path.
        target: String,
        /// Body decoding failure.
        #[source]
        source: reqwest::Error,
    },
    /// A document id without the snapshot prefix.
    #[error("`{doc_id}` is not a scoreboard snapshot document")]
    InvalidDocId {
        /// Offending id.
        doc_id: String,
    },
}
