use std::{env, time::Duration};

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "scoreboard";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Basic-auth pair sent with every CouchDB request.
#[derive(Debug, Clone)]
pub struct CouchCredentials {
    /// CouchDB user.
    pub username: String,
    /// Password of `username`.
    pub password: String,
}

/// Where room snapshots live in CouchDB.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL without a trailing slash.
    pub base_url: String,
    /// Database holding one document per room.
    pub database: String,
    /// Basic-auth credentials, when the server needs them.
    pub credentials: Option<CouchCredentials>,
    /// Upper bound for a single HTTP request.
    pub request_timeout: Duration,
}

impl CouchConfig {
    /// Anonymous access to `database` on `base_url`.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            credentials: None,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Authenticate every request with basic auth.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(CouchCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, `COUCH_TIMEOUT_SECS` and the
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` pair.
    ///
    /// Credentials are only used when both halves are set.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = env::var("COUCH_BASE_URL").map_err(|_| CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = env::var("COUCH_DB").unwrap_or_else(|_| DEFAULT_DATABASE.into());

        let mut config = Self::new(base_url, database);
        if let Some(secs) = env::var("COUCH_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let (Ok(username), Ok(password)) = (env::var("COUCH_USERNAME"), env::var("COUCH_PASSWORD"))
        {
            config = config.with_credentials(username, password);
        }
        Ok(config)
    }

    /// URL of the snapshot database.
    pub fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }
}
