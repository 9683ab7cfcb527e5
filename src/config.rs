//! Application-level configuration loading: scoreboard defaults, broadcast sizing and
//! storage backend selection.

use std::{
    env, fs,
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "IMPROV_SCOREBOARD_CONFIG_PATH";
/// Default broadcast buffer per room.
const DEFAULT_BROADCAST_CAPACITY: usize = 32;
/// Default delay between an accepted mutation and the snapshot write.
const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_millis(250);
/// Directory used by the file store when `STORAGE_DIR` is unset.
const DEFAULT_STORAGE_DIR: &str = "data";
/// Port used when neither `PORT` nor `SERVER_PORT` holds a valid port.
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    defaults: ScoreboardDefaults,
    broadcast_capacity: usize,
    persist_debounce: Duration,
}

/// Initial values of a freshly created room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreboardDefaults {
    /// First team identity.
    pub team1: TeamDefaults,
    /// Second team identity.
    pub team2: TeamDefaults,
    /// Header text.
    pub title_text: String,
    /// Footer text.
    pub footer_text: String,
    /// Color of both text blocks.
    pub text_color: String,
    /// Header font size.
    pub title_size: u32,
    /// Footer font size.
    pub footer_size: u32,
    /// Logo height.
    pub logo_size: u32,
}

/// Initial identity of a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamDefaults {
    /// Display name.
    pub name: String,
    /// Hex color.
    pub color: String,
    /// Optional emoji.
    pub emoji: Option<String>,
}

impl Default for ScoreboardDefaults {
    fn default() -> Self {
        Self {
            team1: TeamDefaults {
                name: "Team 1".into(),
                color: "#3B82F6".into(),
                emoji: None,
            },
            team2: TeamDefaults {
                name: "Team 2".into(),
                color: "#EF4444".into(),
                emoji: None,
            },
            title_text: "Match d'improvisation".into(),
            footer_text: String::new(),
            text_color: "#FFFFFF".into(),
            title_size: 32,
            footer_size: 20,
            logo_size: 80,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        team1 = %app_config.defaults.team1.name,
                        team2 = %app_config.defaults.team2.name,
                        "loaded scoreboard defaults from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Defaults applied to every new room.
    pub fn defaults(&self) -> &ScoreboardDefaults {
        &self.defaults
    }

    /// Capacity of each room's broadcast channel.
    pub fn broadcast_capacity(&self) -> usize {
        self.broadcast_capacity
    }

    /// Quiet period the persistence writer waits for before saving.
    pub fn persist_debounce(&self) -> Duration {
        self.persist_debounce
    }

    /// Shorten the persistence debounce, mostly for tests.
    pub fn with_persist_debounce(mut self, debounce: Duration) -> Self {
        self.persist_debounce = debounce;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: ScoreboardDefaults::default(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    team1: Option<RawTeam>,
    team2: Option<RawTeam>,
    title_text: Option<String>,
    footer_text: Option<String>,
    text_color: Option<String>,
    title_size: Option<u32>,
    footer_size: Option<u32>,
    logo_size: Option<u32>,
    broadcast_capacity: Option<usize>,
    persist_debounce_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a team entry inside the configuration file.
struct RawTeam {
    name: String,
    color: String,
    #[serde(default)]
    emoji: Option<String>,
}

impl From<RawTeam> for TeamDefaults {
    fn from(value: RawTeam) -> Self {
        Self {
            name: value.name,
            color: value.color,
            emoji: value.emoji,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let base = ScoreboardDefaults::default();
        let defaults = ScoreboardDefaults {
            team1: value.team1.map(Into::into).unwrap_or(base.team1),
            team2: value.team2.map(Into::into).unwrap_or(base.team2),
            title_text: value.title_text.unwrap_or(base.title_text),
            footer_text: value.footer_text.unwrap_or(base.footer_text),
            text_color: value.text_color.unwrap_or(base.text_color),
            title_size: value.title_size.filter(|s| *s > 0).unwrap_or(base.title_size),
            footer_size: value.footer_size.filter(|s| *s > 0).unwrap_or(base.footer_size),
            logo_size: value.logo_size.filter(|s| *s > 0).unwrap_or(base.logo_size),
        };
        Self {
            defaults,
            broadcast_capacity: value
                .broadcast_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_BROADCAST_CAPACITY),
            persist_debounce: value
                .persist_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PERSIST_DEBOUNCE),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Where room snapshots are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// One JSON file per room inside the directory.
    File(PathBuf),
    /// Process memory only; snapshots are lost on restart.
    Memory,
    /// CouchDB configured through the `COUCH_*` variables.
    Couch,
}

impl StorageBackend {
    /// Read `STORAGE_BACKEND` (and `STORAGE_DIR` for the file store).
    pub fn from_env() -> Self {
        let kind = env::var("STORAGE_BACKEND").unwrap_or_default();
        match kind.trim().to_ascii_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "couch" | "couchdb" => StorageBackend::Couch,
            "" | "file" => StorageBackend::File(storage_dir()),
            other => {
                warn!(backend = %other, "unknown STORAGE_BACKEND; using the file store");
                StorageBackend::File(storage_dir())
            }
        }
    }
}

/// Address the server binds: all interfaces, port from `PORT` then `SERVER_PORT`.
pub fn listen_addr() -> SocketAddr {
    let port = parse_port(env::var("PORT").ok().as_deref())
        .or_else(|| parse_port(env::var("SERVER_PORT").ok().as_deref()))
        .unwrap_or(DEFAULT_PORT);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

fn parse_port(value: Option<&str>) -> Option<u16> {
    value?.trim().parse().ok()
}

fn storage_dir() -> PathBuf {
    env::var_os("STORAGE_DIR")
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_missing_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r##"{"team1": {"name": "Les Bleus", "color": "#0000FF"}, "titleSize": 0, "persistDebounceMs": 10}"##,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.defaults().team1.name, "Les Bleus");
        assert_eq!(config.defaults().team2, ScoreboardDefaults::default().team2);
        assert_eq!(config.defaults().title_size, 32);
        assert_eq!(config.persist_debounce(), Duration::from_millis(10));
        assert_eq!(config.broadcast_capacity(), DEFAULT_BROADCAST_CAPACITY);
    }

    #[test]
    fn ports_must_parse() {
        assert_eq!(parse_port(Some(" 9000 ")), Some(9000));
        assert_eq!(parse_port(Some("http")), None);
        assert_eq!(parse_port(Some("70000")), None);
        assert_eq!(parse_port(None), None);
    }
}
