use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    client::{
        connection::{ConnectionManager, SendOptions, SendOutcome, SubscriptionId},
        normalizer::{CanonicalState, normalize_with},
    },
    config::ScoreboardDefaults,
    dto::ws::{ClientOperation, EVENT_UPDATE_STATE, Empty, RoundConfigInput, RoundConfigPayload},
    state::rounds::TemplateConfig,
};

/// Why a [`ScoreboardClient`] call did not reach the connection.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation could not be encoded.
    #[error("failed to encode operation: {0}")]
    Encode(#[from] serde_json::Error),
    /// No playlist is active in the last received snapshot.
    #[error("no active playlist")]
    NoActivePlaylist,
    /// The playlist cursor cannot move further in that direction.
    #[error("playlist cursor is already at the {0} end")]
    PlaylistBoundary(&'static str),
}

/// Typed front for a [`ConnectionManager`]: sends [`ClientOperation`]s and keeps the
/// latest normalized snapshot.
///
/// Local state is never updated optimistically; it only changes when the server
/// broadcasts a snapshot.
pub struct ScoreboardClient {
    manager: ConnectionManager,
    latest: Arc<watch::Sender<Option<CanonicalState>>>,
    subscription: SubscriptionId,
}

impl ScoreboardClient {
    /// Wrap `manager`, normalizing snapshots with the built-in defaults.
    pub fn new(manager: ConnectionManager) -> Self {
        Self::with_defaults(manager, ScoreboardDefaults::default())
    }

    /// Wrap `manager`, filling snapshot gaps from `defaults`.
    pub fn with_defaults(manager: ConnectionManager, defaults: ScoreboardDefaults) -> Self {
        let (latest, _) = watch::channel(None);
        let latest = Arc::new(latest);
        let sink = latest.clone();
        let subscription = manager.subscribe(EVENT_UPDATE_STATE, move |payload| {
            let state = normalize_with(&defaults, payload);
            debug!(version = state.version, "snapshot received");
            sink.send_replace(Some(state));
        });

        Self {
            manager,
            latest,
            subscription,
        }
    }

    /// Underlying connection.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Last snapshot received from the server.
    pub fn latest(&self) -> Option<CanonicalState> {
        self.latest.borrow().clone()
    }

    /// Receiver updated with every snapshot.
    pub fn watch(&self) -> watch::Receiver<Option<CanonicalState>> {
        self.latest.subscribe()
    }

    /// Send `operation` with the default [`SendOptions`].
    pub fn send(&self, operation: ClientOperation) -> Result<SendOutcome, ClientError> {
        self.send_with(operation, SendOptions::default())
    }

    /// Send `operation` with explicit queueing and retry options.
    pub fn send_with(
        &self,
        operation: ClientOperation,
        options: SendOptions,
    ) -> Result<SendOutcome, ClientError> {
        let envelope = operation.into_envelope()?;
        Ok(self.manager.send(&envelope.event, envelope.payload, options))
    }

    /// Move the active playlist forward and start the round it now points to.
    pub fn advance_playlist(&self) -> Result<SendOutcome, ClientError> {
        self.step_playlist(true)
    }

    /// Move the active playlist backward and start the round it now points to.
    pub fn retreat_playlist(&self) -> Result<SendOutcome, ClientError> {
        self.step_playlist(false)
    }

    fn step_playlist(&self, forward: bool) -> Result<SendOutcome, ClientError> {
        let state = self.latest().ok_or(ClientError::NoActivePlaylist)?;
        let playlist = state
            .rounds()
            .active_playlist
            .as_ref()
            .ok_or(ClientError::NoActivePlaylist)?;
        let (target, step, boundary) = if forward {
            (playlist.next_template(), ClientOperation::NextInPlaylist(Empty {}), "last")
        } else {
            (
                playlist.previous_template(),
                ClientOperation::PreviousInPlaylist(Empty {}),
                "first",
            )
        };
        let template = target.ok_or(ClientError::PlaylistBoundary(boundary))?;
        let start = ClientOperation::StartRound(RoundConfigPayload {
            config: round_input(&template.config),
        });

        self.send(step)?;
        self.send(start)
    }
}

impl Drop for ScoreboardClient {
    fn drop(&mut self) {
        self.manager
            .unsubscribe(EVENT_UPDATE_STATE, Some(self.subscription));
    }
}

fn round_input(config: &TemplateConfig) -> RoundConfigInput {
    RoundConfigInput {
        number: None,
        round_type: config.round_type.clone(),
        theme: config.theme.clone(),
        is_mixed: config.is_mixed,
        min_players: config.min_players,
        max_players: config.max_players,
        time_limit: config.time_limit,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        client::connection::{
            ConnectionConfig,
            tests::{MockConnector, Script},
        },
        dto::ws::EventEnvelope,
    };

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn snapshot_with_playlist(cursor: usize) -> String {
        let template = |name: &str, kind: &str| {
            json!({
                "id": uuid::Uuid::new_v4(),
                "name": name,
                "config": {"type": kind, "minPlayers": 1, "maxPlayers": 3}
            })
        };
        json!({
            "event": "updateState",
            "payload": {
                "version": 4,
                "gameStatus": "live",
                "activePlaylist": {
                    "id": uuid::Uuid::new_v4(),
                    "name": "Soirée",
                    "templates": [template("Ouverture", "comparée"), template("Finale", "mixte")],
                    "cursor": cursor
                }
            }
        })
        .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn advancing_a_playlist_sends_next_then_start_round() {
        let connector = MockConnector::scripted([Script::Accept]);
        let manager = ConnectionManager::new(connector.clone(), ConnectionConfig::new("ws://test/ws"));
        let client = ScoreboardClient::new(manager.clone());

        assert!(matches!(client.advance_playlist(), Err(ClientError::NoActivePlaylist)));

        manager.connect();
        settle().await;
        let mut peer = connector.take_peer();
        peer.inbound.send(Ok(snapshot_with_playlist(0))).unwrap();
        settle().await;
        assert_eq!(client.latest().map(|state| state.version), Some(4));

        assert_eq!(client.advance_playlist().unwrap(), SendOutcome::Sent);
        settle().await;

        let first = EventEnvelope::from_json_str(&peer.written.recv().await.unwrap()).unwrap();
        let second = EventEnvelope::from_json_str(&peer.written.recv().await.unwrap()).unwrap();
        assert_eq!(first.event, "nextInPlaylist");
        assert_eq!(second.event, "startRound");
        assert_eq!(second.payload["config"]["type"], "mixte");
        assert!(second.payload["config"].get("number").is_none());

        assert!(matches!(
            client.retreat_playlist(),
            Err(ClientError::PlaylistBoundary("first"))
        ));
        peer.inbound.send(Ok(snapshot_with_playlist(1))).unwrap();
        settle().await;
        assert!(matches!(
            client.advance_playlist(),
            Err(ClientError::PlaylistBoundary("last"))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn watchers_observe_each_snapshot() {
        let connector = MockConnector::scripted([Script::Accept]);
        let manager = ConnectionManager::new(connector.clone(), ConnectionConfig::new("ws://test/ws"));
        let client = ScoreboardClient::new(manager.clone());
        let mut rx = client.watch();

        manager.connect();
        settle().await;
        let peer = connector.take_peer();
        peer.inbound
            .send(Ok(r#"{"event":"updateState","payload":{"version":1,"team1":{"name":"Bleus"}}}"#.into()))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        let state = rx.borrow().clone().unwrap();
        assert_eq!(state.scoreboard.team1.name, "Bleus");
    }
}
