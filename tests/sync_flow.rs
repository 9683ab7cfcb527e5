//! End-to-end synchronization between the real server router and the WebSocket client.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::watch};

use improv_scoreboard::{
    client::{
        CanonicalState, ConnectionConfig, ConnectionManager, ConnectionState, ScoreboardClient,
        SendOutcome, WebSocketConnector,
    },
    config::AppConfig,
    dto::ws::{
        ClientOperation, Empty, EndRoundPayload, RoundConfigInput, RoundConfigPayload,
        RoundResultsInput, TeamUpdates, UpdateTeamPayload,
    },
    routes,
    state::{
        AppState,
        rounds::{GameStatus, TeamPoints},
        scoreboard::TeamKey,
    },
};

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::router(AppState::new(AppConfig::default()));
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr, room: &str) -> (ConnectionManager, ScoreboardClient) {
    let config = ConnectionConfig::new(format!("ws://{addr}/ws")).with_room(room);
    let manager = ConnectionManager::new(Arc::new(WebSocketConnector), config);
    let client = ScoreboardClient::new(manager.clone());
    (manager, client)
}

async fn wait_for<F>(rx: &mut watch::Receiver<Option<CanonicalState>>, predicate: F) -> CanonicalState
where
    F: Fn(&CanonicalState) -> bool,
{
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|state| state.as_ref().is_some_and(&predicate)),
    )
    .await
    .expect("timed out waiting for snapshot")
    .expect("snapshot channel closed");
    state.clone().unwrap()
}

async fn wait_connected(manager: &ConnectionManager) {
    let mut states = manager.state_watcher();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == ConnectionState::Connected),
    )
    .await
    .expect("timed out waiting for connection")
    .unwrap();
}

fn rename(team: TeamKey, name: &str) -> ClientOperation {
    ClientOperation::UpdateTeam(UpdateTeamPayload {
        team_id: team,
        updates: TeamUpdates {
            name: Some(name.into()),
            color: None,
        },
    })
}

fn round(kind: &str) -> ClientOperation {
    ClientOperation::StartRound(RoundConfigPayload {
        config: RoundConfigInput {
            number: None,
            round_type: kind.into(),
            theme: None,
            is_mixed: false,
            min_players: 1,
            max_players: 4,
            time_limit: None,
        },
    })
}

fn end_round(team1: i32, team2: i32) -> ClientOperation {
    ClientOperation::EndRound(EndRoundPayload {
        results: RoundResultsInput {
            points: TeamPoints { team1, team2 },
            ..RoundResultsInput::default()
        },
    })
}

#[tokio::test]
async fn operations_queued_offline_are_flushed_on_connect() {
    let addr = spawn_server().await;
    let (manager, client) = client_for(addr, "queued");
    let mut snapshots = client.watch();

    assert_eq!(
        client.send(rename(TeamKey::Team1, "Blue")).unwrap(),
        SendOutcome::Queued
    );
    assert_eq!(manager.queue_len(), 1);

    manager.connect();
    wait_connected(&manager).await;

    let state = wait_for(&mut snapshots, |state| state.team(TeamKey::Team1).name == "Blue").await;
    assert_eq!(manager.queue_len(), 0);
    assert_eq!(state.room.as_deref(), Some("queued"));
    manager.disconnect();
}

#[tokio::test]
async fn round_history_drives_team_totals_across_clients() {
    let addr = spawn_server().await;
    let (control, panel) = client_for(addr, "finale");
    let (display, screen) = client_for(addr, "finale");
    let mut seen = screen.watch();

    control.connect();
    display.connect();
    wait_connected(&control).await;
    wait_connected(&display).await;

    for operation in [
        ClientOperation::StartGame(Empty {}),
        round("comparée"),
        end_round(3, 1),
        round("mixte"),
        end_round(2, 0),
    ] {
        assert_eq!(panel.send(operation).unwrap(), SendOutcome::Sent);
    }

    let state = wait_for(&mut seen, |state| state.rounds().history.len() == 2).await;
    assert_eq!(state.team(TeamKey::Team1).score, 5);
    assert_eq!(state.team(TeamKey::Team2).score, 1);
    assert_eq!(state.rounds().game_status, GameStatus::Live);
    assert!(state.rounds().is_between_rounds);
    assert_eq!(
        state
            .rounds()
            .history
            .iter()
            .map(|round| round.config.number)
            .collect::<Vec<_>>(),
        vec![1, 2]
    );

    control.disconnect();
    display.disconnect();
}

#[tokio::test]
async fn reset_keeps_team_identity() {
    let addr = spawn_server().await;
    let (manager, client) = client_for(addr, "reset");
    let mut snapshots = client.watch();
    manager.connect();
    wait_connected(&manager).await;

    client.send(rename(TeamKey::Team2, "Rouges")).unwrap();
    client.send(ClientOperation::StartGame(Empty {})).unwrap();
    client.send(round("chantée")).unwrap();
    client.send(end_round(0, 4)).unwrap();
    let before = wait_for(&mut snapshots, |state| state.team(TeamKey::Team2).score == 4).await;

    client.send(ClientOperation::ResetAll(Empty {})).unwrap();
    let after = wait_for(&mut snapshots, |state| state.version > before.version && state.rounds().history.is_empty()).await;

    let team2 = after.team(TeamKey::Team2);
    assert_eq!(team2.name, "Rouges");
    assert_eq!(team2.color, before.team(TeamKey::Team2).color);
    assert_eq!(team2.score, 0);
    assert_eq!(after.rounds().game_status, GameStatus::NotStarted);
    manager.disconnect();
}
