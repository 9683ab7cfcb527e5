//! Headless scoreboard display: follows a room and logs every normalized snapshot.

use std::{env, sync::Arc};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use improv_scoreboard::{
    client::{
        ConnectionConfig, ConnectionManager, ScoreboardClient, StaticToken, WebSocketConnector,
    },
    state::scoreboard::TeamKey,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = env::var("SCOREBOARD_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".into());
    let mut config = ConnectionConfig::new(url);
    if let Ok(room) = env::var("SCOREBOARD_ROOM") {
        config = config.with_room(room);
    }
    if let Ok(token) = env::var("SCOREBOARD_TOKEN") {
        config = config.with_token_provider(Arc::new(StaticToken(token)));
    }

    let manager = ConnectionManager::new(Arc::new(WebSocketConnector), config);
    manager.on_connection_state_change(|state| info!(%state, "connection state changed"));

    let client = ScoreboardClient::new(manager.clone());
    let mut snapshots = client.watch();
    manager.connect();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                changed.context("snapshot channel closed")?;
                let Some(state) = snapshots.borrow_and_update().clone() else {
                    continue;
                };
                let team1 = state.team(TeamKey::Team1);
                let team2 = state.team(TeamKey::Team2);
                info!(
                    version = state.version,
                    status = ?state.rounds().game_status,
                    round = state.rounds().current.as_ref().map(|round| round.number),
                    "{} {} - {} {}",
                    team1.name,
                    team1.score,
                    team2.score,
                    team2.name,
                );
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = %err, "failed to listen for ctrl-c");
                }
                break;
            }
        }
    }

    manager.disconnect();
    info!("display stopped");
    Ok(())
}
