use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::ServerEvent,
    services::scoreboard_service::{self, OperationError},
    state::{SharedState, room::Room},
};

/// Handle the full lifecycle of a scoreboard client socket bound to `room_id`.
///
/// The client receives the current snapshot first, then every later snapshot of the
/// room. Text frames from the client are applied as operations.
pub async fn handle_socket(state: SharedState, socket: WebSocket, room_id: String) {
    let room = state.room(&room_id).await;
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let (initial, updates) = match room.subscribe().await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(room = %room_id, error = %err, "failed to serialize initial snapshot");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let last_version = initial.version;
    if send_event(&outbound_tx, &initial).is_err() {
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let forwarder = tokio::spawn(forward_snapshots(
        room.clone(),
        updates,
        outbound_tx.clone(),
        last_version,
    ));

    info!(
        room = %room_id,
        subscribers = room.subscriber_count(),
        "scoreboard client connected"
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(err) = scoreboard_service::apply_frame(&state, &room, text.as_str()).await
                {
                    log_ignored(&room_id, &err);
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(room = %room_id, "scoreboard client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(room = %room_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    let _ = forwarder.await;
    info!(room = %room_id, "scoreboard client disconnected");

    finalize(writer_task, outbound_tx).await;
    drop(room);
    state.evict_idle_room(&room_id).await;
}

/// Relay room snapshots to one socket, skipping anything older than what it already has.
///
/// A lagging receiver gets the room's latest snapshot instead of the frames it missed.
async fn forward_snapshots(
    room: Arc<Room>,
    updates: broadcast::Receiver<ServerEvent>,
    tx: mpsc::UnboundedSender<Message>,
    mut last_version: u64,
) {
    let mut stream = BroadcastStream::new(updates);
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(room = %room.id(), skipped, "client lagged; resending latest snapshot");
                match room.current_event().await {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(room = %room.id(), error = %err, "failed to serialize snapshot");
                        continue;
                    }
                }
            }
        };

        if event.version <= last_version {
            continue;
        }
        last_version = event.version;

        if send_event(&tx, &event).is_err() {
            break;
        }
    }
}

fn send_event(
    tx: &mpsc::UnboundedSender<Message>,
    event: &ServerEvent,
) -> Result<(), mpsc::error::SendError<Message>> {
    tx.send(Message::Text(event.frame.to_string().into()))
}

fn log_ignored(room_id: &str, err: &OperationError) {
    match err {
        OperationError::Decode(_) | OperationError::Invalid(_) => {
            warn!(room = %room_id, error = %err, "ignoring invalid operation");
        }
        OperationError::Rejected(_) | OperationError::Noop(_) => {
            debug!(room = %room_id, error = %err, "operation ignored");
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
