use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use crate::game_loop::{GameCommand, ReportFrame};
use crate::protocol::{decode_client_msg, encode_server_msg, ClientMsg, DropReason, ServerMsg};
use crate::state::ConnId;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub broadcast_tx: broadcast::Sender<ReportFrame>,
    pub connection_semaphore: Arc<Semaphore>,
    pub max_message_bytes: usize,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    let permit = match Arc::clone(&app_state.connection_semaphore).try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Connection limit reached, rejecting upgrade");
            return (StatusCode::SERVICE_UNAVAILABLE, "server full").into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, permit))
}

async fn handle_socket(socket: WebSocket, app_state: AppState, _permit: OwnedSemaphorePermit) {
    let (mut sink, mut stream) = socket.split();

    let Some(conn) = open_connection(&app_state.game_tx).await else {
        tracing::error!("Game loop unavailable, dropping socket");
        return;
    };
    tracing::info!("Connection {} opened", conn);

    // Reports only flow once the socket has joined
    let mut reports: Option<broadcast::Receiver<ReportFrame>> = None;

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match decode_client_msg(text.as_str(), app_state.max_message_bytes) {
                            Ok(ClientMsg::Join { id, name, color }) => {
                                let Some(welcome) = request_join(&app_state.game_tx, conn, id, name, color).await else {
                                    continue;
                                };
                                let Some(json) = encode_server_msg(&ServerMsg::Welcome(welcome)) else {
                                    continue;
                                };
                                if sink.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                                if reports.is_none() {
                                    reports = Some(app_state.broadcast_tx.subscribe());
                                }
                            }
                            Ok(ClientMsg::UpdateDynamics { dynamics }) => {
                                if app_state
                                    .game_tx
                                    .send(GameCommand::UpdateDynamics { conn, dynamics })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(DropReason::Oversized) => {
                                tracing::debug!(
                                    "Connection {} sent {} byte frame, dropped",
                                    conn,
                                    text.as_str().len()
                                );
                            }
                            Err(DropReason::Malformed) => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Connection {} read error: {}", conn, e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client (broadcast)
            result = next_report(&mut reports) => {
                match result {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Connection {} lagged by {} reports", conn, n);
                        // Reports are full snapshots, skipping is fine
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .game_tx
        .send(GameCommand::Disconnect { conn })
        .await;
    tracing::info!("Connection {} closed", conn);
}

async fn open_connection(game_tx: &mpsc::Sender<GameCommand>) -> Option<ConnId> {
    let (response, rx) = oneshot::channel();
    game_tx.send(GameCommand::Connect { response }).await.ok()?;
    rx.await.ok()
}

async fn request_join(
    game_tx: &mpsc::Sender<GameCommand>,
    conn: ConnId,
    id: String,
    name: String,
    color: String,
) -> Option<crate::protocol::WelcomeMsg> {
    let (response, rx) = oneshot::channel();
    game_tx
        .send(GameCommand::Join {
            conn,
            id,
            name,
            color,
            response,
        })
        .await
        .ok()?;
    rx.await.ok().flatten()
}

/// Next report for a joined socket; never resolves for anonymous ones.
async fn next_report(
    reports: &mut Option<broadcast::Receiver<ReportFrame>>,
) -> Result<ReportFrame, RecvError> {
    match reports {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
