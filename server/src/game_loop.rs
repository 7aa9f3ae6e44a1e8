use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use soaring_shared::glider::GliderDynamics;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ServerConfig;
use crate::protocol::{report_json, WelcomeMsg, PROTOCOL_VERSION};
use crate::state::{ConnId, SessionWorld};

/// Commands from client connections to the game loop
pub enum GameCommand {
    Connect {
        response: oneshot::Sender<ConnId>,
    },
    Join {
        conn: ConnId,
        id: String,
        name: String,
        color: String,
        response: oneshot::Sender<Option<WelcomeMsg>>,
    },
    UpdateDynamics {
        conn: ConnId,
        dynamics: GliderDynamics,
    },
    Disconnect {
        conn: ConnId,
    },
}

/// Encoded report frame. Clones share one buffer, so every subscriber
/// sends the same bytes.
pub type ReportFrame = Utf8Bytes;

/// Run the main game loop. Owns all session state.
pub async fn run_game_loop(
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<ReportFrame>,
    config: ServerConfig,
) {
    let mut world = SessionWorld::new(&config);

    let mut tick_interval = tokio::time::interval(Duration::from_millis(config.tick_ms));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        "Game loop started in {:?}, start at ({:.1}, {:.1})",
        world.phase(),
        world.starting_position().x,
        world.starting_position().y
    );

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                if let Some(phase) = world.tick() {
                    tracing::info!(
                        "Entered {:?} with {} gliders ({} sockets)",
                        phase,
                        world.registry.len(),
                        world.connection_count()
                    );
                }
                if let Some(json) = report_json(world.report()) {
                    // Err only means nobody is subscribed yet
                    let _ = broadcast_tx.send(ReportFrame::from(json));
                }
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => handle_command(&mut world, &config, cmd),
                // Every connection handle is gone
                None => break,
            },
        }
    }

    tracing::info!("Game loop ended");
}

fn handle_command(world: &mut SessionWorld, config: &ServerConfig, cmd: GameCommand) {
    match cmd {
        GameCommand::Connect { response } => {
            let conn = world.connect();
            if response.send(conn).is_err() {
                // Socket task gave up before hearing back
                world.disconnect(conn);
            }
        }
        GameCommand::Join {
            conn,
            id,
            name,
            color,
            response,
        } => match world.join(conn, &id, &name, &color) {
            Ok(self_id) => {
                tracing::info!("Connection {} joined as {} ({:?})", conn, self_id, name);
                let welcome = WelcomeMsg {
                    protocol_version: PROTOCOL_VERSION,
                    self_id,
                    palette: config.palette.clone(),
                    glider: config.glider.clone(),
                };
                let _ = response.send(Some(welcome));
            }
            Err(e) => {
                tracing::debug!("Join from connection {} ignored: {}", conn, e);
                let _ = response.send(None);
            }
        },
        GameCommand::UpdateDynamics { conn, dynamics } => {
            if let Err(e) = world.update_dynamics(conn, dynamics) {
                tracing::debug!("Dynamics update ignored: {}", e);
            }
        }
        GameCommand::Disconnect { conn } => {
            if let Some(id) = world.disconnect(conn) {
                tracing::info!("Glider {} left", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GamePhase, ServerMsg};

    fn test_config() -> ServerConfig {
        ServerConfig {
            tick_ms: 20,
            lobby_ms: 60,
            flight_ms: 100,
            scoring_ms: 40,
            ..Default::default()
        }
    }

    async fn next_report(rx: &mut broadcast::Receiver<ReportFrame>) -> crate::protocol::WorldReport {
        let frame = rx.recv().await.unwrap();
        match serde_json::from_str::<ServerMsg>(frame.as_str()).unwrap() {
            ServerMsg::Report { report } => report,
            other => panic!("Expected Report, got {:?}", other),
        }
    }

    async fn connect(tx: &mpsc::Sender<GameCommand>) -> ConnId {
        let (response, rx) = oneshot::channel();
        tx.send(GameCommand::Connect { response }).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn join_update_and_leave_flow_through_reports() {
        let (tx, rx) = mpsc::channel(16);
        let (bc_tx, mut bc_rx) = broadcast::channel(64);
        tokio::spawn(run_game_loop(rx, bc_tx, test_config()));

        let conn = connect(&tx).await;
        let (response, welcome_rx) = oneshot::channel();
        tx.send(GameCommand::Join {
            conn,
            id: "c1".to_string(),
            name: "Ann".to_string(),
            color: "#fe0101".to_string(),
            response,
        })
        .await
        .unwrap();
        let welcome = welcome_rx.await.unwrap().unwrap();
        assert_eq!(welcome.self_id, "c1");
        assert_eq!(welcome.protocol_version, PROTOCOL_VERSION);

        let mut seen = false;
        for _ in 0..10 {
            let report = next_report(&mut bc_rx).await;
            if let Some(glider) = report.gliders.get("c1") {
                assert_eq!(glider.name, "Ann");
                seen = true;
                break;
            }
        }
        assert!(seen, "joined glider should appear in a report");

        tx.send(GameCommand::Disconnect { conn }).await.unwrap();
        let mut gone = false;
        for _ in 0..10 {
            if !next_report(&mut bc_rx).await.gliders.contains_key("c1") {
                gone = true;
                break;
            }
        }
        assert!(gone, "disconnected glider should leave the report");
    }

    #[tokio::test]
    async fn subscribers_share_one_encoded_frame() {
        let (_tx, rx) = mpsc::channel(16);
        let (bc_tx, mut first) = broadcast::channel(64);
        let mut second = bc_tx.subscribe();
        tokio::spawn(run_game_loop(rx, bc_tx, test_config()));

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
    }

    #[tokio::test]
    async fn join_without_connect_gets_no_welcome() {
        let (tx, rx) = mpsc::channel(16);
        let (bc_tx, _bc_rx) = broadcast::channel(64);
        tokio::spawn(run_game_loop(rx, bc_tx, test_config()));

        let (response, welcome_rx) = oneshot::channel();
        tx.send(GameCommand::Join {
            conn: 999,
            id: "c1".to_string(),
            name: "Ann".to_string(),
            color: "#fe0101".to_string(),
            response,
        })
        .await
        .unwrap();
        assert!(welcome_rx.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reports_cycle_through_phases() {
        let (_tx, rx) = mpsc::channel(16);
        let (bc_tx, mut bc_rx) = broadcast::channel(256);
        tokio::spawn(run_game_loop(rx, bc_tx, test_config()));

        let mut phases = Vec::new();
        for _ in 0..30 {
            let phase = next_report(&mut bc_rx).await.game_state;
            if phases.last() != Some(&phase) {
                phases.push(phase);
            }
        }
        assert!(phases.len() >= 4);
        for pair in phases.windows(2) {
            assert_eq!(pair[1], pair[0].next());
        }
        assert_eq!(phases[0], GamePhase::Lobby);
    }
}
