//! Load test for the soaring server.
//!
//! Spawns simulated pilots that:
//! - Connect and join with a palette color
//! - Fly the shared glider model over flat synthetic terrain
//! - Send update_dynamics at a fixed rate
//! - Receive and count report broadcasts
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of pilots to spawn (default: 50)
//!   --duration S     Test duration in seconds (default: 30)
//!   --rate HZ        Dynamics updates per second per pilot (default: 10)
//!   --url URL        Server URL (default: ws://127.0.0.1:8080/ws)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use soaring_shared::config::{GliderConfig, DEFAULT_PALETTE};
use soaring_shared::glider::{Action, Glider, Heading};
use soaring_shared::grid::Grid;
use soaring_shared::protocol::{ClientMsg, GamePhase, ServerMsg};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Side of the synthetic terrain; must cover the server's terrain size.
const TERRAIN_SIZE: usize = 256;
/// Pilots turn back this many cells from the edge.
const EDGE_MARGIN: f64 = 8.0;

// === Metrics ===

struct Metrics {
    connected: AtomicU64,
    joined: AtomicU64,
    reports_received: AtomicU64,
    updates_sent: AtomicU64,
    gliders_seen: AtomicU64,
    halted: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            connected: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            reports_received: AtomicU64::new(0),
            updates_sent: AtomicU64::new(0),
            gliders_seen: AtomicU64::new(0),
            halted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

/// Flat ground with a ring of thermals around the map center.
struct Terrain {
    elevation: Grid,
    thermals: Grid,
}

impl Terrain {
    fn synthetic() -> Self {
        let mut thermals = Grid::filled(TERRAIN_SIZE, TERRAIN_SIZE, 0.0);
        let center = TERRAIN_SIZE as f64 / 2.0;
        for i in 0..16 {
            let angle = i as f64 * std::f64::consts::TAU / 16.0;
            let x = (center + 24.0 * angle.cos()).round() as usize;
            let y = (center + 24.0 * angle.sin()).round() as usize;
            thermals.set(x, y, 4.0);
        }
        Self {
            elevation: Grid::filled(TERRAIN_SIZE, TERRAIN_SIZE, 0.0),
            thermals,
        }
    }
}

// === Pilot ===

/// Pick the next action: steer away from edges, otherwise mostly glide.
fn choose_action(glider: &Glider, rng_state: &mut u64) -> Action {
    let p = glider.dynamics.position;
    let max = TERRAIN_SIZE as f64 - EDGE_MARGIN;
    if p.x < EDGE_MARGIN {
        return Action::Heading(Heading::East);
    }
    if p.x > max {
        return Action::Heading(Heading::West);
    }
    if p.y < EDGE_MARGIN {
        return Action::Heading(Heading::North);
    }
    if p.y > max {
        return Action::Heading(Heading::South);
    }

    // Simple LCG
    *rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
    match (*rng_state >> 33) % 40 {
        0 => Action::Heading(Heading::North),
        1 => Action::Heading(Heading::East),
        2 => Action::Heading(Heading::South),
        3 => Action::Heading(Heading::West),
        4 => Action::Thermal,
        _ => Action::None,
    }
}

fn encode(msg: &ClientMsg) -> Option<Message> {
    serde_json::to_string(msg).ok().map(|json| Message::Text(json.into()))
}

async fn run_pilot(
    pilot_id: u32,
    url: String,
    rate_hz: f64,
    duration: Duration,
    terrain: Arc<Terrain>,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if pilot_id < 5 {
                eprintln!("Pilot {} failed to connect: {}", pilot_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    metrics
        .latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let join = ClientMsg::Join {
        id: format!("pilot-{}", pilot_id),
        name: format!("Pilot {}", pilot_id),
        color: DEFAULT_PALETTE[pilot_id as usize % DEFAULT_PALETTE.len()].to_string(),
    };
    let Some(join) = encode(&join) else {
        return;
    };
    if ws.send(join).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    // Wait for welcome before flying
    let welcome = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(ServerMsg::Welcome(welcome)) = serde_json::from_str(&text) {
                        return Some(welcome);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await;

    let config: GliderConfig = match welcome {
        Ok(Some(welcome)) => {
            if pilot_id < 3 {
                eprintln!("Pilot {} joined as {}", pilot_id, welcome.self_id);
            }
            metrics.joined.fetch_add(1, Ordering::Relaxed);
            welcome.glider
        }
        _ => {
            if pilot_id < 3 {
                eprintln!("Pilot {} got no welcome", pilot_id);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    };

    let step = Duration::from_secs_f64(1.0 / rate_hz.max(0.1));
    let dt_ms = step.as_secs_f64() * 1000.0;
    let mut update_timer = tokio::time::interval(step);
    update_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut glider: Option<Glider> = None;
    let mut last_phase: Option<GamePhase> = None;
    let mut rng_state: u64 = pilot_id as u64 * 12345 + 67890;
    let test_end = Instant::now() + duration;

    while Instant::now() < test_end {
        tokio::select! {
            _ = update_timer.tick() => {
                let Some(g) = glider.as_mut() else {
                    continue;
                };
                if g.is_halted() {
                    continue;
                }
                let action = choose_action(g, &mut rng_state);
                g.update(action, dt_ms, &terrain.thermals, &terrain.elevation, &config);
                if g.is_halted() {
                    metrics.halted.fetch_add(1, Ordering::Relaxed);
                }
                let Some(update) = encode(&ClientMsg::UpdateDynamics { dynamics: g.dynamics }) else {
                    continue;
                };
                if ws.send(update).await.is_ok() {
                    metrics.updates_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ServerMsg::Report { report }) = serde_json::from_str(&text) {
                            metrics.reports_received.fetch_add(1, Ordering::Relaxed);
                            metrics
                                .gliders_seen
                                .fetch_add(report.gliders.len() as u64, Ordering::Relaxed);
                            // Everyone launches from the shared start when a flight begins
                            if report.game_state == GamePhase::Flight
                                && last_phase != Some(GamePhase::Flight)
                            {
                                glider = Some(Glider::new(report.starting_position));
                            } else if report.game_state != GamePhase::Flight {
                                glider = None;
                            }
                            last_phase = Some(report.game_state);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if pilot_id < 3 {
                            eprintln!("Pilot {} error: {}", pilot_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut rate_hz: f64 = 10.0;
    let mut url = "ws://127.0.0.1:8080/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--rate" => {
                i += 1;
                rate_hz = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Soaring Server Load Test ===");
    println!("Pilots: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Update rate: {}/s per pilot", rate_hz);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::new());
    let terrain = Arc::new(Terrain::synthetic());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for pilot_id in 0..num_clients {
        let url = url.clone();
        let terrain = Arc::clone(&terrain);
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_pilot(pilot_id, url, rate_hz, duration, terrain, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if pilot_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All pilots spawned in {:?}", spawn_start.elapsed());
    println!();

    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }
            println!(
                "[{:3}s] connected={}, joined={}, reports={}, updates={}, halted={}, errors={}",
                elapsed,
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.joined.load(Ordering::Relaxed),
                metrics_clone.reports_received.load(Ordering::Relaxed),
                metrics_clone.updates_sent.load(Ordering::Relaxed),
                metrics_clone.halted.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let reports = metrics.reports_received.load(Ordering::Relaxed);
    let gliders = metrics.gliders_seen.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Pilots joined: {}", metrics.joined.load(Ordering::Relaxed));
    println!("Total reports received: {}", reports);
    println!("Total updates sent: {}", metrics.updates_sent.load(Ordering::Relaxed));
    println!("Gliders halted by faults: {}", metrics.halted.load(Ordering::Relaxed));
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));
    println!(
        "Average gliders per report: {}",
        if reports > 0 { gliders / reports } else { 0 }
    );
    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    let reports_per_pilot = reports as f64 / num_clients.max(1) as f64;
    println!();
    println!("Reports per pilot: {:.1}", reports_per_pilot);
    // Default server broadcast is 10 Hz
    println!(
        "Delivery rate vs 10 Hz: {:.1}%",
        reports_per_pilot / (duration_secs as f64 * 10.0) * 100.0
    );
}
