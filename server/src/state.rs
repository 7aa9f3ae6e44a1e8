use std::collections::{HashMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use soaring_shared::glider::GliderDynamics;
use soaring_shared::protocol::{GamePhase, WorldReport};
use soaring_shared::vec3::Vec3;

use crate::config::ServerConfig;
use crate::phase::{PhaseClock, PhaseDurations};
use crate::session::{score_for, RegistryError, SessionRegistry};

/// Server-assigned id for an open socket.
pub type ConnId = u64;

/// Name used when a pilot joins with a blank one.
const DEFAULT_NAME: &str = "Pilot";

/// Central world state owned by the game loop task.
pub struct SessionWorld {
    pub registry: SessionRegistry,
    clock: PhaseClock,
    starting_position: Vec3,
    /// Every open socket, with the session it joined (if any)
    connections: HashMap<ConnId, Option<String>>,
    rng: ChaCha8Rng,
    next_conn_id: ConnId,
    tick_ms: u64,
    terrain_size: [usize; 2],
    start_altitude: f64,
    palette: Vec<String>,
    max_name_len: usize,
}

impl SessionWorld {
    pub fn new(config: &ServerConfig) -> Self {
        let mut world = Self {
            registry: SessionRegistry::new(),
            clock: PhaseClock::new(PhaseDurations::from_config(config)),
            starting_position: Vec3::ZERO,
            connections: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            next_conn_id: 1,
            tick_ms: config.tick_ms,
            terrain_size: config.terrain_size,
            start_altitude: config.start_altitude,
            palette: config.palette.clone(),
            max_name_len: config.max_name_len,
        };
        world.randomize_start();
        world
    }

    pub fn phase(&self) -> GamePhase {
        self.clock.phase()
    }

    pub fn world_time(&self) -> u64 {
        self.clock.remaining_ms()
    }

    pub fn starting_position(&self) -> Vec3 {
        self.starting_position
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Session joined through `conn`, if any.
    pub fn session_of(&self, conn: ConnId) -> Option<&str> {
        self.connections.get(&conn)?.as_deref()
    }

    /// Track a new anonymous socket.
    pub fn connect(&mut self) -> ConnId {
        let conn = self.next_conn_id;
        self.next_conn_id += 1;
        self.connections.insert(conn, None);
        conn
    }

    /// Admit `conn` into the registry.
    ///
    /// A blank id, or one held by another session, is replaced with a fresh
    /// random id. Joining again from the same socket replaces its previous
    /// session. Returns the id the session was registered under.
    pub fn join(
        &mut self,
        conn: ConnId,
        requested_id: &str,
        name: &str,
        color: &str,
    ) -> Result<String, RegistryError> {
        let previous = match self.connections.get(&conn) {
            Some(previous) => previous.clone(),
            None => return Err(RegistryError::NotConnected(conn)),
        };
        if let Some(previous) = previous {
            self.registry.remove(&previous);
        }

        let requested_id = requested_id.trim();
        let id = if requested_id.is_empty() || self.registry.contains(requested_id) {
            self.fresh_id()
        } else {
            requested_id.to_string()
        };
        let name = self.clean_name(name);
        let color = self.palette_color(color);

        self.registry.register(&id, &name, &color)?;
        self.connections.insert(conn, Some(id.clone()));
        Ok(id)
    }

    /// Store dynamics reported over `conn`.
    ///
    /// During flight the score follows the reported position; in the lobby it
    /// stays zero and while scoring it is frozen.
    pub fn update_dynamics(
        &mut self,
        conn: ConnId,
        dynamics: GliderDynamics,
    ) -> Result<(), RegistryError> {
        let id = match self.connections.get(&conn) {
            Some(Some(id)) => id.clone(),
            Some(None) => return Err(RegistryError::NotJoined(conn)),
            None => return Err(RegistryError::NotConnected(conn)),
        };
        let score = match self.clock.phase() {
            GamePhase::Lobby => 0.0,
            GamePhase::Flight => score_for(dynamics.position, self.starting_position),
            GamePhase::Scoring => self.registry.get(&id).map(|s| s.score).unwrap_or(0.0),
        };
        self.registry.update(&id, dynamics, score)
    }

    /// Forget `conn`, removing its session. Returns the removed session id.
    pub fn disconnect(&mut self, conn: ConnId) -> Option<String> {
        let id = self.connections.remove(&conn)??;
        self.registry.remove(&id).then_some(id)
    }

    /// Advance one broadcast period. Returns the phase entered, if any.
    pub fn tick(&mut self) -> Option<GamePhase> {
        let entered = self.clock.advance(self.tick_ms);
        match entered {
            Some(GamePhase::Flight) => {
                self.randomize_start();
                self.registry.reset_flight(self.starting_position);
            }
            Some(GamePhase::Lobby) => self.registry.reset_scores(),
            Some(GamePhase::Scoring) | None => {}
        }

        let pruned = self.prune_orphans();
        if pruned > 0 {
            tracing::debug!("Pruned {} sessions without an open connection", pruned);
        }

        if self.clock.phase() == GamePhase::Flight {
            self.registry.recompute_scores(self.starting_position);
        }
        entered
    }

    /// Report of the current world, built from a registry snapshot.
    pub fn report(&self) -> WorldReport {
        WorldReport {
            starting_position: self.starting_position,
            world_time: self.clock.remaining_ms(),
            game_state: self.clock.phase(),
            gliders: self.registry.snapshot(),
        }
    }

    /// Drop sessions no open connection maps to.
    fn prune_orphans(&mut self) -> usize {
        let live: HashSet<&str> = self
            .connections
            .values()
            .filter_map(|id| id.as_deref())
            .collect();
        let orphans: Vec<String> = self
            .registry
            .ids()
            .filter(|id| !live.contains(id))
            .map(str::to_string)
            .collect();
        for id in &orphans {
            self.registry.remove(id);
        }
        orphans.len()
    }

    fn randomize_start(&mut self) {
        let [width, height] = self.terrain_size;
        let (w, h) = (width as f64, height as f64);
        self.starting_position = Vec3::new(
            w / 2.0 + w / 4.0 * (self.rng.gen::<f64>() - 0.5),
            h / 2.0 + h / 4.0 * (self.rng.gen::<f64>() - 0.5),
            self.start_altitude,
        );
    }

    fn fresh_id(&mut self) -> String {
        loop {
            let id = format!("{:08x}", self.rng.gen::<u32>());
            if !self.registry.contains(&id) {
                return id;
            }
        }
    }

    fn clean_name(&self, name: &str) -> String {
        let name: String = name.trim().chars().take(self.max_name_len).collect();
        if name.is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            name
        }
    }

    fn palette_color(&self, color: &str) -> String {
        if self.palette.iter().any(|c| c.eq_ignore_ascii_case(color)) {
            color.to_ascii_lowercase()
        } else {
            let fallback = self.palette.first().cloned().unwrap_or_default();
            tracing::debug!("Color {:?} not in palette, using {}", color, fallback);
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soaring_shared::vec3::vec3;

    fn test_config() -> ServerConfig {
        ServerConfig {
            tick_ms: 100,
            lobby_ms: 300,
            flight_ms: 500,
            scoring_ms: 200,
            rng_seed: 12345,
            terrain_size: [100, 80],
            ..Default::default()
        }
    }

    fn test_world() -> SessionWorld {
        SessionWorld::new(&test_config())
    }

    fn tick_until(world: &mut SessionWorld, phase: GamePhase) {
        for _ in 0..100 {
            if world.tick() == Some(phase) {
                return;
            }
        }
        panic!("never entered {:?}", phase);
    }

    fn dynamics_at(x: f64, y: f64) -> GliderDynamics {
        GliderDynamics {
            airspeed: 40.0,
            position: vec3(x, y, 2.0),
            ..Default::default()
        }
    }

    #[test]
    fn join_appears_in_next_report_with_zero_score() {
        let mut world = test_world();
        let conn = world.connect();
        let id = world.join(conn, "c1", "Ann", "#fe0101").unwrap();
        assert_eq!(id, "c1");

        world.tick();
        let report = world.report();
        let glider = &report.gliders["c1"];
        assert_eq!(glider.name, "Ann");
        assert_eq!(glider.color, "#fe0101");
        assert_eq!(glider.score, 0.0);
    }

    #[test]
    fn joined_during_flight_scores_zero_until_reporting() {
        let mut world = test_world();
        tick_until(&mut world, GamePhase::Flight);
        let conn = world.connect();
        world.join(conn, "late", "Bo", "#0173fe").unwrap();

        world.tick();
        assert_eq!(world.report().gliders["late"].score, 0.0);
    }

    #[test]
    fn anonymous_socket_excluded_from_report() {
        let mut world = test_world();
        world.connect();
        world.tick();
        assert_eq!(world.connection_count(), 1);
        assert!(world.report().gliders.is_empty());
    }

    #[test]
    fn update_without_join_is_noop() {
        let mut world = test_world();
        let joined = world.connect();
        world.join(joined, "c1", "Ann", "#fe0101").unwrap();
        let anon = world.connect();

        let err = world.update_dynamics(anon, dynamics_at(1.0, 1.0)).unwrap_err();
        assert_eq!(err, RegistryError::NotJoined(anon));
        assert_eq!(world.registry.len(), 1);
    }

    #[test]
    fn disconnect_removes_session_before_next_report() {
        let mut world = test_world();
        let a = world.connect();
        let b = world.connect();
        world.join(a, "c1", "Ann", "#fe0101").unwrap();
        world.join(b, "c2", "Bo", "#0173fe").unwrap();

        assert_eq!(world.disconnect(a), Some("c1".to_string()));
        world.tick();

        let report = world.report();
        assert!(!report.gliders.contains_key("c1"));
        assert!(report.gliders.contains_key("c2"));
        assert_eq!(world.disconnect(a), None);
    }

    #[test]
    fn tick_prunes_sessions_without_connection() {
        let mut world = test_world();
        world.registry.register("stray", "Ghost", "#ffffff").unwrap();
        world.tick();
        assert!(!world.registry.contains("stray"));
    }

    #[test]
    fn taken_id_gets_fresh_one() {
        let mut world = test_world();
        let a = world.connect();
        let b = world.connect();
        world.join(a, "c1", "Ann", "#fe0101").unwrap();
        let id = world.join(b, "c1", "Eve", "#ffffff").unwrap();

        assert_ne!(id, "c1");
        assert_eq!(world.registry.len(), 2);
        assert_eq!(world.registry.get("c1").unwrap().name, "Ann");
        assert_eq!(world.session_of(b), Some(id.as_str()));
    }

    #[test]
    fn rejoin_from_same_socket_replaces_session() {
        let mut world = test_world();
        let conn = world.connect();
        world.join(conn, "c1", "Ann", "#fe0101").unwrap();
        world.join(conn, "c9", "Ann B", "#0173fe").unwrap();

        assert!(!world.registry.contains("c1"));
        assert_eq!(world.registry.get("c9").unwrap().name, "Ann B");
        assert_eq!(world.registry.len(), 1);
    }

    #[test]
    fn join_after_disconnect_is_rejected() {
        let mut world = test_world();
        let conn = world.connect();
        world.disconnect(conn);
        assert_eq!(
            world.join(conn, "c1", "Ann", "#fe0101"),
            Err(RegistryError::NotConnected(conn))
        );
    }

    #[test]
    fn names_are_trimmed_and_colors_checked() {
        let mut world = test_world();
        let conn = world.connect();
        let long = format!("  {}  ", "x".repeat(100));
        world.join(conn, "c1", &long, "#123456").unwrap();

        let session = world.registry.get("c1").unwrap();
        assert_eq!(session.name.len(), 32);
        assert_eq!(session.color, "#fe0101");
    }

    #[test]
    fn blank_name_gets_default() {
        let mut world = test_world();
        let conn = world.connect();
        world.join(conn, "", "   ", "#0173FE").unwrap();
        let report = world.report();
        let glider = report.gliders.values().next().unwrap();
        assert_eq!(glider.name, "Pilot");
        assert_eq!(glider.color, "#0173fe");
    }

    #[test]
    fn flight_scores_follow_reported_position() {
        let mut world = test_world();
        let conn = world.connect();
        world.join(conn, "c1", "Ann", "#fe0101").unwrap();
        tick_until(&mut world, GamePhase::Flight);

        let start = world.starting_position();
        world
            .update_dynamics(conn, dynamics_at(start.x + 3.0, start.y - 4.0))
            .unwrap();
        world.tick();

        assert!((world.report().gliders["c1"].score - 7.0).abs() < 1e-3);
    }

    #[test]
    fn scores_freeze_while_scoring_and_reset_in_lobby() {
        let mut world = test_world();
        let conn = world.connect();
        world.join(conn, "c1", "Ann", "#fe0101").unwrap();
        tick_until(&mut world, GamePhase::Flight);
        let start = world.starting_position();
        world
            .update_dynamics(conn, dynamics_at(start.x + 5.0, start.y))
            .unwrap();

        tick_until(&mut world, GamePhase::Scoring);
        let frozen = world.registry.get("c1").unwrap().score;
        assert!((frozen - 5.0).abs() < 1e-9);

        world
            .update_dynamics(conn, dynamics_at(start.x + 50.0, start.y))
            .unwrap();
        world.tick();
        assert_eq!(world.registry.get("c1").unwrap().score, frozen);

        tick_until(&mut world, GamePhase::Lobby);
        assert_eq!(world.registry.get("c1").unwrap().score, 0.0);
    }

    #[test]
    fn start_changes_only_entering_flight() {
        let mut world = test_world();
        let mut start = world.starting_position();
        for _ in 0..60 {
            let entered = world.tick();
            let now = world.starting_position();
            if entered == Some(GamePhase::Flight) {
                assert_ne!(now, start);
            } else {
                assert_eq!(now, start);
            }
            start = now;
        }
    }

    #[test]
    fn start_stays_in_central_half_of_terrain() {
        let mut world = test_world();
        for _ in 0..20 {
            tick_until(&mut world, GamePhase::Flight);
            let start = world.starting_position();
            assert!((37.5..=62.5).contains(&start.x));
            assert!((30.0..=50.0).contains(&start.y));
            assert_eq!(start.z, 3.0);
        }
    }

    #[test]
    fn entering_flight_resets_positions_to_start() {
        let mut world = test_world();
        let conn = world.connect();
        world.join(conn, "c1", "Ann", "#fe0101").unwrap();
        world.update_dynamics(conn, dynamics_at(1.0, 1.0)).unwrap();

        tick_until(&mut world, GamePhase::Flight);

        assert_eq!(
            world.registry.get("c1").unwrap().dynamics.position,
            world.starting_position()
        );
    }

    #[test]
    fn world_time_never_negative_and_decreases_within_phase() {
        let mut world = test_world();
        let mut last = world.world_time();
        for _ in 0..50 {
            let entered = world.tick();
            let now = world.world_time();
            if entered.is_none() {
                assert!(now < last);
            }
            last = now;
        }
    }
}
