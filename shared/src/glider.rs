//! Glider flight model.
//!
//! One call to [`Glider::update`] advances a glider by `dt` milliseconds:
//! apply the pilot's action, check the flight envelope, sample lift and sink
//! at the current cell, integrate position, then test for ground contact.
//! The step is pure arithmetic over its inputs, so clients predicting the
//! same glider with the same inputs land on bit-identical states.

use std::f64::consts::PI;

use crate::config::GliderConfig;
use crate::grid::Field;
use crate::vec3::{grid_cell, Vec3};

/// Metres per horizontal grid unit
pub const HORIZONTAL_UNIT_LENGTH: f64 = 2500.0;
/// Metres per vertical unit
pub const VERTICAL_UNIT_LENGTH: f64 = 1000.0;
/// Game seconds per real second
pub const TIME_SCALING: f64 = 100.0;
/// Airspeed pinned while circling in a thermal (m/s)
pub const THERMAL_AIRSPEED: f64 = 30.0;
/// Airspeed change per second of held speed input (m/s)
pub const SPEED_CHANGE_RATE: f64 = 20.0;
/// Height band above ground over which thermals fade out (vertical units)
pub const THERMAL_GROUND_BAND: f64 = 0.5;

/// Kinematic state reported by each client.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
pub struct GliderDynamics {
    /// m/s
    pub airspeed: f64,
    /// Radians clockwise from north (+y)
    pub direction: f64,
    pub thermalling: bool,
    /// x/y in m/s over the ground, z in m/s vertical
    pub velocity: Vec3,
    pub position: Vec3,
}

/// Terminal fault flags. Any one set freezes the glider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    pub crashed: bool,
    pub flutter: bool,
    pub stalled: bool,
}

impl Faults {
    pub fn any(&self) -> bool {
        self.crashed || self.flutter || self.stalled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    pub fn radians(self) -> f64 {
        match self {
            Heading::North => 0.0,
            Heading::East => PI / 2.0,
            Heading::South => PI,
            Heading::West => 3.0 * PI / 2.0,
        }
    }
}

/// Pilot input for one step. Only one action applies per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    Heading(Heading),
    SpeedUp,
    SpeedDown,
    Thermal,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glider {
    pub dynamics: GliderDynamics,
    pub faults: Faults,
    /// Height above ground at the last collision check
    pub agl: f64,
}

impl Glider {
    /// A glider cruising north at 40 m/s from `start`.
    pub fn new(start: Vec3) -> Self {
        Self {
            dynamics: GliderDynamics {
                airspeed: 40.0,
                direction: 0.0,
                thermalling: false,
                velocity: Vec3::ZERO,
                position: start,
            },
            faults: Faults::default(),
            agl: start.z,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.faults.any()
    }

    /// Advance by `dt_ms` milliseconds. A halted glider is left untouched.
    pub fn update(
        &mut self,
        action: Action,
        dt_ms: f64,
        thermals: &impl Field,
        elevation: &impl Field,
        config: &GliderConfig,
    ) {
        if self.is_halted() {
            return;
        }
        self.apply_action(action, dt_ms);
        self.check_envelope(config);
        if self.is_halted() {
            return;
        }
        self.lift_and_sink(thermals, elevation, config);
        self.integrate(dt_ms);
        self.check_collision(elevation);
    }

    /// Pure form of [`Glider::update`].
    pub fn step(
        &self,
        action: Action,
        dt_ms: f64,
        thermals: &impl Field,
        elevation: &impl Field,
        config: &GliderConfig,
    ) -> Glider {
        let mut next = self.clone();
        next.update(action, dt_ms, thermals, elevation, config);
        next
    }

    fn apply_action(&mut self, action: Action, dt_ms: f64) {
        let d = &mut self.dynamics;
        match action {
            Action::Heading(heading) => {
                d.direction = heading.radians();
                d.thermalling = false;
            }
            Action::SpeedUp => d.airspeed += dt_ms / 1000.0 * SPEED_CHANGE_RATE,
            Action::SpeedDown => d.airspeed -= dt_ms / 1000.0 * SPEED_CHANGE_RATE,
            Action::Thermal => {
                d.thermalling = true;
                d.airspeed = THERMAL_AIRSPEED;
            }
            Action::None => {}
        }
    }

    fn check_envelope(&mut self, config: &GliderConfig) {
        if self.dynamics.airspeed > config.flutter_speed() {
            self.faults.flutter = true;
        } else if self.dynamics.airspeed < config.stall_threshold() {
            self.faults.stalled = true;
        }
    }

    fn lift_and_sink(&mut self, thermals: &impl Field, elevation: &impl Field, config: &GliderConfig) {
        let (x, y) = grid_cell(self.dynamics.position);
        let lift_index = thermals.at(x, y);
        let ground = elevation.at(x, y);
        let z = self.dynamics.position.z;

        let agl = z - ground;
        let ground_factor = (agl / THERMAL_GROUND_BAND).clamp(0.0, 1.0);

        let inversion = 5.0 + ground / 2.0;
        let inversion_factor = if z < inversion {
            1.0 - (z / inversion).powi(3)
        } else {
            0.0
        };

        let lift = if lift_index > 0.0 {
            lift_index * ground_factor * inversion_factor
        } else {
            0.0
        };
        self.dynamics.velocity.z = lift + config.sink_rate(self.dynamics.airspeed);
    }

    fn integrate(&mut self, dt_ms: f64) {
        let d = &mut self.dynamics;
        if d.thermalling {
            d.velocity.x = 0.0;
            d.velocity.y = 0.0;
        } else {
            d.velocity.x = d.airspeed * d.direction.sin();
            d.velocity.y = d.airspeed * d.direction.cos();
        }

        let seconds = dt_ms / 1000.0 * TIME_SCALING;
        d.position.x += d.velocity.x / HORIZONTAL_UNIT_LENGTH * seconds;
        d.position.y += d.velocity.y / HORIZONTAL_UNIT_LENGTH * seconds;
        d.position.z += d.velocity.z / VERTICAL_UNIT_LENGTH * seconds;
    }

    fn check_collision(&mut self, elevation: &impl Field) {
        let (x, y) = grid_cell(self.dynamics.position);
        self.agl = self.dynamics.position.z - elevation.at(x, y);
        if self.agl <= 0.0 {
            self.faults.crashed = true;
        }
    }
}
