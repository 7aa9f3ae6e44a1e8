/// One point on a glide polar: sink rate (m/s, negative) at an airspeed (km/h).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
pub struct PolarPoint {
    pub kmh: u32,
    pub sink: f64,
}

/// Sink rate used when the airspeed falls outside the polar table.
pub const OUT_OF_POLAR_SINK: f64 = -3.0;

/// Colors a pilot may pick for their glider.
pub const DEFAULT_PALETTE: [&str; 6] = [
    "#fe0101", "#0173fe", "#01fe2c", "#fef001", "#fe01e6", "#ffffff",
];

/// Glider performance configuration, shared by every pilot in a session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
#[serde(default)]
pub struct GliderConfig {
    /// Never-exceed speed (km/h)
    pub velocity_ne: f64,
    /// Stall speed (km/h)
    pub stall_speed: f64,
    /// Polar in 10 km/h steps, ascending
    pub polar: Vec<PolarPoint>,
}

impl Default for GliderConfig {
    fn default() -> Self {
        Self {
            velocity_ne: 260.0,
            stall_speed: 80.0,
            polar: js3_polar(),
        }
    }
}

/// JS3 glide polar.
pub fn js3_polar() -> Vec<PolarPoint> {
    [
        (80, -0.7),
        (90, -0.67),
        (100, -0.65),
        (110, -0.65),
        (120, -0.67),
        (130, -0.70),
        (140, -0.75),
        (150, -0.82),
        (160, -0.95),
        (170, -1.07),
        (180, -1.2),
        (190, -1.34),
        (200, -1.5),
        (210, -1.7),
        (220, -1.93),
        (230, -2.2),
        (240, -2.5),
        (250, -2.85),
        (260, -3.4),
    ]
    .into_iter()
    .map(|(kmh, sink)| PolarPoint { kmh, sink })
    .collect()
}

impl GliderConfig {
    /// Flutter threshold in m/s
    pub fn flutter_speed(&self) -> f64 {
        self.velocity_ne / 3.6
    }

    /// Stall threshold in m/s
    pub fn stall_threshold(&self) -> f64 {
        self.stall_speed / 3.6
    }

    /// Sink rate (m/s) for an airspeed in m/s.
    ///
    /// Speeds at or below the lowest polar entry use that entry. Otherwise the
    /// speed is rounded to the nearest 10 km/h; a step missing from the table
    /// yields [`OUT_OF_POLAR_SINK`].
    pub fn sink_rate(&self, airspeed: f64) -> f64 {
        let Some(lowest) = self.polar.first() else {
            return OUT_OF_POLAR_SINK;
        };
        let kmh = airspeed * 3.6;
        let key = if kmh <= lowest.kmh as f64 {
            lowest.kmh
        } else {
            ((kmh / 10.0).round() * 10.0) as u32
        };
        self.polar
            .iter()
            .find(|p| p.kmh == key)
            .map(|p| p.sink)
            .unwrap_or(OUT_OF_POLAR_SINK)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.velocity_ne.is_finite() || self.velocity_ne <= 0.0 {
            return Err("velocity_ne must be finite and > 0".to_string());
        }
        if !self.stall_speed.is_finite() || self.stall_speed <= 0.0 {
            return Err("stall_speed must be finite and > 0".to_string());
        }
        if self.stall_speed >= self.velocity_ne {
            return Err("stall_speed must be below velocity_ne".to_string());
        }
        if self.polar.is_empty() {
            return Err("polar must have at least one point".to_string());
        }
        if self.polar.windows(2).any(|w| w[0].kmh >= w[1].kmh) {
            return Err("polar must be sorted by ascending kmh".to_string());
        }
        if self.polar.iter().any(|p| !p.sink.is_finite()) {
            return Err("polar sink rates must be finite".to_string());
        }
        Ok(())
    }
}
