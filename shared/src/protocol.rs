use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::GliderConfig;
use crate::glider::GliderDynamics;
use crate::vec3::Vec3;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Session phase ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    Lobby,
    Flight,
    Scoring,
}

impl GamePhase {
    /// The phase that follows this one.
    pub fn next(self) -> GamePhase {
        match self {
            GamePhase::Lobby => GamePhase::Flight,
            GamePhase::Flight => GamePhase::Scoring,
            GamePhase::Scoring => GamePhase::Lobby,
        }
    }
}

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    #[serde(rename = "report")]
    Report { report: WorldReport },
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub self_id: String,
    pub palette: Vec<String>,
    pub glider: GliderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
pub struct WorldReport {
    pub starting_position: Vec3,
    /// Milliseconds left in the current phase
    #[ts(type = "number")]
    pub world_time: u64,
    pub game_state: GamePhase,
    pub gliders: BTreeMap<String, GliderWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
pub struct GliderWire {
    pub name: String,
    pub color: String,
    pub dynamics: GliderDynamics,
    pub score: f64,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "join")]
    Join {
        #[serde(default)]
        id: String,
        name: String,
        color: String,
    },
    #[serde(rename = "update_dynamics")]
    UpdateDynamics { dynamics: GliderDynamics },
}

// === Conversion helpers ===

/// Round to 4 decimal places
#[inline]
pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}
