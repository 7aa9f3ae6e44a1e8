use std::collections::BTreeMap;

use soaring_shared::glider::GliderDynamics;
use soaring_shared::protocol::{round4, GliderWire};
use soaring_shared::vec3::{manhattan_xy, Vec3};
use thiserror::Error;

use crate::state::ConnId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    Duplicate(String),
    #[error("session {0} is not registered")]
    Unknown(String),
    #[error("connection {0} has not joined")]
    NotJoined(ConnId),
    #[error("connection {0} is not open")]
    NotConnected(ConnId),
}

/// A joined pilot.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSession {
    pub id: String,
    pub name: String,
    pub color: String,
    pub dynamics: GliderDynamics,
    pub score: f64,
    /// Set once dynamics arrive during the current flight; unreported
    /// sessions keep a zero score.
    pub reported: bool,
}

impl ClientSession {
    pub fn new(id: String, name: String, color: String) -> Self {
        Self {
            id,
            name,
            color,
            dynamics: GliderDynamics::default(),
            score: 0.0,
            reported: false,
        }
    }

    pub fn to_wire(&self) -> GliderWire {
        GliderWire {
            name: self.name.clone(),
            color: self.color.clone(),
            dynamics: self.dynamics,
            score: round4(self.score),
        }
    }
}

/// Horizontal distance flown from the shared start.
pub fn score_for(position: Vec3, start: Vec3) -> f64 {
    manhattan_xy(position, start)
}

/// Sessions keyed by id, ordered so reports encode stably.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<String, ClientSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &str, name: &str, color: &str) -> Result<(), RegistryError> {
        if self.sessions.contains_key(id) {
            return Err(RegistryError::Duplicate(id.to_string()));
        }
        self.sessions.insert(
            id.to_string(),
            ClientSession::new(id.to_string(), name.to_string(), color.to_string()),
        );
        Ok(())
    }

    pub fn update(
        &mut self,
        id: &str,
        dynamics: GliderDynamics,
        score: f64,
    ) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))?;
        session.dynamics = dynamics;
        session.score = score;
        session.reported = true;
        Ok(())
    }

    /// Returns whether a session was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Owned copy of every session in wire form.
    pub fn snapshot(&self) -> BTreeMap<String, GliderWire> {
        self.sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.to_wire()))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&ClientSession> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn reset_scores(&mut self) {
        for session in self.sessions.values_mut() {
            session.score = 0.0;
        }
    }

    /// Recompute every reported session's score against `start`.
    pub fn recompute_scores(&mut self, start: Vec3) {
        for session in self.sessions.values_mut() {
            session.score = if session.reported {
                score_for(session.dynamics.position, start)
            } else {
                0.0
            };
        }
    }

    /// Put every glider back on the start for a new flight.
    pub fn reset_flight(&mut self, start: Vec3) {
        for session in self.sessions.values_mut() {
            session.dynamics = GliderDynamics {
                position: start,
                ..GliderDynamics::default()
            };
            session.score = 0.0;
            session.reported = false;
        }
    }
}
