use soaring_shared::protocol::GamePhase;

use crate::config::ServerConfig;

/// Length of each phase in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    pub lobby_ms: u64,
    pub flight_ms: u64,
    pub scoring_ms: u64,
}

impl PhaseDurations {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            lobby_ms: config.lobby_ms,
            flight_ms: config.flight_ms,
            scoring_ms: config.scoring_ms,
        }
    }

    pub fn of(&self, phase: GamePhase) -> u64 {
        match phase {
            GamePhase::Lobby => self.lobby_ms,
            GamePhase::Flight => self.flight_ms,
            GamePhase::Scoring => self.scoring_ms,
        }
    }
}

/// Countdown driving the lobby -> flight -> scoring cycle.
#[derive(Debug, Clone)]
pub struct PhaseClock {
    phase: GamePhase,
    remaining_ms: u64,
    durations: PhaseDurations,
}

impl PhaseClock {
    /// Starts in the lobby with a full countdown.
    pub fn new(durations: PhaseDurations) -> Self {
        Self {
            phase: GamePhase::Lobby,
            remaining_ms: durations.of(GamePhase::Lobby),
            durations,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// Count down by `dt_ms`. When the countdown reaches zero the clock moves
    /// to the next phase with a fresh countdown and returns that phase.
    /// Leftover time is not carried into the new phase.
    pub fn advance(&mut self, dt_ms: u64) -> Option<GamePhase> {
        self.remaining_ms = self.remaining_ms.saturating_sub(dt_ms);
        if self.remaining_ms > 0 {
            return None;
        }
        self.phase = self.phase.next();
        self.remaining_ms = self.durations.of(self.phase);
        Some(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durations() -> PhaseDurations {
        PhaseDurations {
            lobby_ms: 300,
            flight_ms: 500,
            scoring_ms: 200,
        }
    }

    #[test]
    fn starts_in_lobby() {
        let clock = PhaseClock::new(durations());
        assert_eq!(clock.phase(), GamePhase::Lobby);
        assert_eq!(clock.remaining_ms(), 300);
    }

    #[test]
    fn counts_down_strictly_within_phase() {
        let mut clock = PhaseClock::new(durations());
        let mut last = clock.remaining_ms();
        for _ in 0..2 {
            assert_eq!(clock.advance(100), None);
            assert!(clock.remaining_ms() < last);
            last = clock.remaining_ms();
        }
        assert_eq!(clock.advance(100), Some(GamePhase::Flight));
        assert_eq!(clock.remaining_ms(), 500);
    }

    #[test]
    fn overshoot_saturates_and_transitions_once() {
        let mut clock = PhaseClock::new(durations());
        assert_eq!(clock.advance(10_000), Some(GamePhase::Flight));
        assert_eq!(clock.phase(), GamePhase::Flight);
        assert_eq!(clock.remaining_ms(), 500);
    }

    #[test]
    fn cycles_indefinitely() {
        let mut clock = PhaseClock::new(durations());
        let mut entered = Vec::new();
        for _ in 0..200 {
            if let Some(phase) = clock.advance(100) {
                entered.push(phase);
            }
        }
        assert!(entered.len() >= 6);
        for pair in entered.windows(2) {
            assert_eq!(pair[1], pair[0].next());
        }
        assert_eq!(entered[0], GamePhase::Flight);
    }
}
