//! Soaring multiplayer server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod game_loop;
pub mod phase;
pub mod protocol;
pub mod session;
pub mod state;
pub mod ws;
