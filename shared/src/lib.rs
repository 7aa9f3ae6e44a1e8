//! Types and flight model shared by the soaring server and its clients.

pub mod config;
pub mod glider;
pub mod grid;
pub mod protocol;
pub mod vec3;
