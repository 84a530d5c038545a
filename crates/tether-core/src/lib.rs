//! Core tether library (config, transport, heartbeat, session loop).

pub mod config;
pub mod events;
pub mod heartbeat;
pub mod interrupt;
pub mod logging;
pub mod operator;
pub mod session;
pub mod transport;
