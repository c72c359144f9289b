pub mod config;
pub mod logging;

pub mod pull;
pub mod race;
pub mod resource;
pub mod session;
pub mod sink;
pub mod trace;
pub mod transport;
