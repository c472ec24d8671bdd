//! routerstat_agent: samples uptime, load, memory and interface counters from
//! procfs and pushes them as JSON over a minimal WebSocket server.

pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod metrics;
pub mod netdev;
pub mod rate;
pub mod server;
pub mod session;
pub mod sources;
pub mod state;
pub mod types;

pub use config::Config;
pub use state::AppState;
