//! Data types sent to the client over WebSocket.
//! Field names are what the status board reads; keep them stable.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Bandwidth {
    // absolute byte counters as read from the table
    pub transmit: u64,
    pub receive: u64,
    // bytes/sec; null when there is no usable previous sample
    pub tx_rate: Option<f64>,
    pub rx_rate: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Memory {
    // kB
    pub free: u64,
    pub total: u64,
}

/// One tick's worth of data.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: f64,
    pub uptime: f64,
    // load averages (1, 5, 15 min); the field name predates the rename
    pub cpu: [f64; 3],
    pub bandwidth: BTreeMap<String, Bandwidth>,
    pub memory: Memory,
}
