//! Shared agent state handed to every session.

use crate::config::Config;
use crate::metrics::{Collector, Tracked};
use crate::netdev::NetDev;
use crate::sources::{CounterSource, ProcFs, SystemReader};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // Readers are shared; per-session data (rate baselines, parsed table) is not
    pub system: Arc<dyn SystemReader>,
    pub counters: Arc<dyn CounterSource>,

    pub client_count: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        config: Config,
        system: Arc<dyn SystemReader>,
        counters: Arc<dyn CounterSource>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            system,
            counters,
            client_count: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Both readers backed by `config.proc_root`.
    pub fn procfs(config: Config) -> Self {
        let fs = Arc::new(ProcFs::new(config.proc_root.clone()));
        Self::new(config, fs.clone(), fs)
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn clients(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Fresh collector with its own rate baselines.
    pub fn collector(&self) -> Collector {
        let netdev = NetDev::lazy(self.counters.clone(), self.config.netdev_auto_update);
        Collector::new(
            self.system.clone(),
            netdev,
            Tracked {
                interface: self.config.interface.clone(),
                label: self.config.label.clone(),
            },
        )
    }
}
