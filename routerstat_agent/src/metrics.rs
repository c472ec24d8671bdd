//! Snapshot assembly for one tick.

use crate::error::SourceError;
use crate::netdev::NetDev;
use crate::rate::RateSampler;
use crate::sources::SystemReader;
use crate::types::{Bandwidth, Memory, Snapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// What to sample and how to label it in the payload.
#[derive(Debug, Clone)]
pub struct Tracked {
    pub interface: String,
    pub label: String,
}

/// Per-session collector: owns the counter table view and the rate baselines.
pub struct Collector {
    system: Arc<dyn SystemReader>,
    netdev: NetDev,
    rates: RateSampler,
    tracked: Tracked,
    started: Instant,
    tx_stream: String,
    rx_stream: String,
}

impl Collector {
    pub fn new(system: Arc<dyn SystemReader>, netdev: NetDev, tracked: Tracked) -> Self {
        let tx_stream = format!("{}-tx", tracked.interface);
        let rx_stream = format!("{}-rx", tracked.interface);
        Self {
            system,
            netdev,
            rates: RateSampler::new(),
            tracked,
            started: Instant::now(),
            tx_stream,
            rx_stream,
        }
    }

    pub fn rates(&self) -> &RateSampler {
        &self.rates
    }

    /// Reads every source; any failure skips the tick and leaves the
    /// rate baselines untouched.
    pub fn collect(&mut self) -> Result<Snapshot, SourceError> {
        let uptime = self.system.uptime()?;
        let cpu = self.system.load_average()?;
        let mem = self.system.memory()?;
        let memory = Memory {
            free: mem_kb(&mem, "MemFree")?,
            total: mem_kb(&mem, "MemTotal")?,
        };

        let iface = &self.tracked.interface;
        let sections = self
            .netdev
            .get(iface)?
            .ok_or_else(|| SourceError::MissingInterface(iface.clone()))?;
        let transmit = bytes_of(sections, "transmit")?;
        let receive = bytes_of(sections, "receive")?;

        let now = self.started.elapsed().as_secs_f64();
        let tx_rate = self.rates.update(&self.tx_stream, transmit, now);
        let rx_rate = self.rates.update(&self.rx_stream, receive, now);

        let mut bandwidth = BTreeMap::new();
        bandwidth.insert(
            self.tracked.label.clone(),
            Bandwidth {
                transmit,
                receive,
                tx_rate,
                rx_rate,
            },
        );

        Ok(Snapshot {
            timestamp: unix_secs_now(),
            uptime,
            cpu,
            bandwidth,
            memory,
        })
    }
}

fn mem_kb(mem: &BTreeMap<String, u64>, key: &'static str) -> Result<u64, SourceError> {
    mem.get(key)
        .copied()
        .ok_or_else(|| SourceError::malformed("meminfo", format!("no {key} line")))
}

fn bytes_of(sections: &crate::netdev::Sections, dir: &'static str) -> Result<u64, SourceError> {
    sections
        .get(dir)
        .and_then(|f| f.get("bytes"))
        .copied()
        .ok_or_else(|| SourceError::malformed("net/dev", format!("no {dir} bytes column")))
}

fn unix_secs_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::CounterSource;
    use std::sync::atomic::{AtomicBool, Ordering};

    const TABLE: &str = "\
Inter-| Receive |Transmit
 face |bytes    |bytes
  eth0: 100 200
";

    struct Sys {
        fail: AtomicBool,
    }

    impl SystemReader for Sys {
        fn uptime(&self) -> Result<f64, SourceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceError::malformed("uptime", "empty"));
            }
            Ok(1.0)
        }
        fn load_average(&self) -> Result<[f64; 3], SourceError> {
            Ok([0.0; 3])
        }
        fn memory(&self) -> Result<BTreeMap<String, u64>, SourceError> {
            Ok(BTreeMap::from([("MemFree".into(), 1), ("MemTotal".into(), 2)]))
        }
    }

    struct Table;

    impl CounterSource for Table {
        fn read_table(&self) -> Result<String, SourceError> {
            Ok(TABLE.to_string())
        }
    }

    fn collector(sys: Arc<Sys>, iface: &str) -> Collector {
        let netdev = NetDev::lazy(Arc::new(Table), true);
        Collector::new(
            sys,
            netdev,
            Tracked {
                interface: iface.into(),
                label: "wan".into(),
            },
        )
    }

    #[test]
    fn failed_read_leaves_baselines_alone() {
        let sys = Arc::new(Sys {
            fail: AtomicBool::new(true),
        });
        let mut c = collector(sys.clone(), "eth0");
        assert!(c.collect().is_err());
        assert!(c.rates().is_empty());

        sys.fail.store(false, Ordering::SeqCst);
        let snap = c.collect().unwrap();
        let wan = &snap.bandwidth["wan"];
        assert_eq!((wan.receive, wan.transmit), (100, 200));
        assert_eq!(wan.tx_rate, None);
        assert_eq!(c.rates().len(), 2);
        assert_eq!(c.rates().last("eth0-tx").unwrap().value, 200);
        assert_eq!(snap.memory, Memory { free: 1, total: 2 });
    }

    #[test]
    fn unknown_interface_is_an_error() {
        let sys = Arc::new(Sys {
            fail: AtomicBool::new(false),
        });
        let mut c = collector(sys, "vlan2");
        assert!(matches!(
            c.collect(),
            Err(SourceError::MissingInterface(name)) if name == "vlan2"
        ));
    }
}
