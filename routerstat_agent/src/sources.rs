//! Readers for the kernel counter files. Everything the agent samples goes
//! through these two traits so sessions can be driven by fakes in tests.

use crate::error::SourceError;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Returns the current text of the interface counter table (`/proc/net/dev`).
pub trait CounterSource: Send + Sync {
    fn read_table(&self) -> Result<String, SourceError>;
}

/// The flat, single-line style metrics.
pub trait SystemReader: Send + Sync {
    /// Seconds since boot.
    fn uptime(&self) -> Result<f64, SourceError>;
    /// 1, 5 and 15 minute load averages.
    fn load_average(&self) -> Result<[f64; 3], SourceError>;
    /// Memory metric name -> kilobytes.
    fn memory(&self) -> Result<BTreeMap<String, u64>, SourceError>;
}

/// procfs-backed implementation of both readers.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, what: &'static str, rel: &str) -> Result<String, SourceError> {
        fs::read_to_string(self.root.join(rel)).map_err(|e| SourceError::unavailable(what, e))
    }
}

impl CounterSource for ProcFs {
    fn read_table(&self) -> Result<String, SourceError> {
        self.read("net/dev", "net/dev")
    }
}

impl SystemReader for ProcFs {
    fn uptime(&self) -> Result<f64, SourceError> {
        parse_uptime(&self.read("uptime", "uptime")?)
    }

    fn load_average(&self) -> Result<[f64; 3], SourceError> {
        parse_loadavg(&self.read("loadavg", "loadavg")?)
    }

    fn memory(&self) -> Result<BTreeMap<String, u64>, SourceError> {
        Ok(parse_meminfo(&self.read("meminfo", "meminfo")?))
    }
}

// "350735.47 234388.90" -> first field
pub fn parse_uptime(s: &str) -> Result<f64, SourceError> {
    let tok = s
        .split_whitespace()
        .next()
        .ok_or_else(|| SourceError::malformed("uptime", "empty"))?;
    tok.parse::<f64>()
        .map_err(|_| SourceError::malformed("uptime", format!("bad value {tok:?}")))
}

// "0.20 0.18 0.12 1/80 11206" -> first three fields
pub fn parse_loadavg(s: &str) -> Result<[f64; 3], SourceError> {
    let mut out = [0.0; 3];
    let mut it = s.split_whitespace();
    for slot in out.iter_mut() {
        let tok = it
            .next()
            .ok_or_else(|| SourceError::malformed("loadavg", "fewer than three fields"))?;
        *slot = tok
            .parse::<f64>()
            .map_err(|_| SourceError::malformed("loadavg", format!("bad value {tok:?}")))?;
    }
    Ok(out)
}

/// Keeps `Key:   <n> kB` lines; anything else (HugePages counts etc.) is skipped.
pub fn parse_meminfo(s: &str) -> BTreeMap<String, u64> {
    let mut out = BTreeMap::new();
    for line in s.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let mut it = rest.split_whitespace();
        let (Some(value), Some("kB"), None) = (it.next(), it.next(), it.next()) else {
            continue;
        };
        if let Ok(v) = value.parse::<u64>() {
            out.insert(key.trim().to_string(), v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_takes_first_field() {
        assert_eq!(parse_uptime("350735.47 234388.90\n").unwrap(), 350735.47);
        assert!(parse_uptime("").is_err());
        assert!(parse_uptime("abc 1.0").is_err());
    }

    #[test]
    fn loadavg_drops_process_fields() {
        let v = parse_loadavg("0.20 0.18 0.12 1/80 11206\n").unwrap();
        assert_eq!(v, [0.20, 0.18, 0.12]);
        assert!(parse_loadavg("0.20 0.18").is_err());
    }

    #[test]
    fn meminfo_keeps_kb_lines_only() {
        let text = "MemTotal:         255908 kB\nMemFree:           69936 kB\nHugePages_Total:       0\nbogus line\n";
        let m = parse_meminfo(text);
        assert_eq!(m.get("MemTotal"), Some(&255908));
        assert_eq!(m.get("MemFree"), Some(&69936));
        assert!(!m.contains_key("HugePages_Total"));
        assert_eq!(m.len(), 2);
    }
}
