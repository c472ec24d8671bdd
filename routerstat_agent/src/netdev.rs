//! Parser for the kernel's per-interface counter table (`/proc/net/dev`).
//!
//! The table looks like:
//!
//! ```text
//! Inter-|   Receive                            |  Transmit
//!  face |bytes    packets errs drop fifo frame |bytes    packets errs drop
//!     lo:  1234       12    0    0    0     0     1234       12    0    0
//!   eth0: 98765      432    1    0    0     0    56789      321    0    0
//! ```
//!
//! The first header line splits into column groups on `|`. Each group's byte
//! span selects the matching slice of the second header line, which yields the
//! field names for that group. Data rows are not delimited per group, so the
//! n-th counter on a row belongs to the n-th field of the flattened
//! (group, field) list.

use crate::error::{ParseError, SourceError};
use crate::sources::CounterSource;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// field name -> counter, e.g. "bytes" -> 98765
pub type Fields = BTreeMap<String, u64>;
/// group name -> fields, e.g. "receive" -> {...}
pub type Sections = BTreeMap<String, Fields>;

/// interface name -> group -> field -> value, rebuilt wholesale per parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    interfaces: BTreeMap<String, Sections>,
}

struct Group {
    start: usize,
    end: Option<usize>,
    name: String,
}

impl InterfaceCounters {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = text.lines();
        let header = lines.next().ok_or(ParseError::MissingHeader)?;
        let label_line = lines.next().ok_or(ParseError::MissingHeader)?;

        let groups = header_groups(header)?;
        let labels: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| columns(label_line, g.start, g.end).split_whitespace().collect())
            .collect();
        let expected: usize = labels.iter().map(Vec::len).sum();

        let mut interfaces = BTreeMap::new();
        // 1-based line numbers; data starts on line 3
        for (line_no, row) in (3..).zip(lines) {
            if row.trim().is_empty() {
                continue;
            }
            let (name, data) = row
                .split_once(':')
                .ok_or(ParseError::MissingColon { line: line_no })?;

            let values = data
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<u64>().map_err(|_| ParseError::BadCounter {
                        line: line_no,
                        token: tok.to_string(),
                    })
                })
                .collect::<Result<Vec<u64>, _>>()?;
            if values.len() != expected {
                return Err(ParseError::FieldCount {
                    line: line_no,
                    expected,
                    actual: values.len(),
                });
            }

            let mut values = values.into_iter();
            let mut sections = Sections::new();
            for (group, names) in groups.iter().zip(&labels) {
                let fields: Fields = names
                    .iter()
                    .zip(values.by_ref())
                    .map(|(n, v)| (n.to_string(), v))
                    .collect();
                sections.insert(group.name.clone(), fields);
            }
            interfaces.insert(name.trim().to_string(), sections);
        }
        Ok(Self { interfaces })
    }

    pub fn get(&self, iface: &str) -> Option<&Sections> {
        self.interfaces.get(iface)
    }

    /// Shorthand for `get(iface)?[section][field]`.
    pub fn counter(&self, iface: &str, section: &str, field: &str) -> Option<u64> {
        self.get(iface)?.get(section)?.get(field).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

// Group spans from the first header line; the leading "Inter-" group is dropped.
fn header_groups(header: &str) -> Result<Vec<Group>, ParseError> {
    if !header.contains('|') {
        return Err(ParseError::HeaderFormat);
    }
    let mut groups = Vec::new();
    let mut start = 0;
    loop {
        match header[start..].find('|') {
            Some(off) => {
                let end = start + off;
                groups.push(Group {
                    start,
                    end: Some(end),
                    name: header[start..end].trim().to_lowercase(),
                });
                start = end + 1;
            }
            None => {
                groups.push(Group {
                    start,
                    end: None,
                    name: header[start..].trim().to_lowercase(),
                });
                break;
            }
        }
    }
    groups.remove(0);
    Ok(groups)
}

// Byte-column slice of the label line; out-of-range spans read as empty.
fn columns(line: &str, start: usize, end: Option<usize>) -> &str {
    let end = end.unwrap_or(line.len()).min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).unwrap_or("")
}

/// Cached view over a [`CounterSource`].
///
/// With `auto_update` every lookup re-reads the source so values are always
/// current; otherwise the table is parsed once and refreshed only by
/// [`NetDev::update`]. A failed update keeps the previous table.
pub struct NetDev {
    source: Arc<dyn CounterSource>,
    auto_update: bool,
    data: InterfaceCounters,
    updated: Option<DateTime<Utc>>,
}

impl NetDev {
    /// Reads and parses the table once up front.
    pub fn open(source: Arc<dyn CounterSource>, auto_update: bool) -> Result<Self, SourceError> {
        let mut nd = Self::lazy(source, auto_update);
        nd.update()?;
        Ok(nd)
    }

    /// Defers the first read to the first lookup or `update()`.
    pub fn lazy(source: Arc<dyn CounterSource>, auto_update: bool) -> Self {
        Self {
            source,
            auto_update,
            data: InterfaceCounters::default(),
            updated: None,
        }
    }

    pub fn update(&mut self) -> Result<(), SourceError> {
        let text = self.source.read_table()?;
        self.data = InterfaceCounters::parse(&text)?;
        self.updated = Some(Utc::now());
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), SourceError> {
        if self.auto_update || self.updated.is_none() {
            self.update()?;
        }
        Ok(())
    }

    pub fn get(&mut self, iface: &str) -> Result<Option<&Sections>, SourceError> {
        self.refresh()?;
        Ok(self.data.get(iface))
    }

    pub fn contains(&mut self, iface: &str) -> Result<bool, SourceError> {
        Ok(self.get(iface)?.is_some())
    }

    /// Last parsed table without touching the source.
    pub fn counters(&self) -> &InterfaceCounters {
        &self.data
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const SAMPLE: &str = "\
Inter-|   Receive                  |  Transmit
 face |bytes    packets errs       |bytes    packets errs
    lo:  1234       12    0           1234       12    0
  eth0: 976329938704  7236412    3    56789   321    0
";

    #[test]
    fn parses_two_interfaces() {
        let t = InterfaceCounters::parse(SAMPLE).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["eth0", "lo"]);

        let eth0 = t.get("eth0").unwrap();
        assert_eq!(eth0.len(), 2);
        assert_eq!(eth0["receive"]["bytes"], 976329938704);
        assert_eq!(eth0["receive"]["packets"], 7236412);
        assert_eq!(eth0["receive"]["errs"], 3);
        assert_eq!(eth0["transmit"]["bytes"], 56789);
        assert_eq!(eth0["transmit"]["packets"], 321);
        assert_eq!(eth0["transmit"]["errs"], 0);

        assert_eq!(t.counter("lo", "receive", "bytes"), Some(1234));
        assert_eq!(t.counter("lo", "transmit", "errs"), Some(0));
        assert_eq!(t.counter("lo", "transmit", "colls"), None);
    }

    #[test]
    fn groups_may_have_different_fields() {
        let text = "\
Inter-|   Receive                            |  Transmit
 face |bytes    packets errs drop multicast  |bytes    packets colls
  eth0:   10 20 30 40 50    60 70 80
";
        let t = InterfaceCounters::parse(text).unwrap();
        let rx = &t.get("eth0").unwrap()["receive"];
        let tx = &t.get("eth0").unwrap()["transmit"];
        assert_eq!(rx.len(), 5);
        assert_eq!(rx["multicast"], 50);
        assert_eq!(tx.len(), 3);
        assert_eq!(tx["bytes"], 60);
        assert_eq!(tx["colls"], 80);
    }

    #[test]
    fn empty_group_is_kept_with_no_fields() {
        let text = "\
Inter-|   Receive   |  Extra  |  Transmit
 face |bytes        |         |bytes
  eth0: 5 6
";
        let t = InterfaceCounters::parse(text).unwrap();
        let s = t.get("eth0").unwrap();
        assert!(s["extra"].is_empty());
        assert_eq!(s["receive"]["bytes"], 5);
        assert_eq!(s["transmit"]["bytes"], 6);
    }

    #[test]
    fn colon_split_wins_over_whitespace() {
        let text = "\
Inter-|   Receive |  Transmit
 face |bytes      |bytes
 my if:1 2
eth0:3 4
";
        let t = InterfaceCounters::parse(text).unwrap();
        assert_eq!(t.counter("my if", "receive", "bytes"), Some(1));
        assert_eq!(t.counter("eth0", "transmit", "bytes"), Some(4));
    }

    #[test]
    fn header_without_pipe_is_rejected() {
        let err = InterfaceCounters::parse("Inter- Receive\nface bytes\n").unwrap_err();
        assert_eq!(err, ParseError::HeaderFormat);
        assert_eq!(
            InterfaceCounters::parse("Inter-|Receive\n").unwrap_err(),
            ParseError::MissingHeader
        );
    }

    #[test]
    fn bad_rows_are_rejected() {
        let head = "Inter-| Receive |Transmit\n face |bytes    |bytes\n";
        let err = InterfaceCounters::parse(&format!("{head}eth0 1 2\n")).unwrap_err();
        assert_eq!(err, ParseError::MissingColon { line: 3 });

        let err = InterfaceCounters::parse(&format!("{head}eth0: 1\n")).unwrap_err();
        assert_eq!(
            err,
            ParseError::FieldCount {
                line: 3,
                expected: 2,
                actual: 1
            }
        );

        let err = InterfaceCounters::parse(&format!("{head}eth0: 1 -2\n")).unwrap_err();
        assert!(matches!(err, ParseError::BadCounter { line: 3, .. }));
    }

    #[test]
    fn reparse_is_identical() {
        let a = InterfaceCounters::parse(SAMPLE).unwrap();
        let b = InterfaceCounters::parse(SAMPLE).unwrap();
        assert_eq!(a, b);
    }

    struct Scripted {
        texts: Mutex<Vec<Result<String, ()>>>,
    }

    impl CounterSource for Scripted {
        fn read_table(&self) -> Result<String, SourceError> {
            let mut t = self.texts.lock().unwrap();
            match t.remove(0) {
                Ok(s) => Ok(s),
                Err(()) => Err(SourceError::malformed("net/dev", "scripted failure")),
            }
        }
    }

    fn scripted(texts: Vec<Result<String, ()>>) -> Arc<dyn CounterSource> {
        Arc::new(Scripted {
            texts: Mutex::new(texts),
        })
    }

    #[test]
    fn auto_update_rereads_every_lookup() {
        let second = SAMPLE.replace("56789", "60000");
        let src = scripted(vec![Ok(SAMPLE.to_string()), Ok(second)]);
        let mut nd = NetDev::open(src, true).unwrap();
        assert!(nd.updated().is_some());
        let tx = nd.get("eth0").unwrap().unwrap()["transmit"]["bytes"];
        assert_eq!(tx, 60000);
    }

    #[test]
    fn manual_update_keeps_cached_table() {
        let src = scripted(vec![Ok(SAMPLE.to_string()), Err(())]);
        let mut nd = NetDev::open(src, false).unwrap();
        // no source read here; the scripted queue would fail it
        assert!(nd.contains("lo").unwrap());
        assert_eq!(nd.len(), 2);
        assert!(nd.update().is_err());
        assert_eq!(nd.counters().counter("eth0", "transmit", "bytes"), Some(56789));
    }

    #[test]
    fn lazy_reads_on_first_lookup() {
        let src = scripted(vec![Ok(SAMPLE.to_string())]);
        let mut nd = NetDev::lazy(src, false);
        assert!(nd.is_empty());
        assert!(nd.updated().is_none());
        assert!(nd.get("eth0").unwrap().is_some());
        assert!(!nd.is_empty());
    }
}
