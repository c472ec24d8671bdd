//! Error types shared by the agent's readers, codec and sessions.

use std::io;
use thiserror::Error;

/// The /proc/net/dev style table could not be turned into counters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("table is missing its two header lines")]
    MissingHeader,

    #[error("header was not in the expected format (no '|' group delimiter)")]
    HeaderFormat,

    #[error("line {line}: no ':' between interface name and counters")]
    MissingColon { line: usize },

    #[error("line {line}: expected {expected} counters, found {actual}")]
    FieldCount {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("line {line}: counter {token:?} is not a non-negative integer")]
    BadCounter { line: usize, token: String },
}

/// A reader could not produce data for this tick.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{what} unavailable: {source}")]
    Unavailable {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{what} malformed: {detail}")]
    Malformed { what: &'static str, detail: String },

    #[error("interface table: {0}")]
    Parse(#[from] ParseError),

    #[error("interface {0:?} not present in counter table")]
    MissingInterface(String),
}

impl SourceError {
    pub fn unavailable(what: &'static str, source: io::Error) -> Self {
        Self::Unavailable { what, source }
    }

    pub fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            detail: detail.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),

    #[error("request head is not valid UTF-8")]
    NotUtf8,

    #[error("missing request line")]
    MissingRequestLine,

    #[error("not an upgrade request (Upgrade: {0:?})")]
    NotUpgrade(Option<String>),

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("peer closed before completing the handshake")]
    Eof,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("client frame is not masked")]
    Unmasked,

    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: u64, max: u64 },
}

/// Why a session left the streaming loop.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("bad frame from client: {0}")]
    Frame(#[from] FrameError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),
}
