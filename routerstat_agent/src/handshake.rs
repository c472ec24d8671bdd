//! HTTP upgrade handshake (server side).

use crate::error::HandshakeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
pub const MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the request head.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// `base64(sha1(key + MAGIC))`
pub fn accept_token(key: &str) -> String {
    let mut h = Sha1::new();
    h.update(key.as_bytes());
    h.update(MAGIC.as_bytes());
    STANDARD.encode(h.finalize())
}

/// Offset just past the `\r\n\r\n` ending the request head, if buffered yet.
pub fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    pub fn parse(head: &[u8]) -> Result<Self, HandshakeError> {
        let text = std::str::from_utf8(head).map_err(|_| HandshakeError::NotUtf8)?;
        let mut lines = text.split("\r\n");
        let request_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or(HandshakeError::MissingRequestLine)?
            .to_string();
        let headers = lines
            .take_while(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Ok(Self {
            request_line,
            headers,
        })
    }

    /// Case-insensitive header lookup; first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Checks `Upgrade: websocket` and returns the response to send.
    pub fn negotiate(&self) -> Result<HandshakeResponse, HandshakeError> {
        match self.header("Upgrade") {
            Some(v) if v.eq_ignore_ascii_case("websocket") => {}
            other => return Err(HandshakeError::NotUpgrade(other.map(str::to_string))),
        }
        let key = self
            .header("Sec-WebSocket-Key")
            .filter(|k| !k.is_empty())
            .ok_or(HandshakeError::MissingKey)?;
        Ok(HandshakeResponse {
            accept: accept_token(key),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub accept: String,
}

impl HandshakeResponse {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            self.accept
        )
        .into_bytes()
    }
}

/// Parses a complete request head and negotiates in one go.
pub fn negotiate(head: &[u8]) -> Result<HandshakeResponse, HandshakeError> {
    HandshakeRequest::parse(head)?.negotiate()
}
