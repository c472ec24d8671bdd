//! One client connection: handshake, then a snapshot pushed every interval.

use crate::error::{HandshakeError, SessionError};
use crate::frame::{self, Frame, FrameDecoder, Opcode};
use crate::handshake::{self, MAX_REQUEST_HEAD};
use crate::metrics::Collector;
use crate::state::AppState;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Streaming,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames written.
    pub sent: u64,
    /// Ticks dropped because a source failed.
    pub skipped: u64,
    /// Client frames read and discarded.
    pub received: u64,
}

pub struct Session<S> {
    id: u64,
    stream: S,
    state: SessionState,
    collector: Collector,
    decoder: FrameDecoder,
    interval: Duration,
    handshake_timeout: Duration,
    write_timeout: Duration,
    stats: SessionStats,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, app: &AppState) -> Self {
        let cfg = &app.config;
        Self {
            id: app.next_session_id(),
            stream,
            state: SessionState::AwaitingHandshake,
            collector: app.collector(),
            decoder: FrameDecoder::server(cfg.max_inbound_frame),
            interval: cfg.interval(),
            handshake_timeout: cfg.handshake_timeout(),
            write_timeout: cfg.write_timeout(),
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Runs until the peer goes away or something fails. Always ends `Closed`.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let res = self.drive().await;
        self.state = SessionState::Closed;
        match &res {
            Ok(()) => info!(session = self.id, sent = self.stats.sent, "client disconnected"),
            Err(e) => info!(session = self.id, sent = self.stats.sent, "session closed: {e}"),
        }
        res
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        self.handshake().await?;
        self.state = SessionState::Streaming;
        self.stream_snapshots().await
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        let head = timeout(self.handshake_timeout, self.read_head())
            .await
            .map_err(|_| SessionError::Timeout("handshake"))??;
        let response = handshake::negotiate(&head)?;
        debug!(session = self.id, "handshaking");
        self.write(&response.to_bytes(), "handshake write").await?;
        info!(session = self.id, "handshake complete, streaming");
        Ok(())
    }

    // Bytes past the blank line stay in the decoder buffer.
    async fn read_head(&mut self) -> Result<Vec<u8>, SessionError> {
        loop {
            if let Some(end) = handshake::head_end(self.decoder.buffer()) {
                return Ok(self.decoder.buffer_mut().split_to(end).to_vec());
            }
            if self.decoder.buffered() > MAX_REQUEST_HEAD {
                return Err(HandshakeError::TooLarge(MAX_REQUEST_HEAD).into());
            }
            let n = self.stream.read_buf(self.decoder.buffer_mut()).await?;
            if n == 0 {
                return Err(HandshakeError::Eof.into());
            }
        }
    }

    async fn stream_snapshots(&mut self) -> Result<(), SessionError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            while let Some(frame) = self.decoder.decode()? {
                if self.on_frame(frame).await {
                    return Ok(());
                }
            }
            tokio::select! {
                _ = ticker.tick() => self.tick().await?,
                n = self.stream.read_buf(self.decoder.buffer_mut()) => {
                    if n? == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One sample-and-send. Source failures only skip this tick.
    async fn tick(&mut self) -> Result<(), SessionError> {
        let snapshot = match self.collector.collect() {
            Ok(s) => s,
            Err(e) => {
                self.stats.skipped += 1;
                warn!(session = self.id, "skipping tick: {e}");
                return Ok(());
            }
        };
        let json = match serde_json::to_vec(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                self.stats.skipped += 1;
                warn!(session = self.id, "skipping tick, serialize failed: {e}");
                return Ok(());
            }
        };
        self.write(&frame::encode_text(&json), "frame write").await?;
        self.stats.sent += 1;
        Ok(())
    }

    // true when the client asked to close
    async fn on_frame(&mut self, frame: Frame) -> bool {
        self.stats.received += 1;
        if frame.opcode == Opcode::Close {
            debug!(session = self.id, "close frame from client");
            // best effort; the connection is going away either way
            let _ = self
                .write(&frame::encode(Opcode::Close, &[]), "close write")
                .await;
            return true;
        }
        debug!(
            session = self.id,
            opcode = ?frame.opcode,
            len = frame.payload.len(),
            "discarding client frame"
        );
        false
    }

    async fn write(&mut self, bytes: &[u8], what: &'static str) -> Result<(), SessionError> {
        timeout(self.write_timeout, async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| SessionError::Timeout(what))??;
        Ok(())
    }
}
