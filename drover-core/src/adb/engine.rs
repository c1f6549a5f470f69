//! The protocol engine: handshake and per-command stream lifecycle.
//!
//! ```text
//!  Disconnected ──► Handshaking ──► Connected ──► StreamOpening
//!        ▲                             ▲   │            │
//!        │                             │   ▼            ▼
//!        └──────── (close/error) ◄── StreamClosed ◄─ StreamOpen
//! ```
//!
//! One command is in flight at a time: the stream id pairing and the
//! underlying bulk transfers are not designed for interleaving, so the
//! engine is driven behind a per-device lock (see the dispatch layer).
//!
//! The handshake is deliberately demo-grade: when the device answers
//! `CNXN` with an `AUTH` challenge, the engine logs a reduced-trust
//! notice and proceeds without completing a signature exchange. This
//! is a documented limitation, not an omission to be fixed silently.

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::adb::message::{Command, Header, Message, HEADER_LEN, MAX_PAYLOAD};
use crate::adb::transport::Transport;
use crate::error::DroverError;

// ── EnginePhase ──────────────────────────────────────────────────

/// Lifecycle phase of the engine, with validated transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    /// No connection. Initial / terminal state.
    #[default]
    Disconnected,

    /// `CNXN` sent, waiting for the device's reply.
    Handshaking,

    /// Handshake complete; ready to open a stream.
    Connected,

    /// `OPEN` sent, waiting for the peer's `OKAY`.
    StreamOpening,

    /// Stream acknowledged; exchanging `WRTE`/`OKAY`.
    StreamOpen,

    /// Peer closed the stream; command finishing up.
    StreamClosed,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Handshaking => "Handshaking",
            Self::Connected => "Connected",
            Self::StreamOpening => "StreamOpening",
            Self::StreamOpen => "StreamOpen",
            Self::StreamClosed => "StreamClosed",
        };
        write!(f, "{s}")
    }
}

impl EnginePhase {
    /// Ready for protocol traffic (a stream may be opened).
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Transition to `Handshaking`. Valid from: `Disconnected`.
    pub fn begin_handshake(&mut self) -> Result<(), DroverError> {
        match self {
            Self::Disconnected => {
                *self = Self::Handshaking;
                Ok(())
            }
            _ => Err(DroverError::ProtocolViolation(
                "cannot handshake: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Connected`. Valid from: `Handshaking`.
    pub fn complete_handshake(&mut self) -> Result<(), DroverError> {
        match self {
            Self::Handshaking => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(DroverError::ProtocolViolation(
                "cannot complete handshake: not in Handshaking state",
            )),
        }
    }

    /// Transition to `StreamOpening`. Valid from: `Connected`.
    pub fn begin_stream(&mut self) -> Result<(), DroverError> {
        match self {
            Self::Connected => {
                *self = Self::StreamOpening;
                Ok(())
            }
            _ => Err(DroverError::ProtocolViolation(
                "cannot open stream: engine not connected",
            )),
        }
    }

    /// Transition to `StreamOpen`. Valid from: `StreamOpening`.
    pub fn stream_established(&mut self) -> Result<(), DroverError> {
        match self {
            Self::StreamOpening => {
                *self = Self::StreamOpen;
                Ok(())
            }
            _ => Err(DroverError::ProtocolViolation(
                "cannot establish stream: no stream opening",
            )),
        }
    }

    /// Transition to `StreamClosed`. Valid from: `StreamOpening`,
    /// `StreamOpen`.
    pub fn stream_closed(&mut self) -> Result<(), DroverError> {
        match self {
            Self::StreamOpening | Self::StreamOpen => {
                *self = Self::StreamClosed;
                Ok(())
            }
            _ => Err(DroverError::ProtocolViolation(
                "cannot close stream: no stream in flight",
            )),
        }
    }

    /// Transition back to `Connected`. Valid from: `StreamClosed`.
    pub fn finish_command(&mut self) -> Result<(), DroverError> {
        match self {
            Self::StreamClosed => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(DroverError::ProtocolViolation(
                "cannot finish command: stream not closed",
            )),
        }
    }

    /// Abandon an in-flight stream after a failure, returning to
    /// `Connected`. No-op outside the stream states.
    pub fn abort_stream(&mut self) {
        if matches!(
            self,
            Self::StreamOpening | Self::StreamOpen | Self::StreamClosed
        ) {
            *self = Self::Connected;
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Stream ───────────────────────────────────────────────────────

/// Lifecycle of one multiplexed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Opening,
    Open,
    Closed,
}

/// One shell/service channel: a locally-assigned id paired (once
/// acknowledged) with the peer's. Transient — a stream lives for one
/// command and is never reused after `Closed`.
#[derive(Debug)]
pub struct Stream {
    local_id: u32,
    remote_id: Option<u32>,
    state: StreamState,
}

impl Stream {
    /// A stream for which `OPEN` has been sent.
    pub fn opening(local_id: u32) -> Self {
        Self {
            local_id,
            remote_id: None,
            state: StreamState::Opening,
        }
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// The peer-assigned id, available once the stream is established.
    pub fn remote_id(&self) -> Option<u32> {
        self.remote_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Record the peer's `OKAY`. Valid from: `Opening`.
    pub fn establish(&mut self, remote_id: u32) -> Result<(), DroverError> {
        match self.state {
            StreamState::Opening => {
                self.remote_id = Some(remote_id);
                self.state = StreamState::Open;
                Ok(())
            }
            _ => Err(DroverError::ProtocolViolation(
                "cannot establish stream: not opening",
            )),
        }
    }

    /// Record the stream close. Valid from: `Opening`, `Open`.
    pub fn close(&mut self) -> Result<(), DroverError> {
        match self.state {
            StreamState::Opening | StreamState::Open => {
                self.state = StreamState::Closed;
                Ok(())
            }
            StreamState::Closed => Err(DroverError::ProtocolViolation(
                "stream already closed",
            )),
        }
    }
}

// ── ProtocolEngine ───────────────────────────────────────────────

/// Default deadline applied to every transport wait.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(15);

/// Drives the wire protocol over a [`Transport`].
pub struct ProtocolEngine<T: Transport> {
    transport: T,
    phase: EnginePhase,
    next_local_id: u32,
    io_timeout: Duration,
    reduced_trust: bool,
    peer_max_payload: usize,
    peer_banner: Option<String>,
}

impl<T: Transport> ProtocolEngine<T> {
    pub fn new(transport: T) -> Self {
        Self::with_timeout(transport, DEFAULT_IO_TIMEOUT)
    }

    /// Engine with an explicit I/O deadline; expiry surfaces as a
    /// `Timeout` error and fails the in-flight command.
    pub fn with_timeout(transport: T, io_timeout: Duration) -> Self {
        Self {
            transport,
            phase: EnginePhase::Disconnected,
            next_local_id: 1,
            io_timeout,
            reduced_trust: false,
            peer_max_payload: MAX_PAYLOAD,
            peer_banner: None,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// `true` when the device demanded authentication that this engine
    /// skipped. Commands still work against devices that tolerate the
    /// reduced handshake, but the link is not authenticated.
    pub fn reduced_trust(&self) -> bool {
        self.reduced_trust
    }

    /// Identity banner the device sent in its `CNXN` reply, if any.
    pub fn peer_banner(&self) -> Option<&str> {
        self.peer_banner.as_deref()
    }

    /// Perform the connection handshake.
    ///
    /// Any reply moves the engine to `Connected`; no reply within the
    /// I/O deadline is a connectivity error.
    pub async fn connect(&mut self) -> Result<(), DroverError> {
        self.phase.begin_handshake()?;
        match self.handshake().await {
            Ok(()) => {
                self.phase.complete_handshake()?;
                debug!(banner = ?self.peer_banner, reduced_trust = self.reduced_trust, "connected");
                Ok(())
            }
            Err(e) => {
                self.phase.force_disconnect();
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), DroverError> {
        self.send(Message::connect()).await?;
        let reply = self.recv_message().await?;
        match reply.command {
            Command::Auth => {
                warn!(
                    "device requested authentication; continuing in reduced-trust mode \
                     (no signature challenge is performed)"
                );
                self.reduced_trust = true;
            }
            Command::Connect => {
                if reply.arg1 > 0 {
                    self.peer_max_payload = MAX_PAYLOAD.min(reply.arg1 as usize);
                }
                self.peer_banner = Some(reply.payload_text());
            }
            other => {
                debug!(%other, "unexpected handshake reply; treating link as connected");
            }
        }
        Ok(())
    }

    /// Run a shell command and return its output as (lossy) text.
    pub async fn run_shell(&mut self, cmd: &str) -> Result<String, DroverError> {
        let bytes = self.run_shell_bytes(cmd).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Run a shell command and return its raw output bytes.
    ///
    /// This is the binary-safe path; screenshots use it so PNG bytes
    /// are never squeezed through a text decode.
    pub async fn run_shell_bytes(&mut self, cmd: &str) -> Result<Vec<u8>, DroverError> {
        self.phase.begin_stream()?;
        let local_id = self.next_stream_id();
        match self.shell_exchange(local_id, cmd).await {
            Ok(output) => {
                self.phase.finish_command()?;
                Ok(output)
            }
            Err(e) => {
                self.phase.abort_stream();
                Err(e)
            }
        }
    }

    /// Capture the screen as PNG bytes.
    pub async fn screenshot(&mut self) -> Result<Vec<u8>, DroverError> {
        self.run_shell_bytes("screencap -p").await
    }

    /// Close the transport and reset the engine.
    pub async fn close(&mut self) -> Result<(), DroverError> {
        self.transport.close().await?;
        self.phase.force_disconnect();
        Ok(())
    }

    // ── internals ────────────────────────────────────────────────

    /// Ids are monotonically increasing per engine instance; a closed
    /// stream's id is never handed out again.
    fn next_stream_id(&mut self) -> u32 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }

    async fn shell_exchange(&mut self, local_id: u32, cmd: &str) -> Result<Vec<u8>, DroverError> {
        let service = format!("shell:{cmd}");
        self.send(Message::open(local_id, &service)).await?;

        // The stream is unusable until the peer acknowledges it with
        // an OKAY carrying its own id.
        let reply = self.recv_message().await?;
        let remote_id = match reply.command {
            Command::Okay if reply.arg1 == local_id => reply.arg0,
            _ => {
                trace!(reply = %reply.command, local_id, "stream open not acknowledged");
                return Err(DroverError::StreamRejected { local_id });
            }
        };
        self.phase.stream_established()?;
        let mut stream = Stream::opening(local_id);
        stream.establish(remote_id)?;
        debug!(local_id, remote_id, service = %service, "stream open");

        let mut output = Vec::new();
        loop {
            let msg = self.recv_message().await?;
            match msg.command {
                // Each WRTE must be acknowledged before the peer will
                // send the next chunk.
                Command::Write if msg.arg1 == local_id => {
                    output.extend_from_slice(&msg.payload);
                    self.send(Message::okay(local_id, remote_id)).await?;
                }
                Command::Close if msg.arg1 == local_id => {
                    stream.close()?;
                    self.phase.stream_closed()?;
                    debug!(local_id, remote_id, bytes = output.len(), "stream closed");
                    break;
                }
                other => {
                    trace!(%other, arg1 = msg.arg1, "ignoring message for another stream");
                }
            }
        }
        Ok(output)
    }

    async fn send(&mut self, msg: Message) -> Result<(), DroverError> {
        trace!(%msg.command, arg0 = msg.arg0, arg1 = msg.arg1, len = msg.payload.len(), "send");
        let encoded = msg.encode();
        tokio::time::timeout(self.io_timeout, self.transport.send(&encoded))
            .await
            .map_err(|_| DroverError::Timeout(self.io_timeout))?
    }

    /// Receive the next valid message.
    ///
    /// Frames that fail the magic check or carry an unknown command are
    /// dropped and the loop keeps waiting; only the transport's own
    /// failure or the I/O deadline ends the wait.
    async fn recv_message(&mut self) -> Result<Message, DroverError> {
        loop {
            let head = self.recv_raw(HEADER_LEN).await?;
            let Some(header) = Header::parse(&head) else {
                trace!(len = head.len(), "short header read; dropping");
                continue;
            };
            if !header.magic_ok() {
                trace!("bad magic; dropping frame (word {:#010x})", header.command_word);
                continue;
            }
            let Ok(command) = header.command() else {
                trace!("unknown command; dropping frame (word {:#010x})", header.command_word);
                continue;
            };

            let declared = (header.payload_len as usize).min(MAX_PAYLOAD);
            let mut payload = Vec::with_capacity(declared);
            while payload.len() < declared {
                let chunk = self.recv_raw(declared - payload.len()).await?;
                if chunk.is_empty() {
                    break;
                }
                payload.extend_from_slice(&chunk);
            }

            if Message::checksum(&payload) != header.checksum {
                trace!(%command, "payload checksum mismatch; keeping frame");
            }

            return Ok(Message {
                command,
                arg0: header.arg0,
                arg1: header.arg1,
                payload,
            });
        }
    }

    async fn recv_raw(&mut self, len: usize) -> Result<Vec<u8>, DroverError> {
        tokio::time::timeout(self.io_timeout, self.transport.recv(len))
            .await
            .map_err(|_| DroverError::Timeout(self.io_timeout))?
    }
}

// ── Tests ────────────────────────────────────────────────────────
