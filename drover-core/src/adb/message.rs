//! Wire framing for the device-debug protocol.
//!
//! Every message is a fixed 24-byte header followed by an optional
//! payload. Header layout, six little-endian `u32`s:
//!
//! ```text
//! ┌─────────┬──────┬──────┬─────────┬──────────┬─────────┐
//! │ command │ arg0 │ arg1 │ length  │ checksum │ magic   │
//! └─────────┴──────┴──────┴─────────┴──────────┴─────────┘
//! ```
//!
//! `checksum` is the sum of all payload bytes mod 2^32 — an integrity
//! check, not a cryptographic one. `magic` must equal
//! `command ^ 0xFFFF_FFFF`; a frame that fails this check is not a
//! message at all and is discarded rather than partially trusted.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DroverError;

/// Size of the fixed message header in bytes.
pub const HEADER_LEN: usize = 24;

/// Protocol version advertised in the `CNXN` handshake.
pub const PROTOCOL_VERSION: u32 = 0x0100_0000;

/// Largest payload either side may send in one message.
pub const MAX_PAYLOAD: usize = 256 * 1024;

/// Identity banner sent with `CNXN`. A NUL terminator is appended on
/// the wire.
pub const CONNECT_BANNER: &str = "host::features=shell_v2,cmd";

// ── Command ──────────────────────────────────────────────────────

/// The command word of a message, an ASCII tag packed little-endian.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `CNXN` — connection handshake.
    Connect = 0x4E58_4E43,
    /// `AUTH` — authentication challenge from the device.
    Auth = 0x4854_5541,
    /// `OPEN` — open a stream to a named service.
    Open = 0x4E45_504F,
    /// `OKAY` — stream acknowledgment / write acknowledgment.
    Okay = 0x5941_4B4F,
    /// `WRTE` — payload write on an open stream.
    Write = 0x4554_5257,
    /// `CLSE` — stream close.
    Close = 0x4553_4C43,
}

impl TryFrom<u32> for Command {
    type Error = DroverError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x4E58_4E43 => Ok(Command::Connect),
            0x4854_5541 => Ok(Command::Auth),
            0x4E45_504F => Ok(Command::Open),
            0x5941_4B4F => Ok(Command::Okay),
            0x4554_5257 => Ok(Command::Write),
            0x4553_4C43 => Ok(Command::Close),
            _ => Err(DroverError::UnknownVariant {
                type_name: "Command",
                value,
            }),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Connect => "CNXN",
            Self::Auth => "AUTH",
            Self::Open => "OPEN",
            Self::Okay => "OKAY",
            Self::Write => "WRTE",
            Self::Close => "CLSE",
        };
        write!(f, "{tag}")
    }
}

// ── Header ───────────────────────────────────────────────────────

/// Raw parsed header, before the command word is validated.
///
/// The engine reads headers and payloads in separate bulk transfers, so
/// this layer is exposed separately from [`Message::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command_word: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub payload_len: u32,
    pub checksum: u32,
    pub magic: u32,
}

impl Header {
    /// Parse the first [`HEADER_LEN`] bytes of `buf`.
    ///
    /// Returns `None` when fewer than [`HEADER_LEN`] bytes are present.
    pub fn parse(buf: &[u8]) -> Option<Header> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let mut buf = &buf[..HEADER_LEN];
        Some(Header {
            command_word: buf.get_u32_le(),
            arg0: buf.get_u32_le(),
            arg1: buf.get_u32_le(),
            payload_len: buf.get_u32_le(),
            checksum: buf.get_u32_le(),
            magic: buf.get_u32_le(),
        })
    }

    /// Whether the trailing magic is the complement of the command word.
    pub fn magic_ok(&self) -> bool {
        self.command_word ^ 0xFFFF_FFFF == self.magic
    }

    /// The validated command, or a typed error for unknown words.
    pub fn command(&self) -> Result<Command, DroverError> {
        Command::try_from(self.command_word)
    }
}

// ── Message ──────────────────────────────────────────────────────

/// A complete protocol message: command, two arguments, payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub command: Command,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message, rejecting oversized payloads.
    pub fn new(
        command: Command,
        arg0: u32,
        arg1: u32,
        payload: Vec<u8>,
    ) -> Result<Self, DroverError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(DroverError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            command,
            arg0,
            arg1,
            payload,
        })
    }

    /// The `CNXN` handshake message.
    pub fn connect() -> Self {
        let mut banner = CONNECT_BANNER.as_bytes().to_vec();
        banner.push(0);
        Self {
            command: Command::Connect,
            arg0: PROTOCOL_VERSION,
            arg1: MAX_PAYLOAD as u32,
            payload: banner,
        }
    }

    /// An `OPEN` for the named service on a fresh local stream.
    pub fn open(local_id: u32, service: &str) -> Self {
        let mut payload = service.as_bytes().to_vec();
        payload.push(0);
        Self {
            command: Command::Open,
            arg0: local_id,
            arg1: 0,
            payload,
        }
    }

    /// An `OKAY` acknowledgment carrying our id and the peer's.
    pub fn okay(local_id: u32, remote_id: u32) -> Self {
        Self {
            command: Command::Okay,
            arg0: local_id,
            arg1: remote_id,
            payload: Vec::new(),
        }
    }

    /// A `CLSE` for the given stream pair.
    pub fn close(local_id: u32, remote_id: u32) -> Self {
        Self {
            command: Command::Close,
            arg0: local_id,
            arg1: remote_id,
            payload: Vec::new(),
        }
    }

    /// Sum of payload bytes mod 2^32.
    pub fn checksum(payload: &[u8]) -> u32 {
        payload
            .iter()
            .fold(0u32, |sum, b| sum.wrapping_add(*b as u32))
    }

    /// The integrity word for this message's command.
    pub fn magic(&self) -> u32 {
        self.command as u32 ^ 0xFFFF_FFFF
    }

    /// Encode header + payload into a single buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32_le(self.command as u32);
        buf.put_u32_le(self.arg0);
        buf.put_u32_le(self.arg1);
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_u32_le(Self::checksum(&self.payload));
        buf.put_u32_le(self.magic());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a buffer holding a header and (some of) its payload.
    ///
    /// Returns `None` for anything that is not a valid message: fewer
    /// than [`HEADER_LEN`] bytes, a failed magic check, or an unknown
    /// command word. The declared payload length is clamped to the
    /// bytes actually supplied — decode never reads past the buffer.
    /// A checksum mismatch is logged but tolerated.
    pub fn decode(buf: &[u8]) -> Option<Message> {
        let header = Header::parse(buf)?;
        if !header.magic_ok() {
            return None;
        }
        let command = header.command().ok()?;

        let available = buf.len() - HEADER_LEN;
        let take = (header.payload_len as usize).min(available);
        let payload = buf[HEADER_LEN..HEADER_LEN + take].to_vec();

        if Self::checksum(&payload) != header.checksum {
            tracing::trace!(
                %command,
                declared = header.checksum,
                computed = Self::checksum(&payload),
                "payload checksum mismatch; keeping frame"
            );
        }

        Some(Message {
            command,
            arg0: header.arg0,
            arg1: header.arg1,
            payload,
        })
    }

    /// Payload interpreted as text, lossily.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("command", &self.command.to_string())
            .field("arg0", &self.arg0)
            .field("arg1", &self.arg1)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let msg = Message::new(Command::Write, 7, 1, b"hi\n".to_vec()).unwrap();
        let bytes = msg.encode();
        assert_eq!(Message::decode(&bytes), Some(msg));
    }

    #[test]
    fn roundtrip_all_commands() {
        for cmd in [
            Command::Connect,
            Command::Auth,
            Command::Open,
            Command::Okay,
            Command::Write,
            Command::Close,
        ] {
            let msg = Message::new(cmd, 1, 2, vec![3, 4, 5]).unwrap();
            assert_eq!(Message::decode(&msg.encode()), Some(msg));
        }
    }

    #[test]
    fn short_buffer_is_not_a_message() {
        for len in 0..HEADER_LEN {
            assert_eq!(Message::decode(&vec![0u8; len]), None);
        }
    }

    #[test]
    fn flipped_magic_is_rejected() {
        let msg = Message::okay(1, 7);
        let mut bytes = msg.encode().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(Message::decode(&bytes), None);
    }

    #[test]
    fn unknown_command_word_is_rejected() {
        let mut buf = BytesMut::new();
        let word: u32 = 0xDEAD_BEEF;
        buf.put_u32_le(word);
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.put_u32_le(word ^ 0xFFFF_FFFF); // magic itself is consistent
        assert_eq!(Message::decode(&buf), None);
    }

    #[test]
    fn checksum_values() {
        assert_eq!(Message::checksum(&[]), 0);
        assert_eq!(Message::checksum(&[0xFF, 0xFF]), 510);
    }

    #[test]
    fn checksum_mismatch_is_tolerated() {
        let msg = Message::new(Command::Write, 1, 2, b"abc".to_vec()).unwrap();
        let mut bytes = msg.encode().to_vec();
        // corrupt the checksum field only
        bytes[16] ^= 0x01;
        assert_eq!(Message::decode(&bytes), Some(msg));
    }

    #[test]
    fn declared_length_is_clamped() {
        let msg = Message::new(Command::Write, 1, 2, b"abcdef".to_vec()).unwrap();
        let bytes = msg.encode();
        // truncate two payload bytes
        let decoded = Message::decode(&bytes[..bytes.len() - 2]).unwrap();
        assert_eq!(decoded.payload, b"abcd");
    }

    #[test]
    fn oversized_payload_rejected() {
        let err = Message::new(Command::Write, 0, 0, vec![0; MAX_PAYLOAD + 1]).unwrap_err();
        assert!(matches!(err, DroverError::PayloadTooLarge { .. }));
    }

    #[test]
    fn connect_banner_is_nul_terminated() {
        let msg = Message::connect();
        assert_eq!(msg.arg0, PROTOCOL_VERSION);
        assert_eq!(msg.arg1, MAX_PAYLOAD as u32);
        assert_eq!(msg.payload.last(), Some(&0));
    }

    #[test]
    fn open_names_the_service() {
        let msg = Message::open(5, "shell:echo hi");
        assert_eq!(msg.arg0, 5);
        assert_eq!(&msg.payload[..13], b"shell:echo hi");
        assert_eq!(msg.payload.last(), Some(&0));
    }

    #[test]
    fn command_words_are_ascii_tags() {
        // each constant is its display tag packed little-endian
        assert_eq!(&(Command::Connect as u32).to_le_bytes(), b"CNXN");
        assert_eq!(&(Command::Auth as u32).to_le_bytes(), b"AUTH");
        assert_eq!(&(Command::Open as u32).to_le_bytes(), b"OPEN");
        assert_eq!(&(Command::Okay as u32).to_le_bytes(), b"OKAY");
        assert_eq!(&(Command::Write as u32).to_le_bytes(), b"WRTE");
        assert_eq!(&(Command::Close as u32).to_le_bytes(), b"CLSE");
    }
}
