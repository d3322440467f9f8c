//! [`tokio_util::codec`] adapters for both directions of a session.
//!
//! [`FrameCodec`] splits the server stream on [`MESSAGE_DELIMITER`];
//! [`CommandCodec`] splits the client stream on [`COMMAND_TERMINATOR`].
//!
//! The delimiter byte is also a UTF-8 continuation byte (`€` is
//! `E2 82 AC`), so frame bodies escape it: `0xAC` travels as
//! `FF 01` and `0xFF` itself as `FF 02`. Neither `0xFF` nor a bare `0xAC`
//! can then appear inside an encoded body. Peers at protocol version 3 and
//! below get unescaped bodies.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::constants::{COMMAND_TERMINATOR, MESSAGE_DELIMITER};
use crate::error::ProtocolError;
use crate::frame::Frame;

/// Largest frame the decoders accept before giving up on the stream.
///
/// Lines are split at 1 MiB by the reader, so this only guards against a
/// peer that never sends a delimiter.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

const ESCAPE: u8 = 0xFF;
const ESCAPED_DELIMITER: u8 = 0x01;
const ESCAPED_ESCAPE: u8 = 0x02;

fn escape_into(body: &[u8], dst: &mut BytesMut) {
    let mut rest = body;
    while let Some(at) = memchr::memchr2(MESSAGE_DELIMITER, ESCAPE, rest) {
        dst.put_slice(&rest[..at]);
        dst.put_u8(ESCAPE);
        dst.put_u8(if rest[at] == ESCAPE {
            ESCAPED_ESCAPE
        } else {
            ESCAPED_DELIMITER
        });
        rest = &rest[at + 1..];
    }
    dst.put_slice(rest);
}

/// Reverses [`escape_into`]. An escape byte followed by anything else is
/// kept verbatim.
fn unescape(raw: Bytes) -> Bytes {
    if memchr::memchr(ESCAPE, &raw).is_none() {
        return raw;
    }
    let mut out = BytesMut::with_capacity(raw.len());
    let mut bytes = raw.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte != ESCAPE {
            out.put_u8(byte);
            continue;
        }
        match bytes.peek().copied() {
            Some(ESCAPED_DELIMITER) => {
                bytes.next();
                out.put_u8(MESSAGE_DELIMITER);
            }
            Some(ESCAPED_ESCAPE) => {
                bytes.next();
                out.put_u8(ESCAPE);
            }
            _ => out.put_u8(ESCAPE),
        }
    }
    out.freeze()
}

/// Codec for server-to-client frames.
#[derive(Clone, Debug, Default)]
pub struct FrameCodec {
    spartan: bool,
    legacy_newline: bool,
    next_index: usize,
}

impl FrameCodec {
    /// Creates a codec speaking the current protocol version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret bare content as spartan lines when decoding.
    #[must_use]
    pub const fn spartan(mut self, spartan: bool) -> Self {
        self.spartan = spartan;
        self
    }

    /// Append (and tolerate) a newline after every frame, for peers at
    /// protocol version 3 and below.
    #[must_use]
    pub const fn legacy_newline(mut self, legacy: bool) -> Self {
        self.legacy_newline = legacy;
        self
    }

    /// Switches legacy framing after the peer announced its version.
    pub fn set_legacy_newline(&mut self, legacy: bool) {
        self.legacy_newline = legacy;
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.legacy_newline && src.first() == Some(&b'\n') {
            src.advance(1);
        }

        let searched = self.next_index.min(src.len());
        match memchr::memchr(MESSAGE_DELIMITER, &src[searched..]) {
            Some(offset) => {
                let end = searched + offset;
                self.next_index = 0;
                let raw = src.split_to(end).freeze();
                src.advance(1);
                let raw = if self.legacy_newline { raw } else { unescape(raw) };
                Frame::parse(raw, self.spartan).map(Some)
            }
            None if src.len() > MAX_FRAME_LENGTH => Err(ProtocolError::FrameTooLong(src.len())),
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.legacy_newline {
            frame.encode_into(dst);
        } else {
            let mut body = BytesMut::new();
            frame.encode_into(&mut body);
            escape_into(&body, dst);
        }
        dst.put_u8(MESSAGE_DELIMITER);
        if self.legacy_newline {
            dst.put_u8(b'\n');
        }
        Ok(())
    }
}

/// Codec for client-to-server command segments.
///
/// Decodes to the text between terminators with surrounding whitespace (and
/// any stray [`MESSAGE_DELIMITER`]) removed; empty segments are skipped.
/// Encodes already enveloped text, appending `;` when missing.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandCodec;

impl CommandCodec {
    /// Creates a command codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder for CommandCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = memchr::memchr(COMMAND_TERMINATOR, src) else {
                if src.len() > MAX_FRAME_LENGTH {
                    return Err(ProtocolError::FrameTooLong(src.len()));
                }
                return Ok(None);
            };
            let raw = src.split_to(end);
            src.advance(1);
            let text = String::from_utf8(raw.to_vec())?;
            let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{ac}');
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_owned()));
            }
        }
    }
}

impl Encoder<&str> for CommandCodec {
    type Error = ProtocolError;

    fn encode(&mut self, text: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(text.as_bytes());
        if !text.ends_with(char::from(COMMAND_TERMINATOR)) {
            dst.put_u8(COMMAND_TERMINATOR);
        }
        Ok(())
    }
}
