//! Server-to-client messages.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{FIELD_DELIMITER, HIDDEN_PREFIX};
use crate::error::ProtocolError;

const REMOTE: &str = "REMOTE";
const SERVER: &str = "SERVER";
const AGGREGATE: &str = "AGGREGATE";

/// One message streamed by the server, without its terminator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    /// A log line: `REMOTE|host|percent|count|source|content`.
    Line {
        /// Server that read the line.
        host: String,
        /// Transmitted percentage over the last 100 lines, `0..=100`.
        percent: u8,
        /// Line count within its file.
        count: u64,
        /// Source identifier (glob id, `STDOUT`, `STDERR`).
        source: String,
        /// Raw line content; may contain a trailing newline.
        content: Bytes,
    },
    /// An informational, warning or error message: `SERVER|host|text`.
    Server {
        /// Server that produced the message.
        host: String,
        /// Message text.
        text: String,
    },
    /// One serialised partial aggregate: `AGGREGATE|host|payload`.
    Aggregate {
        /// Server that produced the aggregate.
        host: String,
        /// `groupKey∥samples∥k≔v∥…`.
        payload: String,
    },
    /// A control message starting with `.`, never rendered.
    Hidden(String),
    /// Bare content, as sent for spartan lines.
    Plain(Bytes),
}

impl Frame {
    /// Builds a server message frame.
    pub fn server(host: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Server {
            host: host.into(),
            text: text.into(),
        }
    }

    /// Builds a hidden control frame.
    pub fn hidden(text: impl Into<String>) -> Self {
        Self::Hidden(text.into())
    }

    /// Appends the wire form (without delimiter) to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        match self {
            Self::Line {
                host,
                percent,
                count,
                source,
                content,
            } => {
                dst.put_slice(
                    format!("{REMOTE}|{host}|{percent:3}|{count}|{source}|").as_bytes(),
                );
                dst.put_slice(content);
            }
            Self::Server { host, text } => {
                dst.put_slice(format!("{SERVER}|{host}|{text}").as_bytes());
            }
            Self::Aggregate { host, payload } => {
                dst.put_slice(format!("{AGGREGATE}|{host}|{payload}").as_bytes());
            }
            Self::Hidden(text) => dst.put_slice(text.as_bytes()),
            Self::Plain(content) => dst.put_slice(content),
        }
    }

    /// Classifies one received message.
    ///
    /// With `spartan` set, line content is bare, so only exact control
    /// messages are treated as hidden and `REMOTE|` is not interpreted.
    pub fn parse(raw: Bytes, spartan: bool) -> Result<Self, ProtocolError> {
        if raw.first() == Some(&(HIDDEN_PREFIX as u8)) {
            if !spartan || is_control_message(&raw) {
                return Ok(Self::Hidden(String::from_utf8_lossy(&raw).into_owned()));
            }
            return Ok(Self::Plain(raw));
        }

        if let Some(rest) = strip_kind(&raw, SERVER) {
            let text = String::from_utf8_lossy(rest);
            let (host, text) = text
                .split_once(FIELD_DELIMITER)
                .ok_or(ProtocolError::MalformedFrame { kind: SERVER })?;
            return Ok(Self::server(host, text));
        }

        if let Some(rest) = strip_kind(&raw, AGGREGATE) {
            let text = String::from_utf8_lossy(rest);
            let (host, payload) = text
                .split_once(FIELD_DELIMITER)
                .ok_or(ProtocolError::MalformedFrame { kind: AGGREGATE })?;
            return Ok(Self::Aggregate {
                host: host.to_owned(),
                payload: payload.to_owned(),
            });
        }

        if !spartan {
            if let Some(rest) = strip_kind(&raw, REMOTE) {
                return parse_line(&raw, raw.len() - rest.len());
            }
        }

        Ok(Self::Plain(raw))
    }
}

fn is_control_message(raw: &[u8]) -> bool {
    raw == crate::SYN_CLOSE_CONNECTION.as_bytes() || raw == crate::ACK_CLOSE_CONNECTION.as_bytes()
}

fn strip_kind<'a>(raw: &'a [u8], kind: &str) -> Option<&'a [u8]> {
    raw.strip_prefix(kind.as_bytes())?
        .strip_prefix(FIELD_DELIMITER.as_bytes())
}

fn parse_line(raw: &Bytes, start: usize) -> Result<Frame, ProtocolError> {
    let malformed = || ProtocolError::MalformedFrame { kind: REMOTE };

    // host, percent, count, source; the content keeps any further '|'.
    let mut offsets = [0usize; 4];
    let mut cursor = start;
    for slot in &mut offsets {
        let next = memchr::memchr(b'|', &raw[cursor..]).ok_or_else(malformed)?;
        *slot = cursor + next;
        cursor = cursor + next + 1;
    }

    let field = |from: usize, to: usize| String::from_utf8_lossy(&raw[from..to]).into_owned();
    let host = field(start, offsets[0]);
    let percent = field(offsets[0] + 1, offsets[1])
        .trim()
        .parse()
        .map_err(|_| malformed())?;
    let count = field(offsets[1] + 1, offsets[2])
        .parse()
        .map_err(|_| malformed())?;
    let source = field(offsets[2] + 1, offsets[3]);

    Ok(Frame::Line {
        host,
        percent,
        count,
        source,
        content: raw.slice(offsets[3] + 1..),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: &Frame) -> Bytes {
        let mut buf = BytesMut::new();
        frame.encode_into(&mut buf);
        buf.freeze()
    }

    #[test]
    fn line_prefix_pads_percentage() {
        let frame = Frame::Line {
            host: "web01".to_owned(),
            percent: 7,
            count: 42,
            source: "app".to_owned(),
            content: Bytes::from_static(b"a|b|c\n"),
        };
        let wire = encode(&frame);
        assert_eq!(&wire[..], b"REMOTE|web01|  7|42|app|a|b|c\n");
        assert_eq!(Frame::parse(wire, false).unwrap(), frame);
    }

    #[test]
    fn spartan_keeps_lookalike_content_plain() {
        let raw = Bytes::from_static(b"REMOTE|not|a|frame");
        assert!(matches!(Frame::parse(raw.clone(), true).unwrap(), Frame::Plain(p) if p == raw));
        let dotted = Bytes::from_static(b".hidden file name");
        assert!(matches!(Frame::parse(dotted, true).unwrap(), Frame::Plain(_)));
        let syn = Bytes::from_static(b".syn close connection");
        assert!(matches!(Frame::parse(syn, true).unwrap(), Frame::Hidden(_)));
    }

    #[test]
    fn server_and_aggregate_frames_split_on_first_delimiter() {
        let server = Frame::parse(Bytes::from_static(b"SERVER|db1|WARN|queued"), false).unwrap();
        assert_eq!(server, Frame::server("db1", "WARN|queued"));

        let aggregate =
            Frame::parse(Bytes::from_static("AGGREGATE|db1|k∥3∥count($line)≔3".as_bytes()), false)
                .unwrap();
        assert_eq!(
            aggregate,
            Frame::Aggregate {
                host: "db1".to_owned(),
                payload: "k∥3∥count($line)≔3".to_owned(),
            }
        );
    }

    #[test]
    fn malformed_remote_frame_is_an_error() {
        let err = Frame::parse(Bytes::from_static(b"REMOTE|host|abc|1|src|x"), false).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame { kind: "REMOTE" }));
    }
}
