//! The `protocol V base64 B` wrapper around every client command.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::ProtocolError;
use crate::version::{CompatVersion, PROTOCOL_COMPAT};

/// Wraps decoded command text into the envelope written by clients,
/// including the trailing `;` terminator.
///
/// ```
/// let wire = protocol::encode_envelope("health");
/// assert_eq!(wire, "protocol 4 base64 aGVhbHRo;");
/// ```
#[must_use]
pub fn encode_envelope(command: &str) -> String {
    format!(
        "protocol {PROTOCOL_COMPAT} base64 {};",
        STANDARD.encode(command.as_bytes())
    )
}

/// A decoded command envelope.
///
/// Both tokens are optional on the wire; a server decides what to do with a
/// missing version (old clients always send it first).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Envelope {
    /// Version announced with the `protocol` token.
    pub version: Option<CompatVersion>,
    /// Command text decoded from the `base64` token.
    pub payload: Option<String>,
}

impl Envelope {
    /// Parses one `;`-terminated segment (terminator already removed).
    pub fn parse(segment: &str) -> Result<Self, ProtocolError> {
        let mut envelope = Self::default();
        let mut tokens = segment.split_whitespace();

        while let Some(token) = tokens.next() {
            let value = tokens.next().ok_or_else(|| {
                ProtocolError::MalformedEnvelope(format!("'{token}' without a value"))
            })?;
            match token {
                "protocol" => envelope.version = Some(CompatVersion::new(value)),
                "base64" => {
                    let bytes = STANDARD.decode(value)?;
                    envelope.payload = Some(String::from_utf8(bytes)?);
                }
                other => {
                    return Err(ProtocolError::MalformedEnvelope(format!(
                        "unexpected token '{other}'"
                    )));
                }
            }
        }

        Ok(envelope)
    }
}
