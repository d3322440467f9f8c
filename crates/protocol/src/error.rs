use thiserror::Error;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The command text did not start with a known verb.
    #[error("unknown command verb '{0}'")]
    UnknownVerb(String),

    /// A verb that requires arguments was sent without them.
    #[error("command '{verb}' is missing its {what}")]
    MissingArgument {
        /// The verb that was being parsed.
        verb: &'static str,
        /// Human description of the missing part.
        what: &'static str,
    },

    /// An option could not be parsed.
    #[error("invalid option '{0}'")]
    InvalidOption(String),

    /// A command envelope did not follow `protocol V base64 B`.
    #[error("malformed command envelope: {0}")]
    MalformedEnvelope(String),

    /// The base64 payload of an envelope could not be decoded.
    #[error("unable to decode base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A decoded payload was not valid UTF-8.
    #[error("command payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A frame exceeded [`crate::MAX_FRAME_LENGTH`].
    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLong(usize),

    /// A frame had a known prefix but the wrong number of fields.
    #[error("malformed {kind} frame")]
    MalformedFrame {
        /// The frame kind (`REMOTE`, `SERVER`, `AGGREGATE`).
        kind: &'static str,
    },

    /// Transport level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
