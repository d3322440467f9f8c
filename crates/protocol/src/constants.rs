//! Delimiters shared by every component that reads or writes the wire.

/// Terminates every server-to-client frame.
///
/// This is the low byte of U+00AC (`¬`), written as a single raw byte.
pub const MESSAGE_DELIMITER: u8 = 0xAC;

/// Terminates every client-to-server command envelope.
pub const COMMAND_TERMINATOR: u8 = b';';

/// Separates the fields of a frame and of a log line.
pub const FIELD_DELIMITER: &str = "|";

/// Separates the columns of CSV output.
pub const CSV_DELIMITER: &str = ",";

/// Separates the parts of a serialised aggregate.
pub const AGGREGATE_DELIMITER: &str = "∥";

/// Separates key and value inside one part of a serialised aggregate.
pub const AGGREGATE_KV_DELIMITER: &str = "≔";

/// Joins `group by` values into a group key.
pub const AGGREGATE_GROUP_KEY_COMBINATOR: &str = ",";

/// Frames starting with this character are control messages and never rendered.
pub const HIDDEN_PREFIX: char = '.';

/// Sent by the server once its last active command finished.
pub const SYN_CLOSE_CONNECTION: &str = ".syn close connection";

/// Sent by the client to acknowledge [`SYN_CLOSE_CONNECTION`].
pub const ACK_CLOSE_CONNECTION: &str = ".ack close connection";
