//! Constants and per-version tables describing the STOMP protocol itself:
//! supported versions, command vocabularies, escape sequences, and header
//! names. There is no behavior here, only data.

use std::fmt;

use crate::error::StompError;

/// A STOMP protocol version understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StompVersion {
    V1_0,
    V1_1,
    V1_2,
}

impl StompVersion {
    pub const ALL: [StompVersion; 3] = [StompVersion::V1_0, StompVersion::V1_1, StompVersion::V1_2];

    pub const DEFAULT: StompVersion = StompVersion::V1_0;

    pub fn as_str(self) -> &'static str {
        match self {
            StompVersion::V1_0 => "1.0",
            StompVersion::V1_1 => "1.1",
            StompVersion::V1_2 => "1.2",
        }
    }

    pub fn parse(s: &str) -> Result<StompVersion, StompError> {
        match s {
            "1.0" => Ok(StompVersion::V1_0),
            "1.1" => Ok(StompVersion::V1_1),
            "1.2" => Ok(StompVersion::V1_2),
            other => Err(StompError::protocol(format!("version is not supported: {other}"))),
        }
    }

    /// All versions up to and including `self`, in ascending order.
    pub fn up_to(self) -> Vec<StompVersion> {
        StompVersion::ALL.iter().copied().take_while(|v| *v <= self).collect()
    }
}

impl fmt::Display for StompVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for StompVersion {
    fn default() -> Self {
        StompVersion::DEFAULT
    }
}

pub const LINE_DELIMITER: u8 = b'\n';
pub const FRAME_DELIMITER: u8 = 0u8;
pub const HEADER_SEPARATOR: u8 = b':';
pub const ESCAPE_CHARACTER: u8 = b'\\';
pub const HEART_BEAT_SEPARATOR: char = ',';

/// Client-side ack modes accepted by the `ack` header on SUBSCRIBE frames.
pub mod ack_mode {
    pub const AUTO: &str = "auto";
    pub const CLIENT: &str = "client";
    pub const CLIENT_INDIVIDUAL: &str = "client-individual";
}

/// Header names used in well-known places throughout the engine.
pub mod header {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const ACK: &str = "ack";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const HOST: &str = "host";
    pub const ID: &str = "id";
    pub const LOGIN: &str = "login";
    pub const MESSAGE_ID: &str = "message-id";
    pub const PASSCODE: &str = "passcode";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SESSION: &str = "session";
    pub const SERVER: &str = "server";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const TRANSACTION: &str = "transaction";
    pub const VERSION: &str = "version";
}

/// The fixed per-version set of commands the client is allowed to send.
pub fn client_commands(version: StompVersion) -> &'static [&'static str] {
    match version {
        StompVersion::V1_0 => &["ABORT", "ACK", "BEGIN", "COMMIT", "CONNECT", "DISCONNECT", "SEND", "SUBSCRIBE", "UNSUBSCRIBE"],
        StompVersion::V1_1 | StompVersion::V1_2 => {
            &["ABORT", "ACK", "BEGIN", "COMMIT", "CONNECT", "DISCONNECT", "NACK", "SEND", "STOMP", "SUBSCRIBE", "UNSUBSCRIBE"]
        }
    }
}

/// The fixed set of commands the broker is allowed to send.
pub fn server_commands() -> &'static [&'static str] {
    &["CONNECTED", "ERROR", "MESSAGE", "RECEIPT"]
}

/// Whether `command` is recognized at all (client- or server-originated) for `version`.
pub fn is_known_command(version: StompVersion, command: &str) -> bool {
    client_commands(version).contains(&command) || server_commands().contains(&command)
}

/// Commands allowed to carry a non-empty body. `None` means "no restriction"
/// (STOMP 1.0 places none).
pub fn body_allowed_commands(version: StompVersion) -> Option<&'static [&'static str]> {
    match version {
        StompVersion::V1_0 => None,
        StompVersion::V1_1 | StompVersion::V1_2 => Some(&["SEND", "MESSAGE", "ERROR"]),
    }
}

/// Commands whose headers are never escaped/unescaped for `version`.
///
/// In 1.0 this is every command (STOMP 1.0 never escapes headers at all); in
/// 1.1/1.2 it is only CONNECT/CONNECTED (an interop concession some brokers rely on).
pub fn escape_excluded(version: StompVersion, command: &str) -> bool {
    match version {
        StompVersion::V1_0 => true,
        StompVersion::V1_1 | StompVersion::V1_2 => command == "CONNECT" || command == "CONNECTED",
    }
}

/// `(escaped_char, escape_letter)` pairs in effect for a version's header codec,
/// e.g. `('\\', '\\')`, `(':', 'c')`, `('\n', 'n')`, and (1.2 only) `('\r', 'r')`.
pub fn escape_table(version: StompVersion) -> &'static [(char, char)] {
    match version {
        StompVersion::V1_0 | StompVersion::V1_1 => &[('\\', '\\'), (':', 'c'), ('\n', 'n')],
        StompVersion::V1_2 => &[('\\', '\\'), (':', 'c'), ('\n', 'n'), ('\r', 'r')],
    }
}

/// Whether command/header text is decoded strictly as US-ASCII (1.0) or UTF-8 (1.1/1.2).
pub fn is_ascii_only(version: StompVersion) -> bool {
    version == StompVersion::V1_0
}

/// Whether this version strips a trailing `\r` from header/command lines
/// (i.e. treats CRLF as the line terminator).
pub fn strips_trailing_cr(version: StompVersion) -> bool {
    version == StompVersion::V1_2
}
