//! A plain container for the options needed to establish a STOMP connection,
//! shared by whatever client sits on top of this crate.

use crate::spec::StompVersion;

/// Connection configuration common to every STOMP client built on this crate.
///
/// `login`/`passcode` have to be the same across every broker in a failover
/// URI, since they are not part of the failover URI scheme itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// A failover URI, as parsed by [`crate::failover::FailoverUri`].
    pub uri: String,
    pub login: Option<String>,
    pub passcode: Option<String>,
    /// The highest STOMP version to offer. Defaults to [`StompVersion::DEFAULT`].
    pub version: StompVersion,
    /// Whether the session built from this config should be strict about its
    /// connection phase (see [`crate::session::Session::new`]).
    pub strict: bool,
}

impl Config {
    pub fn new(uri: impl Into<String>) -> Config {
        Config { uri: uri.into(), login: None, passcode: None, version: StompVersion::DEFAULT, strict: true }
    }

    pub fn with_login(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Config {
        self.login = Some(login.into());
        self.passcode = Some(passcode.into());
        self
    }

    pub fn with_version(mut self, version: StompVersion) -> Config {
        self.version = version;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Config {
        self.strict = strict;
        self
    }
}
