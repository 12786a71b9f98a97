//! The byte-duplex contract a client wrapper must supply to drive the
//! session/parser with real I/O. No implementation ships in this crate: the
//! core stays single-threaded and non-blocking, with connection handling and
//! actual socket I/O left to the collaborator that embeds it.

use std::time::Duration;

use crate::Result;

/// What the core needs from a transport collaborator. Mirrors the shape of
/// the teacher crate's `connect`/`Framed`/`Sink`/`Stream` split in
/// `client.rs`, generalized into a synchronous, runtime-agnostic trait so
/// this crate does not have to commit to tokio or any other executor.
pub trait Transport {
    /// Establish a byte-duplex link, failing with [`crate::StompError::Connection`]
    /// if `timeout` elapses first.
    fn connect(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Write `bytes` in full.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever is available right now. An EOF is a connection error,
    /// not an empty read.
    fn receive_some(&mut self) -> Result<Vec<u8>>;

    /// Whether [`Transport::receive_some`] would produce data within `timeout`.
    fn can_read(&mut self, timeout: Option<Duration>) -> Result<bool>;

    /// Close the link.
    fn disconnect(&mut self) -> Result<()>;
}
