//! Transport abstraction for the modem AT link
//!
//! The manager talks to the modem through a byte-stream endpoint opened by
//! path. An open link is a pair of independently owned halves so the reader
//! can live on a blocking read loop while the writer stays with the manager.

pub mod serial;

use modemkit_core::Result;
use std::io::{Read, Write};

/// Reader half of an open modem link.
///
/// Implementations must return `WouldBlock`/`TimedOut` periodically instead
/// of blocking forever, so the read loop can observe shutdown.
pub trait LinkReader: Read + Send {}
impl<T: Read + Send> LinkReader for T {}

/// Writer half of an open modem link.
pub trait LinkWriter: Write + Send {}
impl<T: Write + Send> LinkWriter for T {}

/// An open modem link: one reader half and one writer half.
pub struct TransportLink {
    /// Reader half, handed to the link read loop.
    pub reader: Box<dyn LinkReader>,
    /// Writer half, kept by the manager for command writes.
    pub writer: Box<dyn LinkWriter>,
}

/// Factory for modem links, injected at manager construction.
///
/// Opening must produce both halves or fail as a whole; a half-open link is
/// never returned.
pub trait ModemTransport: Send + Sync {
    /// Open the endpoint at `path`, producing both halves of the link.
    fn open(&self, path: &str) -> Result<TransportLink>;
}
