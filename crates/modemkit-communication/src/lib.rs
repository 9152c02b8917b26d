#![allow(dead_code)]
//! # Modemkit Communication
//!
//! Transport, protocol, and manager layers for the modem AT link.
//! The manager serializes command/response transactions over a serial
//! transport, tracks modem liveness through an external status service,
//! and dispatches periodic and unsolicited commands.

pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{AtManager, ManagerConfig};
pub use protocol::command::{
    AnswerHook, AtCommand, PeriodicCommand, PeriodicHandle, UnsolicitedCommand, UnsolicitedHandle,
};
pub use protocol::parser::SentenceParser;
pub use transport::{
    serial::{SerialSettings, SerialTransport},
    LinkReader, LinkWriter, ModemTransport, TransportLink,
};
