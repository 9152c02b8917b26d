//! # Modemkit
//!
//! An AT-command transaction manager for cellular modems:
//! - One-at-a-time command/response transactions over a serial AT link
//! - Modem liveness driven by an external status service, with automatic
//!   link teardown, recovery requests, and re-subscription
//! - Synchronous and fire-and-forget sends, periodic polling commands, and
//!   unsolicited notification registrations
//!
//! ## Architecture
//!
//! Modemkit is organized as a workspace with multiple crates:
//!
//! 1. **modemkit-core** - Core types, errors, listener traits
//! 2. **modemkit-communication** - Transport, sentence parser, status
//!    channel, and the AT manager
//! 3. **modemkit** - Main binary that integrates the crates

pub use modemkit_core::{
    status_word, AtListener, AtListenerHandle, AtResponse, CommandError, Error, ModemStatus,
    Result, TransportError, UnsolicitedReport,
};

pub use modemkit_communication::{
    AnswerHook, AtCommand, AtManager, ManagerConfig, ModemTransport, PeriodicCommand,
    PeriodicHandle, SentenceParser, SerialSettings, SerialTransport, TransportLink,
    UnsolicitedCommand, UnsolicitedHandle,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
