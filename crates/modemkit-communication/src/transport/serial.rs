//! Serial port transport
//!
//! Production transport for the modem AT link, backed by the `serialport`
//! crate. The device is opened once and cloned so the reader and writer
//! halves can be owned independently.

use super::{ModemTransport, TransportLink};
use modemkit_core::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read timeout for the modem reader half. Short so the read loop can notice
/// shutdown promptly.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Line settings for the modem serial device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Baud rate of the AT link.
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self { baud_rate: 115_200 }
    }
}

/// Serial transport for the modem AT link.
pub struct SerialTransport {
    settings: SerialSettings,
}

impl SerialTransport {
    /// Create a transport with the given line settings.
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new(SerialSettings::default())
    }
}

impl ModemTransport for SerialTransport {
    fn open(&self, path: &str) -> Result<TransportLink> {
        let reader = serialport::new(path, self.settings.baud_rate)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", path, e);
                TransportError::OpenFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            })?;

        // Second handle on the same device for writes. If this fails the
        // reader is dropped and the link is not opened at all.
        let writer = reader.try_clone().map_err(|e| TransportError::OpenFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(TransportLink {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}
