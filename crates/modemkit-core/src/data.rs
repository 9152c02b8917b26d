//! Shared data types for modem state and command answers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status words exchanged on the modem status and recovery channels.
///
/// Each word is transmitted as a 4-byte little-endian integer.
pub mod status_word {
    /// The modem is down.
    pub const MODEM_DOWN: u32 = 0;
    /// The modem is up and the AT link may be opened.
    pub const MODEM_UP: u32 = 1;
    /// The modem is about to cold reset and waits for an acknowledgment.
    pub const MODEM_COLD_RESET: u32 = 2;
    /// Acknowledgment written back after a cold reset announcement.
    pub const MODEM_COLD_RESET_ACK: u32 = 3;
    /// Recovery request written on the cleanup channel.
    pub const REQUEST_CLEANUP: u32 = 4;
}

/// Modem liveness as reported by the status service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModemStatus {
    /// The modem is not reachable.
    #[default]
    Down,
    /// The modem is up; the AT link can be used.
    Up,
    /// The modem announced a cold reset and is restarting.
    ColdReset,
}

impl ModemStatus {
    /// Decode a raw status word. Returns `None` for unknown words.
    pub fn from_word(word: u32) -> Option<Self> {
        match word {
            status_word::MODEM_DOWN => Some(ModemStatus::Down),
            status_word::MODEM_UP => Some(ModemStatus::Up),
            status_word::MODEM_COLD_RESET => Some(ModemStatus::ColdReset),
            _ => None,
        }
    }

    /// Whether the AT link may be open in this state.
    pub fn is_alive(self) -> bool {
        matches!(self, ModemStatus::Up)
    }
}

impl fmt::Display for ModemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemStatus::Down => write!(f, "DOWN"),
            ModemStatus::Up => write!(f, "UP"),
            ModemStatus::ColdReset => write!(f, "COLD_RESET"),
        }
    }
}

/// A completed command transaction, returned to synchronous callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtResponse {
    /// The command text that was sent.
    pub command: String,
    /// Answer sentences in arrival order, terminal sentinel included.
    pub fragments: Vec<String>,
    /// Whether the transaction terminated with `OK`.
    pub success: bool,
}

impl AtResponse {
    /// The accumulated answer text, one sentence per line.
    pub fn answer(&self) -> String {
        self.fragments.join("\n")
    }
}

/// Notification payload for an unsolicited response.
#[derive(Debug, Clone)]
pub struct UnsolicitedReport {
    /// The registered prefix that matched.
    pub prefix: String,
    /// The sentence that triggered the notification.
    pub line: String,
    /// The answer accumulated by the registration so far.
    pub answer: String,
}
