//! Manager listener interface
//!
//! Defines the listener trait for modem events

use crate::data::{ModemStatus, UnsolicitedReport};
use async_trait::async_trait;

/// Handle for a registered manager listener.
///
/// Uniquely identifies a listener subscription. Can be used to unsubscribe
/// from manager events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtListenerHandle(pub String);

/// Listener trait for modem events
///
/// Implement this trait to receive notifications of modem state changes and
/// unsolicited responses. Callbacks are dispatched from the manager worker
/// and must not block significantly.
#[async_trait]
pub trait AtListener: Send + Sync {
    /// Called on every status update delivered by the status service
    async fn on_modem_state_changed(&self, _status: ModemStatus) {}

    /// Called when a registered unsolicited response is received
    async fn on_unsolicited_received(&self, _report: &UnsolicitedReport) {}
}
