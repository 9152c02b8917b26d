//! Command objects
//!
//! An [`AtCommand`] is the immutable request; the manager wraps it in a
//! transaction record that accumulates answer fragments until a terminal
//! sentinel or timeout decides the outcome. Periodic and unsolicited
//! variants carry the extra data their scheduling needs.

use modemkit_core::AtResponse;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Hook invoked with each answer fragment of an unsolicited command.
pub type AnswerHook = Arc<dyn Fn(&str) + Send + Sync>;

/// One AT command: the text to send plus the answer prefix expected for its
/// informational response lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    text: String,
    prefix: Option<String>,
}

impl AtCommand {
    /// Create a command with no expected answer prefix.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prefix: None,
        }
    }

    /// Set the prefix that answer fragments are expected to start with.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// The command text, without line terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The expected answer prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Whether `line` is an informational answer fragment for this command.
    pub fn matches(&self, line: &str) -> bool {
        self.prefix.as_deref().is_some_and(|p| line.starts_with(p))
    }
}

/// Reply slot handed back to a synchronous caller.
pub(crate) type ReplySlot = oneshot::Sender<AtResponse>;

/// A command queued for transmission, with its transaction bookkeeping.
pub(crate) struct QueuedCommand {
    pub command: AtCommand,
    pub fragments: Vec<String>,
    pub outcome: Option<bool>,
    pub reply: Option<ReplySlot>,
}

impl QueuedCommand {
    pub fn new(command: AtCommand, reply: Option<ReplySlot>) -> Self {
        Self {
            command,
            fragments: Vec::new(),
            outcome: None,
            reply,
        }
    }

    /// Reset answer state before transmission.
    pub fn clear_status(&mut self) {
        self.fragments.clear();
        self.outcome = None;
    }

    pub fn add_fragment(&mut self, line: &str) {
        self.fragments.push(line.to_string());
    }

    /// Whether a terminal sentinel or timeout already decided the outcome.
    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }

    /// Snapshot the transaction as a client-facing response.
    pub fn response(&self) -> AtResponse {
        AtResponse {
            command: self.command.text().to_string(),
            fragments: self.fragments.clone(),
            success: self.outcome.unwrap_or(false),
        }
    }
}

/// A command the manager resends on a fixed interval, independent of client
/// requests.
#[derive(Debug, Clone)]
pub struct PeriodicCommand {
    command: AtCommand,
    interval: Duration,
}

impl PeriodicCommand {
    /// Create a periodic command with the given repeat interval.
    pub fn new(command: AtCommand, interval: Duration) -> Self {
        Self { command, interval }
    }

    pub fn command(&self) -> &AtCommand {
        &self.command
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Handle for a registered periodic command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeriodicHandle(pub String);

/// A modem-initiated response pattern.
///
/// The subscription command is sent whenever the modem comes up; afterwards
/// any sentence starting with the registered prefix is matched passively and
/// reported through the listener interface. The command itself is never sent
/// on behalf of a client request.
#[derive(Clone)]
pub struct UnsolicitedCommand {
    subscribe: AtCommand,
    prefix: String,
    answer: Vec<String>,
    hook: Option<AnswerHook>,
}

impl UnsolicitedCommand {
    /// Create a registration: `subscribe` enables the notification on the
    /// modem, `prefix` matches the notification lines.
    pub fn new(subscribe: AtCommand, prefix: impl Into<String>) -> Self {
        Self {
            subscribe,
            prefix: prefix.into(),
            answer: Vec::new(),
            hook: None,
        }
    }

    /// Attach a hook invoked with each matched fragment.
    pub fn with_hook(mut self, hook: AnswerHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The command that subscribes this notification on the modem.
    pub fn subscribe(&self) -> &AtCommand {
        &self.subscribe
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `line` belongs to this registration.
    pub fn matches(&self, line: &str) -> bool {
        line.starts_with(&self.prefix)
    }

    /// The answer accumulated so far, one fragment per line.
    pub fn answer(&self) -> String {
        self.answer.join("\n")
    }

    pub(crate) fn add_fragment(&mut self, line: &str) {
        self.answer.push(line.to_string());
    }

    pub(crate) fn process_answer(&self, line: &str) {
        if let Some(hook) = &self.hook {
            hook(line);
        }
    }
}

/// Handle for a registered unsolicited command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnsolicitedHandle(pub String);
