//! Event reactor driving the manager worker
//!
//! All stimulus reaching the worker (status words, modem bytes, client
//! submissions, deadline expiry) is expressed as one [`Event`] consumed by
//! an [`EventHandler`]. The reactor races the event channel against the
//! handler's single armed deadline, so the worker never needs more than one
//! pending timeout.

use crate::protocol::command::QueuedCommand;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Events consumed by the worker state machine.
pub(crate) enum Event {
    /// A status word arrived on the modem status channel.
    Status(u32),
    /// The status channel closed or failed.
    StatusClosed,
    /// Bytes arrived on the modem link. Tagged with the link generation so
    /// data from a torn-down link is discarded.
    ModemData { generation: u64, bytes: Vec<u8> },
    /// The modem link reader saw EOF or a read error.
    ModemClosed { generation: u64 },
    /// A client submitted a command for transmission.
    Submit(QueuedCommand),
    /// Explicit wake to re-examine the send queue and deadlines.
    Wake,
    /// The armed countdown expired.
    Timeout,
}

/// Handler driven by the [`Reactor`].
#[async_trait]
pub(crate) trait EventHandler: Send {
    /// Consume one event.
    async fn on_event(&mut self, event: Event);

    /// Deadline of the armed countdown, if any.
    fn deadline(&self) -> Option<Instant>;

    /// Release resources before the reactor exits.
    async fn on_shutdown(&mut self);
}

/// One-shot countdown armed by the state machine and raced by the reactor.
///
/// Re-arming replaces the previous deadline; there is never more than one.
#[derive(Debug, Default)]
pub(crate) struct Countdown {
    deadline: Option<Instant>,
}

impl Countdown {
    /// Arm the countdown to expire `after` from now.
    pub fn arm(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    /// Arm the countdown to expire at `deadline`.
    pub fn arm_until(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Cancel any pending deadline.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Drives an [`EventHandler`] from an event channel.
///
/// Exits when the shutdown channel fires or every event sender is gone, then
/// gives the handler a chance to release its resources.
pub(crate) struct Reactor<H: EventHandler> {
    events: mpsc::Receiver<Event>,
    shutdown: mpsc::Receiver<()>,
    handler: H,
}

impl<H: EventHandler> Reactor<H> {
    pub fn new(events: mpsc::Receiver<Event>, shutdown: mpsc::Receiver<()>, handler: H) -> Self {
        Self {
            events,
            shutdown,
            handler,
        }
    }

    pub async fn run(mut self) {
        loop {
            let event = match self.handler.deadline() {
                Some(deadline) => tokio::select! {
                    _ = self.shutdown.recv() => break,
                    event = self.events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    _ = tokio::time::sleep_until(deadline) => Event::Timeout,
                },
                None => tokio::select! {
                    _ = self.shutdown.recv() => break,
                    event = self.events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                },
            };
            self.handler.on_event(event).await;
        }
        self.handler.on_shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn countdown_arm_and_disarm() {
        let mut countdown = Countdown::default();
        assert!(countdown.deadline().is_none());

        countdown.arm(Duration::from_millis(100));
        let deadline = countdown.deadline().expect("armed");
        assert!(deadline > Instant::now());

        countdown.arm(Duration::from_millis(500));
        assert!(countdown.deadline().expect("re-armed") > deadline);

        countdown.disarm();
        assert!(countdown.deadline().is_none());
    }
}
