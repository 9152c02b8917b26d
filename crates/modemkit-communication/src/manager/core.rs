//! Worker-side protocol state machine
//!
//! Owns the send queue, the current transaction, the sentence parser, and
//! the modem link. Everything here runs on the reactor task; the only state
//! it shares with client callers is the flag block behind the manager's
//! lock and the periodic/unsolicited registries.

use super::reactor::{Countdown, Event, EventHandler};
use super::status;
use super::{ManagerConfig, Registries, SharedState};
use crate::protocol::command::QueuedCommand;
use crate::protocol::parser::SentenceParser;
use crate::transport::{LinkReader, LinkWriter, ModemTransport};
use async_trait::async_trait;
use modemkit_core::{
    AtListener, ModemStatus, ThreadSafe, ThreadSafeMap, ThreadSafeRw, UnsolicitedReport,
};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Terminal answer sentinels, case-sensitive.
const ANSWER_OK: &str = "OK";
const ANSWER_ERROR: &str = "ERROR";

/// An open modem link with its read loop.
struct ModemLink {
    generation: u64,
    writer: Box<dyn LinkWriter>,
    reader_stop: Arc<AtomicBool>,
}

pub(crate) struct ManagerCore {
    config: ManagerConfig,
    modem_path: String,
    transport: Arc<dyn ModemTransport>,
    shared: ThreadSafeRw<SharedState>,
    registries: ThreadSafe<Registries>,
    listeners: ThreadSafeMap<String, Arc<dyn AtListener>>,
    events: mpsc::Sender<Event>,
    status_writer: OwnedWriteHalf,

    to_send: VecDeque<QueuedCommand>,
    current: Option<QueuedCommand>,
    retries: u32,
    parser: SentenceParser,
    status: ModemStatus,
    modem_alive: bool,
    link: Option<ModemLink>,
    next_generation: u64,
    countdown: Countdown,
    first_status: Option<oneshot::Sender<()>>,
}

impl ManagerCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ManagerConfig,
        modem_path: String,
        transport: Arc<dyn ModemTransport>,
        shared: ThreadSafeRw<SharedState>,
        registries: ThreadSafe<Registries>,
        listeners: ThreadSafeMap<String, Arc<dyn AtListener>>,
        events: mpsc::Sender<Event>,
        status_writer: OwnedWriteHalf,
        first_status: oneshot::Sender<()>,
    ) -> Self {
        Self {
            config,
            modem_path,
            transport,
            shared,
            registries,
            listeners,
            events,
            status_writer,
            to_send: VecDeque::new(),
            current: None,
            retries: 0,
            parser: SentenceParser::new(),
            status: ModemStatus::Down,
            modem_alive: false,
            link: None,
            next_generation: 0,
            countdown: Countdown::default(),
            first_status: Some(first_status),
        }
    }

    fn sync_shared(&self) {
        let mut shared = self.shared.write();
        shared.modem_status = self.status;
        shared.transport_ready = self.link.is_some();
    }

    // === send queue ===

    /// Process the queue only when no transaction is in flight, keeping the
    /// one-at-a-time request/response pairing the modem requires.
    fn check_and_process_send_queue(&mut self) {
        if self.current.is_none() {
            self.process_send_queue();
        }
    }

    fn process_send_queue(&mut self) {
        if self.to_send.is_empty() {
            match self.next_periodic_deadline() {
                Some(deadline) => self.countdown.arm_until(deadline),
                None => self.countdown.disarm(),
            }
            return;
        }

        if let Some(mut command) = self.to_send.pop_front() {
            command.clear_status();
            self.current = Some(command);
            self.countdown.arm(self.config.answer_timeout());
            self.write_current();
        }
    }

    /// Write the current command text followed by CRLF.
    fn write_current(&mut self) {
        let text = match &self.current {
            Some(current) => current.command.text().to_string(),
            None => return,
        };
        if let Err(e) = self.send_line(&text) {
            tracing::error!("Could not write AT command: {}", e);
            self.terminate_transaction(false);
            return;
        }
        tracing::debug!("Sent: {}", text);
    }

    fn send_line(&mut self, text: &str) -> io::Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "modem link closed"))?;
        link.writer.write_all(text.as_bytes())?;
        link.writer.write_all(b"\r\n")?;
        link.writer.flush()?;
        Ok(())
    }

    fn terminate_transaction(&mut self, success: bool) {
        if let Some(mut command) = self.current.take() {
            self.retries = 0;
            command.outcome = Some(success);
            let response = command.response();
            match command.reply.take() {
                // A dropped receiver means the caller gave up waiting; the
                // outcome is simply discarded.
                Some(reply) => {
                    let _ = reply.send(response);
                }
                None => {
                    tracing::debug!(
                        "{}: {} without waiter",
                        response.command,
                        if success { "answered" } else { "failed" }
                    );
                }
            }
        }
        self.countdown.disarm();
    }

    // === answers ===

    fn read_answers(&mut self, bytes: &[u8]) {
        self.parser.receive(bytes);
        while let Some(sentence) = self.parser.extract_sentence() {
            tracing::debug!("Received {}", sentence);
            self.dispatch_sentence(sentence);
        }
        // The sentences may have closed the transaction; keep the queue
        // moving.
        self.check_and_process_send_queue();
    }

    fn dispatch_sentence(&mut self, sentence: String) {
        let transaction_open = self.current.as_ref().is_some_and(|c| !c.is_complete());
        if !transaction_open {
            self.process_unsolicited(&sentence);
            return;
        }

        if sentence == ANSWER_OK || sentence == ANSWER_ERROR {
            let success = sentence == ANSWER_OK;
            if let Some(current) = self.current.as_mut() {
                current.add_fragment(&sentence);
            }
            self.terminate_transaction(success);
        } else if self
            .current
            .as_ref()
            .is_some_and(|c| c.command.matches(&sentence))
        {
            if let Some(current) = self.current.as_mut() {
                current.add_fragment(&sentence);
            }
            // Multi-line answers extend the deadline.
            self.countdown.arm(self.config.answer_timeout());
        } else {
            // Interleaved traffic while a transaction is open.
            self.process_unsolicited(&sentence);
        }
    }

    fn process_unsolicited(&mut self, sentence: &str) {
        let report = {
            let mut registries = self.registries.lock();
            match registries
                .unsolicited
                .iter_mut()
                .find(|entry| entry.command.matches(sentence))
            {
                Some(entry) => {
                    entry.command.add_fragment(sentence);
                    entry.command.process_answer(sentence);
                    Some(UnsolicitedReport {
                        prefix: entry.command.prefix().to_string(),
                        line: sentence.to_string(),
                        answer: entry.command.answer(),
                    })
                }
                None => None,
            }
        };
        match report {
            Some(report) => self.notify_unsolicited(report),
            None => tracing::debug!("Unmatched unsolicited response: {}", sentence),
        }
    }

    fn notify_unsolicited(&self, report: UnsolicitedReport) {
        for listener in self.listeners.read().values().cloned() {
            let report = report.clone();
            tokio::spawn(async move {
                listener.on_unsolicited_received(&report).await;
            });
        }
    }

    fn notify_state_changed(&self, status: ModemStatus) {
        for listener in self.listeners.read().values().cloned() {
            tokio::spawn(async move {
                listener.on_modem_state_changed(status).await;
            });
        }
    }

    // === status channel ===

    async fn update_modem_status(&mut self, word: u32) {
        let Some(status) = ModemStatus::from_word(word) else {
            tracing::warn!("Ignoring unknown modem status word {}", word);
            return;
        };

        // The status service holds the reset until it is acknowledged.
        if status == ModemStatus::ColdReset {
            if let Err(e) = status::send_cold_reset_ack(&mut self.status_writer).await {
                tracing::error!("Could not acknowledge cold reset: {}", e);
            }
        }

        self.status = status;
        self.modem_alive = status.is_alive();
        self.countdown.disarm();
        tracing::info!("Modem status: {}", status);

        if self.modem_alive {
            self.start_link_listeners();
        } else {
            self.terminate_transaction(false);
            self.stop_link_listeners();
        }

        self.sync_shared();
        self.notify_state_changed(status);

        if let Some(first) = self.first_status.take() {
            let _ = first.send(());
        }
    }

    // === modem link ===

    fn start_link_listeners(&mut self) {
        if self.link.is_some() {
            return;
        }
        tracing::debug!("Opening modem link {}", self.modem_path);
        let link = match self.transport.open(&self.modem_path) {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("Unable to open modem link {}: {}", self.modem_path, e);
                return;
            }
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        let reader_stop = Arc::new(AtomicBool::new(false));
        spawn_link_reader(
            link.reader,
            generation,
            reader_stop.clone(),
            self.events.clone(),
        );

        self.link = Some(ModemLink {
            generation,
            writer: link.writer,
            reader_stop,
        });
        self.on_link_state_changed(true);
    }

    fn stop_link_listeners(&mut self) {
        if let Some(link) = self.link.take() {
            tracing::debug!("Closing modem link {}", self.modem_path);
            link.reader_stop.store(true, Ordering::Relaxed);
            drop(link.writer);
            self.parser.clear();
            self.on_link_state_changed(false);
        }
    }

    fn on_link_state_changed(&mut self, available: bool) {
        self.sync_shared();

        if !available {
            // Whatever was pending belongs to the old link; subscriptions
            // are re-pushed on the next up transition.
            self.to_send.clear();
            return;
        }

        let now = Instant::now();
        {
            let mut registries = self.registries.lock();
            for entry in &registries.unsolicited {
                self.to_send
                    .push_back(QueuedCommand::new(entry.command.subscribe().clone(), None));
            }
            for entry in &mut registries.periodic {
                self.to_send
                    .push_back(QueuedCommand::new(entry.command.command().clone(), None));
                entry.next_due = now + entry.command.interval();
            }
        }
        self.process_send_queue();
    }

    fn next_periodic_deadline(&self) -> Option<Instant> {
        self.registries
            .lock()
            .periodic
            .iter()
            .map(|entry| entry.next_due)
            .min()
    }

    fn queue_due_periodics(&mut self) {
        let now = Instant::now();
        let mut registries = self.registries.lock();
        for entry in &mut registries.periodic {
            if entry.next_due <= now {
                self.to_send
                    .push_back(QueuedCommand::new(entry.command.command().clone(), None));
                entry.next_due = now + entry.command.interval();
            }
        }
    }

    fn on_link_closed(&mut self, generation: u64) {
        let current_link = self
            .link
            .as_ref()
            .is_some_and(|link| link.generation == generation);
        if !current_link {
            return;
        }

        self.terminate_transaction(false);
        self.stop_link_listeners();

        if self.modem_alive {
            // Give the link a chance to self-heal before forcing a reset.
            tracing::error!(
                "Modem still alive, trying to recover after {}ms",
                self.config.recover_timeout_ms
            );
            self.countdown.arm(self.config.recover_timeout());
        }
    }

    // === timeouts ===

    async fn handle_timeout(&mut self) {
        // Case 1: modem alive but the link is closed. Recovery needed.
        if self.modem_alive && self.link.is_none() {
            self.countdown.disarm();
            tracing::error!("Modem alive with link closed, requesting recovery");
            self.request_cleanup().await;
            return;
        }

        // Case 2: command in flight without an answer.
        if self.current.is_some() {
            self.retries += 1;
            if self.retries < self.config.max_retries {
                tracing::warn!("No answer, retry #{}", self.retries);
                self.countdown.arm(self.config.answer_timeout());
                self.write_current();
                return;
            }

            self.terminate_transaction(false);
            self.stop_link_listeners();
            if self.modem_alive {
                tracing::error!(
                    "{} retries failed, requesting recovery",
                    self.config.max_retries
                );
                self.request_cleanup().await;
            }
            return;
        }

        // Case 3: periodic command wake.
        self.queue_due_periodics();
        self.process_send_queue();
    }

    async fn request_cleanup(&mut self) {
        let result = status::send_cleanup_request(
            &self.config.cleanup_socket,
            self.config.status_retry_interval(),
            self.config.status_connect_window(),
        )
        .await;
        match result {
            Ok(()) => tracing::info!("Cleanup request sent"),
            Err(e) => tracing::error!("Cleanup request failed: {}", e),
        }
    }
}

#[async_trait]
impl EventHandler for ManagerCore {
    async fn on_event(&mut self, event: Event) {
        match event {
            Event::Status(word) => self.update_modem_status(word).await,
            Event::StatusClosed => tracing::error!("Modem status channel closed"),
            Event::ModemData { generation, bytes } => {
                let current_link = self
                    .link
                    .as_ref()
                    .is_some_and(|link| link.generation == generation);
                if current_link {
                    self.read_answers(&bytes);
                }
            }
            Event::ModemClosed { generation } => self.on_link_closed(generation),
            Event::Submit(command) => {
                self.to_send.push_back(command);
                if self.link.is_some() {
                    self.check_and_process_send_queue();
                }
            }
            Event::Wake => {
                if self.link.is_some() {
                    self.check_and_process_send_queue();
                }
            }
            Event::Timeout => self.handle_timeout().await,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.countdown.deadline()
    }

    async fn on_shutdown(&mut self) {
        self.stop_link_listeners();
        // Dropping the transaction drops its reply slot; a waiting caller
        // observes the abort instead of hanging.
        self.current = None;
        self.parser.clear();
        self.status = ModemStatus::Down;
        self.modem_alive = false;
        self.sync_shared();
    }
}

/// Blocking read loop feeding modem bytes into the event channel.
///
/// Exits on EOF, on a hard read error, or when the stop flag is raised;
/// periodic read timeouts keep the stop flag observed.
fn spawn_link_reader(
    mut reader: Box<dyn LinkReader>,
    generation: u64,
    stop: Arc<AtomicBool>,
    events: mpsc::Sender<Event>,
) {
    let _ = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 512];
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            match reader.read(&mut buf) {
                Ok(0) => {
                    let _ = events.blocking_send(Event::ModemClosed { generation });
                    break;
                }
                Ok(n) => {
                    let data = Event::ModemData {
                        generation,
                        bytes: buf[..n].to_vec(),
                    };
                    if events.blocking_send(data).is_err() {
                        break;
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    tracing::debug!("Modem link read failed: {}", e);
                    let _ = events.blocking_send(Event::ModemClosed { generation });
                    break;
                }
            }
        }
    });
}
