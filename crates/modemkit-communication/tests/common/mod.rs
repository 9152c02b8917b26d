#![allow(dead_code)]
//! Shared harness for manager integration tests: a socket-pair transport
//! that hands the modem end to the test, and a fake status service.

use modemkit_communication::transport::{ModemTransport, TransportLink};
use modemkit_communication::{AtManager, ManagerConfig};
use modemkit_core::{AtListener, ModemStatus, Result, UnsolicitedReport};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport that mints a socket pair per open and hands the modem-side end
/// to the test.
pub struct PairTransport {
    peers: Mutex<std_mpsc::Sender<StdUnixStream>>,
}

impl PairTransport {
    pub fn new() -> (Self, std_mpsc::Receiver<StdUnixStream>) {
        let (tx, rx) = std_mpsc::channel();
        (
            Self {
                peers: Mutex::new(tx),
            },
            rx,
        )
    }
}

impl ModemTransport for PairTransport {
    fn open(&self, _path: &str) -> Result<TransportLink> {
        let (ours, theirs) = StdUnixStream::pair()?;
        ours.set_read_timeout(Some(Duration::from_millis(20)))?;
        let reader = ours.try_clone()?;
        self.peers.lock().unwrap().send(theirs).ok();
        Ok(TransportLink {
            reader: Box::new(reader),
            writer: Box::new(ours),
        })
    }
}

/// Await the modem-side end of the next opened link.
pub async fn next_peer(rx: &std_mpsc::Receiver<StdUnixStream>) -> UnixStream {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    loop {
        if let Ok(stream) = rx.try_recv() {
            stream.set_nonblocking(true).unwrap();
            return UnixStream::from_std(stream).unwrap();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no modem link opened in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Fake status service: binds the socket and accepts one connection.
pub struct FakeStatusService {
    accept: tokio::task::JoinHandle<UnixStream>,
}

impl FakeStatusService {
    pub fn bind(path: &Path) -> Self {
        let listener = UnixListener::bind(path).unwrap();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            stream
        });
        Self { accept }
    }

    /// Wait for the manager to connect, then deliver the first status word.
    pub async fn accept_and_send(self, word: u32) -> UnixStream {
        let mut stream = self.accept.await.unwrap();
        stream.write_all(&word.to_le_bytes()).await.unwrap();
        stream
    }
}

/// A started manager with its fake services.
pub struct TestBench {
    pub manager: Arc<AtManager>,
    pub peers: std_mpsc::Receiver<StdUnixStream>,
    pub status: UnixStream,
    pub cleanup: UnixListener,
    dir: tempfile::TempDir,
}

/// Bring up a manager against fake services and deliver `first_word` as the
/// initial modem status.
pub async fn start_bench(
    tweak: impl FnOnce(&mut ManagerConfig),
    first_word: u32,
) -> TestBench {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("status.sock");
    let cleanup_path = dir.path().join("cleanup.sock");
    let cleanup = UnixListener::bind(&cleanup_path).unwrap();
    let service = FakeStatusService::bind(&status_path);

    let (transport, peers) = PairTransport::new();
    let mut config = ManagerConfig {
        status_socket: status_path.to_str().unwrap().to_string(),
        cleanup_socket: cleanup_path.to_str().unwrap().to_string(),
        answer_timeout_ms: 500,
        recover_timeout_ms: 200,
        status_retry_interval_ms: 50,
        status_connect_window_ms: 1000,
        first_status_timeout_secs: 5,
        ..ManagerConfig::default()
    };
    tweak(&mut config);
    let manager = Arc::new(AtManager::new(Arc::new(transport), config));

    let (started, status) = tokio::join!(
        manager.start("modem0", TEST_TIMEOUT),
        service.accept_and_send(first_word),
    );
    started.unwrap();

    TestBench {
        manager,
        peers,
        status,
        cleanup,
        dir,
    }
}

/// Read one CRLF-terminated command line from the modem side.
pub async fn expect_line(peer: &mut UnixStream) -> String {
    tokio::time::timeout(TEST_TIMEOUT, read_line(peer))
        .await
        .expect("timed out waiting for a command line")
}

async fn read_line(peer: &mut UnixStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        peer.read_exact(&mut byte).await.expect("peer read failed");
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).unwrap()
}

pub async fn send_reply(peer: &mut UnixStream, reply: &str) {
    peer.write_all(reply.as_bytes()).await.unwrap();
}

/// Accept one recovery connection and return the word it carried.
pub async fn expect_cleanup_request(listener: &UnixListener) -> u32 {
    let (mut stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("no cleanup connection in time")
        .unwrap();
    let mut buf = [0u8; 4];
    tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("no cleanup word in time")
        .unwrap();
    u32::from_le_bytes(buf)
}

/// Poll until `predicate` holds, panicking after the test timeout.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Listener that records every notification as a string.
pub struct RecordingListener {
    calls: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn state_changes(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|c| c.starts_with("state:"))
            .collect()
    }

    pub fn unsolicited(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|c| c.starts_with("unsolicited:"))
            .collect()
    }
}

#[async_trait::async_trait]
impl AtListener for RecordingListener {
    async fn on_modem_state_changed(&self, status: ModemStatus) {
        self.calls.lock().unwrap().push(format!("state:{}", status));
    }

    async fn on_unsolicited_received(&self, report: &UnsolicitedReport) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("unsolicited:{}:{}", report.prefix, report.line));
    }
}
