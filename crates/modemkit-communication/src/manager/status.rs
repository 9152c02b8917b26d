//! Modem status channel client
//!
//! The status service announces modem liveness as 4-byte little-endian words
//! on a Unix stream socket. A cold reset announcement is held off until the
//! manager acknowledges it on the same stream; recovery is requested by
//! writing a cleanup word on a separate socket.

use super::reactor::Event;
use modemkit_core::{status_word, Result, TransportError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Connect to `path`, retrying every `interval` for at most `window`.
///
/// The service may come up slightly after its clients, so a bounded retry
/// loop papers over the startup race.
pub(crate) async fn connect_with_retry(
    path: &str,
    interval: Duration,
    window: Duration,
) -> Result<UnixStream> {
    let mut attempts = (window.as_millis() / interval.as_millis().max(1)).max(1);
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                attempts -= 1;
                if attempts == 0 {
                    tracing::error!("Failed to connect to status socket {}: {}", path, e);
                    return Err(TransportError::StatusChannelUnavailable {
                        path: path.to_string(),
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// Read one status word. `None` when the channel is closed or the word is
/// truncated.
pub(crate) async fn read_status_word(half: &mut OwnedReadHalf) -> Option<u32> {
    let mut buf = [0u8; 4];
    match half.read_exact(&mut buf).await {
        Ok(_) => Some(u32::from_le_bytes(buf)),
        Err(e) => {
            tracing::debug!("Status channel read failed: {}", e);
            None
        }
    }
}

/// Acknowledge a cold reset announcement so the service may proceed.
pub(crate) async fn send_cold_reset_ack(half: &mut OwnedWriteHalf) -> Result<()> {
    half.write_all(&status_word::MODEM_COLD_RESET_ACK.to_le_bytes())
        .await?;
    Ok(())
}

/// Ask the recovery service to reset the modem.
pub(crate) async fn send_cleanup_request(
    path: &str,
    interval: Duration,
    window: Duration,
) -> Result<()> {
    let mut stream = connect_with_retry(path, interval, window).await?;
    stream
        .write_all(&status_word::REQUEST_CLEANUP.to_le_bytes())
        .await?;
    Ok(())
}

/// Forward status words into the worker event channel until the channel or
/// the socket goes away.
pub(crate) fn spawn_status_reader(
    mut half: OwnedReadHalf,
    events: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match read_status_word(&mut half).await {
                Some(word) => {
                    if events.send(Event::Status(word)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = events.send(Event::StatusClosed).await;
                    break;
                }
            }
        }
    })
}
