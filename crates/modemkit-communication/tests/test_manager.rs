mod common;

use common::*;
use modemkit_communication::{AtCommand, PeriodicCommand, UnsolicitedCommand};
use modemkit_core::{status_word, CommandError, Error, ModemStatus};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn synchronous_command_happy_path() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let mut peer = next_peer(&bench.peers).await;

    let manager = bench.manager.clone();
    let send = tokio::spawn(async move {
        manager
            .send_command(AtCommand::new("AT+CFUN?").with_prefix("+CFUN:"))
            .await
    });

    assert_eq!(expect_line(&mut peer).await, "AT+CFUN?");
    send_reply(&mut peer, "+CFUN: 1\r\nOK\r\n").await;

    let response = send.await.unwrap().unwrap();
    assert!(response.success);
    assert_eq!(response.fragments, vec!["+CFUN: 1", "OK"]);
    assert_eq!(response.answer(), "+CFUN: 1\nOK");

    bench.manager.stop().await;
    assert!(!bench.manager.is_started());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_sentinel_reports_failure() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let mut peer = next_peer(&bench.peers).await;

    let manager = bench.manager.clone();
    let send =
        tokio::spawn(async move { manager.send_command(AtCommand::new("AT+BOGUS")).await });

    assert_eq!(expect_line(&mut peer).await, "AT+BOGUS");
    send_reply(&mut peer, "ERROR\r\n").await;

    let response = send.await.unwrap().unwrap();
    assert!(!response.success);
    assert_eq!(response.fragments, vec!["ERROR"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_line_answer_extends_deadline() {
    let bench = start_bench(|c| c.answer_timeout_ms = 300, status_word::MODEM_UP).await;
    let mut peer = next_peer(&bench.peers).await;

    let manager = bench.manager.clone();
    let send = tokio::spawn(async move {
        manager
            .send_command(AtCommand::new("AT+COPS=?").with_prefix("+COPS:"))
            .await
    });

    assert_eq!(expect_line(&mut peer).await, "AT+COPS=?");
    // Each fragment lands within the answer timeout, but the full answer
    // takes longer than one timeout.
    send_reply(&mut peer, "+COPS: (2,\"one\")\r\n").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    send_reply(&mut peer, "+COPS: (3,\"two\")\r\n").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    send_reply(&mut peer, "OK\r\n").await;

    let response = send.await.unwrap().unwrap();
    assert!(response.success);
    assert_eq!(response.fragments.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejects_send_while_modem_down() {
    let bench = start_bench(|_| {}, status_word::MODEM_DOWN).await;
    assert_eq!(bench.manager.modem_status(), ModemStatus::Down);
    assert!(!bench.manager.is_transport_ready());

    let err = bench
        .manager
        .send_command(AtCommand::new("AT"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Command(CommandError::NotReady)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejects_second_caller_while_synchronous_call_outstanding() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let mut peer = next_peer(&bench.peers).await;

    let manager = bench.manager.clone();
    let first = tokio::spawn(async move { manager.send_command(AtCommand::new("AT")).await });
    assert_eq!(expect_line(&mut peer).await, "AT");

    let err = bench
        .manager
        .send_command(AtCommand::new("ATI"))
        .await
        .unwrap_err();
    assert!(err.is_busy());

    let err = bench
        .manager
        .post_command(AtCommand::new("ATI"))
        .await
        .unwrap_err();
    assert!(err.is_busy());

    send_reply(&mut peer, "OK\r\n").await;
    assert!(first.await.unwrap().unwrap().success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsolicited_round_trip() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let listener = RecordingListener::new();
    bench.manager.register_listener(listener.clone());

    let mut peer = next_peer(&bench.peers).await;
    let _handle = bench
        .manager
        .add_unsolicited_command(UnsolicitedCommand::new(AtCommand::new("AT+CREG=1"), "+CREG:"));

    // Registration pushes the subscription command through the send queue.
    assert_eq!(expect_line(&mut peer).await, "AT+CREG=1");
    send_reply(&mut peer, "OK\r\n").await;

    // No transaction open: the notification is matched passively.
    send_reply(&mut peer, "+CREG: 5\r\n").await;
    wait_until(|| {
        listener
            .unsolicited()
            .iter()
            .any(|c| c == "unsolicited:+CREG::+CREG: 5")
    })
    .await;
    assert_eq!(listener.unsolicited().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsolicited_interleaved_with_open_transaction() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let listener = RecordingListener::new();
    bench.manager.register_listener(listener.clone());

    let mut peer = next_peer(&bench.peers).await;
    let _handle = bench
        .manager
        .add_unsolicited_command(UnsolicitedCommand::new(AtCommand::new("AT+CREG=1"), "+CREG:"));
    assert_eq!(expect_line(&mut peer).await, "AT+CREG=1");
    send_reply(&mut peer, "OK\r\n").await;

    let manager = bench.manager.clone();
    let send = tokio::spawn(async move {
        manager
            .send_command(AtCommand::new("AT+CFUN?").with_prefix("+CFUN:"))
            .await
    });
    assert_eq!(expect_line(&mut peer).await, "AT+CFUN?");

    // A notification slips in between the answer fragments; the transaction
    // must not be disturbed.
    send_reply(&mut peer, "+CREG: 2\r\n+CFUN: 1\r\nOK\r\n").await;

    let response = send.await.unwrap().unwrap();
    assert!(response.success);
    assert_eq!(response.fragments, vec!["+CFUN: 1", "OK"]);

    wait_until(|| {
        listener
            .unsolicited()
            .iter()
            .any(|c| c == "unsolicited:+CREG::+CREG: 2")
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_command_fires_on_its_interval() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let mut peer = next_peer(&bench.peers).await;

    bench.manager.add_periodic_command(PeriodicCommand::new(
        AtCommand::new("AT+CSQ"),
        Duration::from_millis(150),
    ));

    assert_eq!(expect_line(&mut peer).await, "AT+CSQ");
    send_reply(&mut peer, "OK\r\n").await;

    // Fires again without any client activity.
    assert_eq!(expect_line(&mut peer).await, "AT+CSQ");
    send_reply(&mut peer, "OK\r\n").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_periodic_command_stops_firing() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let mut peer = next_peer(&bench.peers).await;

    let handle = bench.manager.add_periodic_command(PeriodicCommand::new(
        AtCommand::new("AT+CSQ"),
        Duration::from_millis(100),
    ));
    assert_eq!(expect_line(&mut peer).await, "AT+CSQ");
    send_reply(&mut peer, "OK\r\n").await;

    bench.manager.remove_periodic_command(&handle);

    // One send may already be queued; after that the line stays quiet. Use
    // a synchronous command as the fence.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let manager = bench.manager.clone();
    let send = tokio::spawn(async move { manager.send_command(AtCommand::new("AT")).await });
    let mut line = expect_line(&mut peer).await;
    if line == "AT+CSQ" {
        send_reply(&mut peer, "OK\r\n").await;
        line = expect_line(&mut peer).await;
    }
    assert_eq!(line, "AT");
    send_reply(&mut peer, "OK\r\n").await;
    assert!(send.await.unwrap().unwrap().success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_fails_outstanding_synchronous_call() {
    let bench = start_bench(|_| {}, status_word::MODEM_UP).await;
    let mut peer = next_peer(&bench.peers).await;

    let manager = bench.manager.clone();
    let send = tokio::spawn(async move { manager.send_command(AtCommand::new("AT")).await });
    assert_eq!(expect_line(&mut peer).await, "AT");

    bench.manager.stop().await;

    let err = send.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Command(CommandError::Aborted)));
    assert!(!bench.manager.is_started());
}
