//! End-to-end session tests.
//!
//! These run the real frame-processing pipeline against an in-process
//! WebSocket server, with recording fakes standing in for the
//! persistence and observability collaborators.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async};

use shoefeed_core::GameResult;
use shoefeed_worker::connection::{Session, WorkerError};
use shoefeed_worker::protocol::ProtocolError;
use shoefeed_worker::shutdown::{Disposition, ShutdownCoordinator};
use shoefeed_worker::store::{GameStore, StoreError};
use shoefeed_worker::telemetry::{ExceptionReport, ExceptionSink};

const TABLE: &str = "t42";

// ============================================================================
// Test Fixtures
// ============================================================================

/// Store fake that records appended results, optionally after a delay to
/// simulate a slow persistence collaborator.
#[derive(Clone, Default)]
struct RecordingStore {
    games: Arc<Mutex<Vec<GameResult>>>,
    delay: Duration,
}

impl RecordingStore {
    fn slow(delay: Duration) -> Self {
        RecordingStore {
            games: Arc::default(),
            delay,
        }
    }

    fn games(&self) -> Vec<GameResult> {
        self.games.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameStore for RecordingStore {
    async fn append(&self, game: &GameResult) -> Result<(), StoreError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.games.lock().unwrap().push(game.clone());
        Ok(())
    }
}

/// Sink fake that records exception reports.
#[derive(Clone, Default)]
struct RecordingSink {
    reports: Arc<Mutex<Vec<ExceptionReport>>>,
}

#[async_trait]
impl ExceptionSink for RecordingSink {
    async fn report(&self, report: ExceptionReport) {
        self.reports.lock().unwrap().push(report);
    }

    async fn flush(&self, _limit: Duration) -> bool {
        true
    }
}

fn result_frame(id: &str, result: &str, score: &str) -> String {
    format!(
        r#"{{"gameresult":{{"id":"{}","table":"{}","result":"{}","score":"{}"}}}}"#,
        id, TABLE, result, score
    )
}

fn shuffle_frame() -> String {
    r#"{"startshuffling":{}}"#.to_string()
}

/// Start a server that sends the scripted frames, closes cleanly, and
/// then drains the peer until it goes away.
async fn start_feed_server(frames: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.expect("Failed to accept");
        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        let _ = ws.close(None).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    addr
}

async fn open_session(addr: SocketAddr, store: RecordingStore) -> Session<RecordingStore> {
    let (stream, _) = connect_async(format!("ws://{}", addr))
        .await
        .expect("Failed to connect");
    Session::from_stream(stream, TABLE, store)
}

// ============================================================================
// Grouping Scenarios
// ============================================================================

#[tokio::test]
async fn test_results_before_any_shuffle_share_the_initial_group() {
    let addr = start_feed_server(vec![
        result_frame("r-1", "player", "7"),
        result_frame("r-2", "banker", "8"),
        result_frame("r-3", "tie", "6"),
    ])
    .await;

    let store = RecordingStore::default();
    let session = open_session(addr, store.clone()).await;
    session.run(&Notify::new()).await.expect("run failed");

    let games = store.games();
    assert_eq!(games.len(), 3);
    assert_eq!(games[0].group, games[1].group);
    assert_eq!(games[1].group, games[2].group);
    // The initial group is a generated token, not a fixed value.
    assert_eq!(games[0].group.as_str().len(), 22);
    // Numeric score text is persisted as an integer.
    assert_eq!(games[1].score, 8);
    assert_eq!(games[1].external_id, "r-2");
}

#[tokio::test]
async fn test_shuffle_start_splits_results_into_two_groups() {
    let addr = start_feed_server(vec![
        result_frame("r-1", "player", "7"),
        result_frame("r-2", "banker", "9"),
        shuffle_frame(),
        result_frame("r-3", "tie", "0"),
        result_frame("r-4", "player", "5"),
        result_frame("r-5", "banker", "8"),
    ])
    .await;

    let store = RecordingStore::default();
    let session = open_session(addr, store.clone()).await;
    session.run(&Notify::new()).await.expect("run failed");

    let games = store.games();
    assert_eq!(games.len(), 5);

    let first = &games[0].group;
    let second = &games[2].group;
    assert_ne!(first, second);
    assert_eq!(&games[1].group, first);
    assert_eq!(&games[3].group, second);
    assert_eq!(&games[4].group, second);
}

#[tokio::test]
async fn test_slow_write_does_not_observe_a_later_rotation() {
    // The rotation frame is already queued while the first result's write
    // is still sleeping in the store; sequential processing means the
    // record keeps the group snapshotted at dispatch.
    let addr = start_feed_server(vec![
        result_frame("r-1", "banker", "8"),
        shuffle_frame(),
        result_frame("r-2", "player", "6"),
    ])
    .await;

    let store = RecordingStore::slow(Duration::from_millis(150));
    let session = open_session(addr, store.clone()).await;
    session.run(&Notify::new()).await.expect("run failed");

    let games = store.games();
    assert_eq!(games.len(), 2);
    assert_ne!(games[0].group, games[1].group);
}

#[tokio::test]
async fn test_unknown_traffic_is_skipped() {
    let addr = start_feed_server(vec![
        r#"{"seat":{"n":1}}"#.to_string(),
        "<balance>100</balance>".to_string(),
        result_frame("r-1", "tie", "4"),
    ])
    .await;

    let store = RecordingStore::default();
    let session = open_session(addr, store.clone()).await;
    session.run(&Notify::new()).await.expect("run failed");

    let games = store.games();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].external_id, "r-1");
}

// ============================================================================
// Error and Shutdown Scenarios
// ============================================================================

#[tokio::test]
async fn test_malformed_score_fails_the_worker_without_persisting() {
    let addr = start_feed_server(vec![result_frame("r-1", "banker", "abc")]).await;

    let store = RecordingStore::default();
    let session = open_session(addr, store.clone()).await;
    let error = session.run(&Notify::new()).await.unwrap_err();

    assert!(matches!(
        error,
        WorkerError::Protocol(ProtocolError::Score(_))
    ));
    assert_eq!(error.event_kind(), "protocol parse error");
    assert!(store.games().is_empty());
}

#[tokio::test]
async fn test_session_end_notice_ends_the_run_normally() {
    let addr = start_feed_server(vec![
        result_frame("r-1", "player", "7"),
        "<session>expired</session>".to_string(),
        // Never reaches the pipeline: the session closed before it.
        result_frame("r-2", "banker", "9"),
    ])
    .await;

    let store = RecordingStore::default();
    let session = open_session(addr, store.clone()).await;
    session.run(&Notify::new()).await.expect("run failed");

    assert_eq!(store.games().len(), 1);
}

#[tokio::test]
async fn test_signal_while_idle_shuts_down_cleanly() {
    // Server that sends nothing and just waits for the peer to leave.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.expect("Failed to accept");
        while let Some(Ok(_)) = ws.next().await {}
    });

    let store = RecordingStore::default();
    let session = open_session(addr, store.clone()).await;

    let shutdown = Notify::new();
    shutdown.notify_one();

    let result = tokio::time::timeout(Duration::from_secs(5), session.run(&shutdown)).await;
    result.expect("run did not finish").expect("run failed");
    assert!(store.games().is_empty());

    let sink = RecordingSink::default();
    let coordinator = ShutdownCoordinator::new(Arc::new(sink));
    assert_eq!(coordinator.finish(Disposition::Normal).await, Some(0));
}

#[tokio::test]
async fn test_transport_error_is_reported_with_context() {
    // Server that drops the socket abruptly, without a close handshake.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.expect("Failed to accept");
        ws.send(Message::Text(result_frame("r-1", "player", "3").into()))
            .await
            .unwrap();
        drop(ws);
    });

    let store = RecordingStore::default();
    let session = open_session(addr, store.clone()).await;
    let error = session.run(&Notify::new()).await.unwrap_err();
    assert_eq!(error.event_kind(), "transport error");

    // The frame sent before the drop was still persisted in order.
    assert_eq!(store.games().len(), 1);

    // Failure path: report with {event, table} context, bounded flush,
    // failure exit code.
    let sink = RecordingSink::default();
    sink.report(ExceptionReport::new(error.event_kind(), TABLE, &error))
        .await;

    let coordinator = ShutdownCoordinator::new(Arc::new(sink.clone()));
    assert_eq!(coordinator.finish(Disposition::Failure).await, Some(1));

    let reports = sink.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].event, "transport error");
    assert_eq!(reports[0].table, TABLE);
}

// ============================================================================
// Keepalive
// ============================================================================

#[tokio::test]
async fn test_keepalive_pings_flow_only_while_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let pings: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen = Arc::clone(&pings);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.expect("Failed to accept");
        let (mut write, mut read) = ws.split();

        let collector = tokio::spawn(async move {
            while let Some(Ok(Message::Text(text))) = read.next().await {
                seen.lock().unwrap().push(text.to_string());
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = write.send(Message::Close(None)).await;
        let _ = collector.await;
    });

    let store = RecordingStore::default();
    let session = open_session(addr, store)
        .await
        .with_keepalive(Duration::from_millis(40));
    session.run(&Notify::new()).await.expect("run failed");

    let sent_while_open = pings.lock().unwrap().len();
    assert!(
        sent_while_open >= 2,
        "expected at least 2 pings, got {}",
        sent_while_open
    );
    for ping in pings.lock().unwrap().iter() {
        assert!(
            ping.starts_with(r#"<ping channel="table-t42" time=""#),
            "unexpected ping frame: {}",
            ping
        );
    }

    // The timer died with the session: nothing more shows up afterwards.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(pings.lock().unwrap().len(), sent_while_open);
}
