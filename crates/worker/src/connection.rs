//! Connection lifecycle and the sequential frame-processing loop.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use shoefeed_core::GroupTracker;

use crate::config::WorkerConfig;
use crate::protocol::{Inbound, ProtocolError, classify, map_result};
use crate::store::{GameStore, StoreError};

/// Vendor-mandated keepalive cadence.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(10_000);

/// User agent the vendor expects on the handshake.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Unrecoverable worker failure. Every variant ends the process with a
/// failure disposition; resilience is the supervisor's job, not ours.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid handshake header value: {0}")]
    Header(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkerError {
    /// Event kind used as exception-report context.
    pub fn event_kind(&self) -> &'static str {
        match self {
            WorkerError::Transport(_) | WorkerError::Header(_) => "transport error",
            WorkerError::Protocol(_) => "protocol parse error",
            WorkerError::Store(_) => "persistence error",
        }
    }
}

enum FrameOutcome {
    Continue,
    SessionEnded,
}

/// One connection session: owns the transport, the keepalive timer, and
/// the group tracker, and drives the sequential processing pipeline.
///
/// Exactly one of these exists per process lifetime. The lifecycle is
/// connect, run until the feed ends one way or another, tear down; there
/// is no reconnection.
pub struct Session<S> {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    table_id: String,
    keepalive: Duration,
    tracker: GroupTracker,
    store: S,
}

impl<S: GameStore> Session<S> {
    /// Open the transport with the vendor-mandated handshake headers and
    /// a freshly generated initial group.
    pub async fn connect(config: &WorkerConfig, store: S) -> Result<Self, WorkerError> {
        let request = handshake_request(config)?;
        let (stream, response) = connect_async(request).await?;
        tracing::info!(status = %response.status(), "connected to the game table");
        Ok(Session::from_stream(stream, &config.table_id, store))
    }

    /// Wrap an already-open transport. Used by tests to run the pipeline
    /// against an in-process server.
    pub fn from_stream(stream: WsStream, table_id: &str, store: S) -> Self {
        let (write, read) = stream.split();
        Session {
            write,
            read,
            table_id: table_id.to_string(),
            keepalive: KEEPALIVE_INTERVAL,
            tracker: GroupTracker::new(),
            store,
        }
    }

    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = interval;
        self
    }

    /// Drive the session until the feed ends.
    ///
    /// Frames are processed strictly in arrival order: classification,
    /// dispatch, and the persistence write for frame N all complete before
    /// frame N+1 is taken off the stream. The group id a result observes
    /// is snapshotted at dispatch and can never be moved by a rotation
    /// that arrives while its write is in flight.
    ///
    /// Returns `Ok` for the normal dispositions (remote close, stream end,
    /// session-end notice, termination signal) and `Err` for failures.
    /// Either way the keepalive timer dies with the loop.
    pub async fn run(mut self, shutdown: &Notify) -> Result<(), WorkerError> {
        let mut keepalive = interval_at(Instant::now() + self.keepalive, self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    let frame = ping_frame(&self.table_id);
                    self.write.send(Message::Text(frame.into())).await?;
                }
                _ = shutdown.notified() => {
                    tracing::info!("termination signal received, closing the table feed");
                    self.close().await;
                    return Ok(());
                }
                frame = self.read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let FrameOutcome::SessionEnded = self.process_frame(text.as_str()).await? {
                            self.close().await;
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        match close {
                            Some(close) => {
                                let reason = if close.reason.as_str().is_empty() {
                                    "N/A"
                                } else {
                                    close.reason.as_str()
                                };
                                tracing::info!(
                                    code = %close.code,
                                    reason,
                                    "disconnected from the game table"
                                );
                            }
                            None => tracing::info!("disconnected from the game table"),
                        }
                        return Ok(());
                    }
                    // Binary and control frames are not part of the feed.
                    Some(Ok(_)) => {}
                    Some(Err(error)) => return Err(WorkerError::Transport(error)),
                    None => {
                        tracing::info!("table feed stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Classify and dispatch one frame to completion.
    async fn process_frame(&mut self, frame: &str) -> Result<FrameOutcome, WorkerError> {
        match classify(frame)? {
            Inbound::GameResult(payload) => {
                // Snapshot the group before the write is awaited.
                let group = self.tracker.current().clone();
                let game = map_result(payload, group)?;
                tracing::debug!(
                    external_id = %game.external_id,
                    group = %game.group,
                    "persisting result"
                );
                self.store.append(&game).await?;
            }
            Inbound::StartShuffling => {
                let group = self.tracker.rotate();
                tracing::info!(%group, "shuffle started, rotated session group");
            }
            Inbound::SessionEnd(body) => {
                tracing::info!(%body, "session end notice received");
                return Ok(FrameOutcome::SessionEnded);
            }
            Inbound::Ignored => {}
        }
        Ok(FrameOutcome::Continue)
    }

    async fn close(&mut self) {
        if let Err(error) = self.write.close().await {
            tracing::debug!(%error, "transport close failed");
        }
    }
}

/// Handshake request with the header set the vendor's gateway requires
/// verbatim.
fn handshake_request(config: &WorkerConfig) -> Result<Request, WorkerError> {
    let mut request = config.endpoint().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(header::HOST, HeaderValue::from_str(&config.host())?);
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::ORIGIN, HeaderValue::from_static(config.origin()));
    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br, zstd"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    Ok(request)
}

/// Outbound keepalive frame: channel tag derived from the table id plus
/// the current epoch-millisecond timestamp.
fn ping_frame(table_id: &str) -> String {
    format!(
        "<ping channel=\"table-{}\" time=\"{}\"/>",
        table_id,
        epoch_millis()
    )
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
