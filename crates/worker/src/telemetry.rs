//! Observability collaborator port.
//!
//! Reports are fire-and-forget while the worker runs; the only moment the
//! worker ever waits on this collaborator is the bounded flush during
//! shutdown, so a slow or unreachable collector can never stall frame
//! processing or hang termination.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use url::Url;

/// One structured exception/event report.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionReport {
    /// Event kind, e.g. `transport error`.
    pub event: String,
    /// Table the worker was following.
    pub table: String,
    pub detail: String,
}

impl ExceptionReport {
    pub fn new(
        event: impl Into<String>,
        table: impl Into<String>,
        detail: impl ToString,
    ) -> Self {
        ExceptionReport {
            event: event.into(),
            table: table.into(),
            detail: detail.to_string(),
        }
    }
}

/// Fire-and-forget event sink with a bounded flush used only at shutdown.
#[async_trait]
pub trait ExceptionSink: Send + Sync {
    async fn report(&self, report: ExceptionReport);

    /// Drain buffered reports, waiting at most `limit`. Returns whether
    /// the drain completed inside the bound.
    async fn flush(&self, limit: Duration) -> bool;
}

enum Command {
    Report(ExceptionReport),
    Flush(oneshot::Sender<()>),
}

/// Sink that ships reports to an HTTP collector from a background task.
pub struct HttpExceptionSink {
    tx: mpsc::Sender<Command>,
}

impl HttpExceptionSink {
    pub fn new(collector_url: Url) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_shipper(collector_url, rx));
        HttpExceptionSink { tx }
    }
}

async fn run_shipper(url: Url, mut rx: mpsc::Receiver<Command>) {
    let client = reqwest::Client::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Report(report) => {
                if let Err(error) = client.post(url.clone()).json(&report).send().await {
                    tracing::warn!(%error, "failed to ship exception report");
                }
            }
            // Commands are handled in order, so acking here means every
            // report queued before the flush has been shipped.
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[async_trait]
impl ExceptionSink for HttpExceptionSink {
    async fn report(&self, report: ExceptionReport) {
        if self.tx.try_send(Command::Report(report)).is_err() {
            tracing::warn!("exception report dropped: shipper queue full or gone");
        }
    }

    async fn flush(&self, limit: Duration) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_err() {
            return false;
        }
        tokio::time::timeout(limit, done_rx).await.is_ok()
    }
}

/// Fallback sink when no collector is configured: reports land in the log.
pub struct LogSink;

#[async_trait]
impl ExceptionSink for LogSink {
    async fn report(&self, report: ExceptionReport) {
        tracing::error!(
            event = %report.event,
            table = %report.table,
            detail = %report.detail,
            "exception report"
        );
    }

    async fn flush(&self, _limit: Duration) -> bool {
        true
    }
}

/// Pick the sink implementation for the configured collector.
pub fn sink_from_config(telemetry_url: Option<Url>) -> Arc<dyn ExceptionSink> {
    match telemetry_url {
        Some(url) => Arc::new(HttpExceptionSink::new(url)),
        None => Arc::new(LogSink),
    }
}
