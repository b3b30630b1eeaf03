//! Single idempotent teardown path.
//!
//! Every way the worker can end — termination signal, remote close,
//! transport error, unrecoverable processing error, session-end notice —
//! funnels into one coordinator. The session loop has already released
//! the transport and its keepalive timer by the time the coordinator
//! runs; the coordinator's job is the bounded observability flush and
//! picking the exit code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::telemetry::ExceptionSink;

/// Ceiling on the observability flush during teardown. A slow or
/// unreachable collector must never hang the process.
pub const FLUSH_LIMIT: Duration = Duration::from_millis(2_000);

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remote close, session-end notice, or signal-driven shutdown.
    Normal,
    /// Transport, protocol, persistence, or teardown failure.
    Failure,
}

impl Disposition {
    pub fn exit_code(self) -> i32 {
        match self {
            Disposition::Normal => 0,
            Disposition::Failure => 1,
        }
    }
}

/// One-shot teardown authority.
///
/// If two trigger paths race (say a signal lands while an error-path
/// shutdown is already running), the second call observes the flag and
/// becomes a no-op.
pub struct ShutdownCoordinator {
    sink: Arc<dyn ExceptionSink>,
    begun: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(sink: Arc<dyn ExceptionSink>) -> Self {
        ShutdownCoordinator {
            sink,
            begun: AtomicBool::new(false),
        }
    }

    /// Run the bounded teardown steps once and return the exit code to
    /// use, or `None` when another teardown already owns the process.
    pub async fn finish(&self, disposition: Disposition) -> Option<i32> {
        if self.begun.swap(true, Ordering::SeqCst) {
            return None;
        }

        if !self.sink.flush(FLUSH_LIMIT).await {
            tracing::warn!(
                limit_ms = FLUSH_LIMIT.as_millis() as u64,
                "observability flush did not finish inside its bound"
            );
        }

        tracing::info!(code = disposition.exit_code(), "worker finished");
        Some(disposition.exit_code())
    }
}

/// Resolve when the process receives a termination signal.
#[cfg(unix)]
pub async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
