use std::process;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shoefeed_worker::config::WorkerConfig;
use shoefeed_worker::connection::{Session, WorkerError};
use shoefeed_worker::shutdown::{self, Disposition, ShutdownCoordinator};
use shoefeed_worker::store::RestStore;
use shoefeed_worker::telemetry::{self, ExceptionReport, ExceptionSink};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shoefeed_worker=info")),
        )
        .init();

    // Configuration is fatal-if-absent, before any connection attempt.
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "configuration error");
            process::exit(Disposition::Failure.exit_code());
        }
    };

    tracing::info!(endpoint = %config.endpoint(), "starting table feed worker");

    let sink = telemetry::sink_from_config(config.telemetry_url.clone());
    let coordinator = ShutdownCoordinator::new(Arc::clone(&sink));

    // Signals route through the same teardown as every other trigger: the
    // session loop observes the notification and returns normally.
    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            match shutdown::wait_for_termination().await {
                Ok(()) => shutdown.notify_one(),
                Err(error) => tracing::error!(%error, "failed to listen for signals"),
            }
        });
    }

    let disposition = match run(&config, &shutdown).await {
        Ok(()) => Disposition::Normal,
        Err(error) => {
            tracing::error!(%error, "worker failed");
            sink.report(ExceptionReport::new(
                error.event_kind(),
                &config.table_id,
                &error,
            ))
            .await;
            Disposition::Failure
        }
    };

    let code = coordinator
        .finish(disposition)
        .await
        .unwrap_or_else(|| disposition.exit_code());
    process::exit(code);
}

async fn run(config: &WorkerConfig, shutdown: &Notify) -> Result<(), WorkerError> {
    let store = RestStore::new(config.results_api_url.clone());
    let session = Session::connect(config, store).await?;
    session.run(shutdown).await
}
