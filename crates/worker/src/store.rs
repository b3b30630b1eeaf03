//! Persistence collaborator port.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use shoefeed_core::GameResult;

/// Ceiling on a single write. The processing loop awaits every write
/// before taking the next frame, so a hung collaborator must not be able
/// to wedge the worker (or a pending shutdown) forever.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write failure at the persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("persistence request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("persistence collaborator rejected the record: {0}")]
    Rejected(StatusCode),
}

/// Append-only store for accepted results.
///
/// A failed write must surface as an error; records are never silently
/// dropped. The store assigns the write timestamp itself.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn append(&self, game: &GameResult) -> Result<(), StoreError>;
}

/// Store backed by the results ingest API.
pub struct RestStore {
    client: reqwest::Client,
    games_url: String,
}

impl RestStore {
    pub fn new(base_url: Url) -> Self {
        RestStore {
            client: reqwest::Client::new(),
            games_url: format!("{}/games", base_url.as_str().trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl GameStore for RestStore {
    async fn append(&self, game: &GameResult) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.games_url.as_str())
            .timeout(WRITE_TIMEOUT)
            .json(game)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Rejected(response.status()));
        }
        Ok(())
    }
}
