//! Environment-sourced worker configuration, read once at startup.

use std::env;

use thiserror::Error;
use url::Url;

/// Domain the vendor serves game feeds from; only the host segment in
/// front of it varies between game servers.
const VENDOR_DOMAIN: &str = "pragmaticplaylive.net";

/// Origin of the vendor's own client application. The handshake is
/// rejected without it.
const VENDOR_ORIGIN: &str = "https://client.pragmaticplaylive.net";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
}

/// Connection and collaborator settings. Every connection value is
/// required; the worker refuses to start partially configured.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Vendor host segment for the assigned game server, e.g. `gs19`.
    pub server_segment: String,
    /// Vendor session identifier for the feed handshake.
    pub session_id: String,
    /// Table the worker follows.
    pub table_id: String,
    /// Base URL of the results ingest API (persistence collaborator).
    pub results_api_url: Url,
    /// Exception collector endpoint; reports go to the log when unset.
    pub telemetry_url: Option<Url>,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary lookup function. `from_env` goes through
    /// here; tests pass a map instead of mutating process environment.
    pub fn from_lookup(
        get: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(WorkerConfig {
            server_segment: require(&get, "GAME_SERVER_SEGMENT")?,
            session_id: require(&get, "GAME_SESSION_ID")?,
            table_id: require(&get, "GAME_TABLE_ID")?,
            results_api_url: parse_url("RESULTS_API_URL", require(&get, "RESULTS_API_URL")?)?,
            telemetry_url: match get("TELEMETRY_URL") {
                Some(value) if !value.is_empty() => Some(parse_url("TELEMETRY_URL", value)?),
                _ => None,
            },
        })
    }

    /// Vendor host for the configured game server segment.
    pub fn host(&self) -> String {
        format!("{}.{}", self.server_segment, VENDOR_DOMAIN)
    }

    /// Feed endpoint, parameterized by session, table, and the requested
    /// payload encoding.
    pub fn endpoint(&self) -> String {
        format!(
            "wss://{}/game?JSESSIONID={}&tableId={}&type=json",
            self.host(),
            self.session_id,
            self.table_id
        )
    }

    pub fn origin(&self) -> &'static str {
        VENDOR_ORIGIN
    }
}

fn require(
    get: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    match get(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_url(name: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { name, source })
}
