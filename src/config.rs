//! Mirror configuration: endpoint, symbol, credentials and table limits.

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{MirrorError, Result};

/// Default cap on bounded tables (trades, quotes, bins).
pub const DEFAULT_MAX_TABLE_LEN: usize = 200;

/// Default time allowed for the websocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default time to wait for the initial snapshots after connecting.
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_ENDPOINT: &str = "https://testnet.bitmex.com/api/v1";
pub const DEFAULT_SYMBOL: &str = "XBTUSD";

/// API key and secret. Only ever constructed as a pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

// Keep the secret out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Both or neither: a key without a secret (or the reverse) is a configuration error.
    pub fn from_parts(api_key: Option<String>, api_secret: Option<String>) -> Result<Option<Self>> {
        match (api_key, api_secret) {
            (Some(api_key), Some(api_secret)) => Ok(Some(Self { api_key, api_secret })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(MirrorError::Config(
                "api_secret is required if api_key is provided".into(),
            )),
            (None, Some(_)) => Err(MirrorError::Config(
                "api_key is required if api_secret is provided".into(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// REST-style base URL; the websocket URL is derived from it.
    pub endpoint: String,
    pub symbol: String,
    pub credentials: Option<Credentials>,
    pub max_table_len: usize,
    pub connect_timeout: Duration,
    pub ready_timeout: Duration,
}

impl MirrorConfig {
    pub fn new(endpoint: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            symbol: symbol.into(),
            credentials: None,
            max_table_len: DEFAULT_MAX_TABLE_LEN,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
        }
    }

    /// Sets the API key pair. Fails if only one half is given.
    pub fn with_credentials(
        mut self,
        api_key: Option<impl Into<String>>,
        api_secret: Option<impl Into<String>>,
    ) -> Result<Self> {
        self.credentials = Credentials::from_parts(api_key.map(Into::into), api_secret.map(Into::into))?;
        Ok(self)
    }

    pub fn with_max_table_len(mut self, max_table_len: usize) -> Self {
        self.max_table_len = max_table_len;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Reads `MIRROR_*` variables (after loading `.env` if present).
    ///
    /// - `MIRROR_ENDPOINT` (default testnet), `MIRROR_SYMBOL` (default `XBTUSD`)
    /// - `MIRROR_API_KEY` / `MIRROR_API_SECRET`, both or neither
    /// - `MIRROR_MAX_TABLE_LEN`, `MIRROR_CONNECT_TIMEOUT_SECS`, `MIRROR_READY_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let endpoint = env::var("MIRROR_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let symbol = env::var("MIRROR_SYMBOL").unwrap_or_else(|_| DEFAULT_SYMBOL.to_string());

        let max_table_len = parse_var("MIRROR_MAX_TABLE_LEN")?.unwrap_or(DEFAULT_MAX_TABLE_LEN);
        let connect_secs = parse_var("MIRROR_CONNECT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        let ready_secs = parse_var("MIRROR_READY_TIMEOUT_SECS")?.unwrap_or(DEFAULT_READY_TIMEOUT_SECS);

        let config = Self::new(endpoint, symbol)
            .with_credentials(non_empty_var("MIRROR_API_KEY"), non_empty_var("MIRROR_API_SECRET"))?
            .with_max_table_len(max_table_len)
            .with_connect_timeout(Duration::from_secs(connect_secs))
            .with_ready_timeout(Duration::from_secs(ready_secs));
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked before connecting.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| MirrorError::Config(format!("invalid endpoint `{}`: {}", self.endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(MirrorError::Config(format!(
                "endpoint scheme must be http(s) or ws(s), got `{}`",
                url.scheme()
            )));
        }
        if self.symbol.trim().is_empty() {
            return Err(MirrorError::Config("symbol must not be empty".into()));
        }
        if self.max_table_len == 0 {
            return Err(MirrorError::Config("max_table_len must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_SYMBOL)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| MirrorError::Config(format!("invalid {}=`{}`: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}
