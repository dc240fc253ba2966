//! Auth headers for the websocket upgrade request.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Credentials;
use crate::error::{MirrorError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Produces the headers that authenticate a request.
/// The mirror never looks inside; it only forwards them to the transport.
pub trait RequestSigner: Send + Sync + 'static {
    fn auth_headers(&self, verb: &str, path: &str) -> Result<Vec<(String, String)>>;
}

/// API-key scheme: `api-expires`, `api-signature`, `api-key`.
///
/// The signature is hex(HMAC-SHA256(secret, verb + path + expires + body)),
/// with an empty body for the upgrade request.
#[derive(Debug, Clone)]
pub struct ApiKeySigner {
    credentials: Credentials,
    valid_for: Duration,
}

impl ApiKeySigner {
    pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(60);

    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            valid_for: Self::DEFAULT_VALIDITY,
        }
    }

    pub fn with_validity(mut self, valid_for: Duration) -> Self {
        self.valid_for = valid_for;
        self
    }

    pub fn sign(&self, verb: &str, path: &str, expires: u64, body: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| MirrorError::Config(format!("unusable api secret: {}", e)))?;
        mac.update(format!("{}{}{}{}", verb, path, expires, body).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn expires_at(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (now + self.valid_for).as_secs()
    }
}

impl RequestSigner for ApiKeySigner {
    fn auth_headers(&self, verb: &str, path: &str) -> Result<Vec<(String, String)>> {
        let expires = self.expires_at();
        let signature = self.sign(verb, path, expires, "")?;
        Ok(vec![
            ("api-expires".to_string(), expires.to_string()),
            ("api-signature".to_string(), signature),
            ("api-key".to_string(), self.credentials.api_key.clone()),
        ])
    }
}
