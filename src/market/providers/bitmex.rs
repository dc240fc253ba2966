//! BitMEX realtime feed.
//! Table-oriented protocol: `partial` / `insert` / `update` / `delete` per table.

use serde_json::json;
use url::Url;

use crate::error::{MirrorError, Result};
use crate::market::message::FeedMessage;
use crate::market::message_parser::MessageParser;
use crate::market::websocket_client::FeedClient;

pub const BITMEX_ENDPOINT: &str = "https://www.bitmex.com/api/v1";
pub const BITMEX_TESTNET_ENDPOINT: &str = "https://testnet.bitmex.com/api/v1";

const REALTIME_PATH: &str = "/realtime";

/// BitMEX-specific message parser.
#[derive(Debug, Clone, Default)]
pub struct BitmexParser;

impl BitmexParser {
    pub fn new() -> Self {
        Self
    }

    fn command(op: &str, topics: &[String]) -> String {
        json!({ "op": op, "args": topics }).to_string()
    }
}

impl MessageParser for BitmexParser {
    fn name(&self) -> &'static str {
        "BitMEX"
    }

    /// `https://host/api/v1` -> `wss://host/realtime?subscribe=a:X,b:X,...`
    fn connect_url(&self, endpoint: &str, topics: &[String]) -> Result<String> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| MirrorError::Config(format!("invalid endpoint `{}`: {}", endpoint, e)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(MirrorError::Config(format!(
                    "unsupported endpoint scheme `{}`",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| MirrorError::Config(format!("cannot switch `{}` to {}", endpoint, scheme)))?;
        url.set_path(REALTIME_PATH);
        if topics.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&format!("subscribe={}", topics.join(","))));
        }
        Ok(url.into())
    }

    fn format_subscribe(&self, topics: &[String]) -> String {
        Self::command("subscribe", topics)
    }

    fn format_unsubscribe(&self, topics: &[String]) -> String {
        Self::command("unsubscribe", topics)
    }

    fn parse_message(&self, msg: &str) -> Result<FeedMessage> {
        FeedMessage::from_json(msg)
    }
}

pub type BitmexClient = FeedClient<BitmexParser>;

pub fn new_bitmex_client() -> BitmexClient {
    FeedClient::new(BitmexParser::new())
}
