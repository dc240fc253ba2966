//! MessageParser trait for exchange-specific wire handling.

use crate::error::Result;
use crate::market::message::FeedMessage;

// This trait keeps FeedClient and the sync engine exchange-agnostic.
// An exchange supplies its URL layout, command format and frame decoding;
// everything downstream only sees FeedMessage.

/// Trait for exchange-specific message parsing and formatting.
pub trait MessageParser: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Websocket URL for `endpoint`, with `topics` (already symbol-scoped)
    /// requested in the query string where the exchange allows it.
    fn connect_url(&self, endpoint: &str, topics: &[String]) -> Result<String>;

    /// Verb and path covered by the auth signature.
    fn auth_target(&self) -> (&'static str, &'static str) {
        ("GET", "/realtime")
    }

    // Each exchange has its own JSON for subscribe/unsubscribe
    fn format_subscribe(&self, topics: &[String]) -> String;
    fn format_unsubscribe(&self, topics: &[String]) -> String;

    /// Decodes one text frame. Control frames come back as the matching
    /// `FeedMessage` variant; errors are protocol errors for this frame only.
    fn parse_message(&self, msg: &str) -> Result<FeedMessage>;
}
