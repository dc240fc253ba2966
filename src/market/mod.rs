//! Table feed: wire messages, the table store and its sync engine,
//! readiness tracking and the websocket transport.

pub mod auth;
pub mod candle;
pub mod identity;
pub mod message;
pub mod message_parser;
pub mod providers;
pub mod readiness;
pub mod store;
pub mod streams;
pub mod sync;
pub mod table;
pub mod timeframe;
pub mod views;
pub mod websocket_client;

// Re-exports for convenience
pub use auth::{ApiKeySigner, RequestSigner};
pub use candle::Candle;
pub use identity::{IdentityToken, KeyPart};
pub use message::{Action, FeedMessage, Record, TableMessage};
pub use message_parser::MessageParser;
pub use readiness::{FeedPhase, FeedStatus, ReadinessGroup, ReadinessTracker};
pub use store::{TableStats, TableStore};
pub use streams::Topic;
pub use sync::Applied;
pub use table::{RowId, Table, TablePolicy};
pub use timeframe::Timeframe;
pub use views::{Instrument, Ticker};
pub use websocket_client::{FeedClient, FeedConnection, FeedEvent};

// Re-export provider convenience functions
pub use providers::new_bitmex_client;
