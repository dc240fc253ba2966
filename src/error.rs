//! Error types shared by the table store, the sync engine and the feed client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

/// Everything that can go wrong while mirroring the feed.
///
/// Variants fall in three groups:
/// - construction / connection errors, returned straight to the caller
/// - per-message errors (protocol errors and consistency misses), logged by the
///   feed pump and then dropped so the next message is still applied
/// - query errors (`NotReady`, `MissingField`) returned by the accessors
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out after {0:?} waiting for the websocket to connect")]
    ConnectTimeout(std::time::Duration),

    #[error("table `{0}` has not received a snapshot yet")]
    NotReady(String),

    #[error("table `{0}` has a snapshot but no records")]
    EmptyTable(String),

    #[error("timed out after {waited:?} waiting for {group} snapshots")]
    ReadyTimeout {
        group: &'static str,
        waited: std::time::Duration,
    },

    #[error("table `{table}` record has no usable `{field}` field")]
    MissingField { table: String, field: String },

    #[error("unknown action `{action}` for table `{table}`")]
    UnknownAction { table: String, action: String },

    #[error("malformed feed message: {0}")]
    MalformedMessage(String),

    #[error("table `{table}` row is missing key field `{field}`")]
    MissingKeyField { table: String, field: String },

    #[error("table `{0}` has no key schema, rows cannot be matched")]
    KeylessTable(String),

    // Rows before `applied` stay applied; the rest of the message is dropped.
    #[error("table `{table}`: no record matches row {applied} of {total}, dropping the rest of the message")]
    ConsistencyMiss {
        table: String,
        applied: usize,
        total: usize,
    },

    #[error("feed closed: {0}")]
    Closed(String),

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MirrorError {
    /// True for errors scoped to a single feed message.
    /// The pump logs these and carries on with the next message.
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            MirrorError::UnknownAction { .. }
                | MirrorError::MalformedMessage(_)
                | MirrorError::MissingKeyField { .. }
                | MirrorError::KeylessTable(_)
                | MirrorError::ConsistencyMiss { .. }
                | MirrorError::Json(_)
        )
    }

    pub fn is_consistency_miss(&self) -> bool {
        matches!(self, MirrorError::ConsistencyMiss { .. })
    }
}
