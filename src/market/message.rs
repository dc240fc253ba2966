//! Typed feed messages.
//! One text frame from the feed decodes into exactly one `FeedMessage`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{MirrorError, Result};

/// One row of exchange state: field name -> string / number / bool / null.
pub type Record = Map<String, Value>;

/// Table mutation kinds carried in the `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Full table image; also carries the key schema.
    Partial,
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Partial => "partial",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "partial" => Ok(Action::Partial),
            "insert" => Ok(Action::Insert),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table-oriented message: snapshot or incremental mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMessage {
    pub table: String,
    pub action: Action,
    /// Only non-empty on `partial`.
    pub keys: Vec<String>,
    pub data: Vec<Record>,
}

impl TableMessage {
    pub fn new(table: impl Into<String>, action: Action, data: Vec<Record>) -> Self {
        Self {
            table: table.into(),
            action,
            keys: Vec::new(),
            data,
        }
    }

    pub fn partial<K: Into<String>>(
        table: impl Into<String>,
        keys: impl IntoIterator<Item = K>,
        data: Vec<Record>,
    ) -> Self {
        Self {
            table: table.into(),
            action: Action::Partial,
            keys: keys.into_iter().map(Into::into).collect(),
            data,
        }
    }

    pub fn insert(table: impl Into<String>, data: Vec<Record>) -> Self {
        Self::new(table, Action::Insert, data)
    }

    pub fn update(table: impl Into<String>, data: Vec<Record>) -> Self {
        Self::new(table, Action::Update, data)
    }

    pub fn delete(table: impl Into<String>, data: Vec<Record>) -> Self {
        Self::new(table, Action::Delete, data)
    }
}

/// Everything the feed can send us.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Table(TableMessage),
    /// Acknowledgement of a subscribe request.
    Subscribed { topic: String, success: bool },
    /// Acknowledgement of an unsubscribe request.
    Unsubscribed { topic: String, success: bool },
    /// Welcome banner sent right after the socket opens.
    Info(String),
    /// Error reply to a command (bad topic, auth failure, rate limit...).
    Error(String),
}

// Wire shape of every frame. All fields optional because control messages
// and table messages share one JSON object layout.
#[derive(Debug, Deserialize)]
struct RawMessage {
    table: Option<String>,
    action: Option<String>,
    keys: Option<Vec<String>>,
    data: Option<Vec<Record>>,
    subscribe: Option<Value>,
    unsubscribe: Option<Value>,
    success: Option<bool>,
    info: Option<String>,
    error: Option<String>,
}

impl FeedMessage {
    /// Decodes one text frame.
    ///
    /// Unknown actions come back as `MirrorError::UnknownAction`, frames that
    /// are neither table messages nor known control messages as
    /// `MirrorError::MalformedMessage`.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(text)?;

        if let Some(topic) = raw.subscribe {
            return Ok(FeedMessage::Subscribed {
                topic: topic_string(topic),
                success: raw.success.unwrap_or(false),
            });
        }
        if let Some(topic) = raw.unsubscribe {
            return Ok(FeedMessage::Unsubscribed {
                topic: topic_string(topic),
                success: raw.success.unwrap_or(false),
            });
        }
        if let Some(error) = raw.error {
            return Ok(FeedMessage::Error(error));
        }

        if let Some(action) = raw.action {
            let table = raw
                .table
                .ok_or_else(|| MirrorError::MalformedMessage(format!("`{action}` message without a table")))?;
            let action = action
                .parse::<Action>()
                .map_err(|action| MirrorError::UnknownAction {
                    table: table.clone(),
                    action,
                })?;
            return Ok(FeedMessage::Table(TableMessage {
                table,
                action,
                keys: raw.keys.unwrap_or_default(),
                data: raw.data.unwrap_or_default(),
            }));
        }

        if let Some(info) = raw.info {
            return Ok(FeedMessage::Info(info));
        }

        Err(MirrorError::MalformedMessage(truncate(text, 120)))
    }

    pub fn as_table(&self) -> Option<&TableMessage> {
        match self {
            FeedMessage::Table(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, FeedMessage::Table(_))
    }
}

impl From<TableMessage> for FeedMessage {
    fn from(msg: TableMessage) -> Self {
        FeedMessage::Table(msg)
    }
}

/// Turns a JSON array of objects into records, skipping anything that is not an object.
pub fn records_from(value: Value) -> Vec<Record> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Value::Object(map) => vec![map],
        _ => Vec::new(),
    }
}

/// Builds a record from field/value pairs.
pub fn record_of<I, K, V>(fields: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn topic_string(topic: Value) -> String {
    match topic {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
