//! Composite record identity derived from a table's key schema.

use serde_json::Value;

use crate::error::{MirrorError, Result};
use crate::market::message::Record;

/// One key field's value. Keeps the JSON kind so `"1"` and `1` stay distinct,
/// exactly like a field-by-field comparison would.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(String),
    // serde_json's own rendering; `1` and `1.0` differ, as they do under `Value::eq`
    Num(String),
    Bool(bool),
    Null,
    // Arrays / objects never show up as keys on the feed, but stay matchable.
    Other(String),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => KeyPart::Str(s.clone()),
            Value::Number(n) => KeyPart::Num(n.to_string()),
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Null => KeyPart::Null,
            other => KeyPart::Other(other.to_string()),
        }
    }
}

/// Tuple of key values in schema order.
/// Two records with equal tokens are the same logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityToken(Box<[KeyPart]>);

impl IdentityToken {
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

/// Computes the identity token for `record` under `keys`.
///
/// Returns `Ok(None)` for keyless tables (append-only, no matching).
/// A record missing any key field is a protocol error.
pub fn identity_of(table: &str, keys: &[String], record: &Record) -> Result<Option<IdentityToken>> {
    if keys.is_empty() {
        return Ok(None);
    }

    let parts = keys
        .iter()
        .map(|key| {
            record
                .get(key)
                .map(KeyPart::from)
                .ok_or_else(|| MirrorError::MissingKeyField {
                    table: table.to_string(),
                    field: key.clone(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(IdentityToken(parts.into_boxed_slice())))
}

/// Tokens for a whole batch, in row order. Fails on the first row missing a
/// key field, before anything has been stored.
pub fn identities(table: &str, keys: &[String], data: &[Record]) -> Result<Vec<Option<IdentityToken>>> {
    data.iter().map(|record| identity_of(table, keys, record)).collect()
}
