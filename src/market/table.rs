//! A single mirrored table: key schema, ordered records and the identity index.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::warn;

use crate::error::{MirrorError, Result};
use crate::market::identity::{IdentityToken, identities, identity_of};
use crate::market::message::Record;

// Design: records live in a BTreeMap keyed by a monotonically increasing
// sequence number. Iteration order is arrival order, removal from the middle
// is O(log n), and the identity index can point at a stable sequence number
// instead of a Vec position that shifts on every delete.

/// Per-table behaviour fixed when the table is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePolicy {
    /// Subject to the growth bounder after inserts.
    pub bounded: bool,
    /// Numeric field that, once <= 0 after an update, evicts the record.
    pub evict_when_exhausted: Option<&'static str>,
}

impl TablePolicy {
    pub const BOUNDED: TablePolicy = TablePolicy {
        bounded: true,
        evict_when_exhausted: None,
    };

    pub const UNBOUNDED: TablePolicy = TablePolicy {
        bounded: false,
        evict_when_exhausted: None,
    };

    /// True when the exhaustion field has dropped to zero or below.
    /// Records without that field, or with a non-numeric value, are never exhausted.
    pub fn is_exhausted(&self, record: &Record) -> bool {
        let Some(field) = self.evict_when_exhausted else {
            return false;
        };
        record
            .get(field)
            .and_then(Value::as_f64)
            .is_some_and(|qty| qty <= 0.0)
    }
}

impl Default for TablePolicy {
    fn default() -> Self {
        TablePolicy::BOUNDED
    }
}

#[derive(Debug, Clone)]
struct Row {
    token: Option<IdentityToken>,
    record: Record,
}

/// Stable handle to a stored record, valid until that record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(u64);

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    keys: Vec<String>,
    policy: TablePolicy,
    rows: BTreeMap<u64, Row>,
    // token -> row sequence numbers, oldest first. More than one entry only
    // when the feed inserted a duplicate identity.
    index: HashMap<IdentityToken, Vec<u64>>,
    next_seq: u64,
}

impl Table {
    pub fn new(name: impl Into<String>, keys: Vec<String>, policy: TablePolicy) -> Self {
        Self {
            name: name.into(),
            keys,
            policy,
            rows: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn policy(&self) -> TablePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records oldest to newest.
    pub fn records(&self) -> impl DoubleEndedIterator<Item = &Record> + '_ {
        self.rows.values().map(|row| &row.record)
    }

    pub fn first(&self) -> Option<&Record> {
        self.rows.values().next().map(|row| &row.record)
    }

    /// Newest record.
    pub fn last(&self) -> Option<&Record> {
        self.rows.values().next_back().map(|row| &row.record)
    }

    pub fn to_vec(&self) -> Vec<Record> {
        self.records().cloned().collect()
    }

    pub fn get(&self, id: RowId) -> Option<&Record> {
        self.rows.get(&id.0).map(|row| &row.record)
    }

    /// Replaces the key schema. When it actually changes, every stored
    /// record is re-keyed so the index keeps matching the schema in force.
    /// Returns true if the schema changed.
    pub fn set_keys(&mut self, keys: Vec<String>) -> bool {
        if keys == self.keys {
            return false;
        }
        warn!(table = %self.name, old = ?self.keys, new = ?keys, "key schema changed, re-keying stored records");
        self.keys = keys;
        self.reindex();
        true
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (&seq, row) in self.rows.iter_mut() {
            row.token = match identity_of(&self.name, &self.keys, &row.record) {
                Ok(token) => token,
                Err(e) => {
                    warn!(table = %self.name, error = %e, "stored record cannot be keyed under new schema");
                    None
                }
            };
            if let Some(token) = &row.token {
                self.index.entry(token.clone()).or_default().push(seq);
            }
        }
    }

    /// Appends rows in order, keying each one under the current schema.
    ///
    /// Tokens are computed for the whole batch before anything is stored, so
    /// a row missing a key field rejects the batch without a partial append.
    /// Duplicate identities are stored as-is; lookups return the oldest.
    pub fn append(&mut self, data: Vec<Record>) -> Result<usize> {
        let tokens = identities(&self.name, &self.keys, &data)?;
        Ok(self.append_keyed(data, tokens))
    }

    /// Appends rows whose tokens were already computed under this table's
    /// key schema, one token per row.
    pub(crate) fn append_keyed(&mut self, data: Vec<Record>, tokens: Vec<Option<IdentityToken>>) -> usize {
        debug_assert_eq!(data.len(), tokens.len());
        let count = data.len();
        for (record, token) in data.into_iter().zip(tokens) {
            let seq = self.next_seq;
            self.next_seq += 1;
            if let Some(token) = &token {
                self.index.entry(token.clone()).or_default().push(seq);
            }
            self.rows.insert(seq, Row { token, record });
        }
        count
    }

    /// Finds the stored record with the same identity as `candidate`.
    pub fn find(&self, candidate: &Record) -> Result<Option<RowId>> {
        if self.keys.is_empty() {
            return Err(MirrorError::KeylessTable(self.name.clone()));
        }
        let Some(token) = identity_of(&self.name, &self.keys, candidate)? else {
            return Ok(None);
        };
        Ok(self
            .index
            .get(&token)
            .and_then(|seqs| seqs.first())
            .map(|&seq| RowId(seq)))
    }

    /// Shallow merge: fields in `patch` overwrite, all others are kept.
    /// Identity is not recomputed.
    pub fn merge(&mut self, id: RowId, patch: Record) -> Option<&Record> {
        let row = self.rows.get_mut(&id.0)?;
        for (field, value) in patch {
            row.record.insert(field, value);
        }
        Some(&row.record)
    }

    pub fn remove(&mut self, id: RowId) -> Option<Record> {
        let row = self.rows.remove(&id.0)?;
        if let Some(token) = row.token {
            self.unindex(&token, id.0);
        }
        Some(row.record)
    }

    fn unindex(&mut self, token: &IdentityToken, seq: u64) {
        if let Some(seqs) = self.index.get_mut(token) {
            seqs.retain(|&s| s != seq);
            if seqs.is_empty() {
                self.index.remove(token);
            }
        }
    }

    /// Growth bounder. Once the table exceeds `max_len`, drops the oldest
    /// `max_len / 2` records, or more if a single large insert would
    /// otherwise leave it above `max_len`. Returns the number dropped.
    pub fn bound(&mut self, max_len: usize) -> usize {
        if !self.policy.bounded || self.rows.len() <= max_len {
            return 0;
        }
        let excess = self.rows.len() - max_len;
        let drop = (max_len / 2).max(excess);
        for _ in 0..drop {
            let Some((seq, row)) = self.rows.pop_first() else {
                break;
            };
            if let Some(token) = row.token {
                self.unindex(&token, seq);
            }
        }
        drop
    }

    /// Distinct identity tokens currently held. Equals `len()` for a keyed
    /// table without duplicates.
    pub fn distinct_identities(&self) -> usize {
        self.index.len()
    }

    /// Panics if the identity index and the record sequence disagree.
    pub fn assert_invariants(&self) {
        let mut indexed = 0;
        for (token, seqs) in &self.index {
            assert!(!seqs.is_empty(), "{}: empty index entry", self.name);
            assert!(seqs.windows(2).all(|w| w[0] < w[1]), "{}: index entry out of order", self.name);
            for seq in seqs {
                let row = self
                    .rows
                    .get(seq)
                    .unwrap_or_else(|| panic!("{}: index points at missing row {seq}", self.name));
                assert_eq!(row.token.as_ref(), Some(token), "{}: token mismatch at row {seq}", self.name);
            }
            indexed += seqs.len();
        }
        let tokened = self.rows.values().filter(|row| row.token.is_some()).count();
        assert_eq!(indexed, tokened, "{}: unindexed rows", self.name);
        if self.keys.is_empty() {
            assert!(self.index.is_empty(), "{}: keyless table has an index", self.name);
        }
    }
}
