//! The set of mirrored tables, keyed by table name.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use crate::config::DEFAULT_MAX_TABLE_LEN;
use crate::market::message::Record;
use crate::market::table::{Table, TablePolicy};

pub const INSTRUMENT_TABLE: &str = "instrument";
pub const TRADE_TABLE: &str = "trade";
pub const QUOTE_TABLE: &str = "quote";
pub const ORDER_BOOK_TABLE: &str = "orderBookL2";
pub const ORDER_TABLE: &str = "order";
pub const POSITION_TABLE: &str = "position";
pub const MARGIN_TABLE: &str = "margin";

/// Field holding an order's remaining quantity.
pub const LEAVES_QTY_FIELD: &str = "leavesQty";

/// Receive counters for one table name, kept even for tables that never got a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Action messages received (partial / insert / update / delete).
    pub messages: u64,
    /// Data rows carried by those messages.
    pub rows: u64,
}

/// All mirrored tables plus the per-table policies applied when they are created.
#[derive(Debug, Clone)]
pub struct TableStore {
    tables: HashMap<String, Table>,
    policies: HashMap<String, TablePolicy>,
    stats: HashMap<String, TableStats>,
    max_table_len: usize,
}

impl TableStore {
    /// Store with the default policies: orders are unbounded and evicted
    /// once fully filled or cancelled, the order book is unbounded, every
    /// other table is bounded to `max_table_len`.
    pub fn new(max_table_len: usize) -> Self {
        let policies = HashMap::from([
            (
                ORDER_TABLE.to_string(),
                TablePolicy {
                    bounded: false,
                    evict_when_exhausted: Some(LEAVES_QTY_FIELD),
                },
            ),
            (ORDER_BOOK_TABLE.to_string(), TablePolicy::UNBOUNDED),
        ]);

        Self {
            tables: HashMap::new(),
            policies,
            stats: HashMap::new(),
            max_table_len,
        }
    }

    /// Overrides the policy for `table`. Only affects tables created afterwards.
    #[cfg(test)]
    pub(crate) fn with_policy(mut self, table: impl Into<String>, policy: TablePolicy) -> Self {
        self.policies.insert(table.into(), policy);
        self
    }

    pub fn policy_for(&self, table: &str) -> TablePolicy {
        self.policies.get(table).copied().unwrap_or_default()
    }

    pub fn max_table_len(&self) -> usize {
        self.max_table_len
    }

    pub fn get(&self, table: &str) -> Option<&Table> {
        self.tables.get(table)
    }

    pub(crate) fn get_mut(&mut self, table: &str) -> Option<&mut Table> {
        self.tables.get_mut(table)
    }

    /// True once `table` has received its first snapshot.
    pub fn has_snapshot(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_snapshots(&self, tables: &[&str]) -> bool {
        tables.iter().all(|t| self.has_snapshot(t))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> + '_ {
        self.tables.values()
    }

    /// Returns the table, creating it with `keys` if absent, else replacing its keys.
    pub(crate) fn open_snapshot(&mut self, table: &str, keys: Vec<String>) -> &mut Table {
        let policy = self.policy_for(table);
        match self.tables.entry(table.to_string()) {
            Entry::Vacant(slot) => slot.insert(Table::new(table, keys, policy)),
            Entry::Occupied(slot) => {
                let existing = slot.into_mut();
                existing.set_keys(keys);
                existing
            }
        }
    }

    pub(crate) fn note_message(&mut self, table: &str, rows: usize) {
        let stats = self.stats.entry(table.to_string()).or_default();
        stats.messages += 1;
        stats.rows += rows as u64;
    }

    pub fn stats(&self) -> BTreeMap<String, TableStats> {
        self.stats.iter().map(|(name, s)| (name.clone(), *s)).collect()
    }

    /// Deep copy of every table's records.
    pub fn snapshot(&self) -> HashMap<String, Vec<Record>> {
        self.tables
            .iter()
            .map(|(name, table)| (name.clone(), table.to_vec()))
            .collect()
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TABLE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policies() {
        let store = TableStore::default();
        assert_eq!(store.max_table_len(), 200);

        let order = store.policy_for(ORDER_TABLE);
        assert!(!order.bounded);
        assert_eq!(order.evict_when_exhausted, Some(LEAVES_QTY_FIELD));

        assert_eq!(store.policy_for(ORDER_BOOK_TABLE), TablePolicy::UNBOUNDED);
        assert_eq!(store.policy_for(TRADE_TABLE), TablePolicy::BOUNDED);
        assert_eq!(store.policy_for("tradeBin1m"), TablePolicy::BOUNDED);
    }

    #[test]
    fn test_policy_override() {
        let store = TableStore::new(50).with_policy("quote", TablePolicy::UNBOUNDED);
        assert_eq!(store.policy_for(QUOTE_TABLE), TablePolicy::UNBOUNDED);
        assert_eq!(store.max_table_len(), 50);
    }

    #[test]
    fn test_open_snapshot_creates_once() {
        let mut store = TableStore::default();
        assert!(!store.has_snapshot(TRADE_TABLE));

        store.open_snapshot(TRADE_TABLE, Vec::new());
        store.open_snapshot(QUOTE_TABLE, vec!["symbol".into()]);
        assert!(store.has_snapshots(&[TRADE_TABLE, QUOTE_TABLE]));
        assert!(!store.has_snapshots(&[TRADE_TABLE, ORDER_TABLE]));
        assert_eq!(store.table_names(), vec!["quote".to_string(), "trade".to_string()]);

        let quote = store.open_snapshot(QUOTE_TABLE, vec!["symbol".into(), "timestamp".into()]);
        assert_eq!(quote.keys(), &["symbol".to_string(), "timestamp".to_string()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_stats_are_counted_per_table() {
        let mut store = TableStore::default();
        store.note_message(TRADE_TABLE, 3);
        store.note_message(TRADE_TABLE, 2);
        store.note_message(ORDER_TABLE, 1);

        let stats = store.stats();
        assert_eq!(stats[TRADE_TABLE], TableStats { messages: 2, rows: 5 });
        assert_eq!(stats[ORDER_TABLE], TableStats { messages: 1, rows: 1 });
    }
}
