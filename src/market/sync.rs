//! Sync engine: applies one table message to the store.
//!
//! Per-table state machine: a table is absent until its first `partial`,
//! live afterwards. Mutations against an absent table are dropped silently
//! since the feed may stream them before the snapshot arrives.

use tracing::debug;

use crate::error::{MirrorError, Result};
use crate::market::identity::identities;
use crate::market::message::{Action, TableMessage};
use crate::market::store::TableStore;

/// What a successfully applied message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Snapshot { rows: usize },
    Inserted { rows: usize, truncated: usize },
    Updated { rows: usize, evicted: usize },
    Deleted { rows: usize },
    /// Mutation for a table without a snapshot; nothing changed.
    Skipped,
}

impl TableStore {
    /// Applies `msg` to the store.
    ///
    /// Errors are per-message: rows applied before the failing row stay
    /// applied and the store remains consistent.
    pub fn apply(&mut self, msg: TableMessage) -> Result<Applied> {
        self.note_message(&msg.table, msg.data.len());
        debug!(table = %msg.table, action = %msg.action, rows = msg.data.len(), "applying");

        match msg.action {
            Action::Partial => self.apply_partial(msg),
            Action::Insert => self.apply_insert(msg),
            Action::Update => self.apply_update(msg),
            Action::Delete => self.apply_delete(msg),
        }
    }

    // Repeated partials overwrite the key schema and append their rows to
    // what is already stored. The whole batch is keyed first: a rejected
    // partial neither creates the table nor touches its schema.
    fn apply_partial(&mut self, msg: TableMessage) -> Result<Applied> {
        let tokens = identities(&msg.table, &msg.keys, &msg.data)?;
        let table = self.open_snapshot(&msg.table, msg.keys);
        let rows = table.append_keyed(msg.data, tokens);
        Ok(Applied::Snapshot { rows })
    }

    fn apply_insert(&mut self, msg: TableMessage) -> Result<Applied> {
        let max_len = self.max_table_len();
        let Some(table) = self.get_mut(&msg.table) else {
            return Ok(Applied::Skipped);
        };
        let rows = table.append(msg.data)?;
        let truncated = table.bound(max_len);
        if truncated > 0 {
            debug!(table = %msg.table, truncated, len = table.len(), "table bounded");
        }
        Ok(Applied::Inserted { rows, truncated })
    }

    // The first row that matches nothing ends the message: later rows are
    // not applied, even if they would match.
    fn apply_update(&mut self, msg: TableMessage) -> Result<Applied> {
        let Some(table) = self.get_mut(&msg.table) else {
            return Ok(Applied::Skipped);
        };
        let policy = table.policy();
        let total = msg.data.len();
        let mut evicted = 0;

        for (applied, row) in msg.data.into_iter().enumerate() {
            let Some(id) = table.find(&row)? else {
                return Err(miss(&msg.table, applied, total));
            };
            let exhausted = table
                .merge(id, row)
                .is_some_and(|merged| policy.is_exhausted(merged));
            if exhausted {
                table.remove(id);
                evicted += 1;
            }
        }
        Ok(Applied::Updated {
            rows: total,
            evicted,
        })
    }

    fn apply_delete(&mut self, msg: TableMessage) -> Result<Applied> {
        let Some(table) = self.get_mut(&msg.table) else {
            return Ok(Applied::Skipped);
        };
        let total = msg.data.len();

        for (applied, row) in msg.data.iter().enumerate() {
            let Some(id) = table.find(row)? else {
                return Err(miss(&msg.table, applied, total));
            };
            table.remove(id);
        }
        Ok(Applied::Deleted { rows: total })
    }
}

fn miss(table: &str, applied: usize, total: usize) -> MirrorError {
    MirrorError::ConsistencyMiss {
        table: table.to_string(),
        applied,
        total,
    }
}
