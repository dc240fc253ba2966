//! Readiness tracking: which groups of tables have their initial snapshot,
//! and what state the feed connection is in.
//!
//! The writer republishes a `FeedStatus` after every applied message; waiters
//! sleep on a `watch` channel until their group is ready, the feed ends, or
//! their timeout expires.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::error::{MirrorError, Result};
use crate::market::store::{
    INSTRUMENT_TABLE, MARGIN_TABLE, ORDER_BOOK_TABLE, ORDER_TABLE, POSITION_TABLE, QUOTE_TABLE,
    TRADE_TABLE, TableStore,
};

/// A named set of tables that must all have a snapshot before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessGroup {
    MarketData,
    /// Private tables; only streamed when credentials were supplied.
    AccountData,
}

impl ReadinessGroup {
    pub fn tables(&self) -> &'static [&'static str] {
        match self {
            ReadinessGroup::MarketData => &[INSTRUMENT_TABLE, TRADE_TABLE, QUOTE_TABLE, ORDER_BOOK_TABLE],
            ReadinessGroup::AccountData => &[MARGIN_TABLE, POSITION_TABLE, ORDER_TABLE],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessGroup::MarketData => "market data",
            ReadinessGroup::AccountData => "account data",
        }
    }

    pub fn is_ready(&self, store: &TableStore) -> bool {
        store.has_snapshots(self.tables())
    }
}

impl fmt::Display for ReadinessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle as seen by the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPhase {
    Connecting,
    Open,
    /// Closed by us or by the server.
    Closed(String),
    /// Fatal transport error.
    Failed(String),
}

impl FeedPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedPhase::Closed(_) | FeedPhase::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStatus {
    pub phase: FeedPhase,
    pub market_ready: bool,
    pub account_ready: bool,
}

impl FeedStatus {
    pub fn is_ready(&self, group: ReadinessGroup) -> bool {
        match group {
            ReadinessGroup::MarketData => self.market_ready,
            ReadinessGroup::AccountData => self.account_ready,
        }
    }
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            phase: FeedPhase::Connecting,
            market_ready: false,
            account_ready: false,
        }
    }
}

#[derive(Debug)]
pub struct ReadinessTracker {
    status: watch::Sender<FeedStatus>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        let (status, _) = watch::channel(FeedStatus::default());
        Self { status }
    }

    pub fn current(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    /// Re-evaluates both predicates against `store`. Waiters are only woken
    /// when a flag actually flips.
    pub fn observe(&self, store: &TableStore) {
        let market = ReadinessGroup::MarketData.is_ready(store);
        let account = ReadinessGroup::AccountData.is_ready(store);

        self.status.send_if_modified(|status| {
            let mut changed = false;
            if status.market_ready != market {
                status.market_ready = market;
                changed = true;
                info!("market data tables ready");
            }
            if status.account_ready != account {
                status.account_ready = account;
                changed = true;
                info!("account data tables ready");
            }
            changed
        });
    }

    /// Moves to `phase`. Terminal phases are sticky: once closed or failed,
    /// later phase changes are ignored.
    pub fn set_phase(&self, phase: FeedPhase) {
        self.status.send_if_modified(|status| {
            if status.phase.is_terminal() || status.phase == phase {
                return false;
            }
            status.phase = phase;
            true
        });
    }

    /// Waits until `group` is ready.
    ///
    /// Fails with `ReadyTimeout` after `timeout`, or with `Closed` if the
    /// feed ends first.
    pub async fn wait_ready(&self, group: ReadinessGroup, timeout: Duration) -> Result<()> {
        let mut rx = self.status.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|status| status.is_ready(group) || status.phase.is_terminal()),
        )
        .await;

        match waited {
            Err(_) => Err(MirrorError::ReadyTimeout {
                group: group.as_str(),
                waited: timeout,
            }),
            // sender lives as long as self; kept for completeness
            Ok(Err(_)) => Err(MirrorError::Closed("status channel dropped".into())),
            Ok(Ok(status)) => {
                if status.is_ready(group) {
                    Ok(())
                } else {
                    Err(MirrorError::Closed(match &status.phase {
                        FeedPhase::Closed(reason) | FeedPhase::Failed(reason) => reason.clone(),
                        other => format!("{:?}", other),
                    }))
                }
            }
        }
    }
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::message::TableMessage;
    use std::sync::Arc;

    fn snapshot(store: &mut TableStore, table: &str) {
        store.apply(TableMessage::partial(table, Vec::<String>::new(), Vec::new())).unwrap();
    }

    #[test]
    fn test_group_predicates() {
        let mut store = TableStore::default();
        assert!(!ReadinessGroup::MarketData.is_ready(&store));

        for table in [INSTRUMENT_TABLE, TRADE_TABLE, QUOTE_TABLE] {
            snapshot(&mut store, table);
        }
        assert!(!ReadinessGroup::MarketData.is_ready(&store));
        snapshot(&mut store, ORDER_BOOK_TABLE);
        assert!(ReadinessGroup::MarketData.is_ready(&store));
        assert!(!ReadinessGroup::AccountData.is_ready(&store));

        for table in [MARGIN_TABLE, POSITION_TABLE, ORDER_TABLE] {
            snapshot(&mut store, table);
        }
        assert!(ReadinessGroup::AccountData.is_ready(&store));
    }

    #[test]
    fn test_terminal_phase_is_sticky() {
        let tracker = ReadinessTracker::new();
        tracker.set_phase(FeedPhase::Open);
        tracker.set_phase(FeedPhase::Failed("boom".into()));
        tracker.set_phase(FeedPhase::Open);
        assert_eq!(tracker.current().phase, FeedPhase::Failed("boom".into()));
    }

    #[tokio::test]
    async fn test_wait_returns_once_ready() {
        let tracker = Arc::new(ReadinessTracker::new());
        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker
                    .wait_ready(ReadinessGroup::MarketData, Duration::from_secs(5))
                    .await
            })
        };

        let mut store = TableStore::default();
        for table in ReadinessGroup::MarketData.tables() {
            snapshot(&mut store, table);
        }
        tracker.observe(&store);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let tracker = ReadinessTracker::new();
        let result = tracker
            .wait_ready(ReadinessGroup::AccountData, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(MirrorError::ReadyTimeout { group: "account data", .. })));
    }

    #[tokio::test]
    async fn test_wait_released_on_close() {
        let tracker = Arc::new(ReadinessTracker::new());
        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker
                    .wait_ready(ReadinessGroup::MarketData, Duration::from_secs(30))
                    .await
            })
        };
        tokio::task::yield_now().await;
        tracker.set_phase(FeedPhase::Closed("shutdown".into()));

        match waiter.await.unwrap() {
            Err(MirrorError::Closed(reason)) => assert_eq!(reason, "shutdown"),
            other => panic!("expected Closed, got {:?}", other),
        }
    }
}
