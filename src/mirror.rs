//! The mirror: a shared table store, fed by one writer, read by many.
//!
//! The pump task is the only thing that mutates the store once connected.
//! Readers take a short read lock per accessor call and get owned copies
//! back, so they never observe a half-applied message.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::market::auth::ApiKeySigner;
use crate::market::candle::Candle;
use crate::market::message::{FeedMessage, Record};
use crate::market::message_parser::MessageParser;
use crate::market::providers::bitmex::new_bitmex_client;
use crate::market::readiness::{FeedPhase, FeedStatus, ReadinessGroup, ReadinessTracker};
use crate::market::store::{TableStats, TableStore};
use crate::market::streams::Topic;
use crate::market::sync::Applied;
use crate::market::timeframe::Timeframe;
use crate::market::views::{self, Instrument, Ticker};
use crate::market::websocket_client::{FeedClient, FeedConnection, FeedEvent};

struct Shared {
    config: MirrorConfig,
    store: RwLock<TableStore>,
    readiness: ReadinessTracker,
    connection: Mutex<Option<Arc<FeedConnection>>>,
}

/// Cheap to clone; all clones see the same tables.
#[derive(Clone)]
pub struct Mirror {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("symbol", &self.shared.config.symbol)
            .field("status", &self.status())
            .finish()
    }
}

impl Mirror {
    /// A detached mirror: validated config, empty store, no connection.
    /// Messages are fed in through [`Mirror::apply`].
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate()?;
        let store = TableStore::new(config.max_table_len);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                store: RwLock::new(store),
                readiness: ReadinessTracker::new(),
                connection: Mutex::new(None),
            }),
        })
    }

    /// Connects to the configured BitMEX endpoint and returns once the
    /// market data tables (and the account tables, with credentials) have
    /// their initial snapshots.
    pub async fn connect(config: MirrorConfig) -> Result<Self> {
        let client = new_bitmex_client().with_connect_timeout(config.connect_timeout);
        Self::connect_with(config, client).await
    }

    /// Same as [`Mirror::connect`] over any protocol.
    pub async fn connect_with<P: MessageParser>(config: MirrorConfig, client: FeedClient<P>) -> Result<Self> {
        let mirror = Self::new(config)?;
        let config = &mirror.shared.config;

        let client = match &config.credentials {
            Some(credentials) if !client.has_signer() => client.with_signer(ApiKeySigner::new(credentials.clone())),
            _ => client,
        };

        // Without credentials the private topics are refused by the server;
        // the refusals arrive as error frames and are only logged.
        let topics: Vec<String> = Topic::defaults()
            .iter()
            .map(|topic| topic.scoped(&config.symbol))
            .collect();

        let (connection, events) = match client.connect(&config.endpoint, &topics).await {
            Ok(pair) => pair,
            Err(e) => {
                mirror.shared.readiness.set_phase(FeedPhase::Failed(e.to_string()));
                return Err(e);
            }
        };
        let shutdown = connection.shutdown_signal();
        *mirror.shared.connection.lock() = Some(Arc::new(connection));
        tokio::spawn(pump(Arc::downgrade(&mirror.shared), events, shutdown));

        let ready_timeout = config.ready_timeout;
        let mut groups = vec![ReadinessGroup::MarketData];
        if config.has_credentials() {
            groups.push(ReadinessGroup::AccountData);
        }
        for group in groups {
            if let Err(e) = mirror.wait_ready(group, ready_timeout).await {
                error!("{} not ready: {}", group, e);
                mirror.shutdown();
                return Err(e);
            }
        }

        info!("Connected to {} for {}", config.endpoint, config.symbol);
        Ok(mirror)
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.shared.config
    }

    pub fn symbol(&self) -> &str {
        &self.shared.config.symbol
    }

    /// Applies one decoded message. This is the single write path; the pump
    /// calls it for every frame and tests can call it directly.
    ///
    /// Control messages are logged and return `Ok(None)`.
    pub fn apply(&self, message: FeedMessage) -> Result<Option<Applied>> {
        match message {
            FeedMessage::Table(table_message) => {
                let mut store = self.shared.store.write();
                let applied = store.apply(table_message);
                // status published while the lock is held so it matches the tables
                self.shared.readiness.observe(&store);
                applied.map(Some)
            }
            FeedMessage::Subscribed { topic, success } => {
                if success {
                    debug!("Subscribed to {}", topic);
                } else {
                    warn!("Subscription to {} rejected", topic);
                }
                Ok(None)
            }
            FeedMessage::Unsubscribed { topic, success } => {
                debug!("Unsubscribed from {} (success: {})", topic, success);
                Ok(None)
            }
            FeedMessage::Info(info) => {
                info!("{}", info);
                Ok(None)
            }
            FeedMessage::Error(message) => {
                error!("Feed error: {}", message);
                Ok(None)
            }
        }
    }

    /// Decodes a raw frame and applies it.
    pub fn apply_json(&self, text: &str) -> Result<Option<Applied>> {
        self.apply(FeedMessage::from_json(text)?)
    }

    fn handle_event(&self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Opened => {
                self.shared.readiness.set_phase(FeedPhase::Open);
                true
            }
            FeedEvent::Message(message) => {
                if let Err(e) = self.apply(message) {
                    // per-message failure; the store is still consistent
                    warn!("Dropped message: {}", e);
                }
                true
            }
            FeedEvent::Closed(reason) => {
                info!("Feed closed: {}", reason);
                self.shared.readiness.set_phase(FeedPhase::Closed(reason));
                false
            }
            FeedEvent::Failed(reason) => {
                error!("Feed failed: {}", reason);
                self.shared.readiness.set_phase(FeedPhase::Failed(reason));
                false
            }
        }
    }

    /// Runs `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&TableStore) -> R) -> R {
        let store = self.shared.store.read();
        f(&*store)
    }

    pub fn get_instrument(&self) -> Result<Instrument> {
        self.read(views::instrument)
    }

    pub fn get_ticker(&self) -> Result<Ticker> {
        self.read(views::ticker)
    }

    pub fn funds(&self) -> Result<Record> {
        self.read(views::funds)
    }

    pub fn position(&self) -> Result<Record> {
        self.read(views::position)
    }

    pub fn market_depth(&self) -> Result<Vec<Record>> {
        self.read(views::market_depth)
    }

    pub fn recent_trades(&self) -> Result<Vec<Record>> {
        self.read(views::recent_trades)
    }

    pub fn all_orders(&self) -> Result<Vec<Record>> {
        self.read(views::all_orders)
    }

    pub fn open_orders(&self, cl_ord_id_prefix: &str) -> Result<Vec<Record>> {
        self.read(|store| views::open_orders(store, cl_ord_id_prefix))
    }

    pub fn get_ohlcv(&self, timeframe: Timeframe) -> Result<Vec<Record>> {
        self.read(|store| views::ohlcv(store, timeframe))
    }

    pub fn ohlcv_candles(&self, timeframe: Timeframe) -> Result<Vec<Candle>> {
        self.read(|store| views::ohlcv_candles(store, timeframe))
    }

    /// Copy of every live table.
    pub fn tables(&self) -> HashMap<String, Vec<Record>> {
        self.read(TableStore::snapshot)
    }

    pub fn stats(&self) -> BTreeMap<String, TableStats> {
        self.read(TableStore::stats)
    }

    pub fn status(&self) -> FeedStatus {
        self.shared.readiness.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<FeedStatus> {
        self.shared.readiness.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status().phase == FeedPhase::Open
    }

    pub fn is_ready(&self, group: ReadinessGroup) -> bool {
        self.status().is_ready(group)
    }

    pub async fn wait_ready(&self, group: ReadinessGroup, timeout: Duration) -> Result<()> {
        self.shared.readiness.wait_ready(group, timeout).await
    }

    pub async fn wait_for_market_data(&self, timeout: Duration) -> Result<()> {
        self.wait_ready(ReadinessGroup::MarketData, timeout).await
    }

    pub async fn wait_for_account(&self, timeout: Duration) -> Result<()> {
        self.wait_ready(ReadinessGroup::AccountData, timeout).await
    }

    pub async fn subscribe(&self, topics: &[Topic]) -> Result<()> {
        if !self.shared.config.has_credentials() {
            for topic in topics.iter().filter(|topic| topic.requires_auth()) {
                warn!("Subscribing to {} without credentials; the feed will refuse it", topic.name());
            }
        }
        let topics = self.scoped(topics);
        self.connection()?.subscribe(&topics).await
    }

    pub async fn unsubscribe(&self, topics: &[Topic]) -> Result<()> {
        let topics = self.scoped(topics);
        self.connection()?.unsubscribe(&topics).await
    }

    fn connection(&self) -> Result<Arc<FeedConnection>> {
        self.shared
            .connection
            .lock()
            .clone()
            .ok_or_else(|| MirrorError::Closed("not connected".into()))
    }

    fn scoped(&self, topics: &[Topic]) -> Vec<String> {
        topics.iter().map(|topic| topic.scoped(self.symbol())).collect()
    }

    /// Closes the feed and releases every waiter. Tables stay readable.
    pub fn shutdown(&self) {
        self.shared.readiness.set_phase(FeedPhase::Closed("shutdown".into()));
        if let Some(connection) = self.shared.connection.lock().take() {
            info!("Shutting down feed");
            connection.shutdown();
        }
    }
}

// Sole writer once connected. Holds the mirror weakly: once every handle is
// dropped the connection shuts down and the pump exits with it.
async fn pump(shared: Weak<Shared>, mut events: mpsc::Receiver<FeedEvent>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv() => event,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mirror = Mirror { shared };
        let keep_going = match event {
            Some(event) => mirror.handle_event(event),
            None => mirror.handle_event(FeedEvent::Closed("event stream ended".into())),
        };
        if !keep_going {
            break;
        }
    }
    debug!("Pump task ended");
}
