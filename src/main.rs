//! Connects a mirror using settings from the environment (or `.env`) and logs
//! the ticker once a second until Ctrl-C.

use std::time::Duration;

use anyhow::Context;
use feed_mirror::{Mirror, MirrorConfig, logging};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = MirrorConfig::from_env().context("loading configuration")?;
    info!("Starting feed mirror for {} at {}", config.symbol, config.endpoint);

    let mirror = Mirror::connect(config).await.context("connecting to feed")?;
    if let Ok(instrument) = mirror.get_instrument() {
        info!("Instrument tick size {} ({} decimals)", instrument.tick_size, instrument.tick_log);
    }

    let mut ticks = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            _ = ticks.tick() => {
                if !mirror.is_connected() {
                    warn!("Feed is no longer connected: {:?}", mirror.status().phase);
                    break;
                }
                match mirror.get_ticker() {
                    Ok(ticker) => info!(
                        "Ticker last={} bid={} ask={} mid={}",
                        ticker.last, ticker.bid, ticker.ask, ticker.mid
                    ),
                    Err(e) => warn!("Ticker unavailable: {}", e),
                }
            }
        }
    }

    info!("Shutting down...");
    mirror.shutdown();
    Ok(())
}
