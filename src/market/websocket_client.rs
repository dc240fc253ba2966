//! Generic websocket transport for table feeds.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::error::{MirrorError, Result};
use crate::market::auth::RequestSigner;
use crate::market::message::FeedMessage;
use crate::market::message_parser::MessageParser;

// Design: FeedClient<P: MessageParser> is generic over the exchange protocol.
// It owns the socket and nothing else: decoded messages and lifecycle events
// go out over one channel, and whoever drains that channel is the only
// writer to the table store.

const COMMAND_CHANNEL_CAPACITY: usize = 100;
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// What the transport reports to the mirror, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Opened,
    Message(FeedMessage),
    /// Closed by the server or by us.
    Closed(String),
    /// Fatal transport error; nothing follows.
    Failed(String),
}

/// Websocket client that works with any exchange protocol.
pub struct FeedClient<P: MessageParser> {
    parser: Arc<P>,
    signer: Option<Arc<dyn RequestSigner>>,
    connect_timeout: Duration,
}

impl<P: MessageParser> FeedClient<P> {
    pub fn new(parser: P) -> Self {
        Self {
            parser: Arc::new(parser),
            signer: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_signer(mut self, signer: impl RequestSigner) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn name(&self) -> &'static str {
        self.parser.name()
    }

    /// Connects to `endpoint` requesting `topics`, then spawns the reader and
    /// writer tasks. Returns the command handle and the event stream.
    pub async fn connect(
        &self,
        endpoint: &str,
        topics: &[String],
    ) -> Result<(FeedConnection, mpsc::Receiver<FeedEvent>)> {
        let url = self.parser.connect_url(endpoint, topics)?;
        let mut request = url.as_str().into_client_request()?;

        match &self.signer {
            Some(signer) => {
                info!("[{}] Authenticating with API key", self.parser.name());
                let (verb, path) = self.parser.auth_target();
                for (name, value) in signer.auth_headers(verb, path)? {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|e| MirrorError::Config(format!("bad auth header name: {}", e)))?;
                    let value = HeaderValue::from_str(&value)
                        .map_err(|e| MirrorError::Config(format!("bad auth header value: {}", e)))?;
                    request.headers_mut().insert(name, value);
                }
            }
            None => info!("[{}] Not authenticating", self.parser.name()),
        }

        info!("[{}] Connecting to {}", self.parser.name(), url);
        let (ws_stream, _response) = match tokio::time::timeout(self.connect_timeout, connect_async(request)).await {
            Err(_) => {
                error!("[{}] Couldn't connect within {:?}", self.parser.name(), self.connect_timeout);
                return Err(MirrorError::ConnectTimeout(self.connect_timeout));
            }
            Ok(Err(e)) => return Err(MirrorError::Connection(e.to_string())),
            Ok(Ok(pair)) => pair,
        };
        let (mut write, mut read) = ws_stream.split();

        let (command_tx, mut command_rx) = mpsc::channel::<String>(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Task: outgoing commands (write to websocket)
        let name = self.parser.name();
        let mut writer_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_shutdown.changed() => break,
                    command = command_rx.recv() => {
                        let Some(command) = command else { break };
                        debug!("[{}] Sending {}", name, command);
                        if let Err(e) = write.send(Message::Text(command.into())).await {
                            error!("[{}] Failed to send websocket message: {}", name, e);
                            break;
                        }
                    }
                }
            }
            let _ = write.close().await;
            debug!("[{}] Write task ended", name);
        });

        // Task: incoming frames (read from websocket)
        let parser = Arc::clone(&self.parser);
        let mut reader_shutdown = shutdown_rx;
        tokio::spawn(async move {
            let _ = event_tx.send(FeedEvent::Opened).await;

            let last = loop {
                let frame = tokio::select! {
                    biased;
                    _ = reader_shutdown.changed() => break FeedEvent::Closed("shutdown requested".into()),
                    frame = read.next() => frame,
                };
                match frame {
                    Some(Ok(Message::Text(text))) => match parser.parse_message(text.as_str()) {
                        Ok(message) => {
                            if event_tx.send(FeedEvent::Message(message)).await.is_err() {
                                // consumer gone, nobody left to apply messages
                                break FeedEvent::Closed("event receiver dropped".into());
                            }
                        }
                        Err(e) => warn!("[{}] Discarding frame: {}", parser.name(), e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("[{}] Connection closed: {:?}", parser.name(), frame);
                        break FeedEvent::Closed(
                            frame.map_or_else(|| "closed by server".to_string(), |f| f.reason.to_string()),
                        );
                    }
                    // Ping/pong handled by tungstenite; binary frames are not used by table feeds
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("[{}] Websocket error: {}", parser.name(), e);
                        break FeedEvent::Failed(e.to_string());
                    }
                    None => break FeedEvent::Closed("stream ended".into()),
                }
            };
            let _ = event_tx.send(last).await;
            debug!("[{}] Read task ended", parser.name());
        });

        info!("[{}] Connected", self.parser.name());

        let connection = FeedConnection {
            parser: self.parser.clone(),
            commands: command_tx,
            shutdown: shutdown_tx,
        };
        Ok((connection, event_rx))
    }
}

/// Handle to a live connection: send commands, request shutdown.
pub struct FeedConnection {
    parser: Arc<dyn MessageParser>,
    commands: mpsc::Sender<String>,
    shutdown: watch::Sender<bool>,
}

impl FeedConnection {
    pub async fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.send(self.parser.format_subscribe(topics)).await?;
        info!("[{}] Subscribing to {:?}", self.parser.name(), topics);
        Ok(())
    }

    pub async fn unsubscribe(&self, topics: &[String]) -> Result<()> {
        self.send(self.parser.format_unsubscribe(topics)).await?;
        info!("[{}] Unsubscribing from {:?}", self.parser.name(), topics);
        Ok(())
    }

    async fn send(&self, command: String) -> Result<()> {
        if self.is_shut_down() {
            return Err(MirrorError::Closed("connection shut down".into()));
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| MirrorError::Closed("writer task ended".into()))
    }

    /// Stops both tasks and closes the socket. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// A receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

impl Drop for FeedConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
