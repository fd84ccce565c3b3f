//! Binance USD-M futures user-data listener.
//!
//! Lifecycle per connection: obtain a listen key over REST, keep it
//! alive every 30 minutes, consume the WebSocket event stream, and
//! produce a signal for every completed fill on the replicated symbol.
//! Any disconnect tears down the keep-alive and restarts from the
//! listen-key step.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::messages::{ORDER_TRADE_UPDATE, UserStreamEvent};
use crate::config::{BinanceCredentials, SharedSettings};
use crate::risk::normalize_symbol;
use crate::stream::SignalProducer;

/// Source tag stamped on produced signals.
const SOURCE_NAME: &str = "binance";

/// Listen-key keep-alive cadence.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Delay before reconnecting after a dropped stream.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Delay before retrying a failed listen-key request.
const LISTEN_KEY_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors from the upstream feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Listen-key acquisition or keep-alive failed.
    #[error("listen key request failed: {0}")]
    ListenKey(#[from] reqwest::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server closed the stream.
    #[error("stream closed by server")]
    StreamClosed,
}

#[derive(Debug, Deserialize)]
struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    listen_key: String,
}

/// Long-lived subscription to the upstream user-data feed.
pub struct BinanceListener {
    http: reqwest::Client,
    credentials: BinanceCredentials,
    settings: SharedSettings,
    producer: Arc<dyn SignalProducer>,
    shutdown: CancellationToken,
    rest_base: String,
    ws_base: String,
}

impl BinanceListener {
    /// Wire a listener over the producer capability.
    #[must_use]
    pub fn new(
        credentials: BinanceCredentials,
        settings: SharedSettings,
        producer: Arc<dyn SignalProducer>,
        shutdown: CancellationToken,
    ) -> Self {
        let (rest_base, ws_base) = if credentials.testnet {
            (
                "https://testnet.binancefuture.com".to_string(),
                "wss://stream.binancefuture.com/ws".to_string(),
            )
        } else {
            (
                "https://fapi.binance.com".to_string(),
                "wss://fstream.binance.com/ws".to_string(),
            )
        };

        Self {
            http: reqwest::Client::new(),
            credentials,
            settings,
            producer,
            shutdown,
            rest_base,
            ws_base,
        }
    }

    /// Run the subscribe/consume/reconnect loop until shutdown.
    pub async fn run(&self) {
        tracing::info!(testnet = self.credentials.testnet, "Binance listener started");

        while !self.shutdown.is_cancelled() {
            let listen_key = match self.request_listen_key().await {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to obtain listen key");
                    if self.pause(LISTEN_KEY_RETRY_DELAY).await {
                        break;
                    }
                    continue;
                }
            };

            tracing::info!("User stream listen key obtained");

            let keepalive_cancel = self.shutdown.child_token();
            let keepalive = tokio::spawn(keep_alive_loop(
                self.http.clone(),
                self.rest_base.clone(),
                self.credentials.api_key.clone(),
                keepalive_cancel.clone(),
            ));

            match self.consume_stream(&listen_key).await {
                Ok(()) => {
                    // Clean shutdown.
                    keepalive_cancel.cancel();
                    let _ = keepalive.await;
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "User stream disconnected, reconnecting");
                    keepalive_cancel.cancel();
                    let _ = keepalive.await;
                    if self.pause(RECONNECT_DELAY).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("Binance listener stopped");
    }

    /// Sleep for `delay`, returning `true` when shutdown fired first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => true,
            () = tokio::time::sleep(delay) => false,
        }
    }

    async fn request_listen_key(&self) -> Result<String, FeedError> {
        let response = self
            .http
            .post(format!("{}/fapi/v1/listenKey", self.rest_base))
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?
            .error_for_status()?;

        let body: ListenKeyResponse = response.json().await?;
        Ok(body.listen_key)
    }

    /// Consume one WebSocket connection until it drops or shutdown.
    async fn consume_stream(&self, listen_key: &str) -> Result<(), FeedError> {
        let url = format!("{}/{listen_key}", self.ws_base);
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        tracing::info!("User stream connected");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return Ok(()),
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_event(&text).await,
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Err(FeedError::StreamClosed),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                },
            }
        }
    }

    /// Parse one event and produce a signal for a matching fill.
    ///
    /// Per-event failures never tear down the connection.
    async fn handle_event(&self, text: &str) {
        let event: UserStreamEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring unparseable stream message");
                return;
            }
        };

        if event.event_type != ORDER_TRADE_UPDATE {
            return;
        }
        let Some(order) = event.order else {
            return;
        };

        let symbol = self.settings.snapshot().symbol;
        if !order.is_filled() || normalize_symbol(&order.symbol) != normalize_symbol(&symbol) {
            return;
        }

        let signal = match order.to_signal(SOURCE_NAME, event.event_time) {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(order_id = order.order_id, error = %err, "Skipping unparseable fill");
                return;
            }
        };

        tracing::info!(
            signal_id = %signal.signal_id,
            side = %signal.side,
            quantity = %signal.quantity,
            "Fill observed, producing signal"
        );

        if let Err(err) = self.producer.produce(&signal).await {
            tracing::error!(signal_id = %signal.signal_id, error = %err, "Failed to produce signal");
        }
    }
}

/// Keep the listen key alive until cancelled.
async fn keep_alive_loop(
    http: reqwest::Client,
    rest_base: String,
    api_key: String,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let result = http
                    .put(format!("{rest_base}/fapi/v1/listenKey"))
                    .header("X-MBX-APIKEY", &api_key)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status);

                match result {
                    Ok(_) => tracing::debug!("Listen key kept alive"),
                    Err(err) => tracing::warn!(error = %err, "Listen key keep-alive failed"),
                }
            }
        }
    }
}
