//! TonAPI WebSocket source for account activity
//!
//! WebSocket endpoint: wss://tonapi.io/v2/websocket
//! JSON-RPC method `subscribe_account` with a list of addresses; the server
//! then pushes `account_transaction` notifications.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

use super::source::{EventSource, StreamConnector, Wakeup};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON-RPC request sent over the socket
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub id: u64,
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Vec<String>,
}

impl RpcRequest {
    pub fn subscribe_accounts(accounts: &[String]) -> Self {
        Self {
            id: 1,
            jsonrpc: "2.0",
            method: "subscribe_account",
            params: accounts.to_vec(),
        }
    }
}

/// Transaction notification payload
#[derive(Debug, Clone, Deserialize)]
pub struct AccountTransaction {
    pub account_id: String,
    #[serde(default)]
    pub lt: u64,
    #[serde(default)]
    pub tx_hash: String,
}

/// Any message from the server: a reply to our request or a notification
#[derive(Debug, Clone, Deserialize)]
struct RpcMessage {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Account named by an `account_transaction` notification, if `text` is one
pub fn parse_notification(text: &str) -> Option<String> {
    let msg: RpcMessage = serde_json::from_str(text).ok()?;

    if let Some(result) = &msg.result {
        debug!("Stream reply: {}", result);
    }
    if let Some(error) = &msg.error {
        warn!("Stream error reply: {}", error);
    }

    if msg.method.as_deref() != Some("account_transaction") {
        return None;
    }
    let tx: AccountTransaction = serde_json::from_value(msg.params?).ok()?;
    debug!("Transaction {} lt={} on {}", tx.tx_hash, tx.lt, tx.account_id);
    Some(tx.account_id)
}

/// Live TonAPI subscription
pub struct TonApiStream {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    ping_timer: Interval,
    /// First wakeup after (re)connect covers every account
    fresh: bool,
}

#[async_trait]
impl EventSource for TonApiStream {
    async fn next_wakeup(&mut self) -> Result<Wakeup> {
        if self.fresh {
            self.fresh = false;
            return Ok(Wakeup::All);
        }

        loop {
            tokio::select! {
                // Ping to keep connection alive
                _ = self.ping_timer.tick() => {
                    self.write
                        .send(Message::Ping(vec![]))
                        .await
                        .map_err(|e| Error::CollaboratorUnavailable(format!("Failed to send ping: {}", e)))?;
                    debug!("Sent ping");
                }

                // Receive messages
                msg = self.read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(account) = parse_notification(&text) {
                                return Ok(Wakeup::Accounts(vec![account]));
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Received pong");
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Err(Error::CollaboratorUnavailable(
                                "WebSocket closed by server".to_string(),
                            ));
                        }
                        Some(Err(e)) => {
                            return Err(Error::CollaboratorUnavailable(format!(
                                "WebSocket error: {}",
                                e
                            )));
                        }
                        None => {
                            return Err(Error::CollaboratorUnavailable(
                                "WebSocket stream ended".to_string(),
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "stream"
    }
}

/// Connector for the TonAPI streaming endpoint
#[derive(Debug, Clone)]
pub struct TonApiStreamConnector {
    ws_url: String,
    api_key: String,
    ping_interval: Duration,
}

impl TonApiStreamConnector {
    pub fn new(ws_url: String, api_key: String, ping_interval: Duration) -> Self {
        Self {
            ws_url,
            api_key,
            ping_interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tonapi.ws_url(config.network),
            config.tonapi.api_key.clone(),
            Duration::from_secs(config.monitor.ping_interval_secs),
        )
    }

    fn url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.ws_url)
            .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;
        if !self.api_key.is_empty() {
            url.query_pairs_mut().append_pair("token", &self.api_key);
        }
        Ok(url)
    }
}

#[async_trait]
impl StreamConnector for TonApiStreamConnector {
    async fn connect(&self, accounts: &[String]) -> Result<Box<dyn EventSource>> {
        info!("Connecting to TonAPI WebSocket...");

        let (ws_stream, _) = connect_async(self.url()?).await.map_err(|e| {
            Error::CollaboratorUnavailable(format!("WebSocket connect failed: {}", e))
        })?;

        let (mut write, read) = ws_stream.split();

        if !accounts.is_empty() {
            let json = serde_json::to_string(&RpcRequest::subscribe_accounts(accounts))?;
            write.send(Message::Text(json)).await.map_err(|e| {
                Error::CollaboratorUnavailable(format!("Failed to subscribe: {}", e))
            })?;
            info!("Subscribed to {} account(s)", accounts.len());
        }

        let ping_timer = interval_at(Instant::now() + self.ping_interval, self.ping_interval);

        Ok(Box::new(TonApiStream {
            write,
            read,
            ping_timer,
            fresh: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_shape() {
        let req = RpcRequest::subscribe_accounts(&["0:aa".to_string(), "0:bb".to_string()]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "subscribe_account");
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["params"][1], "0:bb");
    }

    #[test]
    fn test_parse_notification() {
        let text = r#"{"jsonrpc":"2.0","method":"account_transaction","params":{"account_id":"0:aa","lt":42,"tx_hash":"abc"}}"#;
        assert_eq!(parse_notification(text), Some("0:aa".to_string()));

        let reply = r#"{"id":1,"jsonrpc":"2.0","method":"subscribe_account","result":"success! 1 new subscriptions created"}"#;
        assert_eq!(parse_notification(reply), None);
        assert_eq!(parse_notification("not json"), None);
    }

    #[test]
    fn test_token_in_url() {
        let connector = TonApiStreamConnector::new(
            "wss://tonapi.io/v2/websocket".to_string(),
            "KEY".to_string(),
            Duration::from_secs(30),
        );
        assert_eq!(
            connector.url().unwrap().as_str(),
            "wss://tonapi.io/v2/websocket?token=KEY"
        );
    }
}
