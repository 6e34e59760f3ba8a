//! JSON-RPC chain client
//!
//! Thin wrapper over an Ethereum JSON-RPC node exposing only what the
//! indexer needs: current height, log fetching, and read-only calls.
//! The transport is chosen from the endpoint scheme: `http(s)` uses
//! plain POST requests, `ws(s)` a persistent WebSocket with request-id
//! matching. An optional bearer token is attached in both cases.

use crate::types::Log;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read-only chain access used by the poller and the amount normalizer.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain head height.
    async fn block_number(&self) -> Result<u64>;

    /// Logs emitted by `address` in the inclusive block range.
    async fn get_logs(&self, address: Address, from: u64, to: u64) -> Result<Vec<Log>>;

    /// Read-only contract call against the latest block.
    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>>;
}

enum Transport {
    Http {
        client: reqwest::Client,
        url: String,
        bearer: Option<String>,
    },
    Ws {
        url: String,
        bearer: Option<String>,
        socket: Mutex<Option<WsStream>>,
    },
}

/// JSON-RPC client for Ethereum nodes.
pub struct ChainClient {
    transport: Transport,
    next_id: AtomicU64,
}

impl ChainClient {
    /// Connect to the endpoint and verify it answers `eth_blockNumber`.
    ///
    /// This is the only fatal failure point of the subsystem: without a
    /// chain connection at startup there is nothing to index.
    pub async fn connect(url: &str, bearer: Option<String>) -> Result<Self> {
        let transport = if url.starts_with("ws://") || url.starts_with("wss://") {
            Transport::Ws {
                url: url.to_string(),
                bearer,
                socket: Mutex::new(None),
            }
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Transport::Http {
                client: reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(30))
                    .build()
                    .context("Failed to build HTTP client")?,
                url: url.to_string(),
                bearer,
            }
        } else {
            anyhow::bail!("Unsupported RPC endpoint scheme: {}", url);
        };

        let client = Self {
            transport,
            next_id: AtomicU64::new(1),
        };
        client
            .block_number()
            .await
            .with_context(|| format!("Failed to reach RPC endpoint {}", url))?;
        Ok(client)
    }

    /// Make a JSON-RPC request and return the `result` value.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let response = match &self.transport {
            Transport::Http { client, url, bearer } => {
                let mut builder = client.post(url).json(&request);
                if let Some(token) = bearer {
                    builder = builder.bearer_auth(token);
                }
                let response = builder.send().await.context("Failed to send RPC request")?;
                response
                    .json::<Value>()
                    .await
                    .context("Failed to parse RPC response")?
            }
            Transport::Ws { url, bearer, socket } => {
                self.ws_request(url, bearer.as_deref(), socket, id, &request)
                    .await?
            }
        };

        if let Some(error) = response.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }
        response
            .get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }

    /// Send a request over the persistent socket, reconnecting if needed.
    async fn ws_request(
        &self,
        url: &str,
        bearer: Option<&str>,
        socket: &Mutex<Option<WsStream>>,
        id: u64,
        request: &Value,
    ) -> Result<Value> {
        let mut guard = socket.lock().await;
        if guard.is_none() {
            debug!("Opening WebSocket connection to {}", url);
            let mut ws_request = url
                .into_client_request()
                .context("Invalid WebSocket endpoint")?;
            if let Some(token) = bearer {
                let value = format!("Bearer {}", token)
                    .parse()
                    .context("Bearer token is not a valid header value")?;
                ws_request.headers_mut().insert("Authorization", value);
            }
            let (stream, _) = connect_async(ws_request)
                .await
                .context("WebSocket connect failed")?;
            *guard = Some(stream);
        }

        let stream = guard.as_mut().context("WebSocket not connected")?;
        let outcome = Self::ws_roundtrip(stream, id, request).await;
        if outcome.is_err() {
            // Drop the broken socket; the next request reconnects.
            *guard = None;
        }
        outcome
    }

    async fn ws_roundtrip(stream: &mut WsStream, id: u64, request: &Value) -> Result<Value> {
        stream
            .send(Message::Text(request.to_string()))
            .await
            .context("Failed to send WebSocket request")?;

        // Responses arrive in order on a single-consumer socket, but skip
        // anything that is not our reply (pings, stray notifications).
        loop {
            let message = stream
                .next()
                .await
                .context("WebSocket closed while awaiting response")?
                .context("WebSocket read failed")?;
            let text = match message {
                Message::Text(text) => text,
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => anyhow::bail!("WebSocket closed by peer"),
                other => {
                    warn!("Ignoring unexpected WebSocket frame: {:?}", other);
                    continue;
                }
            };
            let value: Value =
                serde_json::from_str(&text).context("Failed to parse WebSocket response")?;
            if value.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(value);
            }
            debug!("Skipping WebSocket message with unmatched id");
        }
    }
}

#[async_trait]
impl ChainSource for ChainClient {
    async fn block_number(&self) -> Result<u64> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let s = result.as_str().context("eth_blockNumber result is not a string")?;
        parse_hex_u64(s)
    }

    async fn get_logs(&self, address: Address, from: u64, to: u64) -> Result<Vec<Log>> {
        let params = json!([{
            "address": format!("0x{:x}", address),
            "fromBlock": format!("0x{:x}", from),
            "toBlock": format!("0x{:x}", to),
        }]);
        let result = self.request("eth_getLogs", params).await?;
        serde_json::from_value(result).context("Failed to deserialize logs")
    }

    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([
            {
                "to": format!("0x{:x}", to),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let s = result.as_str().context("eth_call result is not a string")?;
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.is_empty() {
            return Ok(Vec::new());
        }
        hex::decode(s).context("Failed to decode eth_call return data")
    }
}

/// Parse a 0x-prefixed hex quantity into a u64.
fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        anyhow::bail!("Empty hex quantity");
    }
    u64::from_str_radix(s, 16).context("Failed to parse hex quantity")
}
