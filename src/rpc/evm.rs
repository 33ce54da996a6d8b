//! EVM JSON-RPC client: a thin WS+HTTP transport
//! shared by the Venue-A/B listeners and the EVM safety prober.
//!
//! WS reconnect uses exponential back-off over a split
//! `tokio_tungstenite` sink/stream with ping/pong; subscription dispatch is
//! one `mpsc::Receiver<Value>` per subscription id, fed by a single read loop.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::RpcError;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type SubMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>>;

/// A live `eth_subscribe` stream, keyed by the subscription id the node assigned.
pub struct Subscription {
    pub id: String,
    pub rx: mpsc::UnboundedReceiver<Value>,
}

struct WsShared {
    write: Mutex<Option<futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        Message,
    >>>,
    next_id: AtomicU64,
    pending: PendingMap,
    subs: SubMap,
    /// method name -> pending subscribe requests awaiting their assigned sub-id,
    /// so renewed connections can re-issue them transparently.
    resubscribe: Mutex<Vec<(String, Value)>>,
}

pub struct EvmRpcClient {
    wss_url: String,
    http_url: String,
    http: reqwest::Client,
    shared: Arc<WsShared>,
}

impl EvmRpcClient {
    pub fn new(wss_url: impl Into<String>, http_url: impl Into<String>) -> Self {
        Self {
            wss_url: wss_url.into(),
            http_url: http_url.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            shared: Arc::new(WsShared {
                write: Mutex::new(None),
                next_id: AtomicU64::new(1),
                pending: Arc::new(Mutex::new(HashMap::new())),
                subs: Arc::new(Mutex::new(HashMap::new())),
                resubscribe: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connects (blocking until the first connection succeeds) then spawns
    /// the background reconnect-forever read loop.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        self.connect_once().await?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_forever().await;
        });
        Ok(())
    }

    async fn run_forever(self: Arc<Self>) {
        let mut delay = Duration::from_secs(1);
        loop {
            match self.connect_once().await {
                Ok(()) => {
                    delay = Duration::from_secs(1);
                }
                Err(e) => {
                    error!("EVM WS connection lost: {e}");
                    warn!("reconnecting in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let (ws, _resp) = tokio_tungstenite::connect_async(&self.wss_url)
            .await
            .context("EVM WS connect failed")?;
        info!("EVM WS connected");
        let (write, mut read) = ws.split();
        *self.shared.write.lock().await = Some(write);

        // Re-issue any subscriptions the caller registered before this connect
        // (first connect, or after a reconnect).
        let to_resub: Vec<(String, Value)> = self.shared.resubscribe.lock().await.clone();
        for (_method, params) in &to_resub {
            let _ = self.raw_call("eth_subscribe", params.clone()).await;
        }

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => self.handle_message(&text).await,
                Ok(Message::Ping(_)) => {}
                Ok(Message::Close(frame)) => {
                    return Err(anyhow!("EVM WS closed by server: {:?}", frame));
                }
                Ok(_) => {}
                Err(e) => return Err(anyhow!("EVM WS read error: {e}")),
            }
        }
        Err(anyhow!("EVM WS stream ended"))
    }

    async fn handle_message(&self, text: &str) {
        let v: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("EVM WS malformed JSON: {e}");
                return;
            }
        };

        // Subscription notification: {"method":"eth_subscription","params":{"subscription":id,"result":...}}
        if v.get("method").and_then(|m| m.as_str()) == Some("eth_subscription") {
            if let Some(params) = v.get("params") {
                if let Some(sub_id) = params.get("subscription").and_then(|s| s.as_str()) {
                    if let Some(result) = params.get("result") {
                        let subs = self.shared.subs.lock().await;
                        if let Some(tx) = subs.get(sub_id) {
                            let _ = tx.send(result.clone());
                        }
                    }
                }
            }
            return;
        }

        // Reply to an outstanding request, keyed by id.
        if let Some(id) = v.get("id").and_then(|i| i.as_u64()) {
            let mut pending = self.shared.pending.lock().await;
            if let Some(tx) = pending.remove(&id) {
                let _ = tx.send(v);
            }
        }
    }

    async fn raw_call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id, tx);

        let payload = json!({"jsonrpc":"2.0","id":id,"method":method,"params":params});
        {
            let mut guard = self.shared.write.lock().await;
            let write = guard.as_mut().ok_or_else(|| anyhow!("EVM WS not connected"))?;
            write
                .send(Message::Text(payload.to_string()))
                .await
                .map_err(|e| anyhow!("EVM WS send failed: {e}"))?;
        }

        let reply = tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .map_err(|_| RpcError::Timeout(Duration::from_secs(10)))?
            .map_err(|_| RpcError::Closed)?;

        if let Some(err) = reply.get("error") {
            return Err(RpcError::RpcReply {
                code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: err.get("message").and_then(|m| m.as_str()).unwrap_or("").to_string(),
            }
            .into());
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Registers an `eth_subscribe("logs", filter)` stream. Re-issued transparently on reconnect.
    pub async fn subscribe_logs(&self, filter: Value) -> Result<Subscription> {
        let params = json!(["logs", filter]);
        self.shared
            .resubscribe
            .lock()
            .await
            .push(("eth_subscribe".to_string(), params.clone()));

        let result = self.raw_call("eth_subscribe", params).await?;
        let sub_id = result
            .as_str()
            .ok_or_else(|| anyhow!("eth_subscribe did not return a subscription id"))?
            .to_string();

        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subs.lock().await.insert(sub_id.clone(), tx);
        Ok(Subscription { id: sub_id, rx })
    }

    async fn http_rpc(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({"jsonrpc":"2.0","id":1,"method":method,"params":params});
        let resp: Value = self
            .http
            .post(&self.http_url)
            .json(&payload)
            .send()
            .await
            .context("EVM HTTP RPC request failed")?
            .json()
            .await
            .context("EVM HTTP RPC decode failed")?;
        if let Some(err) = resp.get("error") {
            return Err(RpcError::RpcReply {
                code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: err.get("message").and_then(|m| m.as_str()).unwrap_or("").to_string(),
            }
            .into());
        }
        Ok(resp.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let result = self.http_rpc("eth_chainId", json!([])).await?;
        let hex = result.as_str().ok_or_else(|| anyhow!("eth_chainId: bad reply"))?;
        Ok(u64::from_str_radix(hex.trim_start_matches("0x"), 16)?)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let result = self.http_rpc("eth_blockNumber", json!([])).await?;
        let hex = result.as_str().ok_or_else(|| anyhow!("eth_blockNumber: bad reply"))?;
        Ok(u64::from_str_radix(hex.trim_start_matches("0x"), 16)?)
    }

    pub async fn get_logs(&self, filter: Value) -> Result<Vec<Value>> {
        let result = self.http_rpc("eth_getLogs", json!([filter])).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    pub async fn get_code(&self, address: &str) -> Result<String> {
        let result = self.http_rpc("eth_getCode", json!([address, "latest"])).await?;
        Ok(result.as_str().unwrap_or("0x").to_string())
    }

    pub async fn call(&self, to: &str, data: &str) -> Result<String> {
        let result = self
            .http_rpc("eth_call", json!([{"to": to, "data": data}, "latest"]))
            .await?;
        Ok(result.as_str().unwrap_or("0x").to_string())
    }
}
