//! Solana JSON-RPC client: `logsSubscribe` over WS,
//! `getTransaction`/`getAccountInfo` over HTTP. Same connect/reconnect shape
//! as `rpc::evm`, plus a self-imposed ≥100ms gap between HTTP requests to
//! stay under public RPC rate limits.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::RpcError;

const MIN_REQUEST_GAP: Duration = Duration::from_millis(100);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type SubMap = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Value>>>>;

pub struct Subscription {
    pub id: u64,
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
    resubscribe: Mutex<Vec<Value>>,
}

pub struct SolanaRpcClient {
    wss_url: String,
    http_url: String,
    http: reqwest::Client,
    shared: Arc<WsShared>,
    last_http_request: Mutex<Option<Instant>>,
}

impl SolanaRpcClient {
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
            last_http_request: Mutex::new(None),
        }
    }

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
                Ok(()) => delay = Duration::from_secs(1),
                Err(e) => {
                    error!("Solana WS connection lost: {e}");
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
            .context("Solana WS connect failed")?;
        info!("Solana WS connected");
        let (write, mut read) = ws.split();
        *self.shared.write.lock().await = Some(write);

        let to_resub: Vec<Value> = self.shared.resubscribe.lock().await.clone();
        for params in &to_resub {
            let _ = self.raw_call("logsSubscribe", params.clone()).await;
        }

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => self.handle_message(&text).await,
                Ok(Message::Ping(_)) => {}
                Ok(Message::Close(frame)) => return Err(anyhow!("Solana WS closed by server: {:?}", frame)),
                Ok(_) => {}
                Err(e) => return Err(anyhow!("Solana WS read error: {e}")),
            }
        }
        Err(anyhow!("Solana WS stream ended"))
    }

    async fn handle_message(&self, text: &str) {
        let v: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("Solana WS malformed JSON: {e}");
                return;
            }
        };

        if v.get("method").and_then(|m| m.as_str()) == Some("logsNotification") {
            if let Some(params) = v.get("params") {
                if let Some(sub_id) = params.get("subscription").and_then(|s| s.as_u64()) {
                    if let Some(result) = params.get("result") {
                        let subs = self.shared.subs.lock().await;
                        if let Some(tx) = subs.get(&sub_id) {
                            let _ = tx.send(result.clone());
                        }
                    }
                }
            }
            return;
        }

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
            let write = guard.as_mut().ok_or_else(|| anyhow!("Solana WS not connected"))?;
            write
                .send(Message::Text(payload.to_string()))
                .await
                .map_err(|e| anyhow!("Solana WS send failed: {e}"))?;
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

    /// `logsSubscribe({"mentions":[program]}, {"commitment":"confirmed"})`.
    pub async fn subscribe_logs_mentions(&self, program: &str) -> Result<Subscription> {
        let params = json!([{"mentions": [program]}, {"commitment": "confirmed"}]);
        self.shared.resubscribe.lock().await.push(params.clone());

        let result = self.raw_call("logsSubscribe", params).await?;
        let sub_id = result
            .as_u64()
            .ok_or_else(|| anyhow!("logsSubscribe did not return a subscription id"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subs.lock().await.insert(sub_id, tx);
        Ok(Subscription { id: sub_id, rx })
    }

    async fn throttle_http(&self) {
        let mut last = self.last_http_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_GAP {
                tokio::time::sleep(MIN_REQUEST_GAP - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn http_rpc(&self, method: &str, params: Value) -> Result<Value> {
        self.throttle_http().await;
        let payload = json!({"jsonrpc":"2.0","id":1,"method":method,"params":params});
        let resp: Value = self
            .http
            .post(&self.http_url)
            .json(&payload)
            .send()
            .await
            .context("Solana HTTP RPC request failed")?
            .json()
            .await
            .context("Solana HTTP RPC decode failed")?;
        if let Some(err) = resp.get("error") {
            return Err(RpcError::RpcReply {
                code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: err.get("message").and_then(|m| m.as_str()).unwrap_or("").to_string(),
            }
            .into());
        }
        Ok(resp.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn get_transaction(&self, signature: &str) -> Result<Value> {
        self.http_rpc(
            "getTransaction",
            json!([signature, {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0, "commitment": "confirmed"}]),
        )
        .await
    }

    pub async fn get_account_info(&self, pubkey: &str, encoding: &str) -> Result<Value> {
        self.http_rpc(
            "getAccountInfo",
            json!([pubkey, {"encoding": encoding}]),
        )
        .await
    }
}
