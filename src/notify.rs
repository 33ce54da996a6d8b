//! Notification Sink: one of the fan-out's downstream
//! consumers. Drains fired signals, re-queries the store for the full
//! TokenState, and delivers a rendered message through a pluggable
//! transport.
//!
//! `NotificationTransport` keeps delivery (webhook POST, or stdout under
//! `DRY_RUN`) decoupled from rendering, so a chat/webhook integration is a
//! one-trait-impl addition rather than a branch inside the sink.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::SignalEngine;
use crate::state::{TokenStateStore, TokenView};

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, message: &str);
}

/// Used whenever `DRY_RUN=true` or no webhook is configured.
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, message: &str) {
        info!("{message}");
    }
}

/// POSTs a JSON body to `SIGNAL_WEBHOOK_URL`. Best-effort: delivery failure
/// is logged, never fatal, never retried.
pub struct WebhookTransport {
    http: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(&self, message: &str) {
        let body = serde_json::json!({"text": message});
        if let Err(e) = self.http.post(&self.url).json(&body).send().await {
            warn!(error = %e, "webhook delivery failed");
        }
    }
}

pub struct NotificationSink<T> {
    chain_tag: &'static str,
    store: Arc<TokenStateStore<T>>,
    engine: Arc<SignalEngine>,
    transport: Arc<dyn NotificationTransport>,
}

impl<T: TokenView + 'static> NotificationSink<T> {
    pub fn new(
        chain_tag: &'static str,
        store: Arc<TokenStateStore<T>>,
        engine: Arc<SignalEngine>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Arc<Self> {
        Arc::new(Self { chain_tag, store, engine, transport })
    }

    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut signals = self.engine.subscribe();
        loop {
            tokio::select! {
                signal = signals.recv() => {
                    match signal {
                        Ok(event) if event.chain == self.chain_tag => self.notify_one(&event.token).await,
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(chain = self.chain_tag, skipped = n, "notification sink lagged on signal broadcast");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn notify_one(&self, token: &str) {
        let Some(message) = self.store.get_and(token, render_message) else {
            return;
        };
        self.transport.send(&message).await;
    }
}

/// Fixed-format message: mcap, liquidity, buys, volume, largest-buy%,
/// momentum, age, latency, hooks tag, symbol/no-socials tag.
fn render_message<T: TokenView>(s: &T) -> String {
    let liquidity = s.best_liquidity();
    let largest_pct = if liquidity > 0.0 {
        s.largest_buy_usd() / liquidity * 100.0
    } else {
        0.0
    };
    let latency = s
        .signal_time()
        .map(|t| t - s.first_seen())
        .unwrap_or(0.0);
    let symbol = s
        .enrichment()
        .token_symbol
        .clone()
        .unwrap_or_else(|| "?".to_string());
    let socials_tag = if s.enrichment().has_socials { "" } else { " [no-socials]" };
    let hooks_tag = s
        .hooks_tag()
        .map(|h| format!(" hooks={h}"))
        .unwrap_or_default();

    format!(
        "[{chain}/{venue}] {symbol} {token} mcap=${mcap:.0} liq=${liq:.0} buys={buys} vol=${vol:.0} largest_buy={pct:.1}% momentum={momentum} age={age:.0}s latency={latency:.0}s{hooks}{socials}",
        chain = s.chain_tag(),
        venue = s.venue_tag(),
        symbol = symbol,
        token = s.token_address(),
        mcap = s.best_mcap(),
        liq = liquidity,
        buys = s.best_buys(),
        vol = s.buy_volume_usd(),
        pct = largest_pct,
        momentum = s.has_momentum(),
        age = s.age_seconds(),
        latency = latency,
        hooks = hooks_tag,
        socials = socials_tag,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EvmTokenState;
    use std::time::Duration;

    #[test]
    fn render_message_includes_no_socials_tag_when_absent() {
        let mut s = EvmTokenState::new("0xabc".into(), "0xpool".into(), "evmA", Duration::from_secs(180));
        s.estimated_mcap = 15_000.0;
        s.liquidity_usd = 5_000.0;
        let msg = render_message(&s);
        assert!(msg.contains("[no-socials]"));
        assert!(msg.contains("0xabc"));
    }

    #[test]
    fn render_message_tags_hooks_address_when_present() {
        let mut s = EvmTokenState::new("0xabc".into(), "0xpool".into(), "evmA", Duration::from_secs(180));
        s.hooks_address = Some("0xdead".into());
        let msg = render_message(&s);
        assert!(msg.contains("hooks=0xdead"));
    }
}
