//! Post-Mortem Scheduler: every signal gets a follow-up
//! check ~600 s later to see whether it pumped, dumped, or rugged.
//!
//! One instance per chain, fed by the engine's own signal broadcast —
//! filtered to the matching chain tag since the engine/broadcast channel is
//! shared across both chain stores.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::enrich::EnrichClient;
use crate::engine::{PostMortemClass, SignalEngine};
use crate::state::{TokenStateStore, TokenView};

const CHECK_INTERVAL: Duration = Duration::from_secs(15);
const FOLLOW_UP_WINDOW_SECS: f64 = 600.0;

struct PendingEntry {
    token: String,
    signal_time: f64,
    mcap_at_signal: f64,
}

pub struct PostMortemResult {
    pub token: String,
    pub chain: &'static str,
    pub class: PostMortemClass,
    pub change_pct: f64,
}

/// Invoked once per matured follow-up; `notify.rs` or a log line can hang
/// off this without the scheduler needing to know about transports.
pub type PostMortemCallback = Arc<dyn Fn(PostMortemResult) + Send + Sync>;

pub struct PostMortemScheduler<T> {
    chain_tag: &'static str,
    store: Arc<TokenStateStore<T>>,
    engine: Arc<SignalEngine>,
    client: Arc<EnrichClient>,
    pending: Mutex<Vec<PendingEntry>>,
    callback: Option<PostMortemCallback>,
}

impl<T: TokenView + 'static> PostMortemScheduler<T> {
    pub fn new(
        chain_tag: &'static str,
        store: Arc<TokenStateStore<T>>,
        engine: Arc<SignalEngine>,
        client: Arc<EnrichClient>,
        callback: Option<PostMortemCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            chain_tag,
            store,
            engine,
            client,
            pending: Mutex::new(Vec::new()),
            callback,
        })
    }

    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut signals = self.engine.subscribe();
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        loop {
            tokio::select! {
                signal = signals.recv() => {
                    match signal {
                        Ok(event) if event.chain == self.chain_tag => self.enqueue(&event.token, event.signal_time).await,
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(chain = self.chain_tag, skipped = n, "post-mortem scheduler lagged on signal broadcast");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn enqueue(&self, token: &str, signal_time: f64) {
        let mcap_at_signal = self.store.get_and(token, |s| s.best_mcap()).unwrap_or(0.0);
        self.pending.lock().await.push(PendingEntry {
            token: token.to_string(),
            signal_time,
            mcap_at_signal,
        });
    }

    async fn sweep(&self) {
        let now = now_secs();
        let due = {
            let mut pending = self.pending.lock().await;
            let (due, still_pending): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|e| now - e.signal_time >= FOLLOW_UP_WINDOW_SECS);
            *pending = still_pending;
            due
        };
        for entry in due {
            self.resolve(entry).await;
        }
    }

    async fn resolve(&self, entry: PendingEntry) {
        let pairs = self.client.pairs_for_token(self.chain_tag, &entry.token).await;
        let best = EnrichClient::best_liquidity_pair(&pairs);
        let mcap_now = best.map(|pair| pair.mcap());

        let change = change_pct(entry.mcap_at_signal, mcap_now);
        let class = PostMortemClass::classify(change);
        self.engine.record_postmortem(class);
        debug!(token = %entry.token, chain = self.chain_tag, change, class = class.as_str(), "post-mortem resolved");

        if let Some(cb) = &self.callback {
            cb(PostMortemResult {
                token: entry.token,
                chain: self.chain_tag,
                class,
                change_pct: change,
            });
        } else {
            info!(chain = self.chain_tag, class = class.as_str(), change_pct = change, "post-mortem");
        }
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Percent change between the mcap snapshotted at signal time and the mcap
/// found on follow-up. `mcap_at_signal <= 0` means there was nothing to
/// compare against (an unpriced token at signal time) rather than a rug, so
/// it's reported as no change instead of `-100`. `mcap_now == None` means the
/// pair couldn't be found on follow-up, treated the same as its mcap
/// dropping to zero.
fn change_pct(mcap_at_signal: f64, mcap_now: Option<f64>) -> f64 {
    if mcap_at_signal <= 0.0 {
        return 0.0;
    }
    match mcap_now {
        Some(now) if now > 0.0 => (now - mcap_at_signal) / mcap_at_signal * 100.0,
        _ => -100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateThresholds;
    use crate::state::EvmTokenState;
    use std::time::Duration as StdDuration;

    fn gate() -> GateThresholds {
        GateThresholds {
            max_token_age_evm: StdDuration::from_secs(180),
            max_token_age_sol: StdDuration::from_secs(120),
            max_mcap_usd: 30_000.0,
            min_liquidity_usd: 3_000.0,
            min_buys: 2,
            min_largest_buy_pct: 10.0,
            max_signals_per_hour: 5,
            max_deployer_tokens_24h: 2,
            max_signal_latency_seconds: 0,
        }
    }

    #[tokio::test]
    async fn enqueue_snapshots_mcap_at_signal_time() {
        let store = TokenStateStore::<EvmTokenState>::new();
        store.create_with("0xabc", || {
            let mut s = EvmTokenState::new("0xabc".into(), "0xpool".into(), "evmA", StdDuration::from_secs(180));
            s.estimated_mcap = 12_000.0;
            s
        });
        let engine = Arc::new(SignalEngine::new(gate()));
        let client = Arc::new(EnrichClient::new("https://example.invalid").unwrap());
        let scheduler = PostMortemScheduler::new("base", store, engine, client, None);

        scheduler.enqueue("0xabc", now_secs()).await;
        let pending = scheduler.pending.lock().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mcap_at_signal, 12_000.0);
    }

    #[test]
    fn unpriced_at_signal_is_flat_not_rug() {
        assert_eq!(change_pct(0.0, Some(5_000.0)), 0.0);
        assert_eq!(change_pct(0.0, None), 0.0);
    }

    #[test]
    fn disappeared_pair_is_rug() {
        assert_eq!(change_pct(10_000.0, None), -100.0);
        assert_eq!(change_pct(10_000.0, Some(0.0)), -100.0);
    }

    #[test]
    fn priced_pair_computes_ratio() {
        assert_eq!(change_pct(10_000.0, Some(13_000.0)), 30.0);
        assert_eq!(change_pct(10_000.0, Some(5_000.0)), -50.0);
    }
}
