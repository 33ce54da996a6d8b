//! Enricher Loop: one instance per chain, periodically
//! pricing the active token set from the store and re-invoking the engine.
//!
//! Generic over `T: TokenView` so the same loop drives both the EVM and
//! Solana stores.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::enrich::{is_copycat_match, EnrichClient};
use crate::engine::SignalEngine;
use crate::state::{TokenStateStore, TokenView};

const POLL_INTERVAL: Duration = Duration::from_secs(8);
/// Don't re-fetch a token more often than this even if it's still a candidate.
const MIN_FETCH_GAP_SECS: f64 = 7.0;

pub struct EnricherLoop<T> {
    chain: &'static str,
    store: Arc<TokenStateStore<T>>,
    engine: Arc<SignalEngine>,
    client: Arc<EnrichClient>,
}

impl<T: TokenView + 'static> EnricherLoop<T> {
    pub fn new(
        chain: &'static str,
        store: Arc<TokenStateStore<T>>,
        engine: Arc<SignalEngine>,
        client: Arc<EnrichClient>,
    ) -> Arc<Self> {
        Arc::new(Self { chain, store, engine, client })
    }

    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    self.poll_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn poll_once(&self) {
        let candidates = self.store.enrichment_candidates(MIN_FETCH_GAP_SECS);
        for token in candidates {
            self.enrich_one(&token).await;
        }
    }

    async fn enrich_one(&self, token: &str) {
        let pairs = self.client.pairs_for_token(self.chain, token).await;
        let Some(best) = EnrichClient::best_liquidity_pair(&pairs) else {
            return;
        };

        let is_first = self
            .store
            .get_and(token, |s| s.enrichment().ds_mcap.is_none())
            .unwrap_or(false);

        let symbol = best.base_token.symbol.clone();
        let name = best.base_token.name.clone();
        let pair_created_at = best.pair_created_at;
        let has_socials = best.has_socials();
        let mcap = best.mcap();
        let liquidity = best.liquidity.usd.unwrap_or(0.0);
        let buys_m5 = best.txns.m5.buys;
        let sells_m5 = best.txns.m5.sells;
        let volume_m5 = best.volume.m5;

        let copycats = if is_first {
            let query = symbol.clone().unwrap_or_default();
            if query.is_empty() {
                Vec::new()
            } else {
                self.client.search_by_symbol(&query).await
            }
        } else {
            Vec::new()
        };

        let fired = self.store.mutate(token, |s| {
            {
                let e = s.enrichment_mut();
                e.ds_mcap = Some(mcap);
                e.ds_liquidity_usd = Some(liquidity);
                e.ds_buys_m5 = buys_m5;
                e.ds_sells_m5 = sells_m5;
                e.ds_volume_m5 = volume_m5;
                e.last_fetch = now_secs();
            }

            if is_first {
                let ours_liquidity = liquidity;
                let ours_has_socials = has_socials;
                let ours_mcap = mcap;
                let own_symbol = symbol.clone();

                let is_copycat = own_symbol.as_deref().map(|sym| {
                    copycats.iter().any(|cand| {
                        let cand_symbol = cand.base_token.symbol.as_deref().unwrap_or("");
                        let same_symbol = cand_symbol.eq_ignore_ascii_case(sym);
                        let not_self = !cand.base_token.address.eq_ignore_ascii_case(s.token_address());
                        same_symbol && not_self && is_copycat_match(ours_liquidity, ours_has_socials, ours_mcap, cand)
                    })
                }).unwrap_or(false);

                let e = s.enrichment_mut();
                e.token_symbol = symbol;
                e.token_name = name;
                e.pair_created_at_ms = pair_created_at;
                e.has_socials = has_socials;
                e.is_copycat = is_copycat;
            }

            self.engine.evaluate(s, |d, t| self.store.record_deployer(d, t))
        });

        if fired == Some(true) {
            debug!(token, chain = self.chain, "enrichment triggered signal");
        }
        if fired.is_none() {
            warn!(token, chain = self.chain, "enrichment landed after token evicted");
        }
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
