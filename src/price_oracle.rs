//! Price Oracle: a single positive float, periodically
//! refreshed via the enricher client, read by the decoders as a scaling
//! factor. Stale reads are fine — the value is allowed to lag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::enrich::EnrichClient;

pub struct PriceOracle {
    /// f64 bits stored atomically so reads never block a writer.
    bits: AtomicU64,
    chain: &'static str,
    native_address: String,
    quote_symbols: &'static [&'static str],
}

impl PriceOracle {
    pub fn new(chain: &'static str, native_address: String, quote_symbols: &'static [&'static str], fallback: f64) -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU64::new(fallback.to_bits()),
            chain,
            native_address,
            quote_symbols,
        })
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Fetches the current price once. On failure the previous value is retained.
    pub async fn refresh_once(&self, client: &EnrichClient) {
        let pairs = client.pairs_for_token(self.chain, &self.native_address).await;
        for pair in &pairs {
            let quote_symbol = pair
                .quote_token
                .as_ref()
                .and_then(|q| q.symbol.as_deref())
                .unwrap_or("");
            if !self.quote_symbols.iter().any(|q| q.eq_ignore_ascii_case(quote_symbol)) {
                continue;
            }
            if let Some(price) = pair.price_usd.as_ref().and_then(|p| p.parse::<f64>().ok()) {
                if price > 0.0 {
                    debug!(chain = self.chain, price, "price oracle refreshed");
                    self.set(price);
                    return;
                }
            }
        }
    }

    pub async fn run_refresh_loop(self: Arc<Self>, client: Arc<EnrichClient>, shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => {
                    self.refresh_once(&client).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_previous_value_by_default() {
        let oracle = PriceOracle::new("base", "0xweth".into(), &["USDC", "USDbC"], 2500.0);
        assert_eq!(oracle.get(), 2500.0);
    }
}
