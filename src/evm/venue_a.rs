//! Venue-A: Uniswap V4 PoolManager singleton listener.
//! All pools share one emitter, so this is two topic-filtered subscriptions
//! against one address — no per-pool subscription management needed.

use num_traits::Signed;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::SignalEngine;
use crate::evm::abi;
use crate::evm::constants::{self, V4_POOL_MANAGER};
use crate::price_oracle::PriceOracle;
use crate::price_utils::{estimate_liquidity_usd, estimate_mcap};
use crate::rpc::EvmRpcClient;
use crate::state::{apply_buy, EvmTokenState, TokenStateStore};

pub struct VenueA {
    rpc: Arc<EvmRpcClient>,
    store: Arc<TokenStateStore<EvmTokenState>>,
    engine: Arc<SignalEngine>,
    price: Arc<PriceOracle>,
    safe_hooks: HashSet<String>,
    max_age: Duration,
    pool_map: RwLock<HashMap<String, (String, bool)>>,
}

impl VenueA {
    pub fn new(
        rpc: Arc<EvmRpcClient>,
        store: Arc<TokenStateStore<EvmTokenState>>,
        engine: Arc<SignalEngine>,
        price: Arc<PriceOracle>,
        safe_hooks: Vec<String>,
        max_age: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            rpc,
            store,
            engine,
            price,
            safe_hooks: safe_hooks.into_iter().collect(),
            max_age,
            pool_map: RwLock::new(HashMap::new()),
        })
    }

    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let init_filter = serde_json::json!({
            "address": V4_POOL_MANAGER,
            "topics": [constants::topic_v4_initialize()],
        });
        let swap_filter = serde_json::json!({
            "address": V4_POOL_MANAGER,
            "topics": [constants::topic_v4_swap()],
        });

        let mut init_sub = self.rpc.subscribe_logs(init_filter).await?;
        let mut swap_sub = self.rpc.subscribe_logs(swap_filter).await?;

        let this_init = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(log) = init_sub.rx.recv().await {
                this_init.handle_initialize(&log).await;
            }
        });

        let this_swap = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(log) = swap_sub.rx.recv().await {
                this_swap.handle_swap(&log);
            }
        });

        Ok(())
    }

    fn topics_of(log: &Value) -> Vec<String> {
        log.get("topics")
            .and_then(|t| t.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    async fn handle_initialize(&self, log: &Value) {
        let topics = Self::topics_of(log);
        let data = log.get("data").and_then(|d| d.as_str()).unwrap_or("0x");

        let decoded = match abi::decode_v4_initialize(&topics, data) {
            Ok(d) => d,
            Err(e) => {
                debug!("v4 initialize decode failed: {e}");
                return;
            }
        };

        let eth_set = constants::eth_addresses();
        let c0 = decoded.currency0.to_ascii_lowercase();
        let c1 = decoded.currency1.to_ascii_lowercase();
        if !eth_set.contains(&c0) && !eth_set.contains(&c1) {
            return;
        }
        let (token_address, eth_is_token0) = if eth_set.contains(&c0) {
            (decoded.currency1.clone(), true)
        } else {
            (decoded.currency0.clone(), false)
        };

        let hooks_lower = decoded.hooks.to_ascii_lowercase();
        if !self.safe_hooks.contains(&hooks_lower) {
            debug!(pool = %decoded.pool_id, hooks = %hooks_lower, "v4 pool rejected: hooks not in allowlist");
            return;
        }

        let created = self.store.create_with(&token_address, || {
            EvmTokenState::new(token_address.clone(), decoded.pool_id.clone(), "evmA", self.max_age)
        });
        if !created {
            return;
        }

        self.pool_map
            .write()
            .insert(decoded.pool_id.clone(), (token_address.to_ascii_lowercase(), eth_is_token0));

        let eth_price = self.price.get();
        self.store.mutate(&token_address, |s| {
            s.hooks_address = Some(hooks_lower);
            s.sqrt_price_x96 = decoded.sqrt_price_x96.clone();
            if decoded.sqrt_price_x96 > num_bigint::BigUint::from(0u32) {
                if let Some(mcap) = estimate_mcap(&decoded.sqrt_price_x96, eth_is_token0, eth_price) {
                    s.estimated_mcap = mcap;
                }
            }
        });
    }

    fn handle_swap(&self, log: &Value) {
        let topics = Self::topics_of(log);
        let data = log.get("data").and_then(|d| d.as_str()).unwrap_or("0x");

        let decoded = match abi::decode_v4_swap(&topics, data) {
            Ok(d) => d,
            Err(e) => {
                debug!("v4 swap decode failed: {e}");
                return;
            }
        };

        let entry = { self.pool_map.read().get(&decoded.pool_id).cloned() };
        let Some((token_address, eth_is_token0)) = entry else {
            return;
        };

        // Prune the pool-id mapping once its token is gone or already
        // signaled, matching Venue-B's per-pool tracking set behavior.
        let live = self.store.get_and(&token_address, |s| !s.signaled).unwrap_or(false);
        if !live {
            self.pool_map.write().remove(&decoded.pool_id);
            return;
        }

        let eth_price = self.price.get();
        let (raw_amount, is_buy) = if eth_is_token0 {
            (&decoded.amount0, decoded.amount0.is_positive())
        } else {
            (&decoded.amount1, decoded.amount1.is_positive())
        };
        let eth_value = num_traits::ToPrimitive::to_f64(&raw_amount.abs()).unwrap_or(0.0) / 1e18;
        let usd_value = eth_value * eth_price;

        if is_buy {
            let sender = decoded.sender.clone();
            let liquidity = decoded.liquidity.clone();
            let sqrt_price_x96 = decoded.sqrt_price_x96.clone();
            let fired = self.store.mutate(&token_address, |s| {
                apply_buy(
                    &mut s.total_buys,
                    &mut s.buy_volume_usd,
                    &mut s.largest_buy_usd,
                    &mut s.unique_buyers,
                    &mut s.recent_buy_times,
                    &sender,
                    usd_value,
                );
                s.sqrt_price_x96 = sqrt_price_x96.clone();
                if liquidity > num_bigint::BigUint::from(0u32) && sqrt_price_x96 > num_bigint::BigUint::from(0u32) {
                    if let Some(liq_usd) = estimate_liquidity_usd(&liquidity, &sqrt_price_x96, eth_price) {
                        s.liquidity_usd = liq_usd;
                    }
                }
                self.engine.evaluate(s, |_, _| 0)
            });
            if fired == Some(true) {
                warn!(token = %token_address, "evmA signal fired");
            }
        } else {
            self.store.mutate(&token_address, |s| {
                s.total_sells += 1;
            });
        }
    }
}
