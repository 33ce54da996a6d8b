//! Venue-B: Uniswap V3 Factory + per-pool listener.
//! Swaps are emitted per-pool, so a global topic subscription would stream
//! every V3 swap on the chain; instead this tracks a pool set and polls
//! `eth_getLogs` over the block range since the last poll, every ~2s.

use num_traits::Signed;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::SignalEngine;
use crate::evm::abi;
use crate::evm::constants::{self, V3_FACTORY};
use crate::price_oracle::PriceOracle;
use crate::price_utils::{estimate_liquidity_usd, estimate_mcap};
use crate::rpc::EvmRpcClient;
use crate::state::{apply_buy, EvmTokenState, TokenStateStore};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct VenueB {
    rpc: Arc<EvmRpcClient>,
    store: Arc<TokenStateStore<EvmTokenState>>,
    engine: Arc<SignalEngine>,
    price: Arc<PriceOracle>,
    max_age: Duration,
    pool_map: RwLock<HashMap<String, (String, bool)>>,
    tracked_pools: RwLock<HashSet<String>>,
    last_polled_block: AtomicU64,
}

impl VenueB {
    pub fn new(
        rpc: Arc<EvmRpcClient>,
        store: Arc<TokenStateStore<EvmTokenState>>,
        engine: Arc<SignalEngine>,
        price: Arc<PriceOracle>,
        max_age: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            rpc,
            store,
            engine,
            price,
            max_age,
            pool_map: RwLock::new(HashMap::new()),
            tracked_pools: RwLock::new(HashSet::new()),
            last_polled_block: AtomicU64::new(0),
        })
    }

    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let filter = serde_json::json!({
            "address": V3_FACTORY,
            "topics": [constants::topic_v3_pool_created()],
        });
        let mut sub = self.rpc.subscribe_logs(filter).await?;

        if let Ok(head) = self.rpc.block_number().await {
            self.last_polled_block.store(head, Ordering::Relaxed);
        }

        let this_created = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(log) = sub.rx.recv().await {
                this_created.handle_pool_created(&log).await;
            }
        });

        let this_poll = Arc::clone(&self);
        tokio::spawn(async move {
            this_poll.poll_swaps_forever().await;
        });

        Ok(())
    }

    fn topics_of(log: &Value) -> Vec<String> {
        log.get("topics")
            .and_then(|t| t.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    async fn handle_pool_created(&self, log: &Value) {
        let topics = Self::topics_of(log);
        let data = log.get("data").and_then(|d| d.as_str()).unwrap_or("0x");

        let decoded = match abi::decode_v3_pool_created(&topics, data) {
            Ok(d) => d,
            Err(e) => {
                debug!("v3 pool created decode failed: {e}");
                return;
            }
        };

        let eth_set = constants::eth_addresses();
        let t0 = decoded.token0.to_ascii_lowercase();
        let t1 = decoded.token1.to_ascii_lowercase();
        if !eth_set.contains(&t0) && !eth_set.contains(&t1) {
            return;
        }
        if !constants::ALLOWED_FEE_TIERS.contains(&decoded.fee) {
            return;
        }
        let (token_address, eth_is_token0) = if eth_set.contains(&t0) {
            (decoded.token1.clone(), true)
        } else {
            (decoded.token0.clone(), false)
        };

        let pool_addr = decoded.pool.to_ascii_lowercase();
        let created = self.store.create_with(&token_address, || {
            EvmTokenState::new(token_address.clone(), pool_addr.clone(), "evmB", self.max_age)
        });
        if !created {
            return;
        }

        self.pool_map
            .write()
            .insert(pool_addr.clone(), (token_address.to_ascii_lowercase(), eth_is_token0));
        self.tracked_pools.write().insert(pool_addr.clone());

        // Best-effort initial price via slot0(); failure just leaves the
        // estimate at zero until the first swap arrives.
        if let Ok(result) = self.rpc.call(&pool_addr, &constants::selector_slot0()).await {
            if let Ok(bytes) = abi::hex_to_bytes(&result) {
                if bytes.len() >= 32 {
                    let sqrt_price_x96 = num_bigint::BigUint::from_bytes_be(&bytes[0..32]);
                    let eth_price = self.price.get();
                    self.store.mutate(&token_address, |s| {
                        s.sqrt_price_x96 = sqrt_price_x96.clone();
                        if let Some(mcap) = estimate_mcap(&sqrt_price_x96, eth_is_token0, eth_price) {
                            s.estimated_mcap = mcap;
                        }
                    });
                }
            }
        }
    }

    async fn poll_swaps_forever(self: Arc<Self>) {
        loop {
            if let Err(e) = self.poll_swaps_once().await {
                warn!("v3 swap poll error: {e}");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn poll_swaps_once(&self) -> anyhow::Result<()> {
        let current_block = self.rpc.block_number().await?;
        let from_block = self.last_polled_block.load(Ordering::Relaxed) + 1;
        if current_block < from_block {
            return Ok(());
        }

        let tracked: Vec<String> = self.tracked_pools.read().iter().cloned().collect();
        if tracked.is_empty() {
            self.last_polled_block.store(current_block, Ordering::Relaxed);
            return Ok(());
        }

        let filter = serde_json::json!({
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", current_block),
            "address": tracked,
            "topics": [constants::topic_v3_swap()],
        });
        let logs = self.rpc.get_logs(filter).await?;
        for log in &logs {
            let pool_addr = log
                .get("address")
                .and_then(|a| a.as_str())
                .map(|s| s.to_ascii_lowercase());
            if let Some(pool_addr) = pool_addr {
                if self.tracked_pools.read().contains(&pool_addr) {
                    self.handle_swap(log, &pool_addr);
                }
            }
        }
        self.last_polled_block.store(current_block, Ordering::Relaxed);
        Ok(())
    }

    fn handle_swap(&self, log: &Value, pool_addr: &str) {
        let topics = Self::topics_of(log);
        let data = log.get("data").and_then(|d| d.as_str()).unwrap_or("0x");

        let decoded = match abi::decode_v3_swap(&topics, data) {
            Ok(d) => d,
            Err(e) => {
                debug!("v3 swap decode failed: {e}");
                return;
            }
        };

        let entry = { self.pool_map.read().get(pool_addr).cloned() };
        let Some((token_address, eth_is_token0)) = entry else {
            return;
        };

        let live = self.store.get_and(&token_address, |s| !s.signaled).unwrap_or(false);
        if !live {
            self.tracked_pools.write().remove(pool_addr);
            self.pool_map.write().remove(pool_addr);
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
                warn!(token = %token_address, "evmB signal fired");
            }
        } else {
            self.store.mutate(&token_address, |s| {
                s.total_sells += 1;
            });
        }
    }
}
