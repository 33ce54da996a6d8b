//! Token-State Store: sole owner of TokenState instances,
//! single-writer, TTL-evicting, with a deployer-spam side-index.
//!
//! Generic over the concrete state type so the EVM and Solana stores share
//! one implementation (TokenView gives the engine a uniform read contract;
//! the store itself only needs construction + the handful of mutators below).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::token::TokenView;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

const DEPLOYER_WINDOW_SECS: f64 = 24.0 * 3600.0;
const BUY_WINDOW_SECS: f64 = 60.0;

/// Single-writer, TTL-evicting map from canonical token address to state.
///
/// The deployer side-index lives behind its own lock, separate from `tokens`:
/// `engine::SignalEngine::evaluate` calls `record_deployer` from inside a
/// `mutate` closure, and a single shared lock would deadlock on that
/// re-entrant write.
pub struct TokenStateStore<T> {
    tokens: RwLock<HashMap<String, T>>,
    /// deployer -> (token -> first-seen timestamp)
    deployer_index: RwLock<HashMap<String, HashMap<String, f64>>>,
}

impl<T: TokenView> TokenStateStore<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tokens: RwLock::new(HashMap::new()),
            deployer_index: RwLock::new(HashMap::new()),
        })
    }

    fn normalize(token: &str) -> String {
        token.to_lowercase()
    }

    /// Returns `None` if absent or aged out; evicts aged-out entries as a side effect.
    pub fn get_and<R>(&self, token: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let key = Self::normalize(token);
        let mut tokens = self.tokens.write();
        let stale = match tokens.get(&key) {
            Some(s) => s.age_seconds() > s.max_age().as_secs_f64(),
            None => return None,
        };
        if stale {
            tokens.remove(&key);
            return None;
        }
        tokens.get(&key).map(f)
    }

    pub fn mutate<R>(&self, token: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let key = Self::normalize(token);
        let mut tokens = self.tokens.write();
        let stale = match tokens.get(&key) {
            Some(s) => s.age_seconds() > s.max_age().as_secs_f64(),
            None => return None,
        };
        if stale {
            tokens.remove(&key);
            return None;
        }
        tokens.get_mut(&key).map(f)
    }

    /// Idempotent: returns the existing entry if already created.
    pub fn create_with(&self, token: &str, make: impl FnOnce() -> T) -> bool {
        let key = Self::normalize(token);
        let mut tokens = self.tokens.write();
        if tokens.contains_key(&key) {
            return false;
        }
        tokens.insert(key, make());
        true
    }

    pub fn active_count(&self) -> usize {
        self.tokens.read().len()
    }

    /// Bulk removal of aged-out entries.
    pub fn evict_stale(&self) -> usize {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, s| s.age_seconds() <= s.max_age().as_secs_f64());
        before - tokens.len()
    }

    /// Tokens due for an enrichment pass: not yet signaled,
    /// not aged out, and not fetched within `min_gap_secs`. Evicts aged-out
    /// entries found along the way, same as `get_and`/`mutate`.
    pub fn enrichment_candidates(&self, min_gap_secs: f64) -> Vec<String> {
        let now = now_secs();
        let mut tokens = self.tokens.write();
        tokens.retain(|_, s| s.age_seconds() <= s.max_age().as_secs_f64());
        tokens
            .iter()
            .filter(|(_, s)| !s.signaled() && now - s.enrichment().last_fetch >= min_gap_secs)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Records (deployer, token), prunes entries older than 24h, returns the
    /// unique-token count still within the window. Safe to call from inside
    /// a `mutate` closure on the same store (separate lock).
    pub fn record_deployer(&self, deployer: &str, token: &str) -> u32 {
        if deployer.is_empty() {
            return 0;
        }
        let now = now_secs();
        let key = Self::normalize(token);
        let mut index = self.deployer_index.write();
        let entry = index.entry(deployer.to_lowercase()).or_default();
        entry.entry(key).or_insert(now);
        entry.retain(|_, ts| now - *ts < DEPLOYER_WINDOW_SECS);
        entry.len() as u32
    }
}

/// Appends to the rolling buy-timestamp window (trimmed to the last 60s),
/// updates counters, max-updates largest_buy_usd, inserts the buyer.
/// Shared helper since both state types have identical field shapes for this.
pub fn apply_buy(
    total_buys: &mut u32,
    buy_volume_usd: &mut f64,
    largest_buy_usd: &mut f64,
    unique_buyers: &mut std::collections::HashSet<String>,
    recent_buy_times: &mut Vec<f64>,
    buyer: &str,
    usd: f64,
) {
    let now = now_secs();
    *total_buys += 1;
    *buy_volume_usd += usd;
    if usd > *largest_buy_usd {
        *largest_buy_usd = usd;
    }
    unique_buyers.insert(buyer.to_lowercase());
    recent_buy_times.push(now);
    recent_buy_times.retain(|t| now - *t <= BUY_WINDOW_SECS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::token::EvmTokenState;
    use std::time::Duration;

    fn mk(addr: &str) -> EvmTokenState {
        EvmTokenState::new(addr.into(), "pool".into(), "evmA", Duration::from_secs(180))
    }

    #[test]
    fn create_is_idempotent() {
        let store = TokenStateStore::<EvmTokenState>::new();
        assert!(store.create_with("0xabc", || mk("0xabc")));
        assert!(!store.create_with("0xABC", || mk("0xabc")));
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn record_buy_updates_counters_exactly_once() {
        let store = TokenStateStore::<EvmTokenState>::new();
        store.create_with("0xabc", || mk("0xabc"));
        store.mutate("0xabc", |s| {
            apply_buy(
                &mut s.total_buys,
                &mut s.buy_volume_usd,
                &mut s.largest_buy_usd,
                &mut s.unique_buyers,
                &mut s.recent_buy_times,
                "0xbuyer",
                600.0,
            )
        });
        let (buys, vol, uniq) = store
            .get_and("0xabc", |s| (s.total_buys, s.buy_volume_usd, s.unique_buyers.len()))
            .unwrap();
        assert_eq!(buys, 1);
        assert_eq!(vol, 600.0);
        assert_eq!(uniq, 1);
    }

    #[test]
    fn deployer_spam_counter_is_idempotent_per_pair() {
        let store = TokenStateStore::<EvmTokenState>::new();
        assert_eq!(store.record_deployer("0xDEV", "0xt1"), 1);
        assert_eq!(store.record_deployer("0xdev", "0xt1"), 1);
        assert_eq!(store.record_deployer("0xdev", "0xt2"), 2);
        assert_eq!(store.record_deployer("0xdev", "0xt3"), 3);
    }

    #[test]
    fn get_evicts_aged_out_entries_as_side_effect() {
        let store = TokenStateStore::<EvmTokenState>::new();
        store.create_with("0xabc", || {
            let mut s = mk("0xabc");
            s.first_seen -= 1000.0;
            s
        });
        assert!(store.get_and("0xabc", |_| ()).is_none());
        assert_eq!(store.active_count(), 0);
    }
}
