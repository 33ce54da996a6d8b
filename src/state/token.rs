//! Per-token state and the chain-agnostic read contract
//! the signal engine evaluates against.
//!
//! Two concrete state types (`EvmTokenState`, `SolTokenState`) implement the
//! shared `TokenView` trait instead of branching on a chain-tag string.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Tri-state safety verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Safety {
    Safe,
    Unsafe,
    Unknown,
}

impl Safety {
    pub fn is_unsafe(&self) -> bool {
        matches!(self, Safety::Unsafe)
    }
}

/// Fields populated by the enricher; absent until first success.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub ds_mcap: Option<f64>,
    pub ds_liquidity_usd: Option<f64>,
    pub ds_buys_m5: Option<u32>,
    pub ds_sells_m5: Option<u32>,
    pub ds_volume_m5: Option<f64>,
    pub last_fetch: f64,
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub pair_created_at_ms: Option<i64>,
    pub has_socials: bool,
    pub is_copycat: bool,
}

/// Read-only capability set the engine evaluates.
pub trait TokenView {
    fn token_address(&self) -> &str;
    fn chain_tag(&self) -> &'static str;
    fn venue_tag(&self) -> &'static str;
    fn first_seen(&self) -> f64;
    fn signaled(&self) -> bool;
    fn mark_signaled(&mut self, at: f64);
    fn signal_time(&self) -> Option<f64>;
    fn deployer(&self) -> &str;
    fn max_age(&self) -> Duration;
    fn safety(&self) -> Safety;
    fn enrichment(&self) -> &Enrichment;
    fn enrichment_mut(&mut self) -> &mut Enrichment;

    fn total_buys(&self) -> u32;
    fn largest_buy_usd(&self) -> f64;
    fn buy_volume_usd(&self) -> f64;
    fn estimated_mcap(&self) -> f64;
    fn liquidity_usd(&self) -> f64;
    fn unique_buyers(&self) -> &HashSet<String>;
    fn recent_buy_times(&self) -> &[f64];

    fn age_seconds(&self) -> f64 {
        (now_secs() - self.first_seen()).max(0.0)
    }

    fn best_mcap(&self) -> f64 {
        match self.enrichment().ds_mcap {
            Some(m) if m > 0.0 => m,
            _ => self.estimated_mcap(),
        }
    }

    fn best_liquidity(&self) -> f64 {
        match self.enrichment().ds_liquidity_usd {
            Some(l) if l > 0.0 => l,
            _ => self.liquidity_usd(),
        }
    }

    fn best_buys(&self) -> u32 {
        match self.enrichment().ds_buys_m5 {
            Some(ds) => self.total_buys().max(ds),
            None => self.total_buys(),
        }
    }

    /// Venue-A hooks address, surfaced for the notification message's "hooks"
    /// tag; `None` on chains/venues with no such concept.
    fn hooks_tag(&self) -> Option<&str> {
        None
    }

    fn has_momentum(&self) -> bool {
        let now = now_secs();
        let recent = self
            .recent_buy_times()
            .iter()
            .filter(|t| now - *t <= 30.0)
            .count();
        if recent >= 2 {
            return true;
        }
        let liq = self.best_liquidity();
        if liq > 0.0 && self.buy_volume_usd() >= liq * 0.20 {
            return true;
        }
        if self.total_buys() as usize > self.unique_buyers().len() && self.total_buys() >= 2 {
            return true;
        }
        false
    }
}

#[derive(Debug, Clone)]
pub struct EvmTokenState {
    pub token_address: String,
    pub pair_address: String,
    pub first_seen: f64,
    pub venue: &'static str, // "evmA" | "evmB"
    pub max_age: Duration,

    pub total_buys: u32,
    pub total_sells: u32,
    pub buy_volume_usd: f64,
    pub largest_buy_usd: f64,
    pub unique_buyers: HashSet<String>,
    pub recent_buy_times: Vec<f64>,

    pub sqrt_price_x96: num_bigint::BigUint,
    pub liquidity_usd: f64,
    pub estimated_mcap: f64,
    pub deployer_address: String,
    /// Venue-A only (PoolManager hooks address); Venue-B has no hooks concept.
    pub hooks_address: Option<String>,

    pub enrichment: Enrichment,
    pub safety: Safety,

    pub signaled: bool,
    pub signal_time: Option<f64>,
}

impl EvmTokenState {
    pub fn new(
        token_address: String,
        pair_address: String,
        venue: &'static str,
        max_age: Duration,
    ) -> Self {
        Self {
            token_address,
            pair_address,
            first_seen: now_secs(),
            venue,
            max_age,
            total_buys: 0,
            total_sells: 0,
            buy_volume_usd: 0.0,
            largest_buy_usd: 0.0,
            unique_buyers: HashSet::new(),
            recent_buy_times: Vec::new(),
            sqrt_price_x96: num_bigint::BigUint::from(0u32),
            liquidity_usd: 0.0,
            estimated_mcap: 0.0,
            deployer_address: String::new(),
            hooks_address: None,
            enrichment: Enrichment::default(),
            safety: Safety::Unknown,
            signaled: false,
            signal_time: None,
        }
    }
}

impl TokenView for EvmTokenState {
    fn token_address(&self) -> &str {
        &self.token_address
    }
    fn chain_tag(&self) -> &'static str {
        "base"
    }
    fn venue_tag(&self) -> &'static str {
        self.venue
    }
    fn first_seen(&self) -> f64 {
        self.first_seen
    }
    fn signaled(&self) -> bool {
        self.signaled
    }
    fn mark_signaled(&mut self, at: f64) {
        self.signaled = true;
        self.signal_time = Some(at);
    }
    fn signal_time(&self) -> Option<f64> {
        self.signal_time
    }
    fn deployer(&self) -> &str {
        &self.deployer_address
    }
    fn max_age(&self) -> Duration {
        self.max_age
    }
    fn safety(&self) -> Safety {
        self.safety
    }
    fn enrichment(&self) -> &Enrichment {
        &self.enrichment
    }
    fn enrichment_mut(&mut self) -> &mut Enrichment {
        &mut self.enrichment
    }
    fn total_buys(&self) -> u32 {
        self.total_buys
    }
    fn largest_buy_usd(&self) -> f64 {
        self.largest_buy_usd
    }
    fn buy_volume_usd(&self) -> f64 {
        self.buy_volume_usd
    }
    fn estimated_mcap(&self) -> f64 {
        self.estimated_mcap
    }
    fn liquidity_usd(&self) -> f64 {
        self.liquidity_usd
    }
    fn unique_buyers(&self) -> &HashSet<String> {
        &self.unique_buyers
    }
    fn recent_buy_times(&self) -> &[f64] {
        &self.recent_buy_times
    }
    fn hooks_tag(&self) -> Option<&str> {
        self.hooks_address.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplAuthority {
    /// Authority revoked (`null` on-chain) — the safe state.
    Revoked,
    /// Not yet checked.
    Unchecked,
    /// Authority held by some pubkey — unsafe.
    Held,
}

#[derive(Debug, Clone)]
pub struct SolTokenState {
    pub token_address: String, // SPL mint
    pub pair_address: String,  // Raydium AMM pool
    pub first_seen: f64,
    pub max_age: Duration,

    pub total_buys: u32,
    pub total_sells: u32,
    pub buy_volume_usd: f64,
    pub largest_buy_usd: f64,
    pub unique_buyers: HashSet<String>,
    pub recent_buy_times: Vec<f64>,

    pub liquidity_sol: f64,
    pub liquidity_usd: f64,
    pub estimated_mcap: f64,
    pub deployer_address: String,

    pub mint_authority: SplAuthority,
    pub freeze_authority: SplAuthority,

    pub enrichment: Enrichment,

    pub signaled: bool,
    pub signal_time: Option<f64>,
}

impl SolTokenState {
    pub fn new(token_address: String, pair_address: String, max_age: Duration) -> Self {
        Self {
            token_address,
            pair_address,
            first_seen: now_secs(),
            max_age,
            total_buys: 0,
            total_sells: 0,
            buy_volume_usd: 0.0,
            largest_buy_usd: 0.0,
            unique_buyers: HashSet::new(),
            recent_buy_times: Vec::new(),
            liquidity_sol: 0.0,
            liquidity_usd: 0.0,
            estimated_mcap: 0.0,
            deployer_address: String::new(),
            mint_authority: SplAuthority::Unchecked,
            freeze_authority: SplAuthority::Unchecked,
            enrichment: Enrichment::default(),
            signaled: false,
            signal_time: None,
        }
    }

    /// Tri-state safety derived from the two SPL authorities.
    pub fn safety(&self) -> Safety {
        use SplAuthority::*;
        match (self.mint_authority, self.freeze_authority) {
            (Unchecked, _) | (_, Unchecked) => Safety::Unknown,
            (Revoked, Revoked) => Safety::Safe,
            _ => Safety::Unsafe,
        }
    }
}

impl TokenView for SolTokenState {
    fn token_address(&self) -> &str {
        &self.token_address
    }
    fn chain_tag(&self) -> &'static str {
        "solana"
    }
    fn venue_tag(&self) -> &'static str {
        "solRay"
    }
    fn first_seen(&self) -> f64 {
        self.first_seen
    }
    fn signaled(&self) -> bool {
        self.signaled
    }
    fn mark_signaled(&mut self, at: f64) {
        self.signaled = true;
        self.signal_time = Some(at);
    }
    fn signal_time(&self) -> Option<f64> {
        self.signal_time
    }
    fn deployer(&self) -> &str {
        &self.deployer_address
    }
    fn max_age(&self) -> Duration {
        self.max_age
    }
    fn safety(&self) -> Safety {
        SolTokenState::safety(self)
    }
    fn enrichment(&self) -> &Enrichment {
        &self.enrichment
    }
    fn enrichment_mut(&mut self) -> &mut Enrichment {
        &mut self.enrichment
    }
    fn total_buys(&self) -> u32 {
        self.total_buys
    }
    fn largest_buy_usd(&self) -> f64 {
        self.largest_buy_usd
    }
    fn buy_volume_usd(&self) -> f64 {
        self.buy_volume_usd
    }
    fn estimated_mcap(&self) -> f64 {
        self.estimated_mcap
    }
    fn liquidity_usd(&self) -> f64 {
        self.liquidity_usd
    }
    fn unique_buyers(&self) -> &HashSet<String> {
        &self.unique_buyers
    }
    fn recent_buy_times(&self) -> &[f64] {
        &self.recent_buy_times
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_mcap_prefers_positive_ds_value() {
        let mut s = EvmTokenState::new("0xabc".into(), "0xpool".into(), "evmA", Duration::from_secs(180));
        s.estimated_mcap = 15_000.0;
        assert_eq!(s.best_mcap(), 15_000.0);
        s.enrichment.ds_mcap = Some(20_000.0);
        assert_eq!(s.best_mcap(), 20_000.0);
        s.enrichment.ds_mcap = Some(0.0);
        assert_eq!(s.best_mcap(), 15_000.0);
    }

    #[test]
    fn spl_safety_requires_both_authorities_revoked() {
        let mut s = SolTokenState::new("mint".into(), "pool".into(), Duration::from_secs(120));
        assert_eq!(s.safety(), Safety::Unknown);
        s.mint_authority = SplAuthority::Revoked;
        s.freeze_authority = SplAuthority::Revoked;
        assert_eq!(s.safety(), Safety::Safe);
        s.freeze_authority = SplAuthority::Held;
        assert_eq!(s.safety(), Safety::Unsafe);
    }
}
