//! Central configuration, loaded once at startup and shared as `Arc<Config>`.
//!
//! One immutable record instead of scattered global mutable settings.

use std::env;
use std::time::Duration;

/// Thresholds consumed only by the signal gate (`engine::SignalEngine`).
#[derive(Debug, Clone)]
pub struct GateThresholds {
    pub max_token_age_evm: Duration,
    pub max_token_age_sol: Duration,
    pub max_mcap_usd: f64,
    pub min_liquidity_usd: f64,
    pub min_buys: u32,
    pub min_largest_buy_pct: f64,
    pub max_signals_per_hour: usize,
    pub max_deployer_tokens_24h: u32,
    pub max_signal_latency_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    // EVM
    pub rpc_wss: String,
    pub rpc_http: String,
    pub chain_id: u64,

    // Solana
    pub sol_enabled: bool,
    pub sol_rpc_wss: String,
    pub sol_rpc_http: String,
    pub sol_min_liquidity_sol: f64,

    /// Venue-A hooks allowlist; `address(0)` always safe.
    pub evm_safe_hooks: Vec<String>,
    pub enrich_base_url: String,

    pub gate: GateThresholds,

    pub whale_alert_min_usd: f64,
    pub dry_run: bool,
    pub log_level: String,

    pub signal_webhook_url: Option<String>,
    pub metrics_addr: String,
    pub signal_journal_path: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();

        let gate = GateThresholds {
            max_token_age_evm: Duration::from_secs(env_parse("MAX_TOKEN_AGE_SECONDS", 180)),
            max_token_age_sol: Duration::from_secs(env_parse("SOL_MAX_TOKEN_AGE_SECONDS", 120)),
            max_mcap_usd: env_parse("MAX_MCAP_USD", 30_000.0),
            min_liquidity_usd: env_parse("MIN_LIQUIDITY_USD", 3_000.0),
            min_buys: env_parse("MIN_BUYS", 2),
            min_largest_buy_pct: env_parse("MIN_LARGEST_BUY_PCT", 10.0),
            max_signals_per_hour: env_parse("MAX_SIGNALS_PER_HOUR", 5),
            max_deployer_tokens_24h: env_parse("MAX_DEPLOYER_TOKENS_24H", 2),
            max_signal_latency_seconds: env_parse("MAX_SIGNAL_LATENCY_SECONDS", 0),
        };

        Self {
            rpc_wss: env_or("RPC_WSS", "wss://base-mainnet.example/ws"),
            rpc_http: env_or("RPC_HTTP", "https://base-mainnet.example/rpc"),
            chain_id: env_parse("CHAIN_ID", 8453),

            sol_enabled: env_or("SOL_ENABLED", "false") == "true",
            sol_rpc_wss: env_or("SOL_RPC_WSS", "wss://api.mainnet-beta.solana.com"),
            sol_rpc_http: env_or("SOL_RPC_HTTP", "https://api.mainnet-beta.solana.com"),
            sol_min_liquidity_sol: env_parse("SOL_MIN_LIQUIDITY_SOL", 10.0),

            evm_safe_hooks: env::var("EVM_SAFE_HOOKS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_ascii_lowercase()).collect())
                .unwrap_or_else(|| crate::evm::constants::default_safe_hooks()),
            enrich_base_url: env_or("ENRICH_BASE_URL", "https://api.dexscreener.com"),

            gate,

            whale_alert_min_usd: env_parse("WHALE_ALERT_MIN_USD", 5_000.0),
            dry_run: env_or("DRY_RUN", "true") == "true",
            log_level: env_or("LOG_LEVEL", "info"),

            signal_webhook_url: env::var("SIGNAL_WEBHOOK_URL").ok(),
            metrics_addr: env_or("METRICS_ADDR", "127.0.0.1:9090"),
            signal_journal_path: env::var("SIGNAL_JOURNAL_PATH").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        env::remove_var("MAX_MCAP_USD");
        env::remove_var("MIN_LIQUIDITY_USD");
        let cfg = Config::from_env();
        assert_eq!(cfg.gate.max_mcap_usd, 30_000.0);
        assert_eq!(cfg.gate.min_liquidity_usd, 3_000.0);
        assert_eq!(cfg.gate.max_token_age_evm, Duration::from_secs(180));
        assert_eq!(cfg.gate.max_token_age_sol, Duration::from_secs(120));
        assert_eq!(cfg.gate.max_deployer_tokens_24h, 2);
    }
}
