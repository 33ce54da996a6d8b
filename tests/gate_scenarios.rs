//! End-to-end gate scenarios: worked examples for signal firing, rejection,
//! and post-mortem classification across both chains.

use std::time::Duration;

use early_signal_backend::config::GateThresholds;
use early_signal_backend::engine::{PostMortemClass, SignalEngine};
use early_signal_backend::state::{EvmTokenState, Safety, SolTokenState, TokenView};

fn gate() -> GateThresholds {
    GateThresholds {
        max_token_age_evm: Duration::from_secs(180),
        max_token_age_sol: Duration::from_secs(120),
        max_mcap_usd: 30_000.0,
        min_liquidity_usd: 3_000.0,
        min_buys: 2,
        min_largest_buy_pct: 10.0,
        max_signals_per_hour: 5,
        max_deployer_tokens_24h: 2,
        max_signal_latency_seconds: 0,
    }
}

fn happy_evm_token(age_offset: f64) -> EvmTokenState {
    let mut s = EvmTokenState::new("0xabc".into(), "0xpool".into(), "evmA", Duration::from_secs(180));
    s.first_seen -= age_offset;
    s.liquidity_usd = 5_000.0;
    s.estimated_mcap = 15_000.0;
    s.safety = Safety::Safe;
    s.total_buys = 2;
    s.buy_volume_usd = 1_200.0;
    s.largest_buy_usd = 600.0;
    s.unique_buyers.insert("0xbuyer1".into());
    s.unique_buyers.insert("0xbuyer2".into());
    s
}

fn no_deployer(_d: &str, _t: &str) -> u32 {
    0
}

#[test]
fn evm_happy_path_fires() {
    let engine = SignalEngine::new(gate());
    let mut s = happy_evm_token(60.0);
    assert!(engine.evaluate(&mut s, no_deployer));
    assert!(s.signaled());
    assert!(s.signal_time().is_some());
}

#[test]
fn evm_too_old_rejects() {
    let engine = SignalEngine::new(gate());
    let mut s = happy_evm_token(200.0);
    assert!(!engine.evaluate(&mut s, no_deployer));
    let snap = engine.stats_snapshot();
    assert_eq!(snap.reject_reasons.get("too_old"), Some(&1));
}

#[test]
fn high_mcap_rejects() {
    let engine = SignalEngine::new(gate());
    let mut s = happy_evm_token(60.0);
    s.estimated_mcap = 50_000.0;
    assert!(!engine.evaluate(&mut s, no_deployer));
    let snap = engine.stats_snapshot();
    assert_eq!(snap.reject_reasons.get("mcap_high"), Some(&1));
}

#[test]
fn unsafe_bytecode_rejects() {
    let engine = SignalEngine::new(gate());
    let mut s = happy_evm_token(60.0);
    s.safety = Safety::Unsafe;
    assert!(!engine.evaluate(&mut s, no_deployer));
    let snap = engine.stats_snapshot();
    assert_eq!(snap.reject_reasons.get("unsafe_bytecode"), Some(&1));
}

#[test]
fn non_evm_age_threshold_is_stricter_than_evm() {
    let engine_evm = SignalEngine::new(gate());
    let mut evm = happy_evm_token(150.0);
    assert!(engine_evm.evaluate(&mut evm, no_deployer));

    let engine_sol = SignalEngine::new(gate());
    let mut sol = SolTokenState::new("mint1".into(), "pool1".into(), Duration::from_secs(120));
    sol.first_seen -= 150.0;
    sol.liquidity_usd = 5_000.0;
    sol.estimated_mcap = 15_000.0;
    sol.total_buys = 2;
    sol.buy_volume_usd = 1_200.0;
    sol.largest_buy_usd = 600.0;
    sol.unique_buyers.insert("buyerA".into());
    sol.unique_buyers.insert("buyerB".into());
    sol.mint_authority = early_signal_backend::state::SplAuthority::Revoked;
    sol.freeze_authority = early_signal_backend::state::SplAuthority::Revoked;

    assert!(!engine_sol.evaluate(&mut sol, no_deployer));
    let snap = engine_sol.stats_snapshot();
    assert_eq!(snap.reject_reasons.get("too_old"), Some(&1));
}

#[test]
fn non_evm_mint_authority_set_is_unsafe() {
    let engine = SignalEngine::new(gate());
    let mut sol = SolTokenState::new("mint2".into(), "pool2".into(), Duration::from_secs(120));
    sol.liquidity_usd = 5_000.0;
    sol.estimated_mcap = 15_000.0;
    sol.total_buys = 2;
    sol.buy_volume_usd = 1_200.0;
    sol.largest_buy_usd = 600.0;
    sol.unique_buyers.insert("buyerA".into());
    sol.unique_buyers.insert("buyerB".into());
    sol.mint_authority = early_signal_backend::state::SplAuthority::Held;
    sol.freeze_authority = early_signal_backend::state::SplAuthority::Revoked;

    assert!(!engine.evaluate(&mut sol, no_deployer));
    let snap = engine.stats_snapshot();
    assert_eq!(snap.reject_reasons.get("unsafe_bytecode"), Some(&1));
}

#[test]
fn deployer_spam_rejects_after_cap() {
    let engine = SignalEngine::new(gate());
    let seen: std::sync::Mutex<std::collections::HashMap<String, u32>> =
        std::sync::Mutex::new(std::collections::HashMap::new());

    // Pre-record 3 distinct tokens (cap is 2) for deployer D.
    let record = |d: &str, t: &str| -> u32 {
        let mut map = seen.lock().unwrap();
        map.insert(format!("{d}:{t}"), 1);
        map.keys().filter(|k| k.starts_with(&format!("{d}:"))).count() as u32
    };
    record("0xD", "0xt1");
    record("0xD", "0xt2");
    record("0xD", "0xt3");

    let mut s = happy_evm_token(60.0);
    s.deployer_address = "0xD".into();
    assert!(!engine.evaluate(&mut s, record));
    let snap = engine.stats_snapshot();
    assert_eq!(snap.reject_reasons.get("deployer_spam"), Some(&1));
}

#[test]
fn boundary_liquidity_at_floor_passes_one_cent_under_rejects() {
    let engine = SignalEngine::new(gate());
    let mut at_floor = happy_evm_token(60.0);
    at_floor.liquidity_usd = 3_000.0;
    assert!(engine.evaluate(&mut at_floor, no_deployer));

    let engine2 = SignalEngine::new(gate());
    let mut under_floor = happy_evm_token(60.0);
    under_floor.liquidity_usd = 2_999.99;
    assert!(!engine2.evaluate(&mut under_floor, no_deployer));
}

#[test]
fn unpriced_token_is_not_blocked_by_mcap_ceiling() {
    let engine = SignalEngine::new(gate());
    let mut s = happy_evm_token(60.0);
    s.estimated_mcap = 0.0;
    assert!(engine.evaluate(&mut s, no_deployer));
}

#[test]
fn postmortem_classification_matches_worked_examples() {
    let classify = |signal: f64, now: f64| {
        let change = (now - signal) / signal * 100.0;
        PostMortemClass::classify(change)
    };
    assert_eq!(classify(10_000.0, 14_000.0), PostMortemClass::Impulse);
    assert_eq!(classify(10_000.0, 4_000.0), PostMortemClass::Rug);
    assert_eq!(PostMortemClass::classify(-100.0), PostMortemClass::Rug);
    assert_eq!(classify(10_000.0, 10_500.0), PostMortemClass::Flat);
}
