//! Signal Engine: the gate. Single operation,
//! `evaluate`, consulted on every swap update and every enrichment poll.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::GateThresholds;
use crate::state::{Safety, TokenView};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

const SIGNALS_WINDOW_SECS: f64 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooOld,
    McapHigh,
    WeakBuy,
    RateLimited,
    DeployerSpam,
    UnsafeBytecode,
    Copycat,
    NoSells,
    TooSlow,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooOld => "too_old",
            RejectReason::McapHigh => "mcap_high",
            RejectReason::WeakBuy => "weak_buy",
            RejectReason::RateLimited => "rate_limited",
            RejectReason::DeployerSpam => "deployer_spam",
            RejectReason::UnsafeBytecode => "unsafe_bytecode",
            RejectReason::Copycat => "copycat",
            RejectReason::NoSells => "no_sells",
            RejectReason::TooSlow => "too_slow",
        }
    }
}

/// What downstream consumers get: just enough to re-query the store.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SignalEvent {
    pub token: String,
    pub chain: &'static str,
    pub venue: &'static str,
    pub signal_time: f64,
}

/// Post-mortem classification, ordered the way the
/// classifier checks them: a disappeared pair maps to `change = -100`, which
/// falls into `Rug` before it could ever be read as `Dump`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostMortemClass {
    TpHit,
    Impulse,
    Flat,
    Rug,
    Dump,
    Chop,
}

impl PostMortemClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostMortemClass::TpHit => "tp_hit",
            PostMortemClass::Impulse => "impulse",
            PostMortemClass::Flat => "flat",
            PostMortemClass::Rug => "rug",
            PostMortemClass::Dump => "dump",
            PostMortemClass::Chop => "chop",
        }
    }

    /// `change` is `(mcap_now - mcap_at_signal) / mcap_at_signal * 100`, with
    /// a disappeared pair / zero mcap already mapped to `-100` by the caller.
    pub fn classify(change: f64) -> Self {
        if change >= 30.0 {
            PostMortemClass::TpHit
        } else if change > 10.0 {
            PostMortemClass::Impulse
        } else if change.abs() <= 10.0 {
            PostMortemClass::Flat
        } else if change <= -50.0 {
            PostMortemClass::Rug
        } else if change <= -20.0 {
            PostMortemClass::Dump
        } else {
            PostMortemClass::Chop
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    evaluated: u64,
    signaled: u64,
    rejected: u64,
    reject_reasons: HashMap<RejectReason, u64>,
    latencies: Vec<f64>,
    latency_buckets: [u64; 6], // 0-15,15-30,30-60,60-90,90-120,120+
    postmortem_counts: HashMap<PostMortemClass, u64>,
}

fn bucket_latency(buckets: &mut [u64; 6], latency: f64) {
    let idx = if latency < 15.0 {
        0
    } else if latency < 30.0 {
        1
    } else if latency < 60.0 {
        2
    } else if latency < 90.0 {
        3
    } else if latency < 120.0 {
        4
    } else {
        5
    };
    buckets[idx] += 1;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub evaluated: u64,
    pub signaled: u64,
    pub rejected: u64,
    pub reject_reasons: HashMap<String, u64>,
    pub signals_this_hour: usize,
    pub avg_latency_s: Option<f64>,
    pub min_latency_s: Option<f64>,
    pub max_latency_s: Option<f64>,
    pub latency_distribution: HashMap<String, u64>,
    pub postmortem_counts: HashMap<String, u64>,
    pub tp_hit_rate: Option<f64>,
    pub rug_rate: Option<f64>,
}

const BUCKET_LABELS: [&str; 6] = ["0-15s", "15-30s", "30-60s", "60-90s", "90-120s", "120s+"];

pub struct SignalEngine {
    gate: GateThresholds,
    signal_tx: tokio::sync::broadcast::Sender<SignalEvent>,
    signal_timestamps: Mutex<Vec<f64>>,
    stats: Mutex<Stats>,
}

impl SignalEngine {
    pub fn new(gate: GateThresholds) -> Self {
        let (signal_tx, _) = tokio::sync::broadcast::channel(1024);
        Self {
            gate,
            signal_tx,
            signal_timestamps: Mutex::new(Vec::new()),
            stats: Mutex::new(Stats::default()),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SignalEvent> {
        self.signal_tx.subscribe()
    }

    fn reject(&self, reason: RejectReason) {
        let mut stats = self.stats.lock();
        stats.rejected += 1;
        *stats.reject_reasons.entry(reason).or_insert(0) += 1;
    }

    /// Evaluates `state` against the gate. `record_deployer`
    /// is the store's deployer-spam side-index mutator, passed in so the engine
    /// stays generic over the concrete store type.
    pub fn evaluate<T: TokenView>(
        &self,
        state: &mut T,
        record_deployer: impl FnOnce(&str, &str) -> u32,
    ) -> bool {
        self.stats.lock().evaluated += 1;

        if state.signaled() {
            return false;
        }

        // 1. age
        if state.age_seconds() > state.max_age().as_secs_f64() {
            self.reject(RejectReason::TooOld);
            return false;
        }

        // 2. mcap ceiling (0 == unpriced, permitted)
        let mcap = state.best_mcap();
        if mcap > self.gate.max_mcap_usd && mcap > 0.0 {
            self.reject(RejectReason::McapHigh);
            return false;
        }

        // 3. liquidity floor (silent reject)
        let liquidity = state.best_liquidity();
        if liquidity < self.gate.min_liquidity_usd {
            return false;
        }

        // 4. min buys (silent reject)
        if state.best_buys() < self.gate.min_buys {
            return false;
        }

        // 5. largest buy % of liquidity
        let largest_pct = if liquidity > 0.0 {
            state.largest_buy_usd() / liquidity * 100.0
        } else {
            0.0
        };
        if largest_pct < self.gate.min_largest_buy_pct {
            self.reject(RejectReason::WeakBuy);
            return false;
        }

        // 6. global hourly rate limit
        let now = now_secs();
        {
            let mut ts = self.signal_timestamps.lock();
            ts.retain(|t| now - *t < SIGNALS_WINDOW_SECS);
            if ts.len() >= self.gate.max_signals_per_hour {
                self.reject(RejectReason::RateLimited);
                return false;
            }
        }

        // 7. deployer spam
        if !state.deployer().is_empty() {
            let count = record_deployer(state.deployer(), state.token_address());
            if count > self.gate.max_deployer_tokens_24h {
                self.reject(RejectReason::DeployerSpam);
                return false;
            }
        }

        // 8. safety
        if state.safety().is_unsafe() {
            self.reject(RejectReason::UnsafeBytecode);
            return false;
        }

        // 9. copycat
        if state.enrichment().is_copycat {
            self.reject(RejectReason::Copycat);
            return false;
        }

        // 10. honeypot proxy (DS buys > 5, sells == 0)
        if let (Some(buys), Some(sells)) = (state.enrichment().ds_buys_m5, state.enrichment().ds_sells_m5) {
            if buys > 5 && sells == 0 {
                self.reject(RejectReason::NoSells);
                return false;
            }
        }

        // 11. latency cutoff
        let time_to_signal = now - state.first_seen();
        if self.gate.max_signal_latency_seconds > 0
            && time_to_signal > self.gate.max_signal_latency_seconds as f64
        {
            self.reject(RejectReason::TooSlow);
            return false;
        }

        // fire
        state.mark_signaled(now);
        self.signal_timestamps.lock().push(now);

        {
            let mut stats = self.stats.lock();
            stats.signaled += 1;
            stats.latencies.push(time_to_signal);
            bucket_latency(&mut stats.latency_buckets, time_to_signal);
        }

        let event = SignalEvent {
            token: state.token_address().to_string(),
            chain: state.chain_tag(),
            venue: state.venue_tag(),
            signal_time: now,
        };
        // A lagging/closed broadcast channel only means there are currently no
        // subscribers; the signal itself has already fired and is recorded in
        // stats regardless of delivery.
        let _ = self.signal_tx.send(event);

        true
    }

    /// Records a post-mortem outcome against the rolling
    /// TP-hit-rate / rug-rate stats. Called by the post-mortem scheduler once
    /// a signal's follow-up window has matured.
    pub fn record_postmortem(&self, class: PostMortemClass) {
        *self.stats.lock().postmortem_counts.entry(class).or_insert(0) += 1;
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let stats = self.stats.lock();
        let n = stats.latencies.len();
        let (avg, min, max) = if n > 0 {
            let sum: f64 = stats.latencies.iter().sum();
            let min = stats.latencies.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = stats.latencies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            (Some(sum / n as f64), Some(min), Some(max))
        } else {
            (None, None, None)
        };

        let mut latency_distribution = HashMap::new();
        let total: u64 = stats.latency_buckets.iter().sum();
        if total > 0 {
            for (i, label) in BUCKET_LABELS.iter().enumerate() {
                let count = stats.latency_buckets[i];
                if count > 0 {
                    latency_distribution.insert(label.to_string(), count);
                }
            }
        }

        let postmortem_total: u64 = stats.postmortem_counts.values().sum();
        let rate_of = |class: PostMortemClass| -> Option<f64> {
            if postmortem_total == 0 {
                return None;
            }
            let count = stats.postmortem_counts.get(&class).copied().unwrap_or(0);
            Some(count as f64 / postmortem_total as f64 * 100.0)
        };

        StatsSnapshot {
            evaluated: stats.evaluated,
            signaled: stats.signaled,
            rejected: stats.rejected,
            reject_reasons: stats
                .reject_reasons
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            signals_this_hour: self.signal_timestamps.lock().len(),
            avg_latency_s: avg,
            min_latency_s: min,
            max_latency_s: max,
            latency_distribution,
            postmortem_counts: stats
                .postmortem_counts
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            tp_hit_rate: rate_of(PostMortemClass::TpHit),
            rug_rate: rate_of(PostMortemClass::Rug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EvmTokenState;
    use std::time::Duration;

    fn default_gate() -> GateThresholds {
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

    fn happy_path_state() -> EvmTokenState {
        let mut s = EvmTokenState::new("0xabc".into(), "0xpool".into(), "evmA", Duration::from_secs(180));
        s.first_seen -= 60.0;
        s.liquidity_usd = 5_000.0;
        s.estimated_mcap = 15_000.0;
        s.safety = crate::state::Safety::Safe;
        crate::state::apply_buy(
            &mut s.total_buys,
            &mut s.buy_volume_usd,
            &mut s.largest_buy_usd,
            &mut s.unique_buyers,
            &mut s.recent_buy_times,
            "0xbuyer1",
            600.0,
        );
        crate::state::apply_buy(
            &mut s.total_buys,
            &mut s.buy_volume_usd,
            &mut s.largest_buy_usd,
            &mut s.unique_buyers,
            &mut s.recent_buy_times,
            "0xbuyer2",
            600.0,
        );
        s
    }

    #[test]
    fn scenario_1_evm_happy_path_fires() {
        let engine = SignalEngine::new(default_gate());
        let mut s = happy_path_state();
        assert!(engine.evaluate(&mut s, |_, _| 0));
        assert!(s.signaled);
        assert!(s.signal_time.is_some());
    }

    #[test]
    fn scenario_2_too_old_rejects() {
        let engine = SignalEngine::new(default_gate());
        let mut s = happy_path_state();
        s.first_seen -= 200.0;
        assert!(!engine.evaluate(&mut s, |_, _| 0));
        assert_eq!(
            engine.stats_snapshot().reject_reasons.get("too_old").copied(),
            Some(1)
        );
    }

    #[test]
    fn scenario_3_high_mcap_rejects() {
        let engine = SignalEngine::new(default_gate());
        let mut s = happy_path_state();
        s.estimated_mcap = 50_000.0;
        assert!(!engine.evaluate(&mut s, |_, _| 0));
        assert_eq!(
            engine.stats_snapshot().reject_reasons.get("mcap_high").copied(),
            Some(1)
        );
    }

    #[test]
    fn scenario_4_unsafe_bytecode_rejects() {
        let engine = SignalEngine::new(default_gate());
        let mut s = happy_path_state();
        s.safety = crate::state::Safety::Unsafe;
        assert!(!engine.evaluate(&mut s, |_, _| 0));
        assert_eq!(
            engine.stats_snapshot().reject_reasons.get("unsafe_bytecode").copied(),
            Some(1)
        );
    }

    #[test]
    fn scenario_7_deployer_spam_rejects() {
        let engine = SignalEngine::new(default_gate());
        let mut s = happy_path_state();
        s.deployer_address = "0xdev".into();
        assert!(!engine.evaluate(&mut s, |_, _| 3));
        assert_eq!(
            engine.stats_snapshot().reject_reasons.get("deployer_spam").copied(),
            Some(1)
        );
    }

    #[test]
    fn evaluate_is_idempotent_once_signaled() {
        let engine = SignalEngine::new(default_gate());
        let mut s = happy_path_state();
        assert!(engine.evaluate(&mut s, |_, _| 0));
        assert!(!engine.evaluate(&mut s, |_, _| 0));
    }

    #[test]
    fn copycat_blocks_even_when_other_gates_pass() {
        let engine = SignalEngine::new(default_gate());
        let mut s = happy_path_state();
        s.enrichment.is_copycat = true;
        assert!(!engine.evaluate(&mut s, |_, _| 0));
        assert_eq!(
            engine.stats_snapshot().reject_reasons.get("copycat").copied(),
            Some(1)
        );
    }

    #[test]
    fn postmortem_classification_boundaries() {
        assert_eq!(PostMortemClass::classify(35.0), PostMortemClass::TpHit);
        assert_eq!(PostMortemClass::classify(15.0), PostMortemClass::Impulse);
        assert_eq!(PostMortemClass::classify(5.0), PostMortemClass::Flat);
        assert_eq!(PostMortemClass::classify(-100.0), PostMortemClass::Rug);
        assert_eq!(PostMortemClass::classify(-30.0), PostMortemClass::Dump);
        assert_eq!(PostMortemClass::classify(-15.0), PostMortemClass::Chop);
    }

    #[test]
    fn postmortem_rates_track_recorded_classes() {
        let engine = SignalEngine::new(default_gate());
        engine.record_postmortem(PostMortemClass::TpHit);
        engine.record_postmortem(PostMortemClass::Rug);
        engine.record_postmortem(PostMortemClass::Rug);
        let snap = engine.stats_snapshot();
        assert_eq!(snap.tp_hit_rate, Some(100.0 / 3.0));
        assert_eq!(snap.rug_rate, Some(200.0 / 3.0));
    }

    #[test]
    fn rate_limit_caps_signals_per_hour() {
        let engine = SignalEngine::new(default_gate());
        for i in 0..5 {
            let mut s = happy_path_state();
            s.token_address = format!("0xabc{i}");
            assert!(engine.evaluate(&mut s, |_, _| 0));
        }
        let mut s6 = happy_path_state();
        s6.token_address = "0xabc6".into();
        assert!(!engine.evaluate(&mut s6, |_, _| 0));
        assert_eq!(
            engine.stats_snapshot().reject_reasons.get("rate_limited").copied(),
            Some(1)
        );
    }
}
