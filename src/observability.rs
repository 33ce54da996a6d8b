//! Observability Surface: a small read-only `axum`
//! router serving health, stats, and Prometheus metrics. Carries no
//! authority over the signal gate.

use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::engine::SignalEngine;
use crate::state::{EvmTokenState, SolTokenState, TokenStateStore};

#[derive(Clone)]
pub struct ObservabilityState {
    start: Instant,
    engine: Arc<SignalEngine>,
    evm_store: Arc<TokenStateStore<EvmTokenState>>,
    sol_store: Option<Arc<TokenStateStore<SolTokenState>>>,
    prometheus: PrometheusHandle,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_s: u64,
}

#[derive(Serialize)]
struct StatsResponse {
    uptime_s: u64,
    active_tokens: ActiveTokens,
    #[serde(flatten)]
    engine: crate::engine::StatsSnapshot,
}

#[derive(Serialize)]
struct ActiveTokens {
    base: usize,
    solana: usize,
}

impl ObservabilityState {
    pub fn new(
        engine: Arc<SignalEngine>,
        evm_store: Arc<TokenStateStore<EvmTokenState>>,
        sol_store: Option<Arc<TokenStateStore<SolTokenState>>>,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self { start: Instant::now(), engine, evm_store, sol_store, prometheus }
    }
}

async fn health(State(state): State<ObservabilityState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", uptime_s: state.start.elapsed().as_secs() })
}

async fn stats(State(state): State<ObservabilityState>) -> Json<StatsResponse> {
    let active = ActiveTokens {
        base: state.evm_store.active_count(),
        solana: state.sol_store.as_ref().map(|s| s.active_count()).unwrap_or(0),
    };
    Json(StatsResponse {
        uptime_s: state.start.elapsed().as_secs(),
        active_tokens: active,
        engine: state.engine.stats_snapshot(),
    })
}

async fn metrics(State(state): State<ObservabilityState>) -> String {
    publish_gauges(&state);
    state.prometheus.render()
}

/// Mirrors the stats dict's counters into `metrics::gauge!`/`counter!` at
/// scrape time rather than at every gate evaluation, avoiding a metrics call
/// on the engine's hot path.
fn publish_gauges(state: &ObservabilityState) {
    let snap = state.engine.stats_snapshot();
    metrics::gauge!("early_signal_active_tokens", state.evm_store.active_count() as f64, "chain" => "base");
    if let Some(sol) = &state.sol_store {
        metrics::gauge!("early_signal_active_tokens", sol.active_count() as f64, "chain" => "solana");
    }
    metrics::counter!("early_signal_evaluated_total", snap.evaluated);
    metrics::counter!("early_signal_signaled_total", snap.signaled);
    metrics::counter!("early_signal_rejected_total", snap.rejected);
    for (reason, count) in &snap.reject_reasons {
        metrics::counter!("early_signal_rejected_by_reason_total", *count, "reason" => reason.clone());
    }
    if let Some(avg) = snap.avg_latency_s {
        metrics::gauge!("early_signal_latency_avg_seconds", avg);
    }
}

pub fn router(state: ObservabilityState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn run(
    addr: &str,
    state: ObservabilityState,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "observability surface listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateThresholds;
    use std::time::Duration;

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

    #[tokio::test]
    async fn stats_reports_zero_active_tokens_when_empty() {
        let engine = Arc::new(SignalEngine::new(gate()));
        let evm_store = TokenStateStore::<EvmTokenState>::new();
        let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let state = ObservabilityState::new(engine, evm_store, None, prometheus);
        let resp = stats(State(state)).await;
        assert_eq!(resp.0.active_tokens.base, 0);
        assert_eq!(resp.0.active_tokens.solana, 0);
    }
}
