//! Supervisor: starts every component concurrently,
//! runs the periodic maintenance tasks (eviction, safety-probe dispatch,
//! stats emission), and tears everything down on SIGINT/SIGTERM.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use std::future::Future;
use tracing::{error, info, info_span, Instrument};

use crate::config::Config;
use crate::engine::SignalEngine;
use crate::enrich::EnrichClient;
use crate::enrich_loop::EnricherLoop;
use crate::evm::{VenueA, VenueB};
use crate::journal::JournalWriter;
use crate::notify::{LogTransport, NotificationSink, NotificationTransport, WebhookTransport};
use crate::observability::{self, ObservabilityState};
use crate::postmortem::PostMortemScheduler;
use crate::price_oracle::PriceOracle;
use crate::rpc::{EvmRpcClient, SolanaRpcClient};
use crate::safety;
use crate::solana::SolanaListener;
use crate::state::{EvmTokenState, SolTokenState, TokenStateStore};

const EVM_EVICT_INTERVAL: Duration = Duration::from_secs(30);
const SOL_EVICT_INTERVAL: Duration = Duration::from_secs(20);
const SAFETY_PROBE_INTERVAL: Duration = Duration::from_secs(2);
const STATS_INTERVAL: Duration = Duration::from_secs(300);

/// Spawns a fallible long-running task, logging (rather than propagating) a
/// terminal error — a single listener dying should not bring down the other
/// chain's pipeline.
fn spawn_guarded(
    label: &'static str,
    fut: impl Future<Output = anyhow::Result<()>> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = fut.instrument(info_span!("task", name = label)).await {
            error!(task = label, error = %e, "task exited with error");
        }
    })
}

fn spawn_task(
    label: &'static str,
    fut: impl Future<Output = ()> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(fut.instrument(info_span!("task", name = label)))
}

pub struct Supervisor {
    config: Arc<Config>,
}

impl Supervisor {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let evm_rpc = Arc::new(EvmRpcClient::new(&self.config.rpc_wss, &self.config.rpc_http));
        evm_rpc.connect().await?;
        let chain_id = evm_rpc.chain_id().await?;
        info!(chain_id, "connected to EVM RPC");

        let engine = Arc::new(SignalEngine::new(self.config.gate.clone()));
        let evm_store = TokenStateStore::<EvmTokenState>::new();
        let eth_price = PriceOracle::new("base", crate::evm::constants::WETH.to_string(), &["USDC", "USDbC"], 2500.0);
        let enrich_client = Arc::new(EnrichClient::new(self.config.enrich_base_url.clone())?);

        let venue_a = VenueA::new(
            Arc::clone(&evm_rpc),
            Arc::clone(&evm_store),
            Arc::clone(&engine),
            Arc::clone(&eth_price),
            self.config.evm_safe_hooks.clone(),
            self.config.gate.max_token_age_evm,
        );
        let venue_b = VenueB::new(
            Arc::clone(&evm_rpc),
            Arc::clone(&evm_store),
            Arc::clone(&engine),
            Arc::clone(&eth_price),
            self.config.gate.max_token_age_evm,
        );

        let mut tasks = Vec::new();

        tasks.push(spawn_guarded("venue_a", Arc::clone(&venue_a).run()));
        tasks.push(spawn_guarded("venue_b", Arc::clone(&venue_b).run()));

        let evm_enricher = EnricherLoop::new("base", Arc::clone(&evm_store), Arc::clone(&engine), Arc::clone(&enrich_client));
        tasks.push(spawn_task("enricher_base", Arc::clone(&evm_enricher).run(shutdown_rx.clone())));

        let evm_postmortem = PostMortemScheduler::new(
            "base",
            Arc::clone(&evm_store),
            Arc::clone(&engine),
            Arc::clone(&enrich_client),
            None,
        );
        tasks.push(spawn_task("postmortem_base", Arc::clone(&evm_postmortem).run(shutdown_rx.clone())));

        let transport: Arc<dyn NotificationTransport> = match &self.config.signal_webhook_url {
            Some(url) if !self.config.dry_run => {
                Arc::new(WebhookTransport::new(reqwest::Client::new(), url.clone()))
            }
            _ => Arc::new(LogTransport),
        };
        let evm_notify = NotificationSink::new("base", Arc::clone(&evm_store), Arc::clone(&engine), Arc::clone(&transport));
        tasks.push(spawn_task("notify_base", Arc::clone(&evm_notify).run(shutdown_rx.clone())));

        let sol_store = if self.config.sol_enabled {
            let sol_rpc = Arc::new(SolanaRpcClient::new(&self.config.sol_rpc_wss, &self.config.sol_rpc_http));
            sol_rpc.connect().await?;
            info!("connected to Solana RPC");

            let sol_store = TokenStateStore::<SolTokenState>::new();
            let sol_price = PriceOracle::new("solana", crate::solana::constants::WSOL.to_string(), &["USDC"], 150.0);

            let listener = SolanaListener::new(
                Arc::clone(&sol_rpc),
                Arc::clone(&sol_store),
                Arc::clone(&sol_price),
                self.config.sol_min_liquidity_sol,
                self.config.gate.max_token_age_sol,
            );
            tasks.push(spawn_guarded("solana_listener", Arc::clone(&listener).run()));

            let sol_enricher = EnricherLoop::new("solana", Arc::clone(&sol_store), Arc::clone(&engine), Arc::clone(&enrich_client));
            tasks.push(spawn_task("enricher_solana", Arc::clone(&sol_enricher).run(shutdown_rx.clone())));

            let sol_postmortem = PostMortemScheduler::new(
                "solana",
                Arc::clone(&sol_store),
                Arc::clone(&engine),
                Arc::clone(&enrich_client),
                None,
            );
            tasks.push(spawn_task("postmortem_solana", Arc::clone(&sol_postmortem).run(shutdown_rx.clone())));

            let sol_notify = NotificationSink::new("solana", Arc::clone(&sol_store), Arc::clone(&engine), Arc::clone(&transport));
            tasks.push(spawn_task("notify_solana", Arc::clone(&sol_notify).run(shutdown_rx.clone())));

            tasks.push(spawn_task(
                "safety_probe_solana",
                safety_probe_dispatch_sol(Arc::clone(&sol_store), Arc::clone(&sol_rpc), shutdown_rx.clone()),
            ));
            tasks.push(spawn_task(
                "evictor_solana",
                evict_loop_sol(Arc::clone(&sol_store), shutdown_rx.clone()),
            ));

            tasks.push(spawn_task(
                "price_oracle_solana",
                sol_price.run_refresh_loop(Arc::clone(&enrich_client), shutdown_rx.clone()),
            ));
            Some(sol_store)
        } else {
            None
        };

        if let Some(path) = &self.config.signal_journal_path {
            let journal = JournalWriter::new(path.clone());
            tasks.push(spawn_task("journal", journal.run(Arc::clone(&engine), shutdown_rx.clone())));
        }

        tasks.push(spawn_task(
            "safety_probe_base",
            safety_probe_dispatch_evm(Arc::clone(&evm_store), Arc::clone(&evm_rpc), shutdown_rx.clone()),
        ));
        tasks.push(spawn_task(
            "evictor_base",
            evict_loop_evm(Arc::clone(&evm_store), shutdown_rx.clone()),
        ));
        tasks.push(spawn_task(
            "price_oracle_base",
            eth_price.run_refresh_loop(Arc::clone(&enrich_client), shutdown_rx.clone()),
        ));
        tasks.push(spawn_task("stats", stats_emission(Arc::clone(&engine), shutdown_rx.clone())));

        let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus recorder install");
        let obs_state = ObservabilityState::new(Arc::clone(&engine), Arc::clone(&evm_store), sol_store.clone(), prometheus);
        let metrics_addr = self.config.metrics_addr.clone();
        tasks.push(spawn_guarded("observability", async move {
            observability::run(&metrics_addr, obs_state, shutdown_rx.clone()).await
        }));

        wait_for_termination().await;
        info!("shutdown signal received, cancelling tasks");
        let _ = shutdown_tx.send(true);

        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

async fn evict_loop_evm(store: Arc<TokenStateStore<EvmTokenState>>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(EVM_EVICT_INTERVAL) => {
                let n = store.evict_stale();
                if n > 0 {
                    info!(evicted = n, chain = "base", "evicted stale tokens");
                }
            }
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

async fn evict_loop_sol(store: Arc<TokenStateStore<SolTokenState>>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SOL_EVICT_INTERVAL) => {
                let n = store.evict_stale();
                if n > 0 {
                    info!(evicted = n, chain = "solana", "evicted stale tokens");
                }
            }
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

/// Dispatches a one-shot bytecode safety check for each freshly created
/// token not yet probed. `probed` is pruned against the live store each pass
/// so it never grows past the active token set.
async fn safety_probe_dispatch_evm(
    store: Arc<TokenStateStore<EvmTokenState>>,
    rpc: Arc<EvmRpcClient>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut probed: HashSet<String> = HashSet::new();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SAFETY_PROBE_INTERVAL) => {
                let candidates = store.enrichment_candidates(0.0);
                probed.retain(|t| candidates.contains(t));
                for token in candidates {
                    if probed.contains(&token) {
                        continue;
                    }
                    probed.insert(token.clone());
                    let (safety, _report) = safety::evm::check_token(&rpc, &token).await;
                    store.mutate(&token, |s| s.safety = safety);
                }
            }
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

async fn safety_probe_dispatch_sol(
    store: Arc<TokenStateStore<SolTokenState>>,
    rpc: Arc<SolanaRpcClient>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut probed: HashSet<String> = HashSet::new();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SAFETY_PROBE_INTERVAL) => {
                let candidates = store.enrichment_candidates(0.0);
                probed.retain(|t| candidates.contains(t));
                for token in candidates {
                    if probed.contains(&token) {
                        continue;
                    }
                    probed.insert(token.clone());
                    let authorities = safety::sol::check_mint(&rpc, &token).await;
                    store.mutate(&token, |s| {
                        s.mint_authority = authorities.mint_authority;
                        s.freeze_authority = authorities.freeze_authority;
                    });
                }
            }
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

async fn stats_emission(engine: Arc<SignalEngine>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(STATS_INTERVAL) => {
                let snap = engine.stats_snapshot();
                info!(
                    evaluated = snap.evaluated,
                    signaled = snap.signaled,
                    rejected = snap.rejected,
                    signals_this_hour = snap.signals_this_hour,
                    avg_latency_s = ?snap.avg_latency_s,
                    "periodic stats"
                );
            }
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
