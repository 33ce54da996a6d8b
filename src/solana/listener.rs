//! Raydium AMM V4 pool-init listener. Swap/buy tracking
//! is delegated to the enrichment loop, same as the EVM venues — this
//! listener only detects new pools.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::rpc::SolanaRpcClient;
use crate::solana::constants::{RAYDIUM_AMM_V4, RAYDIUM_IX_AMM, RAY_LOG_INIT, WSOL};
use crate::solana::raylog::{self, RayLogInit};
use crate::state::{SolTokenState, TokenStateStore};

pub struct SolanaListener {
    rpc: Arc<SolanaRpcClient>,
    store: Arc<TokenStateStore<SolTokenState>>,
    sol_price: Arc<crate::price_oracle::PriceOracle>,
    min_liquidity_sol: f64,
    max_age: Duration,
}

impl SolanaListener {
    pub fn new(
        rpc: Arc<SolanaRpcClient>,
        store: Arc<TokenStateStore<SolTokenState>>,
        sol_price: Arc<crate::price_oracle::PriceOracle>,
        min_liquidity_sol: f64,
        max_age: Duration,
    ) -> Arc<Self> {
        Arc::new(Self { rpc, store, sol_price, min_liquidity_sol, max_age })
    }

    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let mut sub = self.rpc.subscribe_logs_mentions(RAYDIUM_AMM_V4).await?;
        tokio::spawn(async move {
            while let Some(value) = sub.rx.recv().await {
                self.handle_notification(&value).await;
            }
        });
        Ok(())
    }

    async fn handle_notification(self: &Arc<Self>, value: &Value) {
        if !value.get("err").map(|e| e.is_null()).unwrap_or(true) {
            return;
        }
        let signature = match value.get("signature").and_then(|s| s.as_str()) {
            Some(s) => s.to_string(),
            None => return,
        };
        let logs = value.get("logs").and_then(|l| l.as_array()).cloned().unwrap_or_default();

        for line in &logs {
            let Some(line) = line.as_str() else { continue };
            let Some((log_type, raw)) = raylog::parse_log_line(line) else { continue };
            if log_type == RAY_LOG_INIT {
                let this = Arc::clone(self);
                let sig = signature.clone();
                tokio::spawn(async move {
                    this.handle_pool_init(&sig, &raw).await;
                });
                return; // one init per transaction
            }
        }
    }

    async fn handle_pool_init(&self, signature: &str, raw: &[u8]) {
        let decoded: RayLogInit = match raylog::decode_init(raw) {
            Ok(d) => d,
            Err(e) => {
                debug!("ray_log decode failed: {e}");
                return;
            }
        };

        let init_sol = decoded.pc_amount_lamports as f64 / 1e9;
        if init_sol < self.min_liquidity_sol {
            return;
        }

        let tx = match self.rpc.get_transaction(signature).await {
            Ok(tx) if !tx.is_null() => tx,
            _ => {
                debug!(signature, "failed to fetch Solana transaction");
                return;
            }
        };

        let Some(meta) = tx.get("meta") else { return };
        let post_balances = meta.get("postTokenBalances").and_then(|b| b.as_array()).cloned().unwrap_or_default();
        let mints: Vec<String> = post_balances
            .iter()
            .filter_map(|b| b.get("mint").and_then(|m| m.as_str()).map(String::from))
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();

        if !mints.iter().any(|m| m == WSOL) {
            return;
        }
        let Some(token_mint) = mints.into_iter().find(|m| m != WSOL) else {
            return;
        };

        if self.store.get_and(&token_mint, |_| ()).is_some() {
            return;
        }

        let pool_address = extract_pool_address(&tx).unwrap_or_else(|| signature.chars().take(32).collect());
        let deployer = extract_deployer(&tx);
        let sol_price = self.sol_price.get();
        let liquidity_usd = init_sol * sol_price * 2.0;

        let created = self.store.create_with(&token_mint, || {
            let mut s = SolTokenState::new(token_mint.clone(), pool_address.clone(), self.max_age);
            s.deployer_address = deployer.clone();
            s.liquidity_sol = init_sol;
            s.liquidity_usd = liquidity_usd;
            s
        });
        if created {
            debug!(token = %token_mint, liquidity_usd, "new Raydium pool tracked");
        }
    }
}

fn extract_deployer(tx: &Value) -> String {
    let account_keys = tx
        .pointer("/transaction/message/accountKeys")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    account_keys
        .first()
        .map(|k| {
            k.get("pubkey")
                .and_then(|p| p.as_str())
                .map(String::from)
                .or_else(|| k.as_str().map(String::from))
                .unwrap_or_default()
        })
        .unwrap_or_default()
}

fn accounts_of(ix: &Value) -> Vec<String> {
    ix.get("accounts")
        .and_then(|a| a.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn extract_pool_address(tx: &Value) -> Option<String> {
    let instructions = tx
        .pointer("/transaction/message/instructions")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    for ix in &instructions {
        if ix.get("programId").and_then(|p| p.as_str()) == Some(RAYDIUM_AMM_V4) {
            let accounts = accounts_of(ix);
            if accounts.len() > RAYDIUM_IX_AMM {
                return Some(accounts[RAYDIUM_IX_AMM].clone());
            }
        }
    }

    let groups = tx.pointer("/meta/innerInstructions").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for group in &groups {
        let inner = group.get("instructions").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        for ix in &inner {
            if ix.get("programId").and_then(|p| p.as_str()) == Some(RAYDIUM_AMM_V4) {
                let accounts = accounts_of(ix);
                if accounts.len() > RAYDIUM_IX_AMM {
                    return Some(accounts[RAYDIUM_IX_AMM].clone());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_pool_address_from_top_level_instruction() {
        let tx = json!({
            "transaction": {
                "message": {
                    "instructions": [
                        {"programId": RAYDIUM_AMM_V4, "accounts": ["a0","a1","a2","a3","pool_addr"]}
                    ]
                }
            }
        });
        assert_eq!(extract_pool_address(&tx), Some("pool_addr".to_string()));
    }

    #[test]
    fn falls_back_to_inner_instructions() {
        let tx = json!({
            "transaction": {"message": {"instructions": []}},
            "meta": {
                "innerInstructions": [
                    {"index": 0, "instructions": [
                        {"programId": RAYDIUM_AMM_V4, "accounts": ["a0","a1","a2","a3","pool_addr"]}
                    ]}
                ]
            }
        });
        assert_eq!(extract_pool_address(&tx), Some("pool_addr".to_string()));
    }

    #[test]
    fn extracts_deployer_from_parsed_account_keys() {
        let tx = json!({
            "transaction": {"message": {"accountKeys": [{"pubkey": "deployer_pubkey", "signer": true}]}}
        });
        assert_eq!(extract_deployer(&tx), "deployer_pubkey");
    }
}
