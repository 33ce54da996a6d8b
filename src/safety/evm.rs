//! EVM bytecode safety heuristic. Not a decompiler: a
//! 4-byte-selector substring scan plus two proxy-prefix checks, classified
//! into critical/warning tiers.

use std::time::Duration;

use crate::error::SafetyError;
use crate::evm::constants::{CONTEXT_SELECTORS, DANGEROUS_SELECTORS, PROXY_PATTERNS};
use crate::rpc::EvmRpcClient;
use crate::state::Safety;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const SMALL_BYTECODE_THRESHOLD: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct EvmSafetyReport {
    pub reasons: Vec<String>,
    pub is_proxy: bool,
    pub bytecode_size: usize,
}

/// Fetches bytecode and classifies it; never blocks the caller past `CHECK_TIMEOUT`.
pub async fn check_token(rpc: &EvmRpcClient, token_address: &str) -> (Safety, EvmSafetyReport) {
    match tokio::time::timeout(CHECK_TIMEOUT, rpc.get_code(token_address)).await {
        Err(_) => (Safety::Unknown, EvmSafetyReport::default()),
        Ok(Err(_)) => (Safety::Unknown, EvmSafetyReport::default()),
        Ok(Ok(code)) => classify(&code),
    }
}

fn classify(code_hex: &str) -> (Safety, EvmSafetyReport) {
    let body = code_hex.trim_start_matches("0x");
    let bytecode_size = body.len() / 2;

    let mut report = EvmSafetyReport { bytecode_size, ..Default::default() };
    if bytecode_size == 0 {
        report.reasons.push("No bytecode — not a contract".into());
        return (Safety::Unsafe, report);
    }

    let lower = body.to_ascii_lowercase();
    let mut critical = 0u32;
    let mut warning = 0u32;

    for (selector, _name) in DANGEROUS_SELECTORS {
        if !lower.contains(selector) {
            continue;
        }
        match *selector {
            "40c10f19" => {
                report.reasons.push("Has mint() function".into());
                critical += 1;
            }
            "44df8e70" | "e47d6060" => {
                report.reasons.push("Has blacklist functionality".into());
                critical += 1;
            }
            "3950935e" => {
                report.reasons.push("Has setTax() — owner can change fees".into());
                warning += 1;
            }
            "0e83672a" => {
                report.reasons.push("Has setMaxTxAmount() — trading limits".into());
                warning += 1;
            }
            "c9567bf9" => {
                report.reasons.push("Has openTrading() — launch control".into());
                warning += 1;
            }
            _ => {}
        }
    }

    for (selector, _name) in CONTEXT_SELECTORS {
        if lower.contains(selector) {
            warning += 1;
        }
    }

    for pattern in PROXY_PATTERNS {
        if lower.contains(pattern) {
            report.is_proxy = true;
            report.reasons.push("Proxy contract — implementation can change".into());
            warning += 1;
            break;
        }
    }

    if bytecode_size < SMALL_BYTECODE_THRESHOLD {
        report.reasons.push("Very small bytecode — possibly proxy or minimal".into());
        warning += 1;
    }

    let unsafe_ = critical >= 2 || (critical == 1 && warning >= 2);
    (if unsafe_ { Safety::Unsafe } else { Safety::Safe }, report)
}

pub fn timeout_error() -> SafetyError {
    SafetyError::Timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_with(selectors: &[&str], filler_len: usize) -> String {
        let mut s = "a".repeat(filler_len * 2);
        for sel in selectors {
            s.push_str(sel);
        }
        format!("0x{s}")
    }

    #[test]
    fn empty_code_is_unsafe() {
        let (safety, report) = classify("0x");
        assert_eq!(safety, Safety::Unsafe);
        assert_eq!(report.bytecode_size, 0);
    }

    #[test]
    fn single_mint_selector_alone_is_safe() {
        let code = code_with(&["40c10f19"], 600);
        let (safety, _) = classify(&code);
        assert_eq!(safety, Safety::Safe);
    }

    #[test]
    fn mint_plus_blacklist_is_unsafe() {
        let code = code_with(&["40c10f19", "44df8e70"], 600);
        let (safety, _) = classify(&code);
        assert_eq!(safety, Safety::Unsafe);
    }

    #[test]
    fn one_critical_with_two_warnings_is_unsafe() {
        let code = code_with(&["40c10f19", "3950935e", "0e83672a"], 600);
        let (safety, _) = classify(&code);
        assert_eq!(safety, Safety::Unsafe);
    }

    #[test]
    fn proxy_pattern_flags_is_proxy() {
        let code = code_with(&["363d3d373d3d3d363d"], 600);
        let (_, report) = classify(&code);
        assert!(report.is_proxy);
    }
}
