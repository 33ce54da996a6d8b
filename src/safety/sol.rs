//! SPL mint/freeze authority check.

use std::time::Duration;

use crate::rpc::SolanaRpcClient;
use crate::state::SplAuthority;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MintAuthorities {
    pub mint_authority: SplAuthority,
    pub freeze_authority: SplAuthority,
}

/// Fetches `getAccountInfo(jsonParsed)` for a mint and reads the two SPL
/// authority fields. `SplAuthority::Unchecked` signals RPC failure/timeout —
/// distinct from a confirmed-absent authority. A `result.value == null`
/// response (the account doesn't exist on-chain) is treated as unsafe rather
/// than unchecked, since a missing mint account is itself a red flag rather
/// than an assessment we failed to make.
pub async fn check_mint(rpc: &SolanaRpcClient, mint_address: &str) -> MintAuthorities {
    let unchecked = MintAuthorities { mint_authority: SplAuthority::Unchecked, freeze_authority: SplAuthority::Unchecked };
    let missing_account = MintAuthorities { mint_authority: SplAuthority::Held, freeze_authority: SplAuthority::Held };

    let value = match tokio::time::timeout(CHECK_TIMEOUT, rpc.get_account_info(mint_address, "jsonParsed")).await {
        Ok(Ok(v)) => v,
        _ => return unchecked,
    };

    match value.get("value") {
        None => return unchecked,
        Some(v) if v.is_null() => return missing_account,
        _ => {}
    }

    let info = match value.pointer("/value/data/parsed/info") {
        Some(i) => i,
        None => return unchecked,
    };

    let mint_authority = if info.get("mintAuthority").map(|v| v.is_null()).unwrap_or(true) {
        SplAuthority::Revoked
    } else {
        SplAuthority::Held
    };
    let freeze_authority = if info.get("freezeAuthority").map(|v| v.is_null()).unwrap_or(true) {
        SplAuthority::Revoked
    } else {
        SplAuthority::Held
    };

    MintAuthorities { mint_authority, freeze_authority }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info_from(value: serde_json::Value) -> serde_json::Value {
        json!({"value": {"data": {"parsed": {"info": value}}}})
    }

    #[test]
    fn both_null_means_revoked() {
        let v = info_from(json!({"mintAuthority": null, "freezeAuthority": null}));
        let info = v.pointer("/value/data/parsed/info").unwrap();
        assert!(info.get("mintAuthority").unwrap().is_null());
        assert!(info.get("freezeAuthority").unwrap().is_null());
    }

    #[test]
    fn missing_account_value_is_distinguished_from_missing_field() {
        let response = json!({"context": {"slot": 1}, "value": null});
        match response.get("value") {
            Some(v) if v.is_null() => {}
            other => panic!("expected a null `value` for a missing account, got {other:?}"),
        }

        let malformed = json!({"context": {"slot": 1}});
        assert!(malformed.get("value").is_none());
    }
}
