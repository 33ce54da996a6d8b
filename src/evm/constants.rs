//! Base-mainnet contract addresses, event topics, and bytecode-scan tables.
//!
//! Topic hashes are computed here via `sha3::Keccak256` rather than
//! hard-coded, since the signature strings are the actual source of truth
//! and a wrong hard-coded hash is a silent bug.

use sha3::{Digest, Keccak256};

pub const ETH_NATIVE: &str = "0x0000000000000000000000000000000000000000";
pub const WETH: &str = "0x4200000000000000000000000000000000000006";
pub const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const USDBC: &str = "0xd9aAEc86B65D86f6A7B5B1b0c42FFA531710b6CA";

pub const V3_FACTORY: &str = "0x33128a8fC17869897dcE68Ed026d694621f6FDfD";
pub const V4_POOL_MANAGER: &str = "0x498581fF718922c3f8e6A244956aF099B2652b2b";

pub const ALLOWED_FEE_TIERS: [u32; 2] = [3000, 10000];

/// Hooks addresses considered safe for Venue-A pools. `address(0)` (no hooks)
/// is always included; operators extend this via config as the V4 ecosystem
/// grows vetted hook contracts.
pub fn default_safe_hooks() -> Vec<String> {
    vec![ETH_NATIVE.to_ascii_lowercase()]
}

pub fn eth_addresses() -> [String; 2] {
    [ETH_NATIVE.to_ascii_lowercase(), WETH.to_ascii_lowercase()]
}

fn keccak_topic(signature: &str) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

pub fn topic_v3_pool_created() -> String {
    keccak_topic("PoolCreated(address,address,uint24,int24,address)")
}

pub fn topic_v3_swap() -> String {
    keccak_topic("Swap(address,address,int256,int256,uint160,uint128,int24)")
}

pub fn topic_v4_initialize() -> String {
    keccak_topic("Initialize(bytes32,address,address,uint24,int24,address,uint160,int24)")
}

pub fn topic_v4_swap() -> String {
    keccak_topic("Swap(bytes32,address,int128,int128,uint160,uint128,int24,uint24)")
}

/// First 4 bytes of `keccak256("slot0()")`, used for the best-effort V3
/// initial-price read on pool creation.
pub fn selector_slot0() -> String {
    let mut hasher = Keccak256::new();
    hasher.update(b"slot0()");
    format!("0x{}", hex::encode(&hasher.finalize()[..4]))
}

/// 4-byte selector → risk label, critical tier.
pub const DANGEROUS_SELECTORS: &[(&str, &str)] = &[
    ("40c10f19", "mint(address,uint256)"),
    ("44df8e70", "blacklist(address)"),
    ("e47d6060", "isBlacklisted(address)"),
    ("3950935e", "setTax(uint256)"),
    ("0e83672a", "setMaxTxAmount(uint256)"),
    ("c9567bf9", "openTrading()"),
    ("1694505e", "uniswapV2Pair()"),
    ("49bd5a5e", "uniswapV2Router()"),
];

/// 4-byte selector → label, warning tier: fine alone, risky in combination.
pub const CONTEXT_SELECTORS: &[(&str, &str)] = &[
    ("8da5cb5b", "owner()"),
    ("715018a6", "renounceOwnership()"),
    ("f2fde38b", "transferOwnership(address)"),
];

/// Hex substrings that mark minimal-proxy bytecode; a match is an instant reject.
pub const PROXY_PATTERNS: &[&str] = &[
    "363d3d373d3d3d363d",
    "5f5f5f5f5f365f5f",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_32_byte_hex() {
        for topic in [
            topic_v3_pool_created(),
            topic_v3_swap(),
            topic_v4_initialize(),
            topic_v4_swap(),
        ] {
            assert!(topic.starts_with("0x"));
            assert_eq!(topic.len(), 2 + 64);
        }
    }

    #[test]
    fn topics_are_distinct() {
        let topics = [
            topic_v3_pool_created(),
            topic_v3_swap(),
            topic_v4_initialize(),
            topic_v4_swap(),
        ];
        for i in 0..topics.len() {
            for j in (i + 1)..topics.len() {
                assert_ne!(topics[i], topics[j]);
            }
        }
    }

    #[test]
    fn eth_addresses_are_lowercase() {
        for a in eth_addresses() {
            assert_eq!(a, a.to_ascii_lowercase());
        }
    }
}
