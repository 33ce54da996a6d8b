//! Hand-rolled static-tuple ABI decoding for the four event shapes this
//! pipeline cares about. Every field here is a
//! fixed-width Solidity type, so there is no dynamic-type head/tail machinery
//! to reproduce — each non-indexed parameter occupies exactly one right-
//! aligned 32-byte word, in declaration order.

use num_bigint::{BigInt, BigUint};

use crate::error::DecodeError;

const WORD: usize = 32;

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(strip_0x(s)).map_err(|e| DecodeError::Malformed(format!("bad hex: {e}")))
}

/// Reads 32-byte word `idx` out of `data` (non-indexed event payload).
fn word(data: &[u8], idx: usize) -> Result<&[u8], DecodeError> {
    let start = idx * WORD;
    let end = start + WORD;
    if data.len() < end {
        return Err(DecodeError::ShortData { got: data.len(), need: end });
    }
    Ok(&data[start..end])
}

fn word_address(w: &[u8]) -> String {
    format!("0x{}", hex::encode(&w[12..32]))
}

fn word_unsigned(w: &[u8]) -> BigUint {
    BigUint::from_bytes_be(w)
}

fn word_signed(w: &[u8]) -> BigInt {
    BigInt::from_signed_bytes_be(w)
}

/// A topic as delivered by `eth_subscribe`/`eth_getLogs`: a 32-byte hex word.
/// For an indexed `address`, the value lives in the low 20 bytes.
fn topic_address(topic: &str) -> Result<String, DecodeError> {
    let bytes = hex_to_bytes(topic)?;
    if bytes.len() != WORD {
        return Err(DecodeError::Malformed(format!("topic is not 32 bytes: {} bytes", bytes.len())));
    }
    Ok(word_address(&bytes))
}

fn require_topics(topics: &[String], need: usize) -> Result<(), DecodeError> {
    if topics.len() < need {
        return Err(DecodeError::TopicCount { got: topics.len(), need });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct V4Initialize {
    pub pool_id: String,
    pub currency0: String,
    pub currency1: String,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: String,
    pub sqrt_price_x96: BigUint,
    pub tick: i32,
}

/// `Initialize(bytes32 id, address currency0, address currency1, uint24 fee,
///  int24 tickSpacing, address hooks, uint160 sqrtPriceX96, int24 tick)`.
/// `id`, `currency0`, `currency1` are indexed (topics[1..4]); the rest are
/// five packed words in `data`.
pub fn decode_v4_initialize(topics: &[String], data: &str) -> Result<V4Initialize, DecodeError> {
    require_topics(topics, 4)?;
    let pool_id = topics[1].clone();
    let currency0 = topic_address(&topics[2])?;
    let currency1 = topic_address(&topics[3])?;

    let data = hex_to_bytes(data)?;
    let fee = word_unsigned(word(&data, 0)?).try_into().unwrap_or(u32::MAX);
    let tick_spacing: i32 = word_signed(word(&data, 1)?).try_into().unwrap_or(0);
    let hooks = word_address(word(&data, 2)?);
    let sqrt_price_x96 = word_unsigned(word(&data, 3)?);
    let tick: i32 = word_signed(word(&data, 4)?).try_into().unwrap_or(0);

    Ok(V4Initialize { pool_id, currency0, currency1, fee, tick_spacing, hooks, sqrt_price_x96, tick })
}

#[derive(Debug, Clone)]
pub struct V4Swap {
    pub pool_id: String,
    pub sender: String,
    pub amount0: BigInt,
    pub amount1: BigInt,
    pub sqrt_price_x96: BigUint,
    pub liquidity: BigUint,
    pub tick: i32,
    pub fee: u32,
}

/// `Swap(bytes32 id, address sender, int128 amount0, int128 amount1,
///  uint160 sqrtPriceX96, uint128 liquidity, int24 tick, uint24 fee)`.
pub fn decode_v4_swap(topics: &[String], data: &str) -> Result<V4Swap, DecodeError> {
    require_topics(topics, 3)?;
    let pool_id = topics[1].clone();
    let sender = topic_address(&topics[2])?;

    let data = hex_to_bytes(data)?;
    let amount0 = word_signed(word(&data, 0)?);
    let amount1 = word_signed(word(&data, 1)?);
    let sqrt_price_x96 = word_unsigned(word(&data, 2)?);
    let liquidity = word_unsigned(word(&data, 3)?);
    let tick: i32 = word_signed(word(&data, 4)?).try_into().unwrap_or(0);
    let fee = word_unsigned(word(&data, 5)?).try_into().unwrap_or(u32::MAX);

    Ok(V4Swap { pool_id, sender, amount0, amount1, sqrt_price_x96, liquidity, tick, fee })
}

#[derive(Debug, Clone)]
pub struct V3PoolCreated {
    pub token0: String,
    pub token1: String,
    pub fee: u32,
    pub tick_spacing: i32,
    pub pool: String,
}

/// `PoolCreated(address token0, address token1, uint24 fee, int24 tickSpacing,
///  address pool)`. `token0`, `token1`, `fee` are indexed.
pub fn decode_v3_pool_created(topics: &[String], data: &str) -> Result<V3PoolCreated, DecodeError> {
    require_topics(topics, 4)?;
    let token0 = topic_address(&topics[1])?;
    let token1 = topic_address(&topics[2])?;
    let fee = word_unsigned(&hex_to_bytes(&topics[3])?).try_into().unwrap_or(u32::MAX);

    let data = hex_to_bytes(data)?;
    let tick_spacing: i32 = word_signed(word(&data, 0)?).try_into().unwrap_or(0);
    let pool = word_address(word(&data, 1)?);

    Ok(V3PoolCreated { token0, token1, fee, tick_spacing, pool })
}

#[derive(Debug, Clone)]
pub struct V3Swap {
    pub sender: String,
    pub recipient: String,
    pub amount0: BigInt,
    pub amount1: BigInt,
    pub sqrt_price_x96: BigUint,
    pub liquidity: BigUint,
    pub tick: i32,
}

/// `Swap(address sender, address recipient, int256 amount0, int256 amount1,
///  uint160 sqrtPriceX96, uint128 liquidity, int24 tick)`.
pub fn decode_v3_swap(topics: &[String], data: &str) -> Result<V3Swap, DecodeError> {
    require_topics(topics, 3)?;
    let sender = topic_address(&topics[1])?;
    let recipient = topic_address(&topics[2])?;

    let data = hex_to_bytes(data)?;
    let amount0 = word_signed(word(&data, 0)?);
    let amount1 = word_signed(word(&data, 1)?);
    let sqrt_price_x96 = word_unsigned(word(&data, 2)?);
    let liquidity = word_unsigned(word(&data, 3)?);
    let tick: i32 = word_signed(word(&data, 4)?).try_into().unwrap_or(0);

    Ok(V3Swap { sender, recipient, amount0, amount1, sqrt_price_x96, liquidity, tick })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_hex_unsigned(v: u64) -> String {
        format!("{:064x}", v)
    }

    fn word_hex_address(addr: &str) -> String {
        format!("{:0>64}", strip_0x(addr))
    }

    #[test]
    fn decodes_v4_initialize() {
        let data = format!(
            "0x{}{}{}{}{}",
            word_hex_unsigned(3000),
            word_hex_unsigned(60),
            word_hex_address("0x0000000000000000000000000000000000000000"),
            word_hex_unsigned(79228162514264337593543950336),
            word_hex_unsigned(0),
        );
        let topics = vec![
            "0xtopic0".into(),
            format!("0x{}", "ab".repeat(32)),
            format!("0x{}", word_hex_address("0x4200000000000000000000000000000000000006")),
            format!("0x{}", word_hex_address("0x1111111111111111111111111111111111111111")),
        ];
        let decoded = decode_v4_initialize(&topics, &data).unwrap();
        assert_eq!(decoded.fee, 3000);
        assert_eq!(decoded.tick_spacing, 60);
        assert_eq!(decoded.hooks, "0x0000000000000000000000000000000000000000");
        assert_eq!(decoded.currency0, "0x4200000000000000000000000000000000000006");
    }

    #[test]
    fn decodes_negative_amount() {
        let neg_one = BigInt::from(-1i64);
        let (_, word_bytes) = neg_one.to_bytes_be();
        let mut full = vec![0xffu8; WORD - word_bytes.len()];
        full.extend_from_slice(&word_bytes);
        let back = word_signed(&full);
        assert_eq!(back, BigInt::from(-1i64));
    }

    #[test]
    fn short_data_errors() {
        let topics = vec!["0xa".into(), format!("0x{}", "00".repeat(32)), format!("0x{}", "00".repeat(32)), format!("0x{}", "00".repeat(32))];
        let err = decode_v4_initialize(&topics, "0x00");
        assert!(matches!(err, Err(DecodeError::ShortData { .. })));
    }
}
