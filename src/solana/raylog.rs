//! `ray_log` base64 payload decoding against a fixed byte-offset table.

use crate::error::DecodeError;
use crate::solana::constants::{RAY_LOG_INIT_COIN_AMOUNT_OFFSET, RAY_LOG_INIT_MIN_LENGTH, RAY_LOG_INIT_PC_AMOUNT_OFFSET};

#[derive(Debug, Clone, Copy)]
pub struct RayLogInit {
    pub pc_amount_lamports: u64,
    pub coin_amount: u64,
}

fn read_u64_le(data: &[u8], offset: usize) -> Result<u64, DecodeError> {
    let end = offset + 8;
    if data.len() < end {
        return Err(DecodeError::ShortData { got: data.len(), need: end });
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..end]);
    Ok(u64::from_le_bytes(buf))
}

/// Decodes a base64 `ray_log` line's body once the leading type byte is
/// confirmed to be `RAY_LOG_INIT`. A log shorter than the minimum length is
/// rejected rather than silently zero-filled.
pub fn decode_init(raw: &[u8]) -> Result<RayLogInit, DecodeError> {
    if raw.len() < RAY_LOG_INIT_MIN_LENGTH {
        return Err(DecodeError::ShortData { got: raw.len(), need: RAY_LOG_INIT_MIN_LENGTH });
    }
    let pc_amount_lamports = read_u64_le(raw, RAY_LOG_INIT_PC_AMOUNT_OFFSET)?;
    let coin_amount = read_u64_le(raw, RAY_LOG_INIT_COIN_AMOUNT_OFFSET)?;
    Ok(RayLogInit { pc_amount_lamports, coin_amount })
}

/// Extracts the base64 payload from a Solana program log line of the form
/// `"Program log: ray_log: <base64>"`, returning the leading type byte and
/// decoded body.
pub fn parse_log_line(line: &str) -> Option<(u8, Vec<u8>)> {
    let (_, b64) = line.split_once("ray_log: ")?;
    let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64.trim()).ok()?;
    let log_type = *raw.first()?;
    Some((log_type, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn sample_init_bytes(pc_lamports: u64, coin_amount: u64) -> Vec<u8> {
        let mut raw = vec![0u8; RAY_LOG_INIT_MIN_LENGTH];
        raw[0] = 0;
        raw[RAY_LOG_INIT_PC_AMOUNT_OFFSET..RAY_LOG_INIT_PC_AMOUNT_OFFSET + 8]
            .copy_from_slice(&pc_lamports.to_le_bytes());
        raw[RAY_LOG_INIT_COIN_AMOUNT_OFFSET..RAY_LOG_INIT_COIN_AMOUNT_OFFSET + 8]
            .copy_from_slice(&coin_amount.to_le_bytes());
        raw
    }

    #[test]
    fn decodes_pc_and_coin_amounts() {
        let raw = sample_init_bytes(15_000_000_000, 1_000_000_000_000);
        let decoded = decode_init(&raw).unwrap();
        assert_eq!(decoded.pc_amount_lamports, 15_000_000_000);
        assert_eq!(decoded.coin_amount, 1_000_000_000_000);
    }

    #[test]
    fn short_log_is_rejected() {
        let raw = vec![0u8; 10];
        assert!(decode_init(&raw).is_err());
    }

    #[test]
    fn parses_log_line() {
        let raw = sample_init_bytes(20_000_000_000, 5_000_000_000);
        let b64 = base64::engine::general_purpose::STANDARD.encode(&raw);
        let line = format!("Program log: ray_log: {b64}");
        let (log_type, decoded_raw) = parse_log_line(&line).unwrap();
        assert_eq!(log_type, 0);
        assert_eq!(decoded_raw, raw);
    }
}
