//! Solana program IDs and the ray_log binary layout.

pub const WSOL: &str = "So11111111111111111111111111111111111111112";
pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

pub const RAY_LOG_INIT: u8 = 0;

pub const RAY_LOG_INIT_PC_AMOUNT_OFFSET: usize = 27;
pub const RAY_LOG_INIT_COIN_AMOUNT_OFFSET: usize = 35;
pub const RAY_LOG_INIT_MIN_LENGTH: usize = 43;

/// Index of the AMM/pool address in the Raydium instruction's accounts list.
pub const RAYDIUM_IX_AMM: usize = 4;
