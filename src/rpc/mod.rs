pub mod evm;
pub mod solana;

pub use evm::EvmRpcClient;
pub use solana::SolanaRpcClient;
