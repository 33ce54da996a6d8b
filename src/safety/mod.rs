pub mod evm;
pub mod sol;
