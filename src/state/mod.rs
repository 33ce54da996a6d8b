pub mod store;
pub mod token;

pub use store::{apply_buy, TokenStateStore};
pub use token::{EvmTokenState, SolTokenState, SplAuthority, Safety, TokenView};
