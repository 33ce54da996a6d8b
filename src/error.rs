//! Typed error kinds for the RPC/decode/enrich boundary.
//!
//! Disposition is the caller's responsibility: transport errors retry with
//! back-off, decode errors drop the single event, and nothing here is fatal
//! except at startup (see `supervisor::Supervisor::run`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc returned error: code={code} message={message}")]
    RpcReply { code: i64, message: String },
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected log data length: got {got}, need at least {need}")]
    ShortData { got: usize, need: usize },
    #[error("unexpected topic count: got {got}, need {need}")]
    TopicCount { got: usize, need: usize },
    #[error("base64 decode failed: {0}")]
    Base64(String),
    #[error("malformed event payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("rate limited, retry after {0:?}")]
    RateLimited(std::time::Duration),
    #[error("http error: {0}")]
    Http(String),
    #[error("timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("timed out")]
    Timeout,
}
