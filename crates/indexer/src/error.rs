// crates/indexer/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] claude_index_db::StoreError),

    #[error("parse error: {0}")]
    Parse(#[from] claude_index_core::error::ParseError),
}
