// crates/query/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("store error: {0}")]
    Store(#[from] claude_index_db::StoreError),
}

pub type QueryResult<T> = Result<T, QueryError>;
