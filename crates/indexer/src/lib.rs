// crates/indexer/src/lib.rs
//! Walks the Claude projects root, parses changed session files through
//! the core Parser, and keeps the Store's tracked-file and session tables
//! in sync with what's on disk.

mod error;
mod pipeline;

pub use error::IndexError;
pub use pipeline::{index_single_file, run_full_pass, IndexStats};
