//! Block sources feeding the sync engine.
//!
//! A [`BlockSource`] hands out one block at a time by number. The engine owns
//! ordering and resumption; a source only has to answer "is block N available
//! at this finality yet".

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scrypo_core::Felt;
use thiserror::Error;

use super::events::Block;
use crate::storage::Finality;

/// Upstream failure. The engine reconnects and resumes from its cursor.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Network or HTTP failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The chain no longer extends the committed block.
    #[error(
        "Reorg at block {block_number}: parent hash {parent_hash} does not match committed hash {expected}"
    )]
    Reorg {
        /// Block whose parent does not match
        block_number: u64,
        /// Committed hash of the previous block
        expected: Felt,
        /// Parent hash reported by the source
        parent_hash: Felt,
    },

    /// Source returned a different block than requested.
    #[error("Requested block {expected}, source returned block {actual}")]
    UnexpectedBlock {
        /// Requested number
        expected: u64,
        /// Returned number
        actual: u64,
    },
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

/// Ordered source of blocks.
pub trait BlockSource: Send {
    /// Fetch block `number` if it is available at `finality` or better.
    ///
    /// `Ok(None)` means "not yet"; the engine polls again later.
    fn fetch_block(
        &mut self,
        number: u64,
        finality: Finality,
    ) -> impl Future<Output = Result<Option<Block>, StreamError>> + Send;

    /// Re-establish the upstream connection after a [`StreamError`].
    fn reconnect(&mut self) -> impl Future<Output = Result<(), StreamError>> + Send;
}

/// In-memory block source.
///
/// Clones share state, so a test can keep a handle, publish or replace
/// blocks, and inject failures while the engine owns another clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockSource {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    blocks: BTreeMap<u64, Block>,
    failures: VecDeque<StreamError>,
    reconnects: u32,
    fetches: u64,
}

impl MemoryBlockSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source holding `blocks`.
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let source = Self::new();
        for block in blocks {
            source.push_block(block);
        }
        source
    }

    /// Publish a block, replacing any block with the same number.
    pub fn push_block(&self, block: Block) {
        self.state().blocks.insert(block.number, block);
    }

    /// Make the next fetch fail with `error`.
    pub fn fail_next(&self, error: StreamError) {
        self.state().failures.push_back(error);
    }

    /// Number of `reconnect` calls so far.
    pub fn reconnect_count(&self) -> u32 {
        self.state().reconnects
    }

    /// Number of `fetch_block` calls so far.
    pub fn fetch_count(&self) -> u64 {
        self.state().fetches
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlockSource for MemoryBlockSource {
    async fn fetch_block(
        &mut self,
        number: u64,
        finality: Finality,
    ) -> Result<Option<Block>, StreamError> {
        let mut state = self.state();
        state.fetches += 1;

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        Ok(state
            .blocks
            .get(&number)
            .filter(|block| block.finality.satisfies(finality))
            .cloned())
    }

    async fn reconnect(&mut self) -> Result<(), StreamError> {
        self.state().reconnects += 1;
        Ok(())
    }
}
