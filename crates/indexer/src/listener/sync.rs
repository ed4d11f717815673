//! Sync engine: projects blocks into storage one at a time.
//!
//! Each block goes `Fetched -> Decoding -> Applying -> Committed`, or
//! `Fetched -> Failed`. Every event of a block is decoded before anything is
//! written; the block's writes and the cursor advance then commit in a single
//! transaction, so a crash or error at any point leaves either the whole
//! block or none of it.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use scrypo_core::Felt;

use super::events::{Block, DecodeError, DecodedEvent};
use super::stream::{BlockSource, StreamError};
use crate::config::{RetryConfig, SyncConfig};
use crate::storage::{Cursor, Finality, Storage};

/// Failure while projecting.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A registry event could not be decoded. The block is not applied and
    /// the cursor stays put; the engine stops until the data or decoder is
    /// fixed.
    #[error(
        "Malformed event in block {block_number} (tx {tx_hash}, event {event_index}): {source}"
    )]
    Malformed {
        /// Block containing the event
        block_number: u64,
        /// Transaction containing the event
        tx_hash: Felt,
        /// Index within the transaction
        event_index: u64,
        /// Decode failure
        #[source]
        source: DecodeError,
    },

    /// Storage failure (after retries when committing).
    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    /// Upstream failure.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Processing phase of a block, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPhase {
    /// Received from the source.
    Fetched,
    /// Events being decoded.
    Decoding,
    /// Writes being applied.
    Applying,
    /// Transaction committed.
    Committed,
    /// Block rejected.
    Failed,
}

impl fmt::Display for BlockPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockPhase::Fetched => "fetched",
            BlockPhase::Decoding => "decoding",
            BlockPhase::Applying => "applying",
            BlockPhase::Committed => "committed",
            BlockPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of applying one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    /// Block number
    pub block_number: u64,
    /// Finality the block was committed at
    pub finality: Finality,
    /// Profiles written
    pub profiles: usize,
    /// Messages inserted
    pub messages_inserted: usize,
    /// Messages already present
    pub messages_skipped: usize,
    /// Writes of an earlier pending version undone (profiles restored plus
    /// messages removed)
    pub reverted: u64,
    /// Commit attempts used
    pub attempts: u32,
}

/// Outcome of one [`SyncEngine::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A block was committed.
    Applied(BlockSummary),
    /// The next block is not available yet.
    Waiting,
}

/// Sync engine: single consumer of a [`BlockSource`].
pub struct SyncEngine<S> {
    source: S,
    storage: Storage,
    config: SyncConfig,
    retry: RetryConfig,
}

impl<S: BlockSource> SyncEngine<S> {
    /// Create a new sync engine.
    pub fn new(source: S, storage: Storage, config: SyncConfig, retry: RetryConfig) -> Self {
        Self {
            source,
            storage,
            config,
            retry,
        }
    }

    /// Block to request after `cursor`.
    ///
    /// A block committed while pending is requested again until it arrives
    /// accepted.
    pub fn next_block(cursor: Option<&Cursor>, start_block: u64) -> u64 {
        match cursor {
            None => start_block,
            Some(c) if c.finality == Finality::Pending => c.block_number,
            Some(c) => c.block_number + 1,
        }
    }

    /// Run until shutdown or a fatal error.
    ///
    /// Shutdown is observed only while waiting (between blocks or during
    /// backoff), never in the middle of a commit. Stream errors trigger a
    /// reconnect and resume from the committed cursor; malformed events and
    /// exhausted storage retries stop the engine.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
        info!(
            "Sync engine starting (finality={}, start_block={})",
            self.config.finality, self.config.start_block
        );

        let poll_interval = self.config.poll_interval();
        let mut stream_failures = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.step().await {
                Ok(StepOutcome::Applied(summary)) => {
                    stream_failures = 0;
                    // A pending block is re-polled in place; don't spin on it.
                    (summary.finality == Finality::Pending).then_some(poll_interval)
                }
                Ok(StepOutcome::Waiting) => {
                    stream_failures = 0;
                    Some(poll_interval)
                }
                Err(SyncError::Stream(e)) => {
                    stream_failures = stream_failures.saturating_add(1);
                    let delay = self.retry.backoff(stream_failures);
                    warn!(
                        "Stream error (attempt {}): {}. Reconnecting in {:?}",
                        stream_failures, e, delay
                    );
                    if wait_or_shutdown(&mut shutdown, delay).await {
                        break;
                    }
                    if let Err(e) = self.source.reconnect().await {
                        warn!("Reconnect failed: {}", e);
                    }
                    None
                }
                Err(e) => {
                    error!("Sync engine stopped: {}", e);
                    return Err(e);
                }
            };

            if let Some(delay) = idle {
                if wait_or_shutdown(&mut shutdown, delay).await {
                    break;
                }
            }
        }

        info!("Sync engine stopped by shutdown signal");
        Ok(())
    }

    /// Fetch and apply the next block, if available.
    pub async fn step(&mut self) -> Result<StepOutcome, SyncError> {
        let cursor = self
            .storage
            .load_cursor()
            .await
            .map_err(SyncError::Storage)?;
        let number = Self::next_block(cursor.as_ref(), self.config.start_block);

        let Some(block) = self.source.fetch_block(number, self.config.finality).await? else {
            debug!("Block {} not available yet", number);
            return Ok(StepOutcome::Waiting);
        };

        if block.number != number {
            return Err(StreamError::UnexpectedBlock {
                expected: number,
                actual: block.number,
            }
            .into());
        }

        if let Some(cursor) = &cursor {
            if cursor.finality == Finality::Accepted
                && cursor.block_number + 1 == block.number
                && block.parent_hash != cursor.block_hash
            {
                return Err(StreamError::Reorg {
                    block_number: block.number,
                    expected: cursor.block_hash,
                    parent_hash: block.parent_hash,
                }
                .into());
            }
        }

        self.apply_block(&block).await.map(StepOutcome::Applied)
    }

    /// Decode and commit one block, advancing the cursor to it.
    pub async fn apply_block(&self, block: &Block) -> Result<BlockSummary, SyncError> {
        log_phase(block, BlockPhase::Fetched);

        log_phase(block, BlockPhase::Decoding);
        let decoded = match decode_block(block) {
            Ok(decoded) => decoded,
            Err(e) => {
                log_phase(block, BlockPhase::Failed);
                return Err(e);
            }
        };

        let mut attempt = 1;
        loop {
            log_phase(block, BlockPhase::Applying);
            match self.commit_block(block, &decoded, attempt).await {
                Ok(summary) => {
                    log_phase(block, BlockPhase::Committed);
                    if summary.profiles + summary.messages_inserted > 0 {
                        info!(
                            "Block {} ({}): {} profiles, {} messages ({} duplicate)",
                            block.number,
                            block.finality,
                            summary.profiles,
                            summary.messages_inserted,
                            summary.messages_skipped
                        );
                    }
                    return Ok(summary);
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Commit of block {} failed (attempt {}/{}): {:#}. Retrying in {:?}",
                        block.number, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log_phase(block, BlockPhase::Failed);
                    return Err(SyncError::Storage(e.context(format!(
                        "Failed to commit block {} after {} attempts",
                        block.number, attempt
                    ))));
                }
            }
        }
    }

    async fn commit_block(
        &self,
        block: &Block,
        decoded: &[DecodedEvent],
        attempt: u32,
    ) -> anyhow::Result<BlockSummary> {
        let mut summary = BlockSummary {
            block_number: block.number,
            finality: block.finality,
            profiles: 0,
            messages_inserted: 0,
            messages_skipped: 0,
            reverted: 0,
            attempts: attempt,
        };

        let mut tx = self.storage.begin().await?;

        // A block seen earlier as pending is rebuilt from its current version.
        let keep: HashSet<String> = decoded
            .iter()
            .filter_map(|event| event.to_message_record())
            .map(|message| message.id)
            .collect();
        if let Some(revert) = tx.revert_pending_block(block.number, &keep).await? {
            summary.reverted = revert.profiles_restored + revert.messages_removed;
        }

        for event in decoded {
            if let Some(profile) = event.to_profile_record() {
                if block.finality == Finality::Pending {
                    tx.snapshot_profile(block.number, &profile.address).await?;
                }
                tx.upsert_profile(&profile).await?;
                summary.profiles += 1;
            } else if let Some(message) = event.to_message_record() {
                if tx.append_message(&message).await? {
                    summary.messages_inserted += 1;
                } else {
                    debug!("Message {} already stored", message.id);
                    summary.messages_skipped += 1;
                }
            }
        }

        tx.save_cursor(&Cursor::new(block.number, block.hash, block.finality))
            .await?;
        tx.commit().await?;

        Ok(summary)
    }

    /// Shared handle to the storage.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The block source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Decode every registry event of a block, or fail on the first bad one.
pub fn decode_block(block: &Block) -> Result<Vec<DecodedEvent>, SyncError> {
    let mut decoded = Vec::with_capacity(block.events.len());
    for event in &block.events {
        match DecodedEvent::from_chain_event(event) {
            Ok(Some(event)) => decoded.push(event),
            Ok(None) => {}
            Err(source) => {
                error!(
                    "Malformed event in block {} tx {} index {}: {}",
                    block.number, event.tx_hash, event.event_index, source
                );
                return Err(SyncError::Malformed {
                    block_number: block.number,
                    tx_hash: event.tx_hash,
                    event_index: event.event_index,
                    source,
                });
            }
        }
    }
    Ok(decoded)
}

fn log_phase(block: &Block, phase: BlockPhase) {
    debug!(
        "Block {} [{}] {} ({} events)",
        block.number,
        block.finality,
        phase,
        block.events.len()
    );
}

/// Sleep for `delay`; returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
