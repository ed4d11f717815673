//! Chain listener for ProfileRegistry events.
//!
//! This module provides:
//! - Event types and the registry event decoder
//! - Block sources: Starknet JSON-RPC and an in-memory source for tests
//! - Sync engine projecting blocks into storage

pub mod events;
pub mod provider;
pub mod stream;
pub mod sync;

pub use events::{Block, ChainEvent, DecodeError, DecodedEvent, DomainEvent, EventKind};
pub use provider::RpcProvider;
pub use stream::{BlockSource, MemoryBlockSource, StreamError};
pub use sync::{BlockSummary, StepOutcome, SyncEngine, SyncError};
