//! ProfileRegistry event projection for Scrypo.
//!
//! This crate provides:
//! - A Starknet JSON-RPC block source for ProfileRegistry events
//! - Decoding of `ProfileUpdated` and `MessageSent` events
//! - A SQLite projection: latest-wins profiles with a spatial index, an
//!   append-only message log, and a sync cursor
//! - A sync engine that applies each block atomically
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │  scrypo-indexer (this)           │
//! │                                  │
//! │  ┌──────────────────┐            │
//! │  │  Block Source    │ ← Starknet JSON-RPC
//! │  │  (RpcProvider)   │   starknet_getEvents
//! │  └────────┬─────────┘            │
//! │           │ Block (events)       │
//! │  ┌────────▼─────────┐            │
//! │  │   Sync Engine    │            │
//! │  │   (tokio task)   │ decode all, then
//! │  └────────┬─────────┘ one tx per block
//! │           │                      │
//! │  ┌────────▼─────────┐            │
//! │  │     Storage      │ ← SQLite   │
//! │  │ profiles (rtree) │            │
//! │  │ messages, cursor │            │
//! │  └──────────────────┘            │
//! └──────────────────────────────────┘
//! ```
//!
//! Felt encodings (degrees, public keys, packed payloads, short strings,
//! u256 halves) live in `scrypo-core` and are shared with clients.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod listener;
pub mod storage;

// Re-export common types
pub use scrypo_core::*;
