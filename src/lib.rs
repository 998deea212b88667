//! FerroDB - the storage core of a disk-oriented RDBMS in Rust
//!
//! This crate provides the in-memory storage substrate of a disk-oriented
//! database engine: the layer that sits between persistent storage and
//! everything above it, caching fixed-size pages in a bounded pool.
//!
//! # Architecture
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: fetches pages from disk, caches them in a
//!     fixed set of frames, and allocates page ids
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `PageFrame`: per-frame metadata, data buffer, and latch
//!   - `PageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII pin (and
//!     latch) scopes over a page
//!
//! - **Storage Layer** (`storage`): disk I/O
//!   - `DiskManager`: reads and writes pages to the database file
//!   - `DiskScheduler`: background-thread disk I/O with synchronous
//!     entry points
//!   - `LogManager`: write-ahead-log attachment point
//!
//! - **Versioned Trie** (`trie`): a copy-on-write trie plus a concurrent
//!   store, the engine's snapshot-read building block
//!   - `Trie`: immutable trie of byte-string keys to typed values with
//!     structural sharing across versions
//!   - `TrieStore`: lock-free-reader, single-writer snapshot accessor
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ferrodb::buffer::{AccessType, BufferPoolManager};
//! use ferrodb::storage::disk::DiskManager;
//!
//! # fn main() -> ferrodb::Result<()> {
//! // Create a disk manager for a database file
//! let disk_manager = Arc::new(DiskManager::new("test.db")?);
//!
//! // Create a buffer pool with 100 frames and LRU-2 replacement
//! let bpm = BufferPoolManager::new(100, disk_manager, 2, None);
//!
//! // Allocate a new page and write to it
//! let (page_id, _frame) = bpm.new_page()?.expect("buffer pool is full");
//! bpm.unpin_page(page_id, false, AccessType::Unknown);
//! {
//!     let mut guard = bpm.fetch_page_write(page_id)?.expect("buffer pool is full");
//!     guard.data_mut()[0] = 42;
//! }
//!
//! // Flush changes to disk
//! bpm.flush_page(page_id)?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod common;
pub mod storage;
pub mod trie;

// Re-export commonly used types at the crate root
pub use common::{FerroError, FrameId, PageId, Result};
