//! Concurrent tree sizing engine for dirsizer.
//!
//! This crate walks any [`Container`] recursively and reports the total
//! size and leaf count of everything beneath it.
//!
//! # Overview
//!
//! `dirsizer-walk` is responsible for expanding containers and aggregating
//! their sizes. Key features:
//!
//! - **Parallel fan-out** of one task per child container via tokio
//! - **Bounded concurrency** per container or across the whole walk
//! - **Fail-fast** cancellation: the first error stops all outstanding work
//! - **Tree sources** for the local filesystem and for in-memory trees
//!
//! # Example
//!
//! ```rust,no_run
//! use dirsizer_walk::{FsOptions, FsTree, Sizer};
//!
//! let root = FsTree::new("/path/to/scan", FsOptions::default()).root();
//! let totals = Sizer::new().size_blocking(root).unwrap();
//!
//! println!("Total size: {} bytes", totals.size);
//! println!("Total files: {}", totals.count);
//! ```
//!
//! # Cancellation
//!
//! The async entry point takes a caller-owned token:
//!
//! ```rust,no_run
//! use dirsizer_walk::{CancellationToken, MemDir, Sizer};
//!
//! # async fn run() {
//! let cancel = CancellationToken::new();
//! let root = MemDir::new("root").file("a", 10).into_container();
//!
//! let watchdog = cancel.clone();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     watchdog.cancel();
//! });
//!
//! let totals = Sizer::new().size(&cancel, root).await;
//! # }
//! ```

mod frame;
mod fs;
mod inode;
mod limiter;
mod memory;
mod sizer;

pub use fs::{FsOptions, FsOptionsBuilder, FsTree};
pub use memory::{CallStats, MemDir, MemFile};
pub use sizer::Sizer;

// Re-export core types for convenience
pub use dirsizer_core::{
    BoxFuture, CancellationToken, Container, Leaf, LimitScope, Listing, SizeError, SizerConfig,
    SizerConfigBuilder, Totals,
};
