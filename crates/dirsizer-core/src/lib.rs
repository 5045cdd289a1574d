//! Core types and traits for dirsizer.
//!
//! This crate provides the fundamental pieces shared by the dirsizer
//! workspace: the aggregate [`Totals`] value, the [`SizeError`] taxonomy,
//! sizer configuration, and the [`Container`]/[`Leaf`] traits through which
//! a tree source is consumed.

mod config;
mod error;
mod totals;
mod tree;

pub use config::{LimitScope, SizerConfig, SizerConfigBuilder};
pub use error::SizeError;
pub use totals::Totals;
pub use tree::{BoxFuture, Container, Leaf, Listing};

/// Re-exported so tree sources don't need a direct `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
