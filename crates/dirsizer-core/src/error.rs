//! Error types for sizing operations.

use std::io;

use compact_str::CompactString;
use thiserror::Error;

/// Errors that can occur while sizing a tree.
///
/// Any of these is fatal to the whole top-level invocation.
#[derive(Debug, Error)]
pub enum SizeError {
    /// A container could not be listed.
    #[error("Failed to list {name}: {source}")]
    List {
        name: CompactString,
        #[source]
        source: io::Error,
    },

    /// A leaf could not be measured.
    #[error("Failed to measure {name}: {source}")]
    Measure {
        name: CompactString,
        #[source]
        source: io::Error,
    },

    /// The invocation was cancelled, either by the caller or because
    /// another part of the tree failed first.
    #[error("Operation cancelled")]
    Cancelled,

    /// The aggregate for a container no longer fits in 64 bits.
    #[error("Size total overflowed under {name}")]
    Overflow { name: CompactString },

    /// The blocking entry point could not start its runtime.
    #[error("Failed to start runtime: {source}")]
    Runtime {
        #[source]
        source: io::Error,
    },

    /// A subtree task panicked.
    #[error("Subtree task panicked: {message}")]
    TaskPanicked { message: String },
}

impl SizeError {
    /// Create a listing error for the named container.
    pub fn list(name: impl Into<CompactString>, source: io::Error) -> Self {
        Self::List {
            name: name.into(),
            source,
        }
    }

    /// Create a measurement error for the named leaf.
    pub fn measure(name: impl Into<CompactString>, source: io::Error) -> Self {
        Self::Measure {
            name: name.into(),
            source,
        }
    }

    /// Create an overflow error for the named container.
    pub fn overflow(name: impl Into<CompactString>) -> Self {
        Self::Overflow { name: name.into() }
    }

    /// Whether this error only reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
