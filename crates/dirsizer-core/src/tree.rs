//! Tree source traits.
//!
//! A tree source is anything that can be expanded container by container:
//! a real filesystem, an archive, a remote store or an in-memory mock. The
//! sizer only ever sees the two capabilities defined here.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::SizeError;

/// Type alias for boxed futures returned by tree source methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A node that can be expanded into child containers and child leaves.
pub trait Container: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// List the direct children of this container.
    ///
    /// Implementations should return [`SizeError::Cancelled`] promptly once
    /// `cancel` fires, even if the underlying call is already in flight.
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Listing, SizeError>>;
}

/// A node with a directly measurable size and no children.
pub trait Leaf: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Measure the size of this leaf in bytes.
    ///
    /// Same cancellation expectations as [`Container::list`].
    fn measure<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<u64, SizeError>>;
}

/// Direct children of a container, in the order the source returned them.
#[derive(Clone, Default)]
pub struct Listing {
    /// Child containers.
    pub containers: Vec<Arc<dyn Container>>,
    /// Child leaves.
    pub leaves: Vec<Arc<dyn Leaf>>,
}

impl Listing {
    /// Create an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child container.
    pub fn push_container(&mut self, container: Arc<dyn Container>) {
        self.containers.push(container);
    }

    /// Add a child leaf.
    pub fn push_leaf(&mut self, leaf: Arc<dyn Leaf>) {
        self.leaves.push(leaf);
    }

    /// Check if the container had no children at all.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.leaves.is_empty()
    }
}

impl std::fmt::Debug for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listing")
            .field(
                "containers",
                &self.containers.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field(
                "leaves",
                &self.leaves.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
