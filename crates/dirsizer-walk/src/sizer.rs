//! Recursive, bounded-concurrency tree sizer.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use dirsizer_core::{
    BoxFuture, CancellationToken, Container, Leaf, SizeError, SizerConfig, Totals,
};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, trace};

use crate::frame::Frame;
use crate::limiter::Limiter;

/// Computes the total size and leaf count of a tree.
///
/// Direct leaves of a container are measured one after another; each child
/// container is expanded by its own task, subject to the configured
/// ceiling. The first failure anywhere cancels the rest of the walk and is
/// the only thing returned.
#[derive(Debug, Clone, Default)]
pub struct Sizer {
    config: SizerConfig,
}

/// State shared by every task of one top-level invocation.
struct Walk {
    cancel: CancellationToken,
    limiter: Limiter,
}

impl Walk {
    fn checkpoint(&self) -> Result<(), SizeError> {
        if self.cancel.is_cancelled() {
            Err(SizeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Sizer {
    /// Create a sizer with an auto-detected ceiling.
    pub fn new() -> Self {
        Self::with_config(SizerConfig::new())
    }

    /// Create a sizer with the given configuration.
    pub fn with_config(config: SizerConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SizerConfig {
        &self.config
    }

    /// Size everything reachable from `root`.
    ///
    /// Cancelling `cancel` aborts the walk with [`SizeError::Cancelled`].
    /// A failure inside the walk never cancels the caller's token.
    pub async fn size(
        &self,
        cancel: &CancellationToken,
        root: Arc<dyn Container>,
    ) -> Result<Totals, SizeError> {
        let start = Instant::now();
        let workers = self.config.effective_workers();
        let walk = Arc::new(Walk {
            cancel: cancel.child_token(),
            limiter: Limiter::new(self.config.limit_scope, workers),
        });

        debug!(
            root = root.name(),
            workers,
            scope = ?self.config.limit_scope,
            "sizing started"
        );

        let result = size_container(walk, root).await;

        match &result {
            Ok(totals) => debug!(
                size = totals.size,
                count = totals.count,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "sizing finished"
            ),
            Err(err) => debug!(error = %err, "sizing failed"),
        }
        result
    }

    /// Size everything reachable from `root`, blocking the calling thread.
    ///
    /// Starts its own multi-threaded runtime, so it must not be called from
    /// within an async context.
    pub fn size_blocking(&self, root: Arc<dyn Container>) -> Result<Totals, SizeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|source| SizeError::Runtime { source })?;
        runtime.block_on(self.size(&CancellationToken::new(), root))
    }
}

/// Expand one container; any failure cancels the whole walk.
fn size_container(
    walk: Arc<Walk>,
    container: Arc<dyn Container>,
) -> BoxFuture<'static, Result<Totals, SizeError>> {
    Box::pin(async move {
        let result = expand(&walk, container.as_ref()).await;
        if let Err(err) = &result {
            if !walk.cancel.is_cancelled() {
                debug!(container = container.name(), error = %err, "cancelling walk");
                walk.cancel.cancel();
            }
        }
        result
    })
}

async fn expand(walk: &Arc<Walk>, container: &dyn Container) -> Result<Totals, SizeError> {
    walk.checkpoint()?;
    let listing = {
        let _permit = walk.limiter.io_permit(&walk.cancel).await?;
        container.list(&walk.cancel).await?
    };
    if listing.is_empty() {
        trace!(container = container.name(), "empty container");
        return Ok(Totals::ZERO);
    }
    trace!(
        container = container.name(),
        containers = listing.containers.len(),
        leaves = listing.leaves.len(),
        "expanding"
    );

    let frame = Arc::new(Frame::new(container.name()));
    measure_leaves(walk, &frame, &listing.leaves).await?;

    let fan_out = walk.limiter.fan_out();
    let mut tasks = JoinSet::new();
    let mut failure: Option<SizeError> = None;

    for child in listing.containers {
        let ticket = match fan_out.ticket(&walk.cancel).await {
            Ok(ticket) => ticket,
            Err(err) => {
                failure = Some(err);
                break;
            }
        };

        let walk = Arc::clone(walk);
        let frame = Arc::clone(&frame);
        tasks.spawn(async move {
            let _ticket = ticket;
            let totals = size_container(walk, child).await?;
            frame.add(totals)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined.unwrap_or_else(|e| Err(join_failure(e))) {
            walk.cancel.cancel();
            failure = Some(prefer_cause(failure, err));
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(frame.totals()),
    }
}

/// Measure leaves in order, checking for cancellation before each one.
async fn measure_leaves(walk: &Walk, frame: &Frame, leaves: &[Arc<dyn Leaf>]) -> Result<(), SizeError> {
    for leaf in leaves {
        walk.checkpoint()?;
        let _permit = walk.limiter.io_permit(&walk.cancel).await?;
        let size = leaf.measure(&walk.cancel).await?;
        frame.add(Totals::leaf(size))?;
    }
    Ok(())
}

/// Keep the first real failure; a cancellation only wins if nothing else
/// has been seen, since it is usually the echo of another failure.
fn prefer_cause(current: Option<SizeError>, next: SizeError) -> SizeError {
    match current {
        Some(current) if !current.is_cancelled() || next.is_cancelled() => current,
        _ => next,
    }
}

fn join_failure(err: JoinError) -> SizeError {
    if err.is_panic() {
        SizeError::TaskPanicked {
            message: panic_message(err.into_panic()),
        }
    } else {
        SizeError::Cancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
