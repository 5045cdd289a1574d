//! In-memory tree source.
//!
//! Useful for tests and for exercising the sizer without touching a disk.
//! Nodes can be told to fail, calls can be slowed down, and every call is
//! recorded in a shared [`CallStats`].

use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use compact_str::CompactString;
use dirsizer_core::{BoxFuture, CancellationToken, Container, Leaf, Listing, SizeError, Totals};

/// Call counters shared by every node of an in-memory tree.
#[derive(Debug, Default)]
pub struct CallStats {
    lists: AtomicU64,
    measures: AtomicU64,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CallStats {
    /// Create a new, shareable set of counters.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `list` calls started.
    pub fn lists(&self) -> u64 {
        self.lists.load(Ordering::SeqCst)
    }

    /// Number of `measure` calls started.
    pub fn measures(&self) -> u64 {
        self.measures.load(Ordering::SeqCst)
    }

    /// Number of calls currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }
}

struct InFlight<'a>(&'a CallStats);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A file in an in-memory tree.
#[derive(Debug, Clone)]
pub struct MemFile {
    name: CompactString,
    size: u64,
    failure: Option<String>,
}

impl MemFile {
    /// A file that measures as `size` bytes.
    pub fn new(name: impl Into<CompactString>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            failure: None,
        }
    }

    /// A file whose measurement fails with `message`.
    pub fn failing(name: impl Into<CompactString>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            failure: Some(message.into()),
        }
    }
}

/// A directory in an in-memory tree.
#[derive(Debug, Clone)]
pub struct MemDir {
    name: CompactString,
    dirs: Vec<MemDir>,
    files: Vec<MemFile>,
    failure: Option<String>,
}

impl MemDir {
    /// An empty directory.
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            dirs: Vec::new(),
            files: Vec::new(),
            failure: None,
        }
    }

    /// Add a file of the given size.
    pub fn file(self, name: impl Into<CompactString>, size: u64) -> Self {
        self.leaf(MemFile::new(name, size))
    }

    /// Add a prepared file.
    pub fn leaf(mut self, file: MemFile) -> Self {
        self.files.push(file);
        self
    }

    /// Add a sub-directory.
    pub fn dir(mut self, dir: MemDir) -> Self {
        self.dirs.push(dir);
        self
    }

    /// Make listing this directory fail with `message`.
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Expected totals of this subtree, ignoring injected failures.
    ///
    /// `None` if the subtree does not fit in 64 bits.
    pub fn expected(&self) -> Option<Totals> {
        let own = self
            .files
            .iter()
            .try_fold(Totals::ZERO, |acc, f| acc.checked_add(Totals::leaf(f.size)))?;
        self.dirs
            .iter()
            .try_fold(own, |acc, d| acc.checked_add(d.expected()?))
    }

    /// Turn the description into a tree source without instrumentation.
    pub fn into_container(self) -> Arc<dyn Container> {
        self.instrumented(&CallStats::new(), Duration::ZERO)
    }

    /// Turn the description into a tree source that records every call in
    /// `stats` and takes `latency` per call.
    pub fn instrumented(self, stats: &Arc<CallStats>, latency: Duration) -> Arc<dyn Container> {
        let instrument = Arc::new(Instrument {
            stats: Arc::clone(stats),
            latency,
        });
        Arc::new(self.build(&instrument))
    }

    fn build(self, instrument: &Arc<Instrument>) -> MemNode {
        MemNode {
            name: self.name,
            dirs: self
                .dirs
                .into_iter()
                .map(|d| Arc::new(d.build(instrument)))
                .collect(),
            files: self
                .files
                .into_iter()
                .map(|f| {
                    Arc::new(MemLeaf {
                        file: f,
                        instrument: Arc::clone(instrument),
                    })
                })
                .collect(),
            failure: self.failure,
            instrument: Arc::clone(instrument),
        }
    }
}

struct Instrument {
    stats: Arc<CallStats>,
    latency: Duration,
}

impl Instrument {
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), SizeError> {
        if self.latency.is_zero() {
            return if cancel.is_cancelled() {
                Err(SizeError::Cancelled)
            } else {
                Ok(())
            };
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SizeError::Cancelled),
            _ = tokio::time::sleep(self.latency) => Ok(()),
        }
    }
}

struct MemNode {
    name: CompactString,
    dirs: Vec<Arc<MemNode>>,
    files: Vec<Arc<MemLeaf>>,
    failure: Option<String>,
    instrument: Arc<Instrument>,
}

impl Container for MemNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Listing, SizeError>> {
        Box::pin(async move {
            let stats = &self.instrument.stats;
            stats.lists.fetch_add(1, Ordering::SeqCst);
            let _guard = stats.enter();

            self.instrument.wait(cancel).await?;

            if let Some(message) = &self.failure {
                return Err(SizeError::list(self.name.clone(), io::Error::other(message.clone())));
            }

            let mut listing = Listing::new();
            for dir in &self.dirs {
                listing.push_container(Arc::clone(dir) as Arc<dyn Container>);
            }
            for file in &self.files {
                listing.push_leaf(Arc::clone(file) as Arc<dyn Leaf>);
            }
            Ok(listing)
        })
    }
}

struct MemLeaf {
    file: MemFile,
    instrument: Arc<Instrument>,
}

impl Leaf for MemLeaf {
    fn name(&self) -> &str {
        &self.file.name
    }

    fn measure<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<u64, SizeError>> {
        Box::pin(async move {
            let stats = &self.instrument.stats;
            stats.measures.fetch_add(1, Ordering::SeqCst);
            let _guard = stats.enter();

            self.instrument.wait(cancel).await?;

            match &self.file.failure {
                Some(message) => Err(SizeError::measure(
                    self.file.name.clone(),
                    io::Error::other(message.clone()),
                )),
                None => Ok(self.file.size),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_totals() {
        let tree = MemDir::new("root")
            .file("a", 10)
            .file("b", 20)
            .dir(MemDir::new("sub").file("c", 5));

        assert_eq!(tree.expected(), Some(Totals::new(35, 3)));
        assert_eq!(MemDir::new("big").file("a", u64::MAX).file("b", 1).expected(), None);
    }

    #[tokio::test]
    async fn test_listing_and_stats() {
        let stats = CallStats::new();
        let root = MemDir::new("root")
            .file("a", 1)
            .dir(MemDir::new("sub"))
            .instrumented(&stats, Duration::ZERO);
        let cancel = CancellationToken::new();

        let listing = root.list(&cancel).await.unwrap();
        assert_eq!(listing.containers.len(), 1);
        assert_eq!(listing.containers[0].name(), "sub");
        assert_eq!(listing.leaves[0].measure(&cancel).await.unwrap(), 1);

        assert_eq!(stats.lists(), 1);
        assert_eq!(stats.measures(), 1);
        assert_eq!(stats.peak(), 1);
        assert_eq!(stats.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cancel = CancellationToken::new();

        let broken = MemDir::new("locked").fail_with("permission denied").into_container();
        let err = broken.list(&cancel).await.unwrap_err();
        assert!(matches!(err, SizeError::List { ref name, .. } if name == "locked"));

        let root = MemDir::new("root").leaf(MemFile::failing("bad", "io")).into_container();
        let listing = root.list(&cancel).await.unwrap();
        let err = listing.leaves[0].measure(&cancel).await.unwrap_err();
        assert!(matches!(err, SizeError::Measure { .. }));
    }

    #[tokio::test]
    async fn test_slow_call_observes_cancellation() {
        let stats = CallStats::new();
        let root = MemDir::new("root").instrumented(&stats, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = root.list(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(stats.in_flight(), 0);
    }
}
