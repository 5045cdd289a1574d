//! Local filesystem tree source.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use derive_builder::Builder;
use dirsizer_core::{BoxFuture, CancellationToken, Container, Leaf, Listing, SizeError};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::inode::SeenInodes;

/// Options for reading a directory tree from disk.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct FsOptions {
    /// Follow symbolic links to directories and files.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden entries (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Count the bytes of a hardlinked file only once.
    #[builder(default = "false")]
    #[serde(default)]
    pub dedupe_hardlinks: bool,
}

fn default_true() -> bool {
    true
}

impl FsOptions {
    /// Create a new options builder.
    pub fn builder() -> FsOptionsBuilder {
        FsOptionsBuilder::default()
    }
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            dedupe_hardlinks: false,
        }
    }
}

/// A directory tree on the local filesystem.
///
/// Every `read_dir`/`stat` runs on tokio's blocking pool and is raced
/// against the cancellation token, so a cancelled walk returns without
/// waiting for a slow mount to answer.
#[derive(Debug, Clone)]
pub struct FsTree {
    root: PathBuf,
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    options: FsOptions,
    hardlinks: SeenInodes,
    dirs: SeenInodes,
}

impl FsTree {
    /// Describe the tree rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, options: FsOptions) -> Self {
        Self {
            root: root.into(),
            shared: Arc::new(Shared {
                options,
                hardlinks: SeenInodes::new(),
                dirs: SeenInodes::new(),
            }),
        }
    }

    /// Root container to hand to the sizer.
    pub fn root(&self) -> Arc<dyn Container> {
        Arc::new(FsDir::new(self.root.clone(), Arc::clone(&self.shared)))
    }

    /// Number of distinct hardlinked files measured so far. Stays zero
    /// unless hardlink deduplication is enabled.
    pub fn hardlinked_files(&self) -> usize {
        self.shared.hardlinks.len()
    }
}

struct FsDir {
    path: PathBuf,
    name: String,
    shared: Arc<Shared>,
}

impl FsDir {
    fn new(path: PathBuf, shared: Arc<Shared>) -> Self {
        let name = path.to_string_lossy().into_owned();
        Self { path, name, shared }
    }
}

struct FsFile {
    path: PathBuf,
    name: String,
    shared: Arc<Shared>,
}

impl FsFile {
    fn new(path: PathBuf, shared: Arc<Shared>) -> Self {
        let name = path.to_string_lossy().into_owned();
        Self { path, name, shared }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    Leaf,
}

impl Container for FsDir {
    fn name(&self) -> &str {
        &self.name
    }

    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Listing, SizeError>> {
        Box::pin(async move {
            let path = self.path.clone();
            let shared = Arc::clone(&self.shared);
            let entries = run_blocking(cancel, move || read_children(&path, &shared))
                .await?
                .map_err(|e| SizeError::list(self.name.as_str(), e))?;

            trace!(dir = %self.name, entries = entries.len(), "listed");

            let mut listing = Listing::new();
            for (path, kind) in entries {
                let shared = Arc::clone(&self.shared);
                match kind {
                    EntryKind::Dir => listing.push_container(Arc::new(FsDir::new(path, shared))),
                    EntryKind::Leaf => listing.push_leaf(Arc::new(FsFile::new(path, shared))),
                }
            }
            Ok(listing)
        })
    }
}

impl Leaf for FsFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn measure<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<u64, SizeError>> {
        Box::pin(async move {
            let path = self.path.clone();
            let shared = Arc::clone(&self.shared);
            run_blocking(cancel, move || file_size(&path, &shared))
                .await?
                .map_err(|e| SizeError::measure(self.name.as_str(), e))
        })
    }
}

/// Run blocking filesystem work, giving up as soon as `cancel` fires.
async fn run_blocking<T, F>(cancel: &CancellationToken, work: F) -> Result<T, SizeError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(SizeError::Cancelled);
    }

    let handle = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SizeError::Cancelled),
        joined = handle => joined.map_err(|e| SizeError::TaskPanicked { message: e.to_string() }),
    }
}

/// Read and classify the entries of a directory, sorted by name.
fn read_children(path: &Path, shared: &Shared) -> io::Result<Vec<(PathBuf, EntryKind)>> {
    let options = &shared.options;

    // A directory reachable through several symlinks is only expanded once.
    if options.follow_symlinks {
        if !shared.dirs.claim_metadata(&fs::metadata(path)?) {
            return Ok(Vec::new());
        }
    }

    let mut children = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !options.include_hidden && entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let entry_path = entry.path();
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_symlink() && options.follow_symlinks {
            match fs::metadata(&entry_path) {
                Ok(target) if target.is_dir() => EntryKind::Dir,
                _ => EntryKind::Leaf,
            }
        } else {
            EntryKind::Leaf
        };
        children.push((entry_path, kind));
    }

    children.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}

/// Size of a single entry in bytes.
fn file_size(path: &Path, shared: &Shared) -> io::Result<u64> {
    let options = &shared.options;

    let metadata = if options.follow_symlinks {
        match fs::metadata(path) {
            // Broken link: measure the link itself.
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::symlink_metadata(path)?,
            other => other?,
        }
    } else {
        fs::symlink_metadata(path)?
    };

    if options.dedupe_hardlinks
        && get_nlink(&metadata) > 1
        && !shared.hardlinks.claim_metadata(&metadata)
    {
        return Ok(0);
    }

    Ok(metadata.len())
}

/// Get the number of hard links from metadata.
#[cfg(unix)]
fn get_nlink(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
fn get_nlink(_metadata: &fs::Metadata) -> u64 {
    1 // Assume single link on Windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join(".hidden"), "secret").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();

        temp
    }

    #[tokio::test]
    async fn test_list_classifies_entries() {
        let temp = create_test_tree();
        let tree = FsTree::new(temp.path(), FsOptions::default());
        let cancel = CancellationToken::new();

        let listing = tree.root().list(&cancel).await.unwrap();
        assert_eq!(listing.containers.len(), 1);
        assert!(listing.containers[0].name().ends_with("dir1"));
        assert_eq!(listing.leaves.len(), 2);
    }

    #[tokio::test]
    async fn test_hidden_entries_skipped() {
        let temp = create_test_tree();
        let options = FsOptions::builder().include_hidden(false).build().unwrap();
        let tree = FsTree::new(temp.path(), options);
        let cancel = CancellationToken::new();

        let listing = tree.root().list(&cancel).await.unwrap();
        let names: Vec<_> = listing.leaves.iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("file1.txt"));
        assert_eq!(listing.leaves[0].measure(&cancel).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_missing_dir_is_list_error() {
        let temp = TempDir::new().unwrap();
        let tree = FsTree::new(temp.path().join("nope"), FsOptions::default());
        let cancel = CancellationToken::new();

        let err = tree.root().list(&cancel).await.unwrap_err();
        assert!(matches!(err, SizeError::List { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_io() {
        let temp = create_test_tree();
        let tree = FsTree::new(temp.path(), FsOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tree.root().list(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hardlinks_counted_once() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), "0123456789").unwrap();
        fs::hard_link(temp.path().join("a"), temp.path().join("b")).unwrap();

        let options = FsOptions::builder().dedupe_hardlinks(true).build().unwrap();
        let tree = FsTree::new(temp.path(), options);
        let cancel = CancellationToken::new();

        let listing = tree.root().list(&cancel).await.unwrap();
        let mut total = 0;
        for leaf in &listing.leaves {
            total += leaf.measure(&cancel).await.unwrap();
        }
        assert_eq!(total, 10);
        assert_eq!(tree.hardlinked_files(), 1);
    }
}
