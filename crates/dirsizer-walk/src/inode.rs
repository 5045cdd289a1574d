//! Inode bookkeeping shared by the filesystem tree's concurrent tasks.

use std::fs::Metadata;

use dashmap::DashSet;

/// Device and inode number of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct InodeKey {
    pub device: u64,
    pub inode: u64,
}

impl InodeKey {
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// `None` on platforms without stable inode numbers.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self::new(metadata.dev(), metadata.ino()))
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Set of inodes already claimed by some task of one walk.
///
/// The filesystem tree keeps two: one so a hardlinked file's bytes are
/// counted once, one so a directory reached through several symlinks is
/// expanded once.
#[derive(Debug, Default)]
pub(crate) struct SeenInodes {
    seen: DashSet<InodeKey>,
}

impl SeenInodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Exactly one caller per key gets `true`.
    pub fn claim(&self, key: InodeKey) -> bool {
        self.seen.insert(key)
    }

    /// Claim the inode `metadata` describes. Always `true` when the
    /// platform cannot identify inodes, so nothing is skipped there.
    pub fn claim_metadata(&self, metadata: &Metadata) -> bool {
        InodeKey::from_metadata(metadata).is_none_or(|key| self.claim(key))
    }

    /// Number of distinct inodes claimed.
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_claim_once_across_threads() {
        let seen = Arc::new(SeenInodes::new());
        let key = InodeKey::new(1, 12345);

        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let seen = Arc::clone(&seen);
                    s.spawn(move || seen.claim(key) as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(winners, 1);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_same_inode_on_other_device() {
        let seen = SeenInodes::new();

        assert!(seen.claim(InodeKey::new(1, 12345)));
        assert!(seen.claim(InodeKey::new(2, 12345)));
        assert_eq!(seen.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_claim_metadata() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("a");
        std::fs::write(&file, "x").unwrap();
        std::fs::hard_link(&file, temp.path().join("b")).unwrap();

        let seen = SeenInodes::new();
        assert!(seen.claim_metadata(&std::fs::metadata(&file).unwrap()));
        assert!(!seen.claim_metadata(&std::fs::metadata(temp.path().join("b")).unwrap()));
        assert!(seen.claim_metadata(&std::fs::metadata(temp.path()).unwrap()));
    }
}
