//! Per-container accumulator shared with child tasks.

use std::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;
use dirsizer_core::{SizeError, Totals};

/// Running totals for one container being expanded.
///
/// Direct leaves and child tasks add into the frame, the latter
/// concurrently. Only a fully successful expansion reads it back out; a
/// failed one just drops it, so a half-applied add is never observed.
#[derive(Debug)]
pub(crate) struct Frame {
    name: CompactString,
    size: AtomicU64,
    count: AtomicU64,
}

impl Frame {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            size: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Add into the frame, failing instead of wrapping on overflow.
    pub fn add(&self, totals: Totals) -> Result<(), SizeError> {
        checked_fetch_add(&self.size, totals.size)
            .and_then(|_| checked_fetch_add(&self.count, totals.count))
            .map(|_| ())
            .map_err(|_| SizeError::overflow(self.name.clone()))
    }

    /// Read the accumulated totals. Callers must have joined every task
    /// that writes to this frame.
    pub fn totals(&self) -> Totals {
        Totals::new(
            self.size.load(Ordering::Relaxed),
            self.count.load(Ordering::Relaxed),
        )
    }
}

fn checked_fetch_add(counter: &AtomicU64, value: u64) -> Result<u64, u64> {
    counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        current.checked_add(value)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_concurrent_adds() {
        let frame = Arc::new(Frame::new("root"));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let frame = Arc::clone(&frame);
                s.spawn(move || {
                    for _ in 0..1000 {
                        frame.add(Totals::leaf(3)).unwrap();
                    }
                });
            }
        });

        assert_eq!(frame.totals(), Totals::new(24_000, 8_000));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let frame = Frame::new("big");
        frame.add(Totals::leaf(u64::MAX)).unwrap();

        let err = frame.add(Totals::leaf(1)).unwrap_err();
        assert!(matches!(err, SizeError::Overflow { ref name } if name == "big"));
        assert_eq!(frame.totals(), Totals::leaf(u64::MAX));
    }
}
