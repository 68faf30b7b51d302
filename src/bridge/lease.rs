//! Scoped ownership of buffers handed to the managed side
//!
//! A [`BufferLease`] is the Controller-owned copy passed to the callback
//! method. It is released when dropped, on the success path and the fault
//! path alike, and the tracker counts what is still out.

use crate::codec::ByteBuffer;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct LeaseTracker {
    inner: Arc<LeaseCounts>,
}

#[derive(Debug, Default)]
struct LeaseCounts {
    outstanding: AtomicUsize,
    issued: AtomicU64,
}

impl LeaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `buffer` for the duration of one managed call
    pub fn lease(&self, buffer: ByteBuffer) -> BufferLease {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        self.inner.issued.fetch_add(1, Ordering::Relaxed);
        trace!(bytes = buffer.len(), "buffer leased");
        BufferLease {
            buffer,
            tracker: self.clone(),
        }
    }

    /// Leases not yet released
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    pub fn issued(&self) -> u64 {
        self.inner.issued.load(Ordering::Relaxed)
    }
}

/// Buffer pinned for the managed side until dropped
#[must_use]
pub struct BufferLease {
    buffer: ByteBuffer,
    tracker: LeaseTracker,
}

impl Deref for BufferLease {
    type Target = [i8];

    fn deref(&self) -> &[i8] {
        &self.buffer
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        self.tracker.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
        trace!(bytes = self.buffer.len(), "buffer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_on_drop() {
        let tracker = LeaseTracker::new();
        {
            let lease = tracker.lease(ByteBuffer::from([1i8, 2]));
            assert_eq!(&*lease, &[1, 2]);
            assert_eq!(tracker.outstanding(), 1);
        }
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.issued(), 1);
    }

    #[test]
    fn test_release_on_unwind() {
        let tracker = LeaseTracker::new();
        let inner = tracker.clone();
        let result = std::panic::catch_unwind(move || {
            let _lease = inner.lease(ByteBuffer::from([7i8]));
            panic!("managed side blew up");
        });
        assert!(result.is_err());
        assert_eq!(tracker.outstanding(), 0);
    }
}
