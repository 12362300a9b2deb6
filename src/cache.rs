//! Last-generated snapshot store.
//!
//! A [`SnapshotCache`] holds at most one [`ArtifactBundle`] under a
//! reader/writer lock. It is the plain get/set/clear alternative to the live
//! server's atomic swap, for consumers that want to keep the most recent
//! bundle around without serving it.
//!
//! # Design
//!
//! The lock guards an `Option<Arc<ArtifactBundle>>`, never the bundle bytes.
//! `get` clones the `Arc` and releases the lock immediately, so a reader holds
//! a complete bundle for as long as it likes while writers replace the slot.
//! A reader therefore sees either the old bundle or the new one, never a mix.
//!
//! There is no eviction, expiry or size policy: `set` replaces, `clear` empties.

use crate::bundle::ArtifactBundle;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SnapshotCache {
    slot: RwLock<Option<Arc<ArtifactBundle>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored bundle, or `None` if nothing was set since creation or the
    /// last [`clear`](Self::clear).
    pub fn get(&self) -> Option<Arc<ArtifactBundle>> {
        let current = self.slot.read().clone();
        let counter = if current.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        current
    }

    /// Store `bundle`, replacing any previous one.
    pub fn set(&self, bundle: impl Into<Arc<ArtifactBundle>>) {
        let bundle = bundle.into();
        *self.slot.write() = Some(bundle);
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
        }
    }
}

/// Lookup counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lookups() == 0 {
            write!(f, "{} stored, no lookups", self.stores)
        } else {
            write!(
                f,
                "{} hits, {} misses ({} lookups), {} stored",
                self.hits,
                self.misses,
                self.lookups(),
                self.stores
            )
        }
    }
}
