/*!
 * Listing Cache
 * Short-lived directory listings shared by every view of one cloud backend
 */

use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::super::paths;
use super::super::types::FileMetadata;

pub const DEFAULT_CACHE_CAPACITY: usize = 64;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Children of one directory as last listed
struct CachedListing {
    children: Vec<FileMetadata>,
    inserted: Instant,
}

/// Directory listing cache keyed by directory path
///
/// A cached listing is authoritative for its direct children until it
/// expires: a child missing from it does not exist. Mutations clear the whole
/// cache, so staleness is bounded by the TTL plus changes made by other
/// clients of the remote account.
pub struct ListingCache {
    listings: DashMap<String, CachedListing, RandomState>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ListingCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            listings: DashMap::with_capacity_and_hasher(max_size, RandomState::new()),
            max_size,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Listing of `dir`, if cached and still fresh
    pub fn get(&self, dir: &str) -> Option<Vec<FileMetadata>> {
        if let Some(entry) = self.listings.get(dir) {
            if entry.inserted.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.children.clone());
            }
            drop(entry);
            self.listings.remove(dir);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Answer a lookup of `path` from its parent's listing.
    ///
    /// `None` means the cache cannot answer; `Some(None)` means the parent is
    /// cached and has no such child.
    pub fn lookup(&self, path: &str) -> Option<Option<FileMetadata>> {
        let parent = paths::parent(path)?;
        let name = paths::file_name(path);
        let children = self.get(parent)?;
        Some(children.into_iter().find(|child| child.name() == name))
    }

    /// Store a listing, evicting the oldest one when full
    pub fn put(&self, dir: &str, children: Vec<FileMetadata>) {
        if self.max_size == 0 {
            return;
        }
        if self.listings.len() >= self.max_size && !self.listings.contains_key(dir) {
            let oldest = self
                .listings
                .iter()
                .min_by_key(|entry| entry.inserted)
                .map(|entry| entry.key().clone());
            if let Some(key) = oldest {
                self.listings.remove(&key);
            }
        }

        self.listings.insert(
            dir.to_string(),
            CachedListing {
                children,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop every listing
    pub fn clear(&self) {
        self.listings.clear();
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.listings.len(),
            max_size: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
}
