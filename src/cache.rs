//! Synchronous bitmap cache consulted before any asynchronous load.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;

use crate::bitmap::Bitmap;
use crate::error::Error;

/// Lookup-by-hash-and-id collaborator.
///
/// An `Err` is a lookup failure; display items treat it exactly like a miss.
pub trait BitmapCache {
    fn lookup(&self, content_hash: i32, row_id: i64) -> Result<Option<Bitmap>, Error>;
}

impl<F> BitmapCache for F
where
    F: Fn(i32, i64) -> Result<Option<Bitmap>, Error>,
{
    fn lookup(&self, content_hash: i32, row_id: i64) -> Result<Option<Bitmap>, Error> {
        self(content_hash, row_id)
    }
}

type CacheKey = (i32, i64);

/// Bounded in-memory LRU cache shared between the owning thread (lookups)
/// and fetch workers (write-through inserts).
pub struct MemoryCache {
    entries: Mutex<LruCache<CacheKey, Bitmap>>,
}

impl MemoryCache {
    /// A zero capacity is raised to one entry.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().map(|e| e.cap().get()).unwrap_or(0)
    }

    /// Store `bitmap`, evicting the least recently used entry when full.
    pub fn insert(&self, content_hash: i32, row_id: i64, bitmap: Bitmap) -> Result<(), Error> {
        self.lock()?.put((content_hash, row_id), bitmap);
        Ok(())
    }

    pub fn remove(&self, content_hash: i32, row_id: i64) -> Result<Option<Bitmap>, Error> {
        Ok(self.lock()?.pop(&(content_hash, row_id)))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<CacheKey, Bitmap>>, Error> {
        self.entries
            .lock()
            .map_err(|_| Error::CacheLookup("memory cache lock poisoned".into()))
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl BitmapCache for MemoryCache {
    fn lookup(&self, content_hash: i32, row_id: i64) -> Result<Option<Bitmap>, Error> {
        Ok(self.lock()?.get(&(content_hash, row_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_shared_bitmap() {
        let cache = MemoryCache::new(4);
        let bm = Bitmap::solid(2, 2, [0, 0, 0, 255]);
        cache.insert(42, 7, bm.clone()).unwrap();

        let hit = cache.lookup(42, 7).unwrap().expect("cached");
        assert!(hit.ptr_eq(&bm));
        assert!(cache.lookup(42, 8).unwrap().is_none());
        assert!(cache.lookup(41, 7).unwrap().is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        cache.insert(1, 1, Bitmap::solid(1, 1, [1, 1, 1, 255])).unwrap();
        cache.insert(2, 2, Bitmap::solid(1, 1, [2, 2, 2, 255])).unwrap();
        // Touch the first entry so the second becomes the eviction victim.
        assert!(cache.lookup(1, 1).unwrap().is_some());
        cache.insert(3, 3, Bitmap::solid(1, 1, [3, 3, 3, 255])).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(1, 1).unwrap().is_some());
        assert!(cache.lookup(2, 2).unwrap().is_none());
        assert!(cache.lookup(3, 3).unwrap().is_some());
    }

    #[test]
    fn reinsert_replaces_without_growing() {
        let cache = MemoryCache::new(2);
        cache.insert(1, 1, Bitmap::solid(1, 1, [1, 1, 1, 255])).unwrap();
        let newer = Bitmap::solid(1, 1, [9, 9, 9, 255]);
        cache.insert(1, 1, newer.clone()).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(1, 1).unwrap().unwrap().ptr_eq(&newer));

        assert!(cache.remove(1, 1).unwrap().is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let cache = MemoryCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(1, 1, Bitmap::solid(1, 1, [1, 1, 1, 255])).unwrap();
        cache.insert(2, 2, Bitmap::solid(1, 1, [2, 2, 2, 255])).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(1, 1).unwrap().is_none());
        assert!(cache.lookup(2, 2).unwrap().is_some());
    }

    #[test]
    fn closures_act_as_caches() {
        let hit = Bitmap::solid(3, 3, [0, 0, 0, 255]);
        let lookup = {
            let hit = hit.clone();
            move |hash: i32, _id: i64| -> Result<Option<Bitmap>, Error> {
                if hash == 42 {
                    Ok(Some(hit.clone()))
                } else {
                    Err(Error::CacheLookup("offline".into()))
                }
            }
        };
        assert!(lookup.lookup(42, 0).unwrap().is_some());
        assert!(lookup.lookup(1, 0).is_err());
    }
}
