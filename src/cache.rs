//! In-process caches shared across resolutions
//!
//! Two independent caches cooperate during resolution:
//!
//! - [`FetchCache`] memoises raw bytes per [`SourceLocator`], so the same file
//!   is never fetched twice while its entry lives.
//! - [`ResolverCache`] memoises resolved fragments per locator and carries an
//!   in-progress marker used for cycle detection.
//!
//! Both are cheap to clone (the map lives behind an `Arc`) and safe to share
//! between threads. Locks are only held for map access, never across a fetch.
//! A caller that needs bytes another thread is already fetching waits on a
//! condition variable, which releases the lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use log::debug;

use crate::error::{Error, Result};
use crate::job::{PipelineSpec, Step, Task};
use crate::locator::SourceLocator;

fn lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}

#[derive(Debug, Default)]
struct FetchState {
    entries: HashMap<SourceLocator, Arc<[u8]>>,
    /// Locators some caller is currently fetching
    in_flight: HashSet<SourceLocator>,
}

#[derive(Debug, Default)]
struct FetchInner {
    state: Mutex<FetchState>,
    ready: Condvar,
}

/// Raw content memoised per locator
///
/// Concurrent misses on the same locator are coalesced: one caller fetches
/// while the others wait for its result. Failed fetches are not cached.
#[derive(Debug, Clone, Default)]
pub struct FetchCache {
    inner: Arc<FetchInner>,
}

/// Clears a locator's in-flight flag however the fetch ends.
struct InFlight<'a> {
    inner: &'a FetchInner,
    key: &'a SourceLocator,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.in_flight.remove(self.key);
        drop(state);
        self.inner.ready.notify_all();
    }
}

impl FetchCache {
    /// Create a new empty fetch cache
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, FetchState>> {
        lock(&self.inner.state, "fetch cache")
    }

    /// Get cached bytes, or fetch and cache them if not present.
    ///
    /// The lock is released while `fetch` runs.
    pub fn get_or_fetch<F>(&self, key: &SourceLocator, fetch: F) -> Result<Arc<[u8]>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let mut state = self.state()?;
        loop {
            if let Some(cached) = state.entries.get(key) {
                debug!("Fetch cache hit for {}", key);
                return Ok(cached.clone());
            }
            if !state.in_flight.contains(key) {
                break;
            }
            debug!("Waiting for in-flight fetch of {}", key);
            state = self
                .inner
                .ready
                .wait(state)
                .map_err(|_| Error::LockPoisoned {
                    context: "fetch cache".to_string(),
                })?;
        }
        state.in_flight.insert(key.clone());
        drop(state);

        let guard = InFlight {
            inner: &self.inner,
            key,
        };
        debug!("Fetch cache miss for {}", key);
        let fetched: Arc<[u8]> = fetch()?.into();
        let cached = self
            .state()?
            .entries
            .entry(key.clone())
            .or_insert(fetched)
            .clone();
        drop(guard);
        Ok(cached)
    }

    /// Manually insert bytes into the cache
    pub fn insert(&self, key: SourceLocator, content: Vec<u8>) -> Result<()> {
        self.state()?.entries.insert(key, content.into());
        Ok(())
    }

    /// Get bytes from cache without fetching
    pub fn get(&self, key: &SourceLocator) -> Result<Option<Arc<[u8]>>> {
        Ok(self.state()?.entries.get(key).cloned())
    }

    /// Check if a key exists in cache
    pub fn contains(&self, key: &SourceLocator) -> Result<bool> {
        Ok(self.state()?.entries.contains_key(key))
    }

    /// Clear all cached entries
    pub fn clear(&self) -> Result<()> {
        self.state()?.entries.clear();
        Ok(())
    }

    /// Get the number of cached entries
    pub fn len(&self) -> Result<usize> {
        Ok(self.state()?.entries.len())
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.state()?.entries.is_empty())
    }
}

/// Resolved content found at a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Pipeline(PipelineSpec),
    Task(Task),
    Steps(Vec<Step>),
}

impl Fragment {
    /// Human-readable kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::Pipeline(_) => "pipeline",
            Fragment::Task(_) => "task",
            Fragment::Steps(_) => "step list",
        }
    }
}

/// Identifies one top-level resolution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(u64);

impl PassId {
    /// Allocate a process-unique pass id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PassId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
enum Entry {
    InProgress(PassId),
    Resolved(Arc<Fragment>),
}

/// Outcome of [`ResolverCache::claim`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Already resolved; reuse it.
    Cached(Arc<Fragment>),
    /// The caller's pass now owns the in-progress marker.
    Owned,
    /// Another pass is resolving this locator right now.
    Busy,
}

/// Resolved fragments memoised per locator, with in-progress markers
#[derive(Debug, Clone, Default)]
pub struct ResolverCache {
    entries: Arc<Mutex<HashMap<SourceLocator, Entry>>>,
}

impl ResolverCache {
    /// Create a new empty resolver cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically look up `key` and, if absent, mark it in progress for `pass`.
    ///
    /// Finding a marker owned by `pass` itself means the locator is being
    /// resolved further up the same chain, which is a cycle.
    pub fn claim(&self, key: &SourceLocator, pass: PassId) -> Result<Claim> {
        let mut entries = lock(&self.entries, "resolver cache")?;
        match entries.get(key) {
            Some(Entry::Resolved(fragment)) => Ok(Claim::Cached(Arc::clone(fragment))),
            Some(Entry::InProgress(owner)) if *owner == pass => Err(Error::CycleDetected {
                cycle: format!("{} -> {}", key, key),
            }),
            Some(Entry::InProgress(_)) => Ok(Claim::Busy),
            None => {
                entries.insert(key.clone(), Entry::InProgress(pass));
                Ok(Claim::Owned)
            }
        }
    }

    /// Replace `pass`'s marker for `key` with the resolved fragment.
    pub fn complete(&self, key: &SourceLocator, pass: PassId, fragment: Fragment) -> Result<Arc<Fragment>> {
        let fragment = Arc::new(fragment);
        let mut entries = lock(&self.entries, "resolver cache")?;
        match entries.get(key) {
            Some(Entry::InProgress(owner)) if *owner == pass => {
                entries.insert(key.clone(), Entry::Resolved(Arc::clone(&fragment)));
            }
            Some(Entry::Resolved(existing)) => return Ok(Arc::clone(existing)),
            _ => {}
        }
        Ok(fragment)
    }

    /// Drop `pass`'s marker for `key` after a failed resolution.
    pub fn abandon(&self, key: &SourceLocator, pass: PassId) -> Result<()> {
        let mut entries = lock(&self.entries, "resolver cache")?;
        if matches!(entries.get(key), Some(Entry::InProgress(owner)) if *owner == pass) {
            entries.remove(key);
        }
        Ok(())
    }

    /// Get a resolved fragment without claiming
    pub fn get(&self, key: &SourceLocator) -> Result<Option<Arc<Fragment>>> {
        let entries = lock(&self.entries, "resolver cache")?;
        Ok(match entries.get(key) {
            Some(Entry::Resolved(fragment)) => Some(Arc::clone(fragment)),
            _ => None,
        })
    }

    /// Whether any pass currently holds a marker for `key`
    pub fn is_in_progress(&self, key: &SourceLocator) -> Result<bool> {
        let entries = lock(&self.entries, "resolver cache")?;
        Ok(matches!(entries.get(key), Some(Entry::InProgress(_))))
    }

    /// Number of resolved entries
    pub fn len(&self) -> Result<usize> {
        let entries = lock(&self.entries, "resolver cache")?;
        Ok(entries
            .values()
            .filter(|entry| matches!(entry, Entry::Resolved(_)))
            .count())
    }

    /// Check if no fragment has been resolved yet
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Clear all entries, including markers
    pub fn clear(&self) -> Result<()> {
        lock(&self.entries, "resolver cache")?.clear();
        Ok(())
    }
}
