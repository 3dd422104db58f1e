//! Bounded TTL cache for categorized values.
//!
//! Expiry is strict: reads never refresh an entry's timestamp. Stale
//! entries are evicted lazily on `get`; size is enforced eagerly on `set`.
//! The cache never fails, every problem degrades to a miss.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        crate::util::unix_timestamp_millis_now()
    }
}

/// Clock moved by hand, for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    Notes,
    Archive,
    Search,
}

impl CacheCategory {
    pub const ALL: [Self; 3] = [Self::Notes, Self::Archive, Self::Search];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Archive => "archive",
            Self::Search => "search",
        }
    }

    /// Built-in TTL and size limit for the category.
    pub const fn default_policy(self) -> CachePolicy {
        match self {
            Self::Notes => CachePolicy::new(Duration::from_secs(5 * 60), 100),
            Self::Archive => CachePolicy::new(Duration::from_secs(10 * 60), 50),
            Self::Search => CachePolicy::new(Duration::from_secs(2 * 60), 30),
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_size: usize,
}

impl CachePolicy {
    pub const fn new(ttl: Duration, max_size: usize) -> Self {
        Self { ttl, max_size }
    }

    fn ttl_millis(self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    timestamp: i64,
    category: CacheCategory,
    /// Tie-breaker for entries written within the same millisecond.
    sequence: u64,
}

#[derive(Debug)]
struct CacheState<V> {
    /// One key space; each entry remembers the category it was written under.
    entries: HashMap<String, CacheEntry<V>>,
    next_sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub by_category: BTreeMap<CacheCategory, usize>,
}

/// Categorized TTL cache with per-category size limits.
pub struct CacheManager<V> {
    policies: HashMap<CacheCategory, CachePolicy>,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> CacheManager<V> {
    /// Cache with the built-in policies and the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let policies = CacheCategory::ALL
            .into_iter()
            .map(|category| (category, category.default_policy()))
            .collect();
        Self::with_policies(policies, clock)
    }

    /// Cache with explicit policies; categories without one fall back to
    /// their built-in policy.
    pub fn with_policies(
        mut policies: HashMap<CacheCategory, CachePolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        for category in CacheCategory::ALL {
            policies
                .entry(category)
                .or_insert_with(|| category.default_policy());
        }
        Self {
            policies,
            clock,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_sequence: 0,
            }),
        }
    }

    fn policy(&self, category: CacheCategory) -> CachePolicy {
        self.policies
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_policy())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, replacing any entry under `key`, then prune the
    /// category down to its size limit, oldest entries first.
    pub fn set(&self, key: impl Into<String>, value: V, category: CacheCategory) {
        let key = key.into();
        let now = self.clock.now_millis();
        let max_size = self.policy(category).max_size;

        let mut state = self.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        state.entries.insert(
            key,
            CacheEntry {
                value,
                timestamp: now,
                category,
                sequence,
            },
        );

        let mut by_age = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.category == category)
            .map(|(key, entry)| (entry.timestamp, entry.sequence, key.clone()))
            .collect::<Vec<_>>();
        if by_age.len() > max_size {
            by_age.sort();
            let excess = by_age.len() - max_size;
            for (_, _, key) in by_age.into_iter().take(excess) {
                state.entries.remove(&key);
            }
            tracing::debug!(category = %category, evicted = excess, "Pruned cache category");
        }
    }

    /// Fetch a live entry, judging its age by `category`'s TTL. Expired
    /// entries are evicted and reported as a miss.
    pub fn get(&self, key: &str, category: CacheCategory) -> Option<V> {
        let now = self.clock.now_millis();
        let ttl = self.policy(category).ttl_millis();

        let mut state = self.lock();
        let entry = state.entries.get(key)?;
        if now.saturating_sub(entry.timestamp) > ttl {
            state.entries.remove(key);
            tracing::debug!(category = %category, key, "Evicted expired cache entry");
            return None;
        }
        Some(entry.value.clone())
    }

    /// Clear one category, or everything when `category` is `None`.
    pub fn clear(&self, category: Option<CacheCategory>) {
        let mut state = self.lock();
        match category {
            Some(category) => state.entries.retain(|_, entry| entry.category != category),
            None => state.entries.clear(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut by_category = CacheCategory::ALL
            .into_iter()
            .map(|category| (category, 0))
            .collect::<BTreeMap<_, _>>();
        for entry in state.entries.values() {
            *by_category.entry(entry.category).or_default() += 1;
        }
        CacheStats {
            total_entries: state.entries.len(),
            by_category,
        }
    }
}

impl<V: Clone> Default for CacheManager<V> {
    fn default() -> Self {
        Self::new()
    }
}
