//! Single-flight memoizing cache
//!
//! A [`SingleFlightCache`] maps keys to lazily produced values. The first
//! lookup of a key installs a pending entry and launches the producer as an
//! independent tokio task; every lookup that arrives while the producer runs
//! awaits the same shared outcome instead of starting another run.
//!
//! ```text
//! get(key) ──► entry?
//!               ├─ Ready(value) ─────────────► value
//!               ├─ Pending(outcome) ─────────► await outcome
//!               └─ none ─► install Pending ──► spawn producer ─► await outcome
//!                                                  │
//!                               Ok  ─► entry becomes Ready
//!                               Err ─► entry evicted (next get retries)
//! ```
//!
//! Because the producer runs on its own task, a waiter that is dropped or
//! times out never cancels the production other waiters depend on.

use std::{
    fmt,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, trace, warn};

use crate::error::CacheError;
use crate::metrics::{CacheMetrics, CacheStats, OperationTimer};

/// Future returned by a [`Producer`] for one key
pub type Production<V, E> = BoxFuture<'static, Result<V, E>>;

/// Computes the value for a key on a cache miss
///
/// `produce` is called while the cache holds the key's shard lock, so it must
/// only build the future; all real work belongs inside the returned future.
pub trait Producer<K, V, E>: Send + Sync {
    fn produce(&self, key: K) -> Production<V, E>;
}

/// Adapts a closure into a [`Producer`]
pub struct FnProducer<F>(F);

impl<F> FnProducer<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<K, V, E, F> Producer<K, V, E> for FnProducer<F>
where
    F: Fn(K) -> Production<V, E> + Send + Sync,
{
    fn produce(&self, key: K) -> Production<V, E> {
        (self.0)(key)
    }
}

enum Slot<V, E> {
    Pending {
        flight: u64,
        outcome: Shared<Production<V, E>>,
    },
    Ready {
        flight: u64,
        value: V,
    },
}

impl<V, E> Slot<V, E> {
    fn flight(&self) -> u64 {
        match self {
            Slot::Pending { flight, .. } | Slot::Ready { flight, .. } => *flight,
        }
    }
}

enum Lookup<V, E> {
    Ready(V),
    Waiting(Shared<Production<V, E>>),
}

/// Concurrent memoizing cache with at most one producer run per key
///
/// Values are handed out by clone; store `Arc`s to share one instance among
/// all callers. Failed productions are never cached.
pub struct SingleFlightCache<K, V, E> {
    name: &'static str,
    entries: Arc<DashMap<K, Slot<V, E>>>,
    producer: Arc<dyn Producer<K, V, E>>,
    next_flight: AtomicU64,
    metrics: CacheMetrics,
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + From<CacheError> + Send + Sync + 'static,
{
    /// Create an empty cache backed by `producer`
    pub fn new(name: &'static str, producer: impl Producer<K, V, E> + 'static) -> Self {
        Self::with_producer(name, Arc::new(producer))
    }

    /// Create an empty cache backed by a shared producer
    pub fn with_producer(name: &'static str, producer: Arc<dyn Producer<K, V, E>>) -> Self {
        Self {
            name,
            entries: Arc::new(DashMap::new()),
            producer,
            next_flight: AtomicU64::new(0),
            metrics: CacheMetrics::new(),
        }
    }

    /// Name used in log events and diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the value for `key`, producing it if necessary
    ///
    /// Must be awaited inside a tokio runtime: a miss spawns the producer.
    pub async fn get(&self, key: &K) -> Result<V, E> {
        match self.lookup_or_launch(key) {
            Lookup::Ready(value) => Ok(value),
            Lookup::Waiting(outcome) => outcome.await,
        }
    }

    /// Like [`get`](Self::get), but give up waiting after `timeout`
    ///
    /// Only this caller gives up; the producer keeps running and its result
    /// still lands in the cache for everyone else.
    pub async fn get_with_timeout(&self, key: &K, timeout: Duration) -> Result<V, E> {
        match self.lookup_or_launch(key) {
            Lookup::Ready(value) => Ok(value),
            Lookup::Waiting(outcome) => match tokio::time::timeout(timeout, outcome).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(cache = self.name, key = ?key, "waiter timed out");
                    Err(E::from(CacheError::TimedOut {
                        key: format!("{key:?}"),
                        waited_ms: timeout.as_millis() as u64,
                    }))
                }
            },
        }
    }

    /// Ready value for `key`, without producing
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|slot| match slot.value() {
            Slot::Ready { value, .. } => Some(value.clone()),
            Slot::Pending { .. } => None,
        })
    }

    /// Whether a producer for `key` is currently in flight
    pub fn is_pending(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|slot| matches!(slot.value(), Slot::Pending { .. }))
            .unwrap_or(false)
    }

    /// Whether `key` has an entry, ready or pending
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove the entry for `key`, whatever its state
    ///
    /// Removing a pending entry does not stop its producer: current waiters
    /// still receive the outcome, but it is not stored.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.metrics.record_invalidation();
            debug!(cache = self.name, key = ?key, "entry invalidated");
        }
        removed
    }

    /// Remove the entry for `key` only if it is ready and `predicate` holds
    ///
    /// Lets several callers that observed the same stale value race to
    /// replace it without evicting a fresher entry installed in between.
    pub fn invalidate_if<P>(&self, key: &K, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let removed = self
            .entries
            .remove_if(key, |_, slot| match slot {
                Slot::Ready { value, .. } => predicate(value),
                Slot::Pending { .. } => false,
            })
            .is_some();
        if removed {
            self.metrics.record_invalidation();
            debug!(cache = self.name, key = ?key, "stale entry invalidated");
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries, ready or pending
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.entries.len())
    }

    fn lookup_or_launch(&self, key: &K) -> Lookup<V, E> {
        if let Some(slot) = self.entries.get(key) {
            return self.attach(slot.value());
        }

        match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => self.attach(occupied.get()),
            Entry::Vacant(vacant) => {
                self.metrics.record_miss();
                let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let outcome = self.launch(key.clone(), flight);
                vacant.insert(Slot::Pending {
                    flight,
                    outcome: outcome.clone(),
                });
                Lookup::Waiting(outcome)
            }
        }
    }

    fn attach(&self, slot: &Slot<V, E>) -> Lookup<V, E> {
        match slot {
            Slot::Ready { value, .. } => {
                self.metrics.record_hit();
                Lookup::Ready(value.clone())
            }
            Slot::Pending { outcome, .. } => {
                self.metrics.record_join();
                Lookup::Waiting(outcome.clone())
            }
        }
    }

    fn launch(&self, key: K, flight: u64) -> Shared<Production<V, E>> {
        let production = self.producer.produce(key.clone());
        let entries = Arc::clone(&self.entries);
        let metrics = self.metrics.clone();
        let cache_name = self.name;
        let task_key = key.clone();

        trace!(cache = cache_name, key = ?key, flight, "launching producer");

        // The entry transition happens inside the task, before its output
        // resolves: no waiter can observe the outcome while the slot is stale.
        let handle = tokio::spawn(async move {
            let timer = OperationTimer::start();
            let result = production.await;
            match &result {
                Ok(value) => {
                    metrics.record_load(timer.elapsed());
                    if let Some(mut slot) = entries.get_mut(&task_key) {
                        if slot.flight() == flight {
                            *slot = Slot::Ready {
                                flight,
                                value: value.clone(),
                            };
                        }
                    }
                }
                Err(_) => {
                    metrics.record_failure(timer.elapsed());
                    entries.remove_if(&task_key, |_, slot| slot.flight() == flight);
                    debug!(cache = cache_name, key = ?task_key, "producer failed, entry evicted");
                }
            }
            result
        });

        let entries = Arc::clone(&self.entries);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    entries.remove_if(&key, |_, slot| slot.flight() == flight);
                    warn!(cache = cache_name, key = ?key, error = %join_error, "producer aborted");
                    Err(E::from(CacheError::ProducerAborted {
                        key: format!("{key:?}"),
                        reason: join_error.to_string(),
                    }))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<K: Eq + Hash, V, E> fmt::Debug for SingleFlightCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlightCache")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}
