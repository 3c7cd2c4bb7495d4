//! Keyed query cache with staleness, garbage collection, per-key request
//! de-duplication and optimistic updates.
//!
//! Entries hold JSON values. Typed callers go through [`QueryCache::fetch_as`]
//! and [`QueryCache::get_as`]. Keys are hierarchical ([`QueryKey`]), and every
//! bulk operation (`invalidate`, `remove`, optimistic cancellation) matches by
//! prefix.
//!
//! All state sits behind one `std::sync::Mutex`; no lock is held across an
//! `.await`. Time is read from [`tokio::time::Instant`] so tests can drive it
//! with a paused clock.

use std::{
  collections::HashMap,
  future::Future,
  sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
  time::Duration,
};

use futures::{
  FutureExt as _,
  future::{BoxFuture, Shared},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use svt_core::query_key::QueryKey;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ApiError;

type FetchResult = Result<Value, ApiError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type Updater = Box<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Bounded exponential backoff for failed fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt.
  pub max_retries: u32,
  pub base_delay:  Duration,
  pub max_delay:   Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay:  Duration::from_secs(1),
      max_delay:   Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  pub fn never() -> Self { Self { max_retries: 0, ..Self::default() } }

  /// Delay before retry number `retry` (zero-based).
  pub fn delay(&self, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
  /// Age after which an entry is refetched on the next `fetch`.
  pub stale_time: Duration,
  /// How long an unobserved entry is kept.
  pub gc_time:    Duration,
  pub retry:      RetryPolicy,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(5 * 60),
      gc_time:    Duration::from_secs(30 * 60),
      retry:      RetryPolicy::default(),
    }
  }
}

impl QueryOptions {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = gc_time;
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
  data:             Value,
  updated_at:       Instant,
  stale_time:       Duration,
  gc_time:          Duration,
  invalidated:      bool,
  /// Last write, or the moment the last observer went away.
  unobserved_since: Instant,
}

impl Entry {
  fn new(data: Value, options: QueryOptions, now: Instant) -> Self {
    Self {
      data,
      updated_at: now,
      stale_time: options.stale_time,
      gc_time: options.gc_time,
      invalidated: false,
      unobserved_since: now,
    }
  }

  fn is_stale(&self, now: Instant) -> bool {
    self.invalidated || now.duration_since(self.updated_at) >= self.stale_time
  }
}

struct InFlight {
  id:          u64,
  future:      SharedFetch,
  /// Set by `invalidate` while the fetch runs; its result is stored stale.
  invalidated: bool,
}

/// One optimistic write on a key.
struct Layer {
  id:        u64,
  updater:   Updater,
  committed: bool,
}

/// Optimistic writes on one key, stacked over the data they started from.
///
/// The entry always shows `base` with every live layer applied in order. A
/// rolled-back layer is dropped and the entry rebuilt from `base`; the stack
/// goes away once every remaining layer has committed.
struct Pending {
  base:   Option<Entry>,
  layers: Vec<Layer>,
}

#[derive(Default)]
struct CacheState {
  entries:        HashMap<QueryKey, Entry>,
  in_flight:      HashMap<QueryKey, InFlight>,
  observers:      HashMap<QueryKey, usize>,
  pending:        HashMap<QueryKey, Pending>,
  next_fetch_id:  u64,
  next_update_id: u64,
}

/// Run `updater` over `current`, keeping the entry's lifetimes.
fn apply_layer(
  current: Option<Entry>,
  updater: &Updater,
  defaults: QueryOptions,
  now: Instant,
) -> Option<Entry> {
  let Some(data) = updater(current.as_ref().map(|e| &e.data)) else {
    return current;
  };
  Some(match current {
    Some(previous) => Entry {
      data,
      updated_at: now,
      invalidated: false,
      unobserved_since: now,
      ..previous
    },
    None => Entry::new(data, defaults, now),
  })
}

impl CacheState {
  fn is_collectable(&self, key: &QueryKey, entry: &Entry, now: Instant) -> bool {
    !self.observers.contains_key(key)
      && now.duration_since(entry.unobserved_since) >= entry.gc_time
  }

  /// Drop `key` if it has outlived its gc time unobserved.
  fn evict_expired(&mut self, key: &QueryKey, now: Instant) {
    let expired = self
      .entries
      .get(key)
      .is_some_and(|entry| self.is_collectable(key, entry, now));
    if expired {
      debug!(%key, "evicting expired entry");
      self.entries.remove(key);
    }
  }

  /// Detach in-flight fetches under `prefix` so their results are not
  /// written. Callers already awaiting them still receive the outcome.
  fn cancel_in_flight(&mut self, prefix: &QueryKey) -> usize {
    let before = self.in_flight.len();
    self.in_flight.retain(|key, _| !key.starts_with(prefix));
    before - self.in_flight.len()
  }

  fn put(&mut self, key: &QueryKey, entry: Option<Entry>) {
    match entry {
      Some(entry) => {
        self.entries.insert(key.clone(), entry);
      }
      None => {
        self.entries.remove(key);
      }
    }
  }

  /// Store data that came from the server.
  ///
  /// With optimistic writes pending on `key`, the server data becomes their
  /// new base. Committed layers are dropped since the server already has
  /// them; the others are applied on top again.
  fn write(&mut self, key: &QueryKey, entry: Entry, defaults: QueryOptions) {
    let Some(pending) = self.pending.get_mut(key) else {
      self.entries.insert(key.clone(), entry);
      return;
    };
    pending.layers.retain(|layer| !layer.committed);
    pending.base = Some(entry);
    let now = Instant::now();
    let rebuilt = pending
      .layers
      .iter()
      .fold(pending.base.clone(), |current, layer| {
        apply_layer(current, &layer.updater, defaults, now)
      });
    if pending.layers.is_empty() {
      self.pending.remove(key);
    }
    self.put(key, rebuilt);
  }

  /// Commit (`keep`) or roll back one optimistic layer.
  fn settle_layer(&mut self, key: &QueryKey, id: u64, keep: bool, defaults: QueryOptions) {
    let Some(pending) = self.pending.get_mut(key) else {
      debug!(%key, "entry removed since optimistic update, nothing to settle");
      return;
    };
    let Some(index) = pending.layers.iter().position(|layer| layer.id == id) else {
      return;
    };

    let rebuilt = if keep {
      pending.layers[index].committed = true;
      None
    } else {
      pending.layers.remove(index);
      let now = Instant::now();
      Some(
        pending
          .layers
          .iter()
          .fold(pending.base.clone(), |current, layer| {
            apply_layer(current, &layer.updater, defaults, now)
          }),
      )
    };
    if pending.layers.iter().all(|layer| layer.committed) {
      self.pending.remove(key);
    }
    if let Some(entry) = rebuilt {
      self.cancel_in_flight(key);
      self.put(key, entry);
    }
  }
}

struct Inner {
  state:    Mutex<CacheState>,
  defaults: QueryOptions,
}

impl Inner {
  fn state(&self) -> MutexGuard<'_, CacheState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store a finished fetch, unless it was cancelled or superseded.
  fn settle(&self, key: &QueryKey, id: u64, result: &FetchResult, options: QueryOptions) {
    let mut state = self.state();
    if state.in_flight.get(key).map(|f| f.id) != Some(id) {
      debug!(%key, "discarding result of cancelled fetch");
      return;
    }
    let Some(flight) = state.in_flight.remove(key) else {
      return;
    };
    if let Ok(data) = result {
      let mut entry = Entry::new(data.clone(), options, Instant::now());
      if flight.invalidated {
        debug!(%key, "fetch was invalidated in flight, storing as stale");
        entry.invalidated = true;
      }
      state.write(key, entry, self.defaults);
    }
  }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Counts reported by [`QueryCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub total:    usize,
  pub fetching: usize,
  pub stale:    usize,
}

/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Inner>,
}

impl Default for QueryCache {
  fn default() -> Self { Self::new(QueryOptions::default()) }
}

impl QueryCache {
  pub fn new(defaults: QueryOptions) -> Self {
    Self {
      inner: Arc::new(Inner { state: Mutex::new(CacheState::default()), defaults }),
    }
  }

  /// Options used when a caller does not supply its own.
  pub fn defaults(&self) -> QueryOptions { self.inner.defaults }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Cached data for `key`, stale or not. `None` if absent or collected.
  pub fn get(&self, key: &QueryKey) -> Option<Value> {
    let mut state = self.inner.state();
    state.evict_expired(key, Instant::now());
    state.entries.get(key).map(|entry| entry.data.clone())
  }

  pub fn get_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
    self.get(key).and_then(|v| serde_json::from_value(v).ok())
  }

  /// `Some(true)` if `key` is cached but stale, `None` if not cached.
  pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
    let state = self.inner.state();
    state.entries.get(key).map(|entry| entry.is_stale(Instant::now()))
  }

  /// Return fresh cached data, or run `fetcher` and cache its result.
  ///
  /// Concurrent calls for the same key share one in-flight fetch, so
  /// `fetcher` runs once no matter how many callers are waiting. Retryable
  /// failures are retried per `options.retry`.
  pub async fn fetch<F, Fut>(
    &self,
    key: QueryKey,
    options: QueryOptions,
    fetcher: F,
  ) -> Result<Value, ApiError>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    let shared = {
      let mut state = self.inner.state();
      let now = Instant::now();
      state.evict_expired(&key, now);

      if let Some(entry) = state.entries.get(&key)
        && !entry.is_stale(now)
      {
        debug!(%key, "cache hit");
        return Ok(entry.data.clone());
      }

      let joined = state.in_flight.get(&key).map(|f| f.future.clone());
      match joined {
        Some(future) => {
          debug!(%key, "joining in-flight fetch");
          future
        }
        None => {
          debug!(%key, "cache miss");
          let id = state.next_fetch_id;
          state.next_fetch_id += 1;
          let future = self.shared_fetch(key.clone(), id, options, fetcher);
          state
            .in_flight
            .insert(key, InFlight { id, future: future.clone(), invalidated: false });
          future
        }
      }
    };

    shared.await
  }

  /// [`fetch`](Self::fetch) for a typed result.
  pub async fn fetch_as<T, F, Fut>(
    &self,
    key: QueryKey,
    options: QueryOptions,
    fetcher: F,
  ) -> Result<T, ApiError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let value = self
      .fetch(key, options, move || {
        let pending = fetcher();
        async move {
          let data = pending.await?;
          serde_json::to_value(data).map_err(ApiError::from)
        }
      })
      .await?;
    Ok(serde_json::from_value(value)?)
  }

  /// Warm `key` without observing it. A fresh entry makes this a no-op;
  /// failures are logged and dropped.
  pub async fn prefetch<F, Fut>(&self, key: QueryKey, options: QueryOptions, fetcher: F)
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    if let Err(e) = self.fetch(key.clone(), options, fetcher).await {
      warn!(%key, error = %e, "prefetch failed");
    }
  }

  fn shared_fetch<F, Fut>(
    &self,
    key: QueryKey,
    id: u64,
    options: QueryOptions,
    fetcher: F,
  ) -> SharedFetch
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    let cache: Weak<Inner> = Arc::downgrade(&self.inner);
    async move {
      let result = run_with_retry(&key, options.retry, &fetcher).await;
      if let Some(inner) = cache.upgrade() {
        inner.settle(&key, id, &result, options);
      }
      result
    }
    .boxed()
    .shared()
  }

  // ── Writes ────────────────────────────────────────────────────────────

  /// Mark every entry under `prefix` stale. Returns how many were marked.
  ///
  /// Fetches already running under `prefix` keep running and later callers
  /// still join them, but their results are stored stale so the next
  /// `fetch` after they land goes back to the server.
  pub fn invalidate(&self, prefix: &QueryKey) -> usize {
    let mut state = self.inner.state();
    for (key, flight) in state.in_flight.iter_mut() {
      if key.starts_with(prefix) {
        flight.invalidated = true;
      }
    }
    let mut count = 0;
    for (key, entry) in state.entries.iter_mut() {
      if key.starts_with(prefix) {
        entry.invalidated = true;
        count += 1;
      }
    }
    debug!(%prefix, count, "invalidated");
    count
  }

  pub fn invalidate_many<'a>(&self, prefixes: impl IntoIterator<Item = &'a QueryKey>) -> usize {
    prefixes.into_iter().map(|prefix| self.invalidate(prefix)).sum()
  }

  /// Replace the data for `key` as if it had just been fetched.
  pub fn set_data(&self, key: QueryKey, data: Value) {
    let mut state = self.inner.state();
    let now = Instant::now();
    let options = state
      .entries
      .get(&key)
      .map(|e| QueryOptions { stale_time: e.stale_time, gc_time: e.gc_time, ..self.inner.defaults })
      .unwrap_or(self.inner.defaults);
    state.write(&key, Entry::new(data, options, now), self.inner.defaults);
  }

  /// Remove every entry under `prefix`, cancelling their fetches and any
  /// pending optimistic writes.
  pub fn remove(&self, prefix: &QueryKey) -> usize {
    let mut state = self.inner.state();
    state.cancel_in_flight(prefix);
    state.pending.retain(|key, _| !key.starts_with(prefix));
    let before = state.entries.len();
    state.entries.retain(|key, _| !key.starts_with(prefix));
    before - state.entries.len()
  }

  /// Drop every entry and detach every in-flight fetch.
  pub fn clear(&self) {
    let mut state = self.inner.state();
    let count = state.entries.len();
    state.entries.clear();
    state.in_flight.clear();
    state.pending.clear();
    debug!(count, "cache cleared");
  }

  // ── Lifetime ──────────────────────────────────────────────────────────

  /// Register interest in `key`. Observed entries are never collected;
  /// the gc clock starts when the last observer is dropped.
  pub fn observe(&self, key: QueryKey) -> QueryObserver {
    *self.inner.state().observers.entry(key.clone()).or_insert(0) += 1;
    QueryObserver { cache: self.clone(), key }
  }

  /// Remove every unobserved entry older than its gc time.
  pub fn collect_garbage(&self) -> usize {
    let mut state = self.inner.state();
    let now = Instant::now();
    let expired: Vec<QueryKey> = state
      .entries
      .iter()
      .filter(|(key, entry)| state.is_collectable(key, entry, now))
      .map(|(key, _)| key.clone())
      .collect();
    for key in &expired {
      state.entries.remove(key);
    }
    if !expired.is_empty() {
      debug!(count = expired.len(), "collected expired entries");
    }
    expired.len()
  }

  /// Remove entries whose data is older than `age`, observed or not.
  pub fn remove_older_than(&self, age: Duration) -> usize {
    let mut state = self.inner.state();
    let now = Instant::now();
    let before = state.entries.len();
    state
      .entries
      .retain(|_, entry| now.duration_since(entry.updated_at) <= age);
    before - state.entries.len()
  }

  pub fn stats(&self) -> CacheStats {
    let state = self.inner.state();
    let now = Instant::now();
    CacheStats {
      total:    state.entries.len(),
      fetching: state.in_flight.len(),
      stale:    state.entries.values().filter(|e| e.is_stale(now)).count(),
    }
  }

  pub fn len(&self) -> usize { self.inner.state().entries.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  // ── Optimistic updates ────────────────────────────────────────────────

  /// Cancel fetches under `key` and apply `updater` synchronously.
  /// `updater` returning `None` leaves the entry alone.
  ///
  /// Updates on the same key stack: the first one snapshots the entry, and
  /// rolling one back rebuilds the entry from that snapshot with the others
  /// applied again, so `updater` may run more than once. When every update
  /// on the key has rolled back the snapshot is restored exactly (or the
  /// entry removed if there was none).
  ///
  /// The returned guard must be committed or rolled back; dropping it
  /// unsettled rolls back.
  pub fn optimistic<U>(&self, key: QueryKey, updater: U) -> OptimisticUpdate
  where
    U: Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'static,
  {
    let mut state = self.inner.state();
    let cancelled = state.cancel_in_flight(&key);
    if cancelled > 0 {
      debug!(%key, cancelled, "cancelled fetches for optimistic update");
    }

    let id = state.next_update_id;
    state.next_update_id += 1;
    let updater: Updater = Box::new(updater);
    let current = state.entries.get(&key).cloned();
    let applied = apply_layer(current.clone(), &updater, self.inner.defaults, Instant::now());
    let pending = state
      .pending
      .entry(key.clone())
      .or_insert_with(|| Pending { base: current, layers: Vec::new() });
    pending.layers.push(Layer { id, updater, committed: false });
    debug!(%key, depth = pending.layers.len(), "optimistic update applied");
    state.put(&key, applied);

    OptimisticUpdate { cache: self.clone(), key, id, settled: false }
  }

  /// Apply `updater`, run `mutation`, and roll back if it fails.
  pub async fn mutate_optimistic<T, U, Fut>(
    &self,
    key: QueryKey,
    updater: U,
    mutation: Fut,
  ) -> Result<T, ApiError>
  where
    U: Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let update = self.optimistic(key, updater);
    match mutation.await {
      Ok(value) => {
        update.commit();
        Ok(value)
      }
      Err(e) => {
        debug!(key = %update.key(), error = %e, "mutation failed, rolling back");
        update.rollback();
        Err(e)
      }
    }
  }
}

async fn run_with_retry<F, Fut>(key: &QueryKey, policy: RetryPolicy, fetcher: &F) -> FetchResult
where
  F: Fn() -> Fut,
  Fut: Future<Output = FetchResult>,
{
  let mut retries = 0;
  loop {
    match fetcher().await {
      Err(e) if e.is_retryable() && retries < policy.max_retries => {
        let delay = policy.delay(retries);
        retries += 1;
        debug!(%key, error = %e, retry = retries, ?delay, "retrying fetch");
        tokio::time::sleep(delay).await;
      }
      result => return result,
    }
  }
}

// ─── Guards ──────────────────────────────────────────────────────────────────

/// Keeps a key observed while alive.
pub struct QueryObserver {
  cache: QueryCache,
  key:   QueryKey,
}

impl QueryObserver {
  pub fn key(&self) -> &QueryKey { &self.key }
}

impl Drop for QueryObserver {
  fn drop(&mut self) {
    let mut state = self.cache.inner.state();
    let remaining = match state.observers.get_mut(&self.key) {
      Some(count) => {
        *count = count.saturating_sub(1);
        *count
      }
      None => return,
    };
    if remaining == 0 {
      state.observers.remove(&self.key);
      if let Some(entry) = state.entries.get_mut(&self.key) {
        entry.unobserved_since = Instant::now();
      }
    }
  }
}

/// A pending optimistic change. See [`QueryCache::optimistic`].
#[must_use = "an optimistic update rolls back when dropped"]
pub struct OptimisticUpdate {
  cache:   QueryCache,
  key:     QueryKey,
  id:      u64,
  settled: bool,
}

impl OptimisticUpdate {
  pub fn key(&self) -> &QueryKey { &self.key }

  /// Keep the optimistic data.
  pub fn commit(mut self) { self.settle(true); }

  /// Undo this update, keeping any other pending update on the key.
  pub fn rollback(mut self) { self.settle(false); }

  fn settle(&mut self, keep: bool) {
    if self.settled {
      return;
    }
    self.settled = true;
    let defaults = self.cache.inner.defaults;
    self
      .cache
      .inner
      .state()
      .settle_layer(&self.key, self.id, keep, defaults);
  }
}

impl Drop for OptimisticUpdate {
  fn drop(&mut self) {
    if !self.settled {
      debug!(key = %self.key, "unsettled optimistic update dropped, rolling back");
      self.settle(false);
    }
  }
}
