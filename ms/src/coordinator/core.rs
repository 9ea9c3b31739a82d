//! UpdateCoordinator implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use eyre::{Result, WrapErr};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::listener::{UpdateListener, deliver_detached, deliver_in_order};
use super::messages::{CoordinatorMetrics, Notice};
use crate::domain::DomainId;
use crate::store::CounterStore;

/// Counters behind [`CoordinatorMetrics`]
#[derive(Default)]
struct Stats {
    poll_timers_started: AtomicU64,
    polls: AtomicU64,
    polls_with_changes: AtomicU64,
    full_notifications: AtomicU64,
    partial_notifications: AtomicU64,
    detached_failures: Arc<AtomicU64>,
}

struct Inner {
    config: CoordinatorConfig,
    store: Arc<dyn CounterStore>,
    /// Last counter value this process observed
    cached_counter: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn UpdateListener>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    stats: Stats,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.poll_task.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}

/// Detects dataset changes made by this or any other process
///
/// Writers call [`update_happened`](Self::update_happened) or
/// [`partial_update_happened`](Self::partial_update_happened) after committing.
/// Each call bumps the shared counter and notifies local listeners. A
/// background poll compares the shared counter with the last value seen here
/// and sends a full update when another process has bumped it.
///
/// The handle is cheap to clone; clones share listeners, cache and poll task.
#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("config", &self.inner.config)
            .field("cached_counter", &self.cached_counter())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl UpdateCoordinator {
    /// Create a coordinator over the given counter store
    ///
    /// No poll task runs until the first non-testing
    /// [`register_interest`](Self::register_interest).
    pub fn new(store: Arc<dyn CounterStore>, config: CoordinatorConfig) -> Self {
        debug!(?config, "UpdateCoordinator::new: called");
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                cached_counter: AtomicU64::new(0),
                listeners: RwLock::new(Vec::new()),
                poll_task: Mutex::new(None),
                stats: Stats::default(),
            }),
        }
    }

    /// Record that something changed
    ///
    /// Bumps the shared counter, then awaits every listener's full-update
    /// callback in registration order. A listener error aborts delivery to
    /// the remaining listeners and is returned.
    pub async fn update_happened(&self) -> Result<()> {
        debug!("UpdateCoordinator::update_happened: called");
        self.bump().await?;
        let listeners = self.snapshot();
        self.inner
            .stats
            .full_notifications
            .fetch_add(listeners.len() as u64, Ordering::Relaxed);
        deliver_in_order(&listeners, Notice::Full).await
    }

    /// Record that `item_id` changed
    ///
    /// Same counter bump as [`update_happened`](Self::update_happened); listeners
    /// get the item id. Other processes only ever see a full update for this
    /// write.
    pub async fn partial_update_happened(&self, item_id: DomainId) -> Result<()> {
        debug!(%item_id, "UpdateCoordinator::partial_update_happened: called");
        self.bump().await?;
        let listeners = self.snapshot();
        self.inner
            .stats
            .partial_notifications
            .fetch_add(listeners.len() as u64, Ordering::Relaxed);
        deliver_in_order(&listeners, Notice::Partial(item_id)).await
    }

    /// Add a listener
    ///
    /// Unless `testing` is set, the first registration starts the poll task.
    /// Later registrations never start a second one. Must be called from
    /// within a tokio runtime when `testing` is false.
    pub fn register_interest(&self, listener: Arc<dyn UpdateListener>, testing: bool) -> Result<()> {
        debug!(listener = %listener.name(), %testing, "UpdateCoordinator::register_interest: called");
        if !testing {
            self.start_polling()?;
        }
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
        Ok(())
    }

    /// Drop all listeners and stop the poll task
    pub fn clear_interested(&self) {
        debug!("UpdateCoordinator::clear_interested: called");
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let task = self
            .inner
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            info!("Update polling stopped");
        }
    }

    /// One poll of the shared counter
    ///
    /// Invoked by the poll task each period; public so tests can drive it.
    /// When the stored value differs from the cached one, the cache is updated
    /// and every listener gets a detached full update. Returns whether a
    /// change was detected.
    pub async fn poll_step(&self) -> Result<bool> {
        debug!("UpdateCoordinator::poll_step: called");
        self.inner.stats.polls.fetch_add(1, Ordering::Relaxed);

        // Loaded before the read so a local write landing during it is seen below
        let mut cached = self.inner.cached_counter.load(Ordering::SeqCst);
        let current = self
            .inner
            .store
            .current()
            .await
            .wrap_err("Failed to read update counter")?;
        loop {
            if current == cached {
                debug!(%current, "poll_step: no change");
                return Ok(false);
            }
            match self
                .inner
                .cached_counter
                .compare_exchange(cached, current, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                // A local write moved the cache during the read and already
                // holds this value or a newer one
                Err(actual) if actual >= current => {
                    debug!(%current, %actual, "poll_step: local write is newer");
                    return Ok(false);
                }
                Err(actual) => cached = actual,
            }
        }
        self.inner.stats.polls_with_changes.fetch_add(1, Ordering::Relaxed);

        let listeners = self.snapshot();
        info!(
            previous = %cached,
            %current,
            listener_count = listeners.len(),
            "Shared counter changed, notifying listeners"
        );
        self.inner
            .stats
            .full_notifications
            .fetch_add(listeners.len() as u64, Ordering::Relaxed);
        deliver_detached(listeners, Notice::Full, Arc::clone(&self.inner.stats.detached_failures));
        Ok(true)
    }

    /// Last counter value this process observed
    pub fn cached_counter(&self) -> u64 {
        self.inner.cached_counter.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the poll task is currently running
    pub fn is_polling(&self) -> bool {
        self.inner
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Get current coordinator metrics
    pub fn metrics(&self) -> CoordinatorMetrics {
        let stats = &self.inner.stats;
        CoordinatorMetrics {
            registered_listeners: self.listener_count(),
            cached_counter: self.cached_counter(),
            polling: self.is_polling(),
            poll_timers_started: stats.poll_timers_started.load(Ordering::Relaxed),
            polls: stats.polls.load(Ordering::Relaxed),
            polls_with_changes: stats.polls_with_changes.load(Ordering::Relaxed),
            full_notifications: stats.full_notifications.load(Ordering::Relaxed),
            partial_notifications: stats.partial_notifications.load(Ordering::Relaxed),
            detached_failures: stats.detached_failures.load(Ordering::Relaxed),
        }
    }

    async fn bump(&self) -> Result<u64> {
        let value = self
            .inner
            .store
            .increment()
            .await
            .wrap_err("Failed to bump update counter")?;
        // Never move the cache backwards if a poll raced ahead of us
        self.inner.cached_counter.fetch_max(value, Ordering::SeqCst);
        debug!(%value, "bump: counter persisted");
        Ok(value)
    }

    fn snapshot(&self) -> Vec<Arc<dyn UpdateListener>> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn start_polling(&self) -> Result<()> {
        let mut slot = self.inner.poll_task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("start_polling: already running");
            return Ok(());
        }

        let runtime = Handle::try_current().wrap_err("Update polling requires a tokio runtime")?;
        let period = self.inner.config.poll_interval();
        *slot = Some(runtime.spawn(poll_loop(Arc::downgrade(&self.inner), period)));
        self.inner.stats.poll_timers_started.fetch_add(1, Ordering::Relaxed);

        info!(period_secs = period.as_secs(), "Update polling started");
        Ok(())
    }
}

/// Body of the poll task
///
/// Holds only a weak reference so dropping every coordinator handle ends the
/// loop. Poll errors are logged and the next tick still runs.
async fn poll_loop(inner: Weak<Inner>, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            debug!("poll_loop: coordinator dropped, exiting");
            break;
        };
        let coordinator = UpdateCoordinator { inner };
        if let Err(e) = coordinator.poll_step().await {
            warn!(error = %e, "Update poll failed, will retry next interval");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::listener::mock::RecordingListener;
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    fn coordinator_with(store: &MemoryStore) -> UpdateCoordinator {
        UpdateCoordinator::new(Arc::new(store.clone()), CoordinatorConfig::default())
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<(String, Notice)>) -> (String, Notice) {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for notice")
            .expect("channel closed")
    }

    /// Counter store whose reads always fail
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn current(&self) -> Result<u64, StoreError> {
            Err(StoreError::LockPoisoned)
        }

        async fn increment(&self) -> Result<u64, StoreError> {
            Err(StoreError::LockPoisoned)
        }
    }

    #[tokio::test]
    async fn test_update_bumps_counter_by_one() {
        let store = MemoryStore::new();
        let coord = coordinator_with(&store);

        coord.update_happened().await.unwrap();
        assert_eq!(store.current().await.unwrap(), 2);
        assert_eq!(coord.cached_counter(), 2);

        coord.partial_update_happened(3).await.unwrap();
        assert_eq!(store.current().await.unwrap(), 3);
        assert_eq!(coord.cached_counter(), 3);
    }

    /// Listener that reads the counter from inside its callback
    struct CounterReadingListener {
        store: MemoryStore,
        seen: std::sync::Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl UpdateListener for CounterReadingListener {
        async fn update_happened(&self) -> Result<()> {
            let value = self.store.current().await?;
            self.seen.lock().unwrap().push(value);
            Ok(())
        }

        async fn partial_update_happened(&self, _item_id: DomainId) -> Result<()> {
            self.update_happened().await
        }
    }

    #[tokio::test]
    async fn test_update_notifies_listener_once_after_persisting() {
        let store = MemoryStore::new();
        let coord = coordinator_with(&store);
        let listener = Arc::new(CounterReadingListener {
            store: store.clone(),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        coord.register_interest(listener.clone(), true).unwrap();

        coord.update_happened().await.unwrap();
        assert_eq!(*listener.seen.lock().unwrap(), vec![2]);

        coord.partial_update_happened(8).await.unwrap();
        assert_eq!(*listener.seen.lock().unwrap(), vec![2, 3]);
    }

    /// Counter store whose reads pause until released
    struct StallingStore {
        inner: MemoryStore,
        reading: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl CounterStore for StallingStore {
        async fn current(&self) -> Result<u64, StoreError> {
            let value = self.inner.current().await?;
            self.reading.notify_one();
            self.release.notified().await;
            Ok(value)
        }

        async fn increment(&self) -> Result<u64, StoreError> {
            self.inner.increment().await
        }
    }

    #[tokio::test]
    async fn test_poll_never_moves_cache_behind_local_write() {
        let store = Arc::new(StallingStore {
            inner: MemoryStore::new(),
            reading: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let coord = UpdateCoordinator::new(store.clone(), CoordinatorConfig::default());

        // The poll reads 1, then a local write lands before it finishes
        let poller = coord.clone();
        let poll = tokio::spawn(async move { poller.poll_step().await });
        store.reading.notified().await;
        coord.update_happened().await.unwrap();
        assert_eq!(coord.cached_counter(), 2);
        store.release.notify_one();

        assert!(!poll.await.unwrap().unwrap());
        assert_eq!(coord.cached_counter(), 2);
        assert_eq!(coord.metrics().polls_with_changes, 0);
    }

    #[tokio::test]
    async fn test_partial_update_passes_item_id() {
        let coord = coordinator_with(&MemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        coord
            .register_interest(RecordingListener::new("cache", tx), true)
            .unwrap();

        coord.partial_update_happened(42).await.unwrap();

        assert_eq!(rx.try_recv().unwrap().1, Notice::Partial(42));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listeners_notified_in_registration_order() {
        let coord = coordinator_with(&MemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        for label in ["a", "b", "c"] {
            coord
                .register_interest(RecordingListener::new(label, tx.clone()), true)
                .unwrap();
        }

        coord.update_happened().await.unwrap();

        let order: Vec<String> = (0..3).map(|_| rx.try_recv().unwrap().0).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_listener_failure_propagates_to_writer() {
        let store = MemoryStore::new();
        let coord = coordinator_with(&store);
        let (tx, mut rx) = mpsc::unbounded_channel();
        coord
            .register_interest(RecordingListener::failing("broken", tx.clone()), true)
            .unwrap();
        coord
            .register_interest(RecordingListener::new("after", tx), true)
            .unwrap();

        let result = coord.update_happened().await;

        assert!(result.is_err());
        // The counter was still bumped before delivery
        assert_eq!(store.current().await.unwrap(), 2);
        assert_eq!(rx.try_recv().unwrap().0, "broken");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poll_without_change_notifies_nobody() {
        let store = MemoryStore::new();
        let coord = coordinator_with(&store);
        let (tx, mut rx) = mpsc::unbounded_channel();
        coord
            .register_interest(RecordingListener::new("cache", tx), true)
            .unwrap();

        coord.update_happened().await.unwrap();
        let _ = rx.try_recv();

        assert!(!coord.poll_step().await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poll_detects_foreign_write() {
        let store = MemoryStore::new();
        let coord = coordinator_with(&store);
        let (tx, mut rx) = mpsc::unbounded_channel();
        coord
            .register_interest(RecordingListener::new("a", tx.clone()), true)
            .unwrap();
        coord
            .register_interest(RecordingListener::new("b", tx), true)
            .unwrap();

        coord.update_happened().await.unwrap();
        let _ = (rx.try_recv(), rx.try_recv());

        store.set_counter(10).unwrap();
        assert!(coord.poll_step().await.unwrap());
        assert_eq!(coord.cached_counter(), 10);

        let mut labels = vec![recv(&mut rx).await, recv(&mut rx).await];
        labels.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(
            labels,
            vec![("a".to_string(), Notice::Full), ("b".to_string(), Notice::Full)]
        );

        // Same value again: nothing new
        assert!(!coord.poll_step().await.unwrap());
    }

    #[tokio::test]
    async fn test_first_poll_after_startup_reports_change() {
        let store = MemoryStore::new();
        let coord = coordinator_with(&store);
        assert_eq!(coord.cached_counter(), 0);

        assert!(coord.poll_step().await.unwrap());
        assert_eq!(coord.cached_counter(), 1);
    }

    #[tokio::test]
    async fn test_poll_listener_failure_is_absorbed() {
        let store = MemoryStore::new();
        let coord = coordinator_with(&store);
        let (tx, mut rx) = mpsc::unbounded_channel();
        coord
            .register_interest(RecordingListener::failing("broken", tx.clone()), true)
            .unwrap();
        coord
            .register_interest(RecordingListener::new("healthy", tx), true)
            .unwrap();

        store.set_counter(5).unwrap();
        assert!(coord.poll_step().await.unwrap());

        let mut labels = vec![recv(&mut rx).await.0, recv(&mut rx).await.0];
        labels.sort();
        assert_eq!(labels, vec!["broken", "healthy"]);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coord.metrics().detached_failures, 1);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_from_poll_and_writes() {
        let coord = UpdateCoordinator::new(Arc::new(BrokenStore), CoordinatorConfig::default());

        assert!(coord.poll_step().await.is_err());
        assert!(coord.update_happened().await.is_err());
        assert!(coord.partial_update_happened(1).await.is_err());
    }

    #[tokio::test]
    async fn test_register_starts_single_poll_timer() {
        let coord = coordinator_with(&MemoryStore::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        coord
            .register_interest(RecordingListener::new("a", tx.clone()), false)
            .unwrap();
        coord
            .register_interest(RecordingListener::new("b", tx), false)
            .unwrap();

        assert!(coord.is_polling());
        let metrics = coord.metrics();
        assert_eq!(metrics.poll_timers_started, 1);
        assert_eq!(metrics.registered_listeners, 2);

        coord.clear_interested();
    }

    #[tokio::test]
    async fn test_testing_mode_does_not_poll() {
        let coord = coordinator_with(&MemoryStore::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        coord
            .register_interest(RecordingListener::new("a", tx), true)
            .unwrap();

        assert!(!coord.is_polling());
        assert_eq!(coord.metrics().poll_timers_started, 0);
    }

    #[tokio::test]
    async fn test_clear_interested_removes_listeners_and_timer() {
        let coord = coordinator_with(&MemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        coord
            .register_interest(RecordingListener::new("a", tx), false)
            .unwrap();
        assert!(coord.is_polling());

        coord.clear_interested();

        assert!(!coord.is_polling());
        assert_eq!(coord.listener_count(), 0);
        coord.update_happened().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_allows_polling_to_restart() {
        let coord = coordinator_with(&MemoryStore::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        coord
            .register_interest(RecordingListener::new("a", tx.clone()), false)
            .unwrap();
        coord.clear_interested();
        coord
            .register_interest(RecordingListener::new("b", tx), false)
            .unwrap();

        assert!(coord.is_polling());
        assert_eq!(coord.metrics().poll_timers_started, 2);
        coord.clear_interested();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_task_runs_every_period() {
        let store = MemoryStore::new();
        let coord = UpdateCoordinator::new(Arc::new(store.clone()), CoordinatorConfig { poll_interval_secs: 60 });
        let (tx, mut rx) = mpsc::unbounded_channel();
        coord
            .register_interest(RecordingListener::new("cache", tx), false)
            .unwrap();

        // Nothing before the first period elapses
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(coord.metrics().polls, 0);

        store.set_counter(7).unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(rx.recv().await.unwrap().1, Notice::Full);
        assert_eq!(coord.cached_counter(), 7);

        coord.clear_interested();
    }

    #[tokio::test]
    async fn test_register_without_runtime_fails() {
        let coord = coordinator_with(&MemoryStore::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = std::thread::spawn(move || coord.register_interest(RecordingListener::new("a", tx), false))
            .join()
            .unwrap();

        assert!(result.is_err());
    }
}
