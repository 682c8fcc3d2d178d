// Refresh cache engine
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{BatchFetcher, CacheError, RefreshPolicy, Result};

/// Construction-time settings for one cache instance
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Label used in log lines
    pub name: String,
    /// How often the refresh policy is evaluated
    pub refresh_interval: Duration,
    /// Give up on a pending read after this long. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl CacheOptions {
    pub fn new(name: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            name: name.into(),
            refresh_interval,
            read_timeout: None,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }
}

/// What a call to [`RefreshCache::refresh`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A batch was fetched and replaced the stored items
    Refreshed {
        items: usize,
        discarded: usize,
        readers_served: usize,
    },
    /// Another refresh was already running, nothing was started
    Coalesced,
}

/// Point-in-time view of a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub items: usize,
    pub hits_since_refresh: u64,
    pub pending_readers: usize,
    pub refresh_in_flight: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

struct CacheState<T> {
    items: Vec<T>,
    pending: Vec<oneshot::Sender<T>>,
    hits: u64,
    in_flight: bool,
    last_refreshed_at: Option<DateTime<Utc>>,
}

impl<T: Clone> CacheState<T> {
    /// Uniform draw with replacement. Every draw counts as a hit.
    fn sample(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }

        let index = rand::thread_rng().gen_range(0..self.items.len());
        self.hits += 1;
        Some(self.items[index].clone())
    }
}

enum Read<T> {
    Ready(T),
    Pending(oneshot::Receiver<T>),
}

struct Shared<T: Send + 'static> {
    name: String,
    state: Mutex<CacheState<T>>,
    fetcher: Box<dyn BatchFetcher<T>>,
    policy: Box<dyn RefreshPolicy>,
}

/// Clears the in-flight flag however the refresh ends, including when the
/// refresh future is dropped mid-fetch.
struct InFlight<'a, T: Send + 'static>(&'a Shared<T>);

impl<T: Send + 'static> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.0.lock().in_flight = false;
    }
}

impl<T: Send + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        // State stays consistent even if a holder panicked: every critical
        // section is a handful of assignments.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn read_or_subscribe(&self) -> Read<T> {
        let mut state = self.lock();
        match state.sample() {
            Some(item) => Read::Ready(item),
            None => {
                // Readers that gave up (read timeout, caller gone) would
                // otherwise pile up while refreshes keep coming back empty
                state.pending.retain(|reader| !reader.is_closed());
                let (sender, receiver) = oneshot::channel();
                state.pending.push(sender);
                Read::Pending(receiver)
            }
        }
    }

    /// Claims the single refresh slot. False means one is already running.
    fn begin_refresh(&self) -> bool {
        let mut state = self.lock();
        if state.in_flight {
            return false;
        }
        state.in_flight = true;
        true
    }

    /// Starts a refresh in the background unless one is already running
    fn spawn_refresh(self: &Arc<Self>) -> bool {
        if !self.begin_refresh() {
            debug!(cache = %self.name, "Refresh already in flight, coalescing");
            return false;
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are already logged inside run_refresh
            let _ = shared.run_refresh().await;
        });
        true
    }

    /// Fetches and stores a batch. Caller must have claimed the refresh slot.
    async fn run_refresh(&self) -> Result<RefreshOutcome> {
        let _in_flight = InFlight(self);

        debug!(cache = %self.name, "Fetching fresh batch");
        match self.fetcher.fetch_batch().await {
            Ok(batch) => Ok(self.complete(batch)),
            Err(err) => {
                warn!(cache = %self.name, "Refresh failed: {:#}", err);
                Err(CacheError::FetchFailed(err))
            }
        }
    }

    fn complete(&self, batch: Vec<Option<T>>) -> RefreshOutcome {
        let fetched = batch.len();
        let items: Vec<T> = batch.into_iter().flatten().collect();
        let discarded = fetched - items.len();

        let mut state = self.lock();
        state.items = items;

        // Readers keep waiting through an empty batch
        let mut readers_served = 0;
        if !state.items.is_empty() {
            for reader in std::mem::take(&mut state.pending) {
                if reader.is_closed() {
                    continue;
                }
                if let Some(item) = state.sample() {
                    if reader.send(item).is_ok() {
                        readers_served += 1;
                    }
                }
            }
        }

        state.hits = 0;
        state.last_refreshed_at = Some(Utc::now());

        info!(
            cache = %self.name,
            items = state.items.len(),
            discarded,
            readers_served,
            "Cache refreshed"
        );

        RefreshOutcome::Refreshed {
            items: state.items.len(),
            discarded,
            readers_served,
        }
    }

    fn tick(self: &Arc<Self>) -> bool {
        let due = {
            let state = self.lock();
            self.policy.is_due(state.items.len(), state.hits)
        };

        if !due {
            return false;
        }

        debug!(cache = %self.name, "Refresh policy says refresh is due");
        self.spawn_refresh()
    }

    fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            items: state.items.len(),
            hits_since_refresh: state.hits,
            pending_readers: state.pending.iter().filter(|r| !r.is_closed()).count(),
            refresh_in_flight: state.in_flight,
            last_refreshed_at: state.last_refreshed_at,
        }
    }
}

/// Background-refreshed pool of items of one kind
///
/// Reads are answered from memory with a uniformly random item. When the
/// pool is empty the read waits for the next successful refresh. At most one
/// fetch runs at a time; every trigger that arrives while one is running is
/// folded into it.
///
/// A ticker task evaluates the [`RefreshPolicy`] every `refresh_interval`.
/// It is aborted when the cache is dropped.
pub struct RefreshCache<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    read_timeout: Option<Duration>,
    ticker: JoinHandle<()>,
}

impl<T: Clone + Send + 'static> RefreshCache<T> {
    /// Creates the cache and immediately starts priming it
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F, P>(options: CacheOptions, fetcher: F, policy: P) -> Self
    where
        F: BatchFetcher<T> + 'static,
        P: RefreshPolicy + 'static,
    {
        let shared = Arc::new(Shared {
            name: options.name,
            state: Mutex::new(CacheState {
                items: Vec::new(),
                pending: Vec::new(),
                hits: 0,
                in_flight: false,
                last_refreshed_at: None,
            }),
            fetcher: Box::new(fetcher),
            policy: Box::new(policy),
        });

        info!(
            cache = %shared.name,
            interval_ms = options.refresh_interval.as_millis() as u64,
            "Starting refresh cache"
        );

        shared.spawn_refresh();
        let ticker = spawn_ticker(Arc::downgrade(&shared), options.refresh_interval);

        Self {
            shared,
            read_timeout: options.read_timeout,
            ticker,
        }
    }

    /// Returns one random item, waiting for a refresh if the cache is empty
    ///
    /// Without a read timeout, a read on an empty cache whose refreshes
    /// keep failing never completes.
    pub async fn get(&self) -> Result<T> {
        let receiver = match self.shared.read_or_subscribe() {
            Read::Ready(item) => return Ok(item),
            Read::Pending(receiver) => receiver,
        };

        debug!(cache = %self.shared.name, "Cache empty, waiting for refresh");
        self.shared.spawn_refresh();

        match self.read_timeout {
            None => receiver.await.map_err(|_| CacheError::Closed),
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received.map_err(|_| CacheError::Closed),
                Err(_) => Err(CacheError::ReadTimeout(limit)),
            },
        }
    }

    /// Runs the periodic check once. Returns true if it started a refresh.
    pub fn tick(&self) -> bool {
        self.shared.tick()
    }

    /// Refreshes now and waits for the result
    ///
    /// Returns [`RefreshOutcome::Coalesced`] straight away if a refresh is
    /// already running.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        if !self.shared.begin_refresh() {
            return Ok(RefreshOutcome::Coalesced);
        }
        self.shared.run_refresh().await
    }

    pub fn stats(&self) -> CacheStats {
        self.shared.stats()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<T: Send + 'static> Drop for RefreshCache<T> {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

fn spawn_ticker<T: Clone + Send + 'static>(shared: Weak<Shared<T>>, period: Duration) -> JoinHandle<()> {
    // tokio panics on a zero period
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.tick();
        }
    })
}
