use crate::tags::structures::{now_millis, DataType, HistoricalPoint, Tag, TagSpec};
use crate::tags::synth::synthesize;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap; // Using DashMap for concurrent R/W access
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Upper bound on points produced by a single history request.
pub const MAX_HISTORY_POINTS: u64 = 100_000;

/// Callback receiving the full tag snapshot after each tick.
pub type SubscriberFn = dyn Fn(&[Tag]) + Send + Sync;

type SubscriberRegistry = Mutex<BTreeMap<u64, Arc<SubscriberFn>>>;

thread_local! {
    // Engines this thread is currently delivering snapshots for, keyed by
    // the address of their tick lock.
    static FAN_OUT: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks an engine as delivering on this thread until dropped, unwinding included.
struct FanOutMarker {
    engine: usize,
}

impl FanOutMarker {
    fn enter(engine: usize) -> Self {
        FAN_OUT.with(|active| active.borrow_mut().push(engine));
        FanOutMarker { engine }
    }

    fn is_active(engine: usize) -> bool {
        FAN_OUT.with(|active| active.borrow().contains(&engine))
    }
}

impl Drop for FanOutMarker {
    fn drop(&mut self) {
        FAN_OUT.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|e| *e == self.engine) {
                active.remove(pos);
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the simulated tag set and drives it on a timer.
///
/// Cloning is cheap and every clone refers to the same engine. The engine is
/// created by the composition root and handed to consumers; nothing global.
#[derive(Clone)]
pub struct SimulationEngine {
    tags: Arc<DashMap<String, Tag>>,
    subscribers: Arc<SubscriberRegistry>,
    next_subscriber_id: Arc<AtomicU64>,
    rng: Arc<Mutex<StdRng>>,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_lock: Arc<Mutex<()>>,
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Engine with a reproducible value stream.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        SimulationEngine {
            tags: Arc::new(DashMap::new()),
            subscribers: Arc::new(Mutex::new(BTreeMap::new())),
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
            rng: Arc::new(Mutex::new(rng)),
            timer: Arc::new(Mutex::new(None)),
            tick_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Register a tag, seeded with a fresh reading.
    /// Returns `false` without touching anything if the id is already taken.
    pub fn add_tag(&self, spec: TagSpec) -> bool {
        if self.tags.contains_key(&spec.tag_id) {
            return false;
        }

        let reading = {
            let mut rng = lock(&self.rng);
            synthesize(&mut *rng, spec.data_type, &spec.address, None)
        };

        match self.tags.entry(spec.tag_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(tag_id = %spec.tag_id, data_type = %spec.data_type, "tag added");
                slot.insert(Tag::from_spec(spec, reading, now_millis()));
                true
            }
        }
    }

    /// Remove a tag. Missing ids are ignored.
    pub fn remove_tag(&self, tag_id: &str) -> bool {
        let removed = self.tags.remove(tag_id).is_some();
        if removed {
            debug!(tag_id, "tag removed");
        }
        removed
    }

    /// Get a copy of a single tag.
    pub fn get_tag(&self, tag_id: &str) -> Option<Tag> {
        self.tags.get(tag_id).map(|tag_ref| tag_ref.value().clone())
    }

    /// Tags for the requested ids, in request order. Unknown ids are skipped.
    pub fn tags_by_ids<S: AsRef<str>>(&self, tag_ids: &[S]) -> Vec<Tag> {
        tag_ids.iter().filter_map(|id| self.get_tag(id.as_ref())).collect()
    }

    /// Copies of all tags, ordered by id.
    pub fn snapshot(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.tags.iter().map(|entry| entry.value().clone()).collect();
        tags.sort_by(|a, b| a.tag_id.cmp(&b.tag_id));
        tags
    }

    /// Get a list of all registered tag ids.
    pub fn tag_ids(&self) -> Vec<String> {
        self.tags.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Advance every tag by one synthesized step and notify all subscribers.
    ///
    /// Ticks are serialised. A tick requested from inside one of this
    /// engine's subscriber callbacks (tick fan-out or the initial delivery in
    /// [`subscribe`](Self::subscribe)) is refused and returns an empty
    /// snapshot. Other engines are unaffected.
    pub fn tick(&self) -> Vec<Tag> {
        if FanOutMarker::is_active(self.identity()) {
            warn!("tick requested from within a subscriber callback; ignored");
            return Vec::new();
        }
        let _serial = lock(&self.tick_lock);

        let now = now_millis();
        {
            let mut rng = lock(&self.rng);
            for mut entry in self.tags.iter_mut() {
                let tag = entry.value_mut();
                let reading = synthesize(&mut *rng, tag.data_type, &tag.address, Some(&tag.value));
                tag.value = reading.value;
                tag.quality = reading.quality;
                tag.trend = reading.trend;
                // Subscribers must see strictly increasing timestamps per tag.
                tag.timestamp = now.max(tag.timestamp + 1);
            }
        }

        let snapshot = self.snapshot();
        debug!(tags = snapshot.len(), "tick");
        self.fan_out(&snapshot);
        snapshot
    }

    fn fan_out(&self, snapshot: &[Tag]) {
        // Copy the registry so callbacks may (un)subscribe without deadlocking;
        // such changes apply from the next tick.
        let subscribers: Vec<(u64, Arc<SubscriberFn>)> = lock(&self.subscribers)
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        let _marker = FanOutMarker::enter(self.identity());
        for (id, callback) in subscribers {
            deliver(id, &callback, snapshot);
        }
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.tick_lock) as usize
    }

    /// Register a snapshot callback.
    ///
    /// The callback is invoked immediately with the current snapshot, then
    /// after every tick until the returned [`Subscription`] is dropped or
    /// [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Tag]) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let callback: Arc<SubscriberFn> = Arc::new(callback);

        // Hold the tick lock so the initial snapshot cannot be overtaken by a
        // concurrent tick. Inside one of our own deliveries this thread already holds it.
        let nested = FanOutMarker::is_active(self.identity());
        let _serial = if nested { None } else { Some(lock(&self.tick_lock)) };

        lock(&self.subscribers).insert(id, Arc::clone(&callback));
        let snapshot = self.snapshot();
        {
            let _marker = FanOutMarker::enter(self.identity());
            deliver(id, &callback, &snapshot);
        }
        debug!(subscriber = id, "subscriber registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Tick once now, then every `every`. Replaces a previously started timer.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, every: Duration) {
        let every = every.max(Duration::from_millis(1));
        self.abort_timer();

        self.tick();

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.tick();
            }
        });

        if let Some(stale) = lock(&self.timer).replace(handle) {
            stale.abort();
        }
        info!(interval_ms = every.as_millis() as u64, tags = self.tag_count(), "simulation started");
    }

    /// Cancel the timer. Safe to call repeatedly.
    pub fn stop(&self) {
        if self.abort_timer() {
            info!("simulation stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn abort_timer(&self) -> bool {
        match lock(&self.timer).take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Synthesize a back-filled series for a tag without touching its live value.
    ///
    /// Points are spaced `60 / points_per_hour` minutes apart, oldest first,
    /// the newest stamped now. Unknown ids get an ephemeral REAL walk.
    /// Non-numeric (STRING) readings produce no points.
    pub fn generate_historical_data(
        &self,
        tag_id: &str,
        hours: u32,
        points_per_hour: u32,
    ) -> Vec<HistoricalPoint> {
        if hours == 0 || points_per_hour == 0 {
            return Vec::new();
        }

        let live = self
            .tags
            .get(tag_id)
            .map(|tag| (tag.data_type, tag.address.clone(), tag.value.clone()));

        let mut rng = lock(&self.rng);
        let (data_type, address, mut previous) = match live {
            Some(seed) => seed,
            None => {
                let seed = synthesize(&mut *rng, DataType::Real, tag_id, None);
                (DataType::Real, tag_id.to_string(), seed.value)
            }
        };

        let total = (hours as u64 * points_per_hour as u64).min(MAX_HISTORY_POINTS);
        let step_ms = 3_600_000 / points_per_hour as u64;
        let now = now_millis();

        let mut points = Vec::with_capacity(total as usize);
        for i in 0..total {
            let reading = synthesize(&mut *rng, data_type, &address, Some(&previous));
            if let Some(value) = reading.value.as_plot_value() {
                points.push(HistoricalPoint {
                    value,
                    timestamp: now.saturating_sub((total - 1 - i) * step_ms),
                });
            }
            previous = reading.value;
        }
        points
    }
}

fn deliver(id: u64, callback: &Arc<SubscriberFn>, snapshot: &[Tag]) {
    if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
        error!(subscriber = id, "subscriber panicked while handling a snapshot");
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("tags", &self.tags.len())
            .field("subscribers", &self.subscriber_count())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Handle to a registered subscriber. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.id);
            debug!(subscriber = self.id, "subscriber removed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
