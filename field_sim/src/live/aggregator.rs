//! Live data aggregator: polls a [`TagSource`] for the selected tags and keeps
//! per-tag sparkline and history buffers for the rendering layer.
//!
//! Scheduling is driven by three inputs (selection, live mode, update rate)
//! held in a watch channel. Any change to them tears down the poll schedule
//! and builds a new one. Polls are throttled by start time only: a poll that
//! is still waiting for a slow response does not block the next one.
//!
//! Mode changes published by a [`ModeNotifier`] wipe everything, including the
//! selection, and make in-flight responses from the old mode land nowhere.

use crate::live::history::TagHistories;
use crate::live::mode::{ModeFlags, ModeNotifier};
use crate::live::source::{LiveTag, RawTagRecord, TagSource};
use crate::tags::structures::{now_millis, HistoricalPoint, TagValue};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_UPDATE_RATE: Duration = Duration::from_secs(2);
/// A poll is skipped if less than this share of the update rate has passed
/// since the previous poll started.
pub const DEFAULT_THROTTLE_RATIO: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorInputs {
    pub selected_tags: BTreeSet<String>,
    pub is_live_mode: bool,
    pub update_rate: Duration,
}

impl AggregatorInputs {
    fn polling(&self) -> bool {
        self.is_live_mode && !self.selected_tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorConfig {
    pub update_rate: Duration,
    pub throttle_ratio: f64,
    pub live_mode: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            update_rate: DEFAULT_UPDATE_RATE,
            throttle_ratio: DEFAULT_THROTTLE_RATIO,
            live_mode: true,
        }
    }
}

/// What a single poll attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Throttled: the previous poll started too recently.
    Skipped,
    /// Nothing selected, nothing requested.
    Empty,
    Applied { accepted: usize, quarantined: usize },
    /// The mode changed while the request was in flight; the response was dropped.
    Discarded,
    Failed(String),
}

/// Rendering-layer view of the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorView {
    pub live_data: BTreeMap<String, LiveTag>,
    pub sparklines: BTreeMap<String, Vec<HistoricalPoint>>,
    pub history: BTreeMap<String, Vec<HistoricalPoint>>,
    pub loading: bool,
    pub last_error: Option<String>,
    pub quarantined: u64,
}

#[derive(Debug, Default)]
struct LiveState {
    live_data: HashMap<String, LiveTag>,
    histories: TagHistories,
    in_flight: usize,
    last_error: Option<String>,
    quarantined: u64,
    last_fetch_started: Option<Instant>,
    // Bumped on every reset; responses tagged with an older epoch are dropped.
    epoch: u64,
    observed_mode: ModeFlags,
}

impl LiveState {
    fn apply(&mut self, records: Vec<RawTagRecord>, selected: &BTreeSet<String>) -> (usize, usize) {
        let received_at = now_millis();
        let mut accepted = 0;
        let mut quarantined = 0;

        for record in records {
            let previous = record
                .tag_id
                .as_deref()
                .and_then(|id| self.live_data.get(id))
                .map(|tag| &tag.value);

            match record.into_live_tag(previous, received_at) {
                Ok(tag) if !selected.contains(&tag.tag_id) => {
                    debug!(tag_id = %tag.tag_id, "ignoring record for a tag that is no longer selected");
                }
                Ok(tag) => {
                    if let Some(value) = tag.value.as_f64() {
                        self.histories.record(
                            &tag.tag_id,
                            HistoricalPoint {
                                value,
                                timestamp: tag.last_updated,
                            },
                        );
                    }
                    self.live_data.insert(tag.tag_id.clone(), tag);
                    accepted += 1;
                }
                Err(err) => {
                    warn!(error = %err, "quarantined malformed tag record");
                    quarantined += 1;
                }
            }
        }

        self.quarantined += quarantined as u64;
        (accepted, quarantined)
    }

    fn reset(&mut self) {
        self.live_data.clear();
        self.histories.clear();
        self.last_error = None;
        self.quarantined = 0;
        self.last_fetch_started = None;
        self.epoch += 1;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    source: Arc<dyn TagSource>,
    state: Mutex<LiveState>,
    inputs: watch::Sender<AggregatorInputs>,
    throttle_ratio: f64,
}

impl Shared {
    async fn fetch(&self) -> FetchOutcome {
        // Inputs are read under the state lock: a mode reset clears the
        // selection while holding it, so epoch and selection always agree.
        let (inputs, epoch, session_id) = {
            let mut state = lock(&self.state);
            let inputs = self.inputs.borrow().clone();
            if inputs.selected_tags.is_empty() {
                return FetchOutcome::Empty;
            }
            let min_gap = inputs.update_rate.mul_f64(self.throttle_ratio);
            if let Some(started) = state.last_fetch_started {
                if started.elapsed() < min_gap {
                    debug!(since_ms = started.elapsed().as_millis() as u64, "fetch throttled");
                    return FetchOutcome::Skipped;
                }
            }
            state.last_fetch_started = Some(Instant::now());
            state.in_flight += 1;
            let session_id = state.observed_mode.session_id.clone();
            (inputs, state.epoch, session_id)
        };

        let tag_ids: Vec<String> = inputs.selected_tags.iter().cloned().collect();
        let result = self.source.fetch(&tag_ids, session_id.as_deref()).await;

        let mut state = lock(&self.state);
        let selected = self.inputs.borrow().selected_tags.clone();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.epoch != epoch {
            debug!("dropping response fetched before a mode change");
            return FetchOutcome::Discarded;
        }

        match result {
            Ok(records) => {
                let (accepted, quarantined) = state.apply(records, &selected);
                state.last_error = None;
                debug!(source = self.source.name(), accepted, quarantined, "live data applied");
                FetchOutcome::Applied {
                    accepted,
                    quarantined,
                }
            }
            Err(err) => {
                warn!(source = self.source.name(), error = %err, "live data fetch failed");
                let message = err.to_string();
                state.last_error = Some(message.clone());
                FetchOutcome::Failed(message)
            }
        }
    }

    fn observe_mode(&self, flags: ModeFlags) {
        let mut state = lock(&self.state);
        let switched = state.observed_mode.is_switch_to(&flags);
        state.observed_mode = flags;
        if !switched {
            return;
        }

        // Reset and deselect as one step under the state lock, so no poll can
        // start between them with the new epoch and the old selection.
        state.reset();
        self.inputs.send_if_modified(|inputs| {
            let had_selection = !inputs.selected_tags.is_empty();
            inputs.selected_tags.clear();
            had_selection
        });
        drop(state);
        info!("session or demo mode changed; live data cleared");
    }
}

/// Polls selected tags from a [`TagSource`] and keeps bounded history per tag.
pub struct LiveDataAggregator {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveDataAggregator {
    /// Start the scheduler and mode watcher. Must be called within a Tokio runtime.
    pub fn spawn(source: Arc<dyn TagSource>, modes: &ModeNotifier, config: AggregatorConfig) -> Self {
        let mode_rx = modes.subscribe();
        let initial_mode = mode_rx.borrow().clone();

        let (inputs_tx, inputs_rx) = watch::channel(AggregatorInputs {
            selected_tags: BTreeSet::new(),
            is_live_mode: config.live_mode,
            update_rate: config.update_rate.max(Duration::from_millis(1)),
        });

        let shared = Arc::new(Shared {
            source,
            state: Mutex::new(LiveState {
                observed_mode: initial_mode,
                ..LiveState::default()
            }),
            inputs: inputs_tx,
            throttle_ratio: config.throttle_ratio,
        });

        let tasks = vec![
            tokio::spawn(run_schedule(Arc::clone(&shared), inputs_rx)),
            tokio::spawn(watch_modes(Arc::clone(&shared), mode_rx)),
        ];

        LiveDataAggregator { shared, tasks }
    }

    pub fn inputs(&self) -> AggregatorInputs {
        self.shared.inputs.borrow().clone()
    }

    pub fn set_selected_tags<I, S>(&self, tag_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selected: BTreeSet<String> = tag_ids.into_iter().map(Into::into).collect();
        self.shared.inputs.send_if_modified(|inputs| {
            if inputs.selected_tags == selected {
                return false;
            }
            inputs.selected_tags = selected;
            true
        });
    }

    pub fn select_tag(&self, tag_id: &str) {
        self.shared
            .inputs
            .send_if_modified(|inputs| inputs.selected_tags.insert(tag_id.to_string()));
    }

    pub fn deselect_tag(&self, tag_id: &str) {
        self.shared
            .inputs
            .send_if_modified(|inputs| inputs.selected_tags.remove(tag_id));
    }

    pub fn set_live_mode(&self, on: bool) {
        self.shared.inputs.send_if_modified(|inputs| {
            let changed = inputs.is_live_mode != on;
            inputs.is_live_mode = on;
            changed
        });
    }

    pub fn set_update_rate(&self, rate: Duration) {
        let rate = rate.max(Duration::from_millis(1));
        self.shared.inputs.send_if_modified(|inputs| {
            let changed = inputs.update_rate != rate;
            inputs.update_rate = rate;
            changed
        });
    }

    /// Poll now, subject to the same throttle as scheduled polls.
    pub async fn fetch_now(&self) -> FetchOutcome {
        self.shared.fetch().await
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.shared.state).in_flight > 0
    }

    pub fn live_tag(&self, tag_id: &str) -> Option<LiveTag> {
        lock(&self.shared.state).live_data.get(tag_id).cloned()
    }

    pub fn sparkline(&self, tag_id: &str) -> Vec<HistoricalPoint> {
        lock(&self.shared.state).histories.sparkline(tag_id)
    }

    pub fn history(&self, tag_id: &str) -> Vec<HistoricalPoint> {
        lock(&self.shared.state).histories.history(tag_id)
    }

    /// Value currently displayed for a tag.
    pub fn displayed_value(&self, tag_id: &str) -> Option<TagValue> {
        self.live_tag(tag_id).map(|tag| tag.value)
    }

    pub fn view(&self) -> AggregatorView {
        let state = lock(&self.shared.state);
        AggregatorView {
            live_data: state
                .live_data
                .iter()
                .map(|(id, tag)| (id.clone(), tag.clone()))
                .collect(),
            sparklines: state
                .histories
                .sparklines()
                .map(|(id, ring)| (id.clone(), ring.points()))
                .collect(),
            history: state
                .histories
                .histories()
                .map(|(id, ring)| (id.clone(), ring.points()))
                .collect(),
            loading: state.in_flight > 0,
            last_error: state.last_error.clone(),
            quarantined: state.quarantined,
        }
    }

    /// Cancel the scheduler, the mode watcher and any poll still running.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for LiveDataAggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_schedule(shared: Arc<Shared>, mut inputs: watch::Receiver<AggregatorInputs>) {
    // Owning the poll tasks here means aborting the scheduler aborts them too.
    let mut polls = JoinSet::new();

    loop {
        let current = inputs.borrow_and_update().clone();

        if !current.polling() {
            debug!("live polling idle");
            loop {
                tokio::select! {
                    changed = inputs.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        break;
                    }
                    Some(_) = polls.join_next(), if !polls.is_empty() => {}
                }
            }
            continue;
        }

        debug!(
            tags = current.selected_tags.len(),
            rate_ms = current.update_rate.as_millis() as u64,
            "live polling scheduled"
        );
        let mut ticker = interval(current.update_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let shared = Arc::clone(&shared);
                    polls.spawn(async move {
                        shared.fetch().await;
                    });
                }
                changed = inputs.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
                Some(_) = polls.join_next(), if !polls.is_empty() => {}
            }
        }
    }
}

async fn watch_modes(shared: Arc<Shared>, mut modes: watch::Receiver<ModeFlags>) {
    while modes.changed().await.is_ok() {
        let flags = modes.borrow_and_update().clone();
        shared.observe_mode(flags);
    }
}
