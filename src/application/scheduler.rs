//! Per-source periodic sync scheduling
//!
//! Every active source owns one spawned task driven by a tokio interval. The
//! first tick fires one full cadence after the schedule starts and ticks of
//! one source never overlap; a tick that would fire while a sync is still
//! running is skipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::IntegrationError;
use crate::domain::{ExternalSource, IntegrationResult, SourceId, SyncCadence};

/// Runs one sync attempt for a source
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run_sync(&self, id: &SourceId) -> Result<IntegrationResult, IntegrationError>;
}

/// Next scheduled sync: `now` plus the cadence interval, regardless of the last outcome
pub fn calculate_next_sync(source: &ExternalSource, now: DateTime<Utc>) -> DateTime<Utc> {
    now + source.cadence.as_chrono()
}

struct ScheduleEntry {
    cadence: SyncCadence,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SyncScheduler {
    runner: Arc<dyn SyncRunner>,
    entries: Mutex<HashMap<SourceId, ScheduleEntry>>,
    root: CancellationToken,
}

impl SyncScheduler {
    pub fn new(runner: Arc<dyn SyncRunner>) -> Self {
        Self {
            runner,
            entries: Mutex::new(HashMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Start (or restart) the schedule for `id` at the given cadence
    pub async fn start_sync(&self, id: &SourceId, cadence: SyncCadence) {
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.remove(id) {
            previous.cancel.cancel();
            debug!(source = %id, cadence = %previous.cadence, "Replacing existing schedule");
        }

        let cancel = self.root.child_token();
        let handle = tokio::spawn(run_schedule(
            self.runner.clone(),
            id.clone(),
            cadence,
            cancel.clone(),
        ));

        info!(source = %id, cadence = %cadence, "Started sync schedule");
        entries.insert(
            id.clone(),
            ScheduleEntry {
                cadence,
                cancel,
                handle,
            },
        );
    }

    /// Cancel the schedule for `id`; returns whether one existed
    pub async fn stop_sync(&self, id: &SourceId) -> bool {
        match self.entries.lock().await.remove(id) {
            Some(entry) => {
                entry.cancel.cancel();
                info!(source = %id, "Stopped sync schedule");
                true
            }
            None => false,
        }
    }

    pub async fn is_scheduled(&self, id: &SourceId) -> bool {
        self.entries.lock().await.contains_key(id)
    }

    pub async fn cadence_of(&self, id: &SourceId) -> Option<SyncCadence> {
        self.entries.lock().await.get(id).map(|entry| entry.cadence)
    }

    /// Ids with a live schedule, sorted
    pub async fn scheduled_sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.entries.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cancel every schedule and wait for the tasks to finish
    pub async fn shutdown(&self) {
        self.root.cancel();
        let entries: Vec<(SourceId, ScheduleEntry)> =
            self.entries.lock().await.drain().collect();

        for (id, entry) in entries {
            if let Err(e) = entry.handle.await {
                warn!(source = %id, error = %e, "Schedule task ended abnormally");
            }
        }
        info!("Sync scheduler shut down");
    }
}

async fn run_schedule(
    runner: Arc<dyn SyncRunner>,
    id: SourceId,
    cadence: SyncCadence,
    cancel: CancellationToken,
) {
    let period = cadence.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        debug!(source = %id, "Scheduled sync tick");
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(source = %id, "Schedule cancelled during sync");
                break;
            }
            outcome = runner.run_sync(&id) => match outcome {
                Ok(result) if result.success => {
                    info!(source = %id, records = result.record_count, "Scheduled sync completed");
                }
                Ok(result) => {
                    warn!(source = %id, errors = ?result.errors, "Scheduled sync failed");
                }
                Err(e) => {
                    error!(source = %id, error = %e, "Scheduled sync could not run");
                }
            },
        }
    }

    debug!(source = %id, "Schedule task exited");
}
