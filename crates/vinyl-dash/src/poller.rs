//! Poller: runs one or more sources on their own intervals.
//!
//! Each source gets an independent timer task.  A tick spawns the fetch and
//! goes straight back to waiting, so a slow request never delays the next
//! tick.  `stop()` only aborts the timers; fetches already in flight finish
//! and apply through their `SourceRunner`, which discards stale results.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::lock;
use crate::source::SourceRunner;

struct PollHandle {
    runner: Arc<SourceRunner>,
    interval: Duration,
    /// At most one live timer per source.
    timer: Option<AbortHandle>,
}

pub struct Poller {
    name: &'static str,
    handles: Mutex<Vec<PollHandle>>,
}

impl Poller {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_source(self, runner: Arc<SourceRunner>, interval: Duration) -> Self {
        lock(&self.handles).push(PollHandle {
            runner,
            interval,
            timer: None,
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fetch every source now, then keep fetching on each interval.
    /// Sources that already have a timer are left alone.
    pub fn start(&self) {
        let mut handles = lock(&self.handles);
        let mut started = 0;
        for handle in handles.iter_mut() {
            if handle.timer.is_some() {
                continue;
            }
            let runner = handle.runner.clone();
            let interval = handle.interval;
            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    // First tick completes immediately.
                    ticker.tick().await;
                    let runner = runner.clone();
                    tokio::spawn(async move {
                        let _ = runner.fetch_and_apply().await;
                    });
                }
            });
            handle.timer = Some(task.abort_handle());
            started += 1;
        }
        if started > 0 {
            info!("Poller: {} started ({} timer(s))", self.name, started);
        }
    }

    /// Cancel future ticks.  In-flight fetches are not touched.
    pub fn stop(&self) {
        let mut handles = lock(&self.handles);
        let mut stopped = 0;
        for handle in handles.iter_mut() {
            if let Some(timer) = handle.timer.take() {
                timer.abort();
                stopped += 1;
            }
        }
        if stopped > 0 {
            info!("Poller: {} stopped", self.name);
        }
    }

    /// Out-of-band fetch of every source, leaving the timers as they are.
    /// Resolves once all fetches have been applied; returns the first error.
    pub async fn trigger_now(&self) -> Result<(), SyncError> {
        let runners: Vec<Arc<SourceRunner>> =
            lock(&self.handles).iter().map(|h| h.runner.clone()).collect();
        debug!("Poller: {} triggered", self.name);

        let results = join_all(runners.iter().map(|r| r.fetch_and_apply())).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        lock(&self.handles).iter().any(|h| h.timer.is_some())
    }

    pub fn live_timers(&self) -> usize {
        lock(&self.handles)
            .iter()
            .filter(|h| h.timer.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for handle in lock(&self.handles).iter_mut() {
            if let Some(timer) = handle.timer.take() {
                timer.abort();
            }
        }
    }
}
