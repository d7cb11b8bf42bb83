//! Mapping engine with a statum lifecycle
//!
//! ```text
//! Initializing ──► Running ──► Stopped
//! ```
//!
//! Every tick is strictly sequential: poll the adapter, run the pipeline on
//! `(current, previous)`, keep `current` as the next `previous`. The async
//! loop only decides how long to sleep between ticks and when to stop.

use crate::controller::snapshot::Snapshot;
use crate::controller::DeviceAdapter;
use crate::mapping::pipeline::{ActionPipeline, TickReport};
use crate::mapping::sink::OutputSink;
use crate::mapping::RateLimiter;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Sleep between ticks while a device is active
    pub poll_interval_ms: u64,
    /// Sleep between ticks while no device is active
    pub idle_backoff_ms: u64,
    pub stats_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
            idle_backoff_ms: 100,
            stats_interval_secs: 10,
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A snapshot went through the pipeline
    Mapped,
    /// Device active, nothing new this tick
    NoData,
    /// No device driving input
    Inactive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub ticks: u64,
    pub snapshots: u64,
    pub effects: u64,
    pub sink_failures: u64,
}

impl Counters {
    fn record(&mut self, report: &TickReport) {
        self.effects += report.effects.len() as u64;
        self.sink_failures += report.failures.len() as u64;
    }
}

/// Tick counters, logged every `stats_interval_secs`
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub interval: Counters,
    pub total: Counters,
    last_stats_time: DateTime<Local>,
    stats_interval: chrono::Duration,
}

impl EngineStats {
    fn new(stats_interval_secs: u64) -> Self {
        let secs = i64::try_from(stats_interval_secs).unwrap_or(i64::MAX);
        Self {
            interval: Counters::default(),
            total: Counters::default(),
            last_stats_time: Local::now(),
            stats_interval: chrono::Duration::try_seconds(secs)
                .unwrap_or_else(|| chrono::Duration::seconds(10)),
        }
    }

    fn tick(&mut self) {
        self.interval.ticks += 1;
        self.total.ticks += 1;
    }

    fn snapshot(&mut self, report: &TickReport) {
        self.interval.snapshots += 1;
        self.total.snapshots += 1;
        self.interval.record(report);
        self.total.record(report);
    }

    fn release(&mut self, report: &TickReport) {
        self.interval.record(report);
        self.total.record(report);
    }

    fn maybe_log(&mut self) {
        let now = Local::now();
        if now - self.last_stats_time <= self.stats_interval {
            return;
        }

        let elapsed_seconds = (now - self.last_stats_time).num_milliseconds() as f64 / 1000.0;
        info!(
            "Engine stats: {} ticks, {} snapshots, {} effects, {} sink failures in {:.1} seconds",
            self.interval.ticks,
            self.interval.snapshots,
            self.interval.effects,
            self.interval.sink_failures,
            elapsed_seconds
        );
        if elapsed_seconds > 0.0 {
            debug!(
                "Average: {:.1} ticks/sec, {:.1} snapshots/sec",
                self.interval.ticks as f64 / elapsed_seconds,
                self.interval.snapshots as f64 / elapsed_seconds
            );
        }

        self.interval = Counters::default();
        self.last_stats_time = now;
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum EngineState {
    Initializing,
    Running,
    Stopped,
}

#[machine]
pub struct MappingEngine<S: EngineState> {
    adapter: Box<dyn DeviceAdapter>,
    pipeline: ActionPipeline,
    sink: Box<dyn OutputSink>,
    settings: EngineSettings,
    previous: Option<Snapshot>,
    stats: EngineStats,
    status_limiter: RateLimiter,
}

impl<S: EngineState> MappingEngine<S> {
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

impl MappingEngine<Initializing> {
    pub fn create(
        adapter: Box<dyn DeviceAdapter>,
        pipeline: ActionPipeline,
        sink: Box<dyn OutputSink>,
        settings: EngineSettings,
    ) -> Self {
        info!(
            "Creating mapping engine for {} with {} actions",
            adapter.describe(),
            pipeline.len()
        );
        debug!("Engine settings: {:?}", settings);
        let stats = EngineStats::new(settings.stats_interval_secs);

        Self::new(
            adapter,
            pipeline,
            sink,
            settings,
            None, // previous
            stats,
            RateLimiter::new(STATUS_INTERVAL),
        )
    }

    pub fn start(self) -> MappingEngine<Running> {
        info!("Mapping engine running");
        self.transition()
    }
}

impl MappingEngine<Running> {
    /// Runs one poll and pipeline pass at `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.stats.tick();
        self.stats.maybe_log();

        let Some(mut current) = self.adapter.poll() else {
            if self.adapter.is_active() {
                return TickOutcome::NoData;
            }
            if self.previous.is_some() {
                self.pause();
            }
            return TickOutcome::Inactive;
        };

        let report = self.pipeline.run_tick(
            &mut current,
            self.previous.as_ref(),
            now,
            &mut *self.sink,
        );
        self.stats.snapshot(&report);

        if self.status_limiter.should_process(now) {
            debug!("{}", current.summary());
        }

        self.previous = Some(current);
        TickOutcome::Mapped
    }

    // Input stopped: nothing may stay pressed and no repeat may carry over
    fn pause(&mut self) {
        let report = self
            .pipeline
            .release_held(self.previous.as_ref(), &mut *self.sink);
        self.stats.release(&report);
        self.pipeline.reset();
        self.previous = None;
        warn!("Controller input stopped, mapping paused");
    }

    /// Ticks until `token` is cancelled, then stops the engine.
    pub async fn run_until_cancelled(mut self, token: CancellationToken) -> MappingEngine<Stopped> {
        info!(
            "Entering polling loop ({} ms active, {} ms idle)",
            self.settings.poll_interval_ms, self.settings.idle_backoff_ms
        );

        loop {
            let pause = match self.tick(Instant::now()) {
                TickOutcome::Inactive => self.settings.idle_backoff(),
                TickOutcome::Mapped | TickOutcome::NoData => self.settings.poll_interval(),
            };

            tokio::select! {
                _ = token.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.stop()
    }

    /// Releases held buttons, closes the adapter and stops.
    pub fn stop(mut self) -> MappingEngine<Stopped> {
        info!("Stopping mapping engine");
        if self.previous.is_some() {
            self.pause();
        }
        self.adapter.close();
        self.transition()
    }
}

impl MappingEngine<Stopped> {
    pub fn log_summary(&self) {
        let total = &self.stats.total;
        info!(
            "Engine stopped after {} ticks: {} snapshots, {} effects, {} sink failures",
            total.ticks, total.snapshots, total.effects, total.sink_failures
        );
    }
}
