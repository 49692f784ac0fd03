use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    /// Mean real time between frames, before the delta clamp.
    pub frame_time_ms: f32,
    pub worst_frame_ms: f32,
    /// Frames in the interval whose elapsed time hit `max_frame_delta`.
    pub clamped_frames: u32,
    /// Simulation time thrown away because a frame hit the tick cap.
    pub dropped_backlog_ms: f32,
}

/// Shared, read-mostly view of the latest loop metrics.
#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(LoopMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

/// What the loop observed about one frame.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameSample {
    pub(crate) raw_dt: Duration,
    pub(crate) clamped: bool,
    pub(crate) dropped_backlog: Duration,
}

#[derive(Debug, Default)]
struct IntervalCounters {
    frames: u32,
    ticks: u32,
    clamped_frames: u32,
    frame_time_sum: Duration,
    worst_frame: Duration,
    dropped_backlog: Duration,
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    counters: IntervalCounters,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            counters: IntervalCounters::default(),
        }
    }

    pub(crate) fn record_frame(&mut self, sample: FrameSample) {
        let counters = &mut self.counters;
        counters.frames = counters.frames.saturating_add(1);
        counters.frame_time_sum = counters.frame_time_sum.saturating_add(sample.raw_dt);
        counters.worst_frame = counters.worst_frame.max(sample.raw_dt);
        counters.dropped_backlog = counters
            .dropped_backlog
            .saturating_add(sample.dropped_backlog);
        if sample.clamped {
            counters.clamped_frames = counters.clamped_frames.saturating_add(1);
        }
    }

    pub(crate) fn record_tick(&mut self) {
        self.counters.ticks = self.counters.ticks.saturating_add(1);
    }

    /// Emits once per interval and starts a fresh one.
    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let counters = std::mem::take(&mut self.counters);
        self.interval_start = now;

        let seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = match counters.frames {
            0 => 0.0,
            frames => as_millis_f32(counters.frame_time_sum) / frames as f32,
        };
        Some(LoopMetricsSnapshot {
            fps: counters.frames as f32 / seconds,
            tps: counters.ticks as f32 / seconds,
            frame_time_ms,
            worst_frame_ms: as_millis_f32(counters.worst_frame),
            clamped_frames: counters.clamped_frames,
            dropped_backlog_ms: as_millis_f32(counters.dropped_backlog),
        })
    }
}

fn as_millis_f32(duration: Duration) -> f32 {
    duration.as_secs_f32() * 1000.0
}
