use std::env;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::input::{InputCollector, InputSource};
use super::metrics::{FrameSample, MetricsAccumulator};
use super::{MetricsHandle, Presenter, Scene, SceneCommand};

pub const SLOW_FRAME_ENV_VAR: &str = "BLOCKWALK_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
    pub max_frames: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: None,
            max_frames: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("max_frames must be greater than zero when set")]
    EmptyFrameBudget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    SceneQuit,
    InputQuit,
    FrameBudgetReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub ticks: u64,
    pub dropped_backlog: Duration,
    pub exit: LoopExit,
}

/// Time source for the loop. Swapped for a manual clock in tests.
pub trait FrameClock {
    fn now(&mut self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl FrameClock for SystemClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub fn run_headless(
    config: LoopConfig,
    scene: &mut dyn Scene,
    input: &mut dyn InputSource,
    presenter: &mut dyn Presenter,
) -> Result<LoopSummary, AppError> {
    let metrics_handle = MetricsHandle::default();
    run_headless_with_metrics(
        config,
        scene,
        input,
        presenter,
        &mut SystemClock,
        metrics_handle,
    )
}

pub fn run_headless_with_metrics(
    config: LoopConfig,
    scene: &mut dyn Scene,
    input: &mut dyn InputSource,
    presenter: &mut dyn Presenter,
    clock: &mut dyn FrameClock,
    metrics_handle: MetricsHandle,
) -> Result<LoopSummary, AppError> {
    if config.max_frames == Some(0) {
        return Err(AppError::EmptyFrameBudget);
    }

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        max_frames = ?config.max_frames,
        "loop_config"
    );

    scene.load(presenter);
    info!("scene_loaded");

    let mut input_collector = InputCollector::new();
    let mut accumulator = Duration::ZERO;
    let start = clock.now();
    let mut last_frame_instant = start;
    let mut last_present_instant = start;
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval, start);
    let mut last_title: Option<String> = None;
    let mut frame_index = 0u64;
    let mut total_ticks = 0u64;
    let mut total_dropped = Duration::ZERO;

    let exit = loop {
        for event in input.poll_events(frame_index) {
            input_collector.handle_event(event);
        }
        if input_collector.quit_requested() {
            info!(reason = "quit_action", "shutdown_requested");
            break LoopExit::InputQuit;
        }

        if slow_frame_delay > Duration::ZERO {
            // Explicit debug perturbation only; this is not the FPS cap.
            clock.sleep(slow_frame_delay);
        }

        let now = clock.now();
        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;

        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
        let was_clamped = clamped_frame_dt < raw_frame_dt;
        accumulator = accumulator.saturating_add(clamped_frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        let mut scene_quit = false;
        for _ in 0..step_plan.ticks_to_run {
            let input_snapshot = input_collector.snapshot_for_tick();
            let command = scene.update(fixed_dt_seconds, &input_snapshot, presenter);
            metrics_accumulator.record_tick();
            total_ticks = total_ticks.saturating_add(1);
            if command == SceneCommand::Quit {
                scene_quit = true;
                break;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            total_dropped = total_dropped.saturating_add(step_plan.dropped_backlog);
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        // Single authoritative FPS cap sleep point for render pacing.
        let elapsed_since_last_present =
            clock.now().saturating_duration_since(last_present_instant);
        let cap_sleep = compute_cap_sleep(elapsed_since_last_present, render_frame_target);
        if cap_sleep > Duration::ZERO {
            clock.sleep(cap_sleep);
        }

        scene.render(frame_index, presenter);
        last_present_instant = clock.now();

        let next_title = scene.debug_title();
        if next_title != last_title {
            if let Some(title) = &next_title {
                debug!(title = title.as_str(), "title_changed");
            }
            last_title = next_title;
        }

        metrics_accumulator.record_frame(FrameSample {
            raw_dt: raw_frame_dt,
            clamped: was_clamped,
            dropped_backlog: step_plan.dropped_backlog,
        });
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
            metrics_handle.publish(snapshot);
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                worst_frame_ms = snapshot.worst_frame_ms,
                clamped_frames = snapshot.clamped_frames,
                dropped_backlog_ms = snapshot.dropped_backlog_ms,
                "loop_metrics"
            );
        }

        frame_index = frame_index.saturating_add(1);
        if scene_quit {
            info!(reason = "scene_quit", "shutdown_requested");
            break LoopExit::SceneQuit;
        }
        if config.max_frames.is_some_and(|max| frame_index >= max) {
            info!(frames = frame_index, "frame_budget_reached");
            break LoopExit::FrameBudgetReached;
        }
    };

    scene.unload();
    info!(frames = frame_index, ticks = total_ticks, "shutdown");

    Ok(LoopSummary {
        frames: frame_index,
        ticks: total_ticks,
        dropped_backlog: total_dropped,
        exit,
    })
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}
