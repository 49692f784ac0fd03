use std::process::ExitCode;

use engine::{run_headless_with_metrics, SystemClock, TracingPresenter};
use tracing::{error, info};

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        loop_config,
        mut scene,
        mut input,
        metrics,
    } = app;
    let mut presenter = TracingPresenter::new();

    let summary = match run_headless_with_metrics(
        loop_config,
        &mut scene,
        &mut input,
        &mut presenter,
        &mut SystemClock,
        metrics.clone(),
    ) {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %err, "loop_failed");
            return ExitCode::FAILURE;
        }
    };

    let position = scene.player().position();
    let final_metrics = metrics.snapshot();
    info!(
        frames = summary.frames,
        ticks = summary.ticks,
        dropped_backlog_ms = summary.dropped_backlog.as_millis() as u64,
        exit = ?summary.exit,
        phase = %scene.phase(),
        npcs = scene.npcs().len(),
        buildings = scene.city().buildings().len(),
        player_x = position.x,
        player_z = position.z,
        fps = final_metrics.fps,
        frames_presented = presenter.frames_rendered(),
        "run_finished"
    );
    ExitCode::SUCCESS
}
