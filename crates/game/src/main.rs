mod app;

use std::process::ExitCode;

use tracing::error;

fn main() -> ExitCode {
    app::bootstrap::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match app::bootstrap::build_app(&args) {
        Ok(wiring) => app::loop_runner::run(wiring),
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
