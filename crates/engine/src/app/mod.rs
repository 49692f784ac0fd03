mod input;
mod loop_runner;
mod metrics;
mod presenter;
mod scene;

pub use input::{InputAction, InputCollector, InputEvent, InputSource, ScriptedInput};
pub use loop_runner::{
    run_headless, run_headless_with_metrics, AppError, FrameClock, LoopConfig, LoopExit,
    LoopSummary, SystemClock, SLOW_FRAME_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use presenter::{
    CameraPose, FrameMarker, FrameSnapshot, PresentedMessage, Presenter, RecordingPresenter,
    StatValue, TracingPresenter,
};
pub use scene::{InputSnapshot, Scene, SceneCommand};
