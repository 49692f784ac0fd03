pub mod app;
pub mod math;

pub use app::{
    run_headless, run_headless_with_metrics, AppError, CameraPose, FrameClock, FrameMarker,
    FrameSnapshot, InputAction, InputCollector, InputEvent, InputSnapshot, InputSource,
    LoopConfig, LoopExit, LoopMetricsSnapshot, LoopSummary, MetricsHandle, PresentedMessage,
    Presenter, RecordingPresenter, Scene, SceneCommand, ScriptedInput, StatValue, SystemClock,
    TracingPresenter, SLOW_FRAME_ENV_VAR,
};
pub use math::{clamp, Aabb, Vec3};
