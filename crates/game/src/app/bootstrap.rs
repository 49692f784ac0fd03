use engine::{InputAction, InputEvent, LoopConfig, MetricsHandle, ScriptedInput};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::chat::ChatManager;
use super::config::{load_config, resolve_config_path, ConfigError, GameConfig};
use super::gameplay::{self, seed_from_clock, CityScene};

const DEMO_START_FRAME: u64 = 1;
const DEMO_WALK_FRAMES: (u64, u64) = (10, 130);
const DEMO_TURN_FRAME: u64 = 140;
const DEMO_STRAFE_FRAMES: (u64, u64) = (150, 240);
const DEMO_INTERACT_FRAME: u64 = 260;
const DEMO_QUIT_FRAME: u64 = 900;

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) scene: CityScene,
    pub(crate) input: ScriptedInput,
    pub(crate) metrics: MetricsHandle,
}

pub(crate) fn build_app(args: &[String]) -> Result<AppWiring, ConfigError> {
    info!("=== Block Walkers Startup ===");

    let config_path = resolve_config_path(args)?;
    let config = load_config(config_path.as_deref())?;
    match config_path.as_deref() {
        Some(path) => info!(path = %path.display(), "config_loaded"),
        None => info!("config_defaults_used"),
    }

    let seed = config.seed.unwrap_or_else(seed_from_clock);
    info!(seed, from_clock = config.seed.is_none(), "rng_seeded");

    let chat = ChatManager::from_config(&config.chat);
    info!(
        backend = ?config.chat.backend,
        available = chat.is_available(),
        "chat_configured"
    );

    let metrics = MetricsHandle::default();
    let scene = gameplay::build_city_scene(&config, seed, chat).with_metrics(metrics.clone());

    Ok(AppWiring {
        loop_config: config.loop_settings.to_loop_config(),
        scene,
        input: demo_input(&config),
        metrics,
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// Headless stand-in for a keyboard and pointer: start the game, take a walk,
/// look around, try to talk to whoever is close.
fn demo_input(config: &GameConfig) -> ScriptedInput {
    let mut input = ScriptedInput::new()
        .at(DEMO_START_FRAME, InputEvent::Start)
        .at(DEMO_START_FRAME, InputEvent::PointerLockChanged(true))
        .at(DEMO_WALK_FRAMES.0, InputEvent::Pressed(InputAction::MoveForward))
        .at(DEMO_WALK_FRAMES.1, InputEvent::Released(InputAction::MoveForward))
        .at(DEMO_TURN_FRAME, InputEvent::PointerMoved { dx: 400.0, dy: -40.0 })
        .at(DEMO_STRAFE_FRAMES.0, InputEvent::Pressed(InputAction::StrafeLeft))
        .at(DEMO_STRAFE_FRAMES.0, InputEvent::Pressed(InputAction::MoveForward))
        .at(DEMO_STRAFE_FRAMES.1, InputEvent::Released(InputAction::StrafeLeft))
        .at(DEMO_STRAFE_FRAMES.1, InputEvent::Released(InputAction::MoveForward))
        .at(DEMO_INTERACT_FRAME, InputEvent::Pressed(InputAction::Interact))
        .at(DEMO_INTERACT_FRAME + 1, InputEvent::Released(InputAction::Interact))
        .at(
            DEMO_INTERACT_FRAME + 60,
            InputEvent::SubmitText("Hi! What's worth seeing around here?".to_string()),
        )
        .at(DEMO_INTERACT_FRAME + 180, InputEvent::Pressed(InputAction::EndConversation))
        .at(
            DEMO_INTERACT_FRAME + 181,
            InputEvent::Released(InputAction::EndConversation),
        );

    if config.loop_settings.max_frames.is_none() {
        input.push(DEMO_QUIT_FRAME, InputEvent::Pressed(InputAction::Quit));
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_script_ends_itself_without_frame_budget() {
        let mut config = GameConfig::default();
        assert_eq!(
            demo_input(&config).last_scheduled_frame(),
            Some(DEMO_INTERACT_FRAME + 181)
        );

        config.loop_settings.max_frames = None;
        assert_eq!(demo_input(&config).last_scheduled_frame(), Some(DEMO_QUIT_FRAME));
    }

    #[test]
    fn build_app_rejects_unknown_arguments() {
        let err = build_app(&["--verbose".to_string()]).err().expect("error");
        assert!(matches!(err, ConfigError::UnknownArgument(arg) if arg == "--verbose"));
    }
}
