use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::LoopConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const CONFIG_ENV_VAR: &str = "BLOCKWALK_CONFIG";
const CONFIG_FLAG: &str = "--config";
/// Upper bound on `city_size / block_size`; the grid has `(2n + 1)^2` cells.
const MAX_GRID_EXTENT: f32 = 1024.0;
const MAX_NPC_COUNT: usize = 1024;

pub(crate) const DEFAULT_PROMPTS: [&str; 3] = [
    "You are a friendly resident of Block Walkers city. You are helpful and love to chat about the city. Keep your responses short and conversational.",
    "You are a mysterious stranger in Block Walkers city. You speak in cryptic and thought-provoking sentences. Keep your responses brief.",
    "You are an official city guide for Block Walkers. You are enthusiastic and knowledgeable about all the landmarks and secrets of the city. Keep your responses concise.",
];

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("missing value for {flag}")]
    MissingArgValue { flag: &'static str },
    #[error("unknown argument '{0}' (expected --config <path>)")]
    UnknownArgument(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct GameConfig {
    /// Fixed RNG seed; `None` derives one from the clock at startup.
    pub(crate) seed: Option<u64>,
    pub(crate) city: CityConfig,
    pub(crate) npc: NpcConfig,
    pub(crate) player: PlayerConfig,
    pub(crate) conversation_distance: f32,
    #[serde(rename = "loop")]
    pub(crate) loop_settings: LoopSettings,
    pub(crate) chat: ChatConfig,
    pub(crate) prompts: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: None,
            city: CityConfig::default(),
            npc: NpcConfig::default(),
            player: PlayerConfig::default(),
            conversation_distance: 4.0,
            loop_settings: LoopSettings::default(),
            chat: ChatConfig::default(),
            prompts: DEFAULT_PROMPTS.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CityConfig {
    pub(crate) city_size: f32,
    pub(crate) block_size: f32,
    pub(crate) building_probability: f64,
    pub(crate) min_height: f32,
    pub(crate) max_height: f32,
    /// Footprint side as a fraction of `block_size`.
    pub(crate) min_footprint: f32,
    pub(crate) max_footprint: f32,
}

impl Default for CityConfig {
    fn default() -> Self {
        Self {
            city_size: 100.0,
            block_size: 15.0,
            building_probability: 0.9,
            min_height: 10.0,
            max_height: 30.0,
            min_footprint: 0.6,
            max_footprint: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct NpcConfig {
    pub(crate) count: usize,
    pub(crate) speed_min: f32,
    pub(crate) speed_max: f32,
    pub(crate) turn_interval_min: f32,
    pub(crate) turn_interval_max: f32,
    pub(crate) ground_height: f32,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            count: 15,
            speed_min: 2.0,
            speed_max: 4.0,
            turn_interval_min: 3.0,
            turn_interval_max: 10.0,
            ground_height: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PlayerConfig {
    pub(crate) speed: f32,
    pub(crate) eye_height: f32,
    pub(crate) radius: f32,
    pub(crate) look_sensitivity: f32,
    pub(crate) spawn_x: f32,
    pub(crate) spawn_z: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed: 5.0,
            eye_height: 1.6,
            radius: 0.5,
            look_sensitivity: 0.002,
            spawn_x: 0.0,
            spawn_z: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LoopSettings {
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta_ms: u64,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) max_render_fps: Option<u32>,
    pub(crate) max_frames: Option<u64>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta_ms: 250,
            max_ticks_per_frame: 5,
            max_render_fps: Some(60),
            max_frames: Some(600),
        }
    }
}

impl LoopSettings {
    pub(crate) fn to_loop_config(&self) -> LoopConfig {
        LoopConfig {
            target_tps: self.target_tps,
            max_frame_delta: Duration::from_millis(self.max_frame_delta_ms),
            max_ticks_per_frame: self.max_ticks_per_frame,
            max_render_fps: self.max_render_fps,
            max_frames: self.max_frames,
            ..LoopConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ChatBackend {
    Canned,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ChatConfig {
    pub(crate) backend: ChatBackend,
    pub(crate) max_new_tokens: u32,
    pub(crate) temperature: f32,
    pub(crate) top_p: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: ChatBackend::Canned,
            max_new_tokens: 50,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl GameConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let city = &self.city;
        require_positive("city.city_size", city.city_size)?;
        require_positive("city.block_size", city.block_size)?;
        if city.block_size > city.city_size {
            return Err(invalid("city.block_size", "must not exceed city.city_size"));
        }
        if city.city_size / city.block_size > MAX_GRID_EXTENT {
            return Err(ConfigError::Invalid {
                field: "city.block_size",
                reason: format!(
                    "city.city_size / city.block_size must be at most {MAX_GRID_EXTENT}"
                ),
            });
        }
        if !(0.0..=1.0).contains(&city.building_probability) {
            return Err(invalid(
                "city.building_probability",
                "must be within [0, 1]",
            ));
        }
        require_positive("city.min_height", city.min_height)?;
        require_ordered("city.max_height", city.min_height, city.max_height)?;
        require_positive("city.min_footprint", city.min_footprint)?;
        require_ordered("city.max_footprint", city.min_footprint, city.max_footprint)?;
        if city.max_footprint >= 1.0 {
            return Err(invalid(
                "city.max_footprint",
                "must stay below 1.0 so buildings never reach road cells",
            ));
        }

        let npc = &self.npc;
        if npc.count > MAX_NPC_COUNT {
            return Err(ConfigError::Invalid {
                field: "npc.count",
                reason: format!("must be at most {MAX_NPC_COUNT}, got {}", npc.count),
            });
        }
        require_positive("npc.speed_min", npc.speed_min)?;
        require_ordered("npc.speed_max", npc.speed_min, npc.speed_max)?;
        require_positive("npc.turn_interval_min", npc.turn_interval_min)?;
        require_ordered(
            "npc.turn_interval_max",
            npc.turn_interval_min,
            npc.turn_interval_max,
        )?;

        let player = &self.player;
        require_positive("player.speed", player.speed)?;
        require_positive("player.radius", player.radius)?;
        require_positive("player.look_sensitivity", player.look_sensitivity)?;
        if !player.eye_height.is_finite() {
            return Err(invalid("player.eye_height", "must be finite"));
        }
        require_positive("conversation_distance", self.conversation_distance)?;

        if self.loop_settings.target_tps == 0 {
            return Err(invalid("loop.target_tps", "must be greater than zero"));
        }
        if self.loop_settings.max_frames == Some(0) {
            return Err(invalid("loop.max_frames", "must be greater than zero"));
        }

        if !(0.0..=1.0).contains(&self.chat.top_p) {
            return Err(invalid("chat.top_p", "must be within [0, 1]"));
        }
        if !(self.chat.temperature >= 0.0) {
            return Err(invalid("chat.temperature", "must be non-negative"));
        }
        if self.prompts.iter().all(|prompt| prompt.trim().is_empty()) {
            return Err(invalid("prompts", "at least one non-empty prompt required"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn require_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}

fn require_ordered(field: &'static str, min: f32, max: f32) -> Result<(), ConfigError> {
    if max.is_finite() && max >= min {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be >= the matching minimum ({min}), got {max}"),
        })
    }
}

/// `--config <path>` wins over the environment variable.
pub(crate) fn resolve_config_path(args: &[String]) -> Result<Option<PathBuf>, ConfigError> {
    let mut from_args = None;
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            CONFIG_FLAG => {
                let value = args
                    .get(index + 1)
                    .ok_or(ConfigError::MissingArgValue { flag: CONFIG_FLAG })?;
                from_args = Some(PathBuf::from(value));
                index += 2;
            }
            other => return Err(ConfigError::UnknownArgument(other.to_string())),
        }
    }
    if from_args.is_some() {
        return Ok(from_args);
    }

    match env::var(CONFIG_ENV_VAR) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(PathBuf::from(value))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(ConfigError::EnvVar {
            var: CONFIG_ENV_VAR,
            source,
        }),
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<GameConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            parse_config(&raw, path)?
        }
        None => GameConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> Result<GameConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, GameConfig>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        ConfigError::Parse {
            path: path.to_path_buf(),
            field: if field.is_empty() {
                ".".to_string()
            } else {
                field
            },
            source: error.into_inner(),
        }
    })
}
