mod city;
mod movement;
mod npc;
mod player;
mod scene;
mod util;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::app::chat::ChatManager;
use crate::app::config::GameConfig;

use city::City;
use scene::SceneSettings;

pub(crate) use scene::CityScene;
pub(crate) use util::seed_from_clock;

pub(crate) const PLAYER_SPEAKER: &str = "You";

/// Wires a scene from loaded config. All randomness in the run flows from
/// `seed`, so two scenes built with the same seed and input play out alike.
pub(crate) fn build_city_scene(config: &GameConfig, seed: u64, chat: ChatManager) -> CityScene {
    let settings = SceneSettings {
        npc: config.npc.clone(),
        player: config.player.clone(),
        conversation_distance: config.conversation_distance,
        prompts: config.prompts.clone(),
    };
    CityScene::new(
        settings,
        City::new(config.city.clone()),
        chat,
        ChaCha8Rng::seed_from_u64(seed),
    )
}

#[cfg(test)]
mod tests;
