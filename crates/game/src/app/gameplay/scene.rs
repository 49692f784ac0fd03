use std::fmt;

use engine::{
    CameraPose, FrameMarker, FrameSnapshot, InputSnapshot, MetricsHandle, PresentedMessage,
    Presenter, Scene, SceneCommand, StatValue, Vec3,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use super::city::City;
use super::npc::{Npc, NpcId, NPC_BODY_HEIGHT};
use super::player::Player;
use super::PLAYER_SPEAKER;
use crate::app::chat::{ChatManager, PENDING_REPLY};
use crate::app::config::{NpcConfig, PlayerConfig};

/// Hint radius for the `nearby_npc` stat; starting a chat uses the configured
/// conversation distance instead.
const NEARBY_HINT_DISTANCE: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GamePhase {
    Menu,
    Playing,
    Chatting,
}

impl GamePhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Menu => "menu",
            Self::Playing => "playing",
            Self::Chatting => "chatting",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct SceneSettings {
    pub(crate) npc: NpcConfig,
    pub(crate) player: PlayerConfig,
    pub(crate) conversation_distance: f32,
    pub(crate) prompts: Vec<String>,
}

pub(crate) struct CityScene {
    settings: SceneSettings,
    rng: ChaCha8Rng,
    phase: GamePhase,
    city: City,
    player: Player,
    npcs: Vec<Npc>,
    chat: ChatManager,
    active_npc: Option<NpcId>,
    metrics: Option<MetricsHandle>,
}

impl CityScene {
    pub(crate) fn new(settings: SceneSettings, city: City, chat: ChatManager, rng: ChaCha8Rng) -> Self {
        let player = Player::new(&settings.player);
        Self {
            settings,
            rng,
            phase: GamePhase::Menu,
            city,
            player,
            npcs: Vec::new(),
            chat,
            active_npc: None,
            metrics: None,
        }
    }

    pub(crate) fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn phase(&self) -> GamePhase {
        self.phase
    }

    pub(crate) fn city(&self) -> &City {
        &self.city
    }

    pub(crate) fn player(&self) -> &Player {
        &self.player
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    pub(crate) fn npcs(&self) -> &[Npc] {
        &self.npcs
    }

    #[cfg(test)]
    pub(crate) fn chat(&self) -> &ChatManager {
        &self.chat
    }

    #[cfg(test)]
    pub(crate) fn active_npc(&self) -> Option<NpcId> {
        self.active_npc
    }

    /// Menu -> Playing: build the city, then place the player and the NPCs.
    pub(crate) fn start_game(&mut self) {
        self.city.generate(&mut self.rng);
        self.player = Player::new(&self.settings.player);
        self.player
            .settle(self.city.buildings(), self.city.bounds());
        self.spawn_npcs(self.settings.npc.count);
        self.phase = GamePhase::Playing;
        info!(
            buildings = self.city.buildings().len(),
            npcs = self.npcs.len(),
            "game_started"
        );
    }

    /// Positions come from the city's rejection sampler; any shortfall is
    /// covered by unchecked points in the central half of the city.
    pub(crate) fn spawn_npcs(&mut self, count: usize) {
        self.npcs.clear();
        let positions = self.city.find_valid_positions(count, &mut self.rng);
        let fallback_span = self.city.city_size();

        for index in 0..count {
            let position = match positions.get(index) {
                Some(position) => *position,
                None => {
                    let x = (self.rng.gen::<f32>() - 0.5) * fallback_span;
                    let z = (self.rng.gen::<f32>() - 0.5) * fallback_span;
                    debug!(npc = index, x, z, "npc_spawn_fallback");
                    Vec3::new(x, 0.0, z)
                }
            };
            let npc = Npc::spawn(NpcId(index), position, &self.settings.npc, &mut self.rng);
            debug!(
                npc = %npc.id(),
                x = npc.position().x,
                z = npc.position().z,
                speed = npc.speed(),
                color = %format!("#{:06x}", npc.color()),
                "npc_spawned"
            );
            self.npcs.push(npc);
        }
    }

    /// First NPC in spawn order strictly closer than `radius` on the ground plane.
    pub(crate) fn npc_within(&self, radius: f32) -> Option<&Npc> {
        let player = self.player.position();
        self.npcs
            .iter()
            .find(|npc| horizontal_distance(player, npc.position()) < radius)
    }

    fn nearest_npc_hint(&self) -> Option<NpcId> {
        let player = self.player.position();
        self.npcs
            .iter()
            .map(|npc| (npc.id(), horizontal_distance(player, npc.position())))
            .filter(|(_, distance)| *distance < NEARBY_HINT_DISTANCE)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub(crate) fn interact(&mut self, presenter: &mut dyn Presenter) {
        if self.phase != GamePhase::Playing {
            return;
        }
        if !self.chat.is_available() {
            warn!("chat_unavailable_for_interaction");
            return;
        }
        let Some(npc_id) = self
            .npc_within(self.settings.conversation_distance)
            .map(Npc::id)
        else {
            debug!("no_npc_in_range");
            return;
        };

        let persona = self.pick_persona();
        self.chat.start_conversation(&npc_id.to_string(), &persona);
        self.active_npc = Some(npc_id);
        self.phase = GamePhase::Chatting;
        presenter.show_message(&PresentedMessage {
            speaker: npc_id.to_string(),
            text: PENDING_REPLY.to_string(),
            replace_last: false,
        });
    }

    fn pick_persona(&mut self) -> String {
        if self.settings.prompts.is_empty() {
            return String::new();
        }
        let index = self.rng.gen_range(0..self.settings.prompts.len());
        self.settings.prompts[index].clone()
    }

    pub(crate) fn end_conversation(&mut self) {
        if self.phase != GamePhase::Chatting {
            return;
        }
        self.chat.end_conversation();
        self.active_npc = None;
        self.phase = GamePhase::Playing;
    }

    pub(crate) fn submit_text(&mut self, text: &str, presenter: &mut dyn Presenter) {
        if self.phase != GamePhase::Chatting {
            return;
        }
        let Some(npc_id) = self.active_npc else {
            return;
        };
        match self.chat.send_message(text) {
            Ok(()) => {
                presenter.show_message(&PresentedMessage {
                    speaker: PLAYER_SPEAKER.to_string(),
                    text: text.trim().to_string(),
                    replace_last: false,
                });
                presenter.show_message(&PresentedMessage {
                    speaker: npc_id.to_string(),
                    text: PENDING_REPLY.to_string(),
                    replace_last: false,
                });
            }
            Err(err) => debug!(error = %err, "chat_message_rejected"),
        }
    }

    fn poll_chat(&mut self, presenter: &mut dyn Presenter) {
        let Some(reply) = self.chat.poll() else {
            return;
        };
        let Some(npc_id) = self.active_npc else {
            return;
        };
        presenter.show_message(&PresentedMessage {
            speaker: npc_id.to_string(),
            text: reply,
            replace_last: true,
        });
    }

    /// One fixed simulation step. The player only moves while `Playing`;
    /// NPCs keep wandering during a conversation.
    pub(crate) fn tick(&mut self, dt: f32, input: &InputSnapshot, presenter: &mut dyn Presenter) {
        match self.phase {
            GamePhase::Menu => {
                if input.start_pressed() {
                    self.start_game();
                }
            }
            GamePhase::Playing => {
                self.player
                    .update(dt, input, self.city.buildings(), self.city.bounds());
                if input.interact_pressed() {
                    self.interact(presenter);
                }
            }
            GamePhase::Chatting => {
                if let Some(text) = input.submitted_text() {
                    self.submit_text(text, presenter);
                }
                if input.end_conversation_pressed() {
                    self.end_conversation();
                }
            }
        }

        if self.phase != GamePhase::Menu {
            let bounds = self.city.bounds();
            for npc in &mut self.npcs {
                npc.update(dt, self.city.buildings(), bounds, &mut self.rng);
            }
            self.poll_chat(presenter);
        }
    }

    fn frame_snapshot(&self, frame_index: u64) -> FrameSnapshot {
        let markers = self
            .npcs
            .iter()
            .map(|npc| FrameMarker {
                label: npc.id().to_string(),
                position: npc.position() + Vec3::UP * (NPC_BODY_HEIGHT * 0.5),
            })
            .collect();
        FrameSnapshot {
            frame_index,
            camera: CameraPose {
                position: self.player.position(),
                yaw: self.player.yaw(),
                pitch: self.player.pitch(),
            },
            markers,
            building_count: self.city.buildings().len(),
        }
    }

    fn publish_stats(&self, presenter: &mut dyn Presenter) {
        let position = self.player.position();
        presenter.update_stat("game_phase", StatValue::Text(self.phase.to_string()));
        presenter.update_stat(
            "player_position",
            StatValue::Text(format!(
                "({:.1}, {:.1}, {:.1})",
                position.x, position.y, position.z
            )),
        );
        let nearby = self
            .nearest_npc_hint()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());
        presenter.update_stat("nearby_npc", StatValue::Text(nearby));
        presenter.update_stat("npc_count", StatValue::Int(self.npcs.len() as i64));
        presenter.update_stat(
            "building_count",
            StatValue::Int(self.city.buildings().len() as i64),
        );
        if let Some(metrics) = self.metrics.as_ref() {
            presenter.update_stat("fps", StatValue::Float(f64::from(metrics.snapshot().fps)));
        }
    }
}

fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    a.horizontal().distance(b.horizontal())
}

impl Scene for CityScene {
    fn load(&mut self, presenter: &mut dyn Presenter) {
        self.phase = GamePhase::Menu;
        self.npcs.clear();
        self.city.clear_city();
        self.active_npc = None;
        info!(
            chat_available = self.chat.is_available(),
            npc_count = self.settings.npc.count,
            "scene_loaded"
        );
        self.publish_stats(presenter);
    }

    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        presenter: &mut dyn Presenter,
    ) -> SceneCommand {
        if input.quit_requested() {
            return SceneCommand::Quit;
        }
        self.tick(fixed_dt_seconds, input, presenter);
        SceneCommand::None
    }

    fn render(&mut self, frame_index: u64, presenter: &mut dyn Presenter) {
        presenter.render_frame(&self.frame_snapshot(frame_index));
        self.publish_stats(presenter);
    }

    fn unload(&mut self) {
        self.chat.end_conversation();
        self.active_npc = None;
        info!(phase = %self.phase, npcs = self.npcs.len(), "scene_unloaded");
    }

    fn debug_title(&self) -> Option<String> {
        Some(format!(
            "Block Walkers | {} | NPCs: {} | Buildings: {}",
            self.phase,
            self.npcs.len(),
            self.city.buildings().len()
        ))
    }
}
