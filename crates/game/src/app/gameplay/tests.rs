use std::f32::consts::FRAC_PI_2;
use std::thread;
use std::time::Duration;

use engine::{
    run_headless, Aabb, InputAction, InputEvent, InputSnapshot, LoopConfig, LoopExit,
    PresentedMessage, RecordingPresenter, ScriptedInput, StatValue, Vec3,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::city::{Building, City, GridCell};
use super::movement::{
    is_position_valid, push_out_of_buildings, resolve_npc_step, resolve_player_motion, WorldBounds,
};
use super::npc::{Npc, NpcId};
use super::player::Player;
use super::scene::GamePhase;
use super::*;
use crate::app::chat::{
    ChatMessage, GenerationError, GenerationParams, TextGenerator, GENERATION_FAILED_REPLY,
    PENDING_REPLY,
};
use crate::app::config::{CityConfig, GameConfig, PlayerConfig};

const DT: f32 = 1.0 / 60.0;
const EPSILON: f32 = 1e-4;

fn assert_vec3_close(actual: Vec3, expected: Vec3) {
    assert!(
        actual.distance(expected) <= EPSILON,
        "expected {expected:?}, got {actual:?}"
    );
}

fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

fn snapshot_from_actions(actions: &[InputAction]) -> InputSnapshot {
    let mut snapshot = InputSnapshot::empty();
    for action in actions {
        snapshot = snapshot.with_action_down(*action, true);
    }
    snapshot
}

fn generated_city(seed: u64, config: CityConfig) -> City {
    let mut city = City::new(config);
    city.generate(&mut rng(seed));
    city
}

fn box_building(min: Vec3, max: Vec3) -> Building {
    Building {
        cell: GridCell { i: 1, j: 1 },
        volume: Aabb { min, max },
        color: 0x4a4a4a,
    }
}

fn open_city_config() -> GameConfig {
    let mut config = GameConfig::default();
    config.city.building_probability = 0.0;
    config
}

fn scene_with_chat(config: &GameConfig, seed: u64, chat: ChatManager) -> CityScene {
    let mut scene = build_city_scene(config, seed, chat);
    scene.start_game();
    scene
}

fn canned_chat(config: &GameConfig) -> ChatManager {
    ChatManager::from_config(&config.chat)
}

fn tick_until_reply(scene: &mut CityScene, presenter: &mut RecordingPresenter) {
    for _ in 0..1000 {
        scene.tick(DT, &InputSnapshot::empty(), presenter);
        if !scene.chat().is_reply_pending() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("chat reply never arrived");
}

struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    fn generate(
        &mut self,
        _messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Failed("inference backend crashed".into()))
    }
}

#[test]
fn default_city_grid_covers_169_cells() {
    let mut config = CityConfig::default();
    config.building_probability = 1.0;
    let city = generated_city(7, config);

    assert_eq!(city.grid_extent(), 6);
    assert_eq!(city.roads().len(), 105);
    assert_eq!(city.buildings().len(), 64);
    assert_eq!(city.roads().len() + city.buildings().len(), 169);
}

#[test]
fn no_building_sits_on_a_road_cell() {
    for seed in 0..8 {
        let city = generated_city(seed, CityConfig::default());
        for building in city.buildings() {
            assert!(!building.cell.is_road(), "building on road {:?}", building.cell);
        }
        for road in city.roads() {
            assert!(road.is_road());
        }
    }
}

#[test]
fn generated_buildings_never_overlap() {
    for seed in 0..8 {
        let city = generated_city(seed, CityConfig::default());
        let buildings = city.buildings();
        for (index, a) in buildings.iter().enumerate() {
            for b in &buildings[index + 1..] {
                assert!(
                    !a.volume.intersects(&b.volume),
                    "{:?} overlaps {:?}",
                    a.cell,
                    b.cell
                );
            }
        }
    }
}

#[test]
fn buildings_stand_on_the_ground_within_height_range() {
    let city = generated_city(3, CityConfig::default());
    for building in city.buildings() {
        let size = building.volume.size();
        assert!(building.volume.min.y.abs() <= EPSILON);
        assert!((10.0..30.0 + EPSILON).contains(&size.y));
        assert!(size.x >= 15.0 * 0.6 - EPSILON && size.x <= 15.0 * 0.9 + EPSILON);
        assert!(size.z >= 15.0 * 0.6 - EPSILON && size.z <= 15.0 * 0.9 + EPSILON);
    }
}

#[test]
fn same_seed_generates_same_city() {
    let a = generated_city(99, CityConfig::default());
    let b = generated_city(99, CityConfig::default());
    assert_eq!(a.buildings(), b.buildings());
}

#[test]
fn clear_city_is_idempotent() {
    let mut city = generated_city(5, CityConfig::default());
    assert!(!city.buildings().is_empty());

    city.clear_city();
    city.clear_city();
    assert!(city.buildings().is_empty());
    assert!(city.roads().is_empty());

    city.generate(&mut rng(5));
    assert_eq!(city.generation(), 2);
    assert_eq!(city.roads().len(), 105);
}

#[test]
fn valid_positions_are_outside_buildings_and_inside_spawn_area() {
    let city = generated_city(11, CityConfig::default());
    let positions = city.find_valid_positions(50, &mut rng(12));
    assert!(!positions.is_empty());
    assert!(positions.len() <= 50);
    for position in positions {
        assert!(!city.is_inside_building(position));
        assert!(position.x.abs() <= 90.0 && position.z.abs() <= 90.0);
        assert_eq!(position.y, 0.0);
    }
}

#[test]
fn city_building_check_agrees_with_npc_position_validity() {
    let city = generated_city(13, CityConfig::default());
    let inside = city.buildings()[0].volume.clamp_point(Vec3::ZERO);
    let candidates = [inside, Vec3::ZERO, Vec3::new(22.5, 0.0, 7.5), Vec3::new(-30.0, 0.0, 45.0)];
    for point in candidates {
        assert_eq!(
            city.is_inside_building(point),
            !is_position_valid(point, city.buildings(), city.bounds()),
            "disagreement at {point:?}"
        );
    }
    assert!(city.is_inside_building(inside));
}

#[test]
fn npc_walks_straight_when_path_is_clear() {
    let mut npc = Npc::with_state(NpcId(0), Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 2.0, 5.0, 0.0);
    npc.update(1.0, &[], WorldBounds::new(100.0), &mut rng(1));
    assert_vec3_close(npc.position(), Vec3::new(2.0, 0.0, 0.0));
    assert_vec3_close(npc.direction(), Vec3::new(1.0, 0.0, 0.0));
}

#[test]
fn npc_reverses_when_step_enters_a_building() {
    let wall = box_building(Vec3::new(1.5, 0.0, -1.0), Vec3::new(3.5, 10.0, 1.0));
    let mut npc = Npc::with_state(NpcId(0), Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 2.0, 5.0, 0.0);
    npc.update(1.0, &[wall], WorldBounds::new(100.0), &mut rng(1));
    assert_vec3_close(npc.position(), Vec3::new(-2.0, 0.0, 0.0));
    assert_vec3_close(npc.direction(), Vec3::new(-1.0, 0.0, 0.0));
}

#[test]
fn npc_reverses_at_world_edge() {
    let step = resolve_npc_step(
        Vec3::new(99.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        2.0,
        &[],
        WorldBounds::new(100.0),
    );
    assert!(step.bounced);
    assert_vec3_close(step.position, Vec3::new(97.0, 0.0, 0.0));
}

#[test]
fn npc_picks_new_heading_after_turn_interval() {
    let mut npc = Npc::with_state(NpcId(0), Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0.0, 0.5, 0.0);
    npc.update(0.4, &[], WorldBounds::new(100.0), &mut rng(2));
    assert_vec3_close(npc.direction(), Vec3::new(1.0, 0.0, 0.0));
    npc.update(0.4, &[], WorldBounds::new(100.0), &mut rng(2));
    assert!((npc.direction().length() - 1.0).abs() <= EPSILON);
    assert_eq!(npc.direction().y, 0.0);
}

#[test]
fn spawned_npcs_use_configured_ranges() {
    let config = GameConfig::default();
    let mut generator = rng(21);
    for index in 0..32 {
        let npc = Npc::spawn(NpcId(index), Vec3::ZERO, &config.npc, &mut generator);
        assert!((2.0..4.0).contains(&npc.speed()));
        assert!((3.0..10.0).contains(&npc.turn_interval()));
        assert!((npc.direction().length() - 1.0).abs() <= EPSILON);
        assert_eq!(npc.id().to_string(), format!("npc_{index}"));
    }
}

#[test]
fn player_is_pushed_out_by_penetration_depth() {
    let building = box_building(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 10.0, 1.0));
    let pushed = push_out_of_buildings(Vec3::new(1.3, 1.6, 0.0), &[building.clone()], 0.5);
    assert_vec3_close(pushed, Vec3::new(1.5, 1.6, 0.0));

    let resolved = resolve_player_motion(
        Vec3::new(1.2, 1.6, 0.0),
        Vec3::new(0.1, 0.0, 0.0),
        &[building],
        WorldBounds::new(100.0),
        0.5,
        1.6,
    );
    assert_vec3_close(resolved, Vec3::new(1.5, 1.6, 0.0));
}

#[test]
fn player_basis_follows_yaw() {
    let player = Player::new(&PlayerConfig::default());
    assert_vec3_close(player.forward(), Vec3::new(0.0, 0.0, -1.0));
    assert_vec3_close(player.right(), Vec3::new(1.0, 0.0, 0.0));
    assert_vec3_close(player.position(), Vec3::new(0.0, 1.6, 5.0));
}

#[test]
fn diagonal_movement_is_not_faster() {
    let player = Player::new(&PlayerConfig::default());
    let straight = player.movement_displacement(&snapshot_from_actions(&[InputAction::MoveForward]), DT);
    let diagonal = player.movement_displacement(
        &snapshot_from_actions(&[InputAction::MoveForward, InputAction::StrafeRight]),
        DT,
    );
    assert!((straight.length() - 5.0 * DT).abs() <= EPSILON);
    assert!((diagonal.length() - straight.length()).abs() <= EPSILON);
}

#[test]
fn opposite_keys_cancel_out() {
    let player = Player::new(&PlayerConfig::default());
    let displacement = player.movement_displacement(
        &snapshot_from_actions(&[InputAction::MoveForward, InputAction::MoveBack]),
        DT,
    );
    assert_vec3_close(displacement, Vec3::ZERO);
}

#[test]
fn look_pitch_is_clamped() {
    let mut player = Player::new(&PlayerConfig::default());
    player.apply_look(0.0, 1.0e6);
    assert!((player.pitch() + FRAC_PI_2).abs() <= EPSILON);
    player.apply_look(0.0, -1.0e7);
    assert!((player.pitch() - FRAC_PI_2).abs() <= EPSILON);

    player.apply_look(100.0, 0.0);
    assert!((player.yaw() + 0.2).abs() <= EPSILON);
}

#[test]
fn player_stays_inside_bounds_and_at_eye_height() {
    let mut player = Player::new(&PlayerConfig::default());
    player.set_position(Vec3::new(0.0, 0.0, 95.0));
    let input = snapshot_from_actions(&[InputAction::MoveBack, InputAction::StrafeRight]);
    for _ in 0..600 {
        player.update(DT, &input, &[], WorldBounds::new(100.0));
    }
    let position = player.position();
    assert!(position.x <= 100.0 && position.z <= 100.0);
    assert!((position.z - 100.0).abs() <= EPSILON);
    assert!((position.y - 1.6).abs() <= EPSILON);
}

#[test]
fn actors_stay_in_bounds_over_many_ticks() {
    let config = GameConfig::default();
    let mut scene = scene_with_chat(&config, 2024, ChatManager::new(None, GenerationParams::from(&config.chat)));
    let mut presenter = RecordingPresenter::new();
    let input = snapshot_from_actions(&[InputAction::MoveForward, InputAction::StrafeLeft]);
    for _ in 0..1200 {
        scene.tick(DT, &input, &mut presenter);
        let bounds = scene.city().bounds();
        for npc in scene.npcs() {
            assert!(bounds.contains_horizontal(npc.position()), "{} escaped", npc.id());
            assert_eq!(npc.position().y, 0.0);
        }
        assert!(bounds.contains_horizontal(scene.player().position()));
    }
}

#[test]
fn menu_waits_for_start() {
    let config = GameConfig::default();
    let mut scene = build_city_scene(&config, 1, canned_chat(&config));
    let mut presenter = RecordingPresenter::new();

    scene.tick(DT, &snapshot_from_actions(&[InputAction::MoveForward]), &mut presenter);
    assert_eq!(scene.phase(), GamePhase::Menu);
    assert!(scene.npcs().is_empty());
    assert_vec3_close(scene.player().position(), Vec3::new(0.0, 1.6, 5.0));

    scene.tick(DT, &InputSnapshot::empty().with_start_pressed(true), &mut presenter);
    assert_eq!(scene.phase(), GamePhase::Playing);
    assert_eq!(scene.npcs().len(), 15);
    assert!(!scene.city().buildings().is_empty());
}

#[test]
fn spawn_npcs_always_fills_requested_count() {
    let mut config = GameConfig::default();
    config.city.building_probability = 1.0;
    config.city.min_footprint = 0.95;
    config.city.max_footprint = 0.99;
    let mut scene = scene_with_chat(&config, 8, canned_chat(&config));

    scene.spawn_npcs(40);
    assert_eq!(scene.npcs().len(), 40);
    for (index, npc) in scene.npcs().iter().enumerate() {
        assert_eq!(npc.id(), NpcId(index));
        let position = npc.position();
        let validated = !scene.city().is_inside_building(position);
        let fallback = position.x.abs() <= 50.0 && position.z.abs() <= 50.0;
        assert!(validated || fallback, "{} at {:?}", npc.id(), position);
    }
}

#[test]
fn interact_starts_conversation_with_first_npc_in_range() {
    let config = open_city_config();
    let mut scene = scene_with_chat(&config, 31, canned_chat(&config));
    let mut presenter = RecordingPresenter::new();

    let target = scene.npcs()[4].position();
    scene
        .player_mut()
        .set_position(target + Vec3::new(1.0, 0.0, 0.0));
    let expected = scene.npc_within(4.0).map(|npc| npc.id()).expect("npc in range");

    scene.tick(DT, &InputSnapshot::empty().with_interact_pressed(true), &mut presenter);
    assert_eq!(scene.phase(), GamePhase::Chatting);
    assert_eq!(scene.active_npc(), Some(expected));
    assert_eq!(
        presenter.messages[0],
        PresentedMessage {
            speaker: expected.to_string(),
            text: PENDING_REPLY.to_string(),
            replace_last: false,
        }
    );

    tick_until_reply(&mut scene, &mut presenter);
    let transcript = presenter.transcript();
    assert_eq!(transcript.len(), 1);
    assert_ne!(transcript[0].1, PENDING_REPLY);
}

#[test]
fn interact_without_npc_in_range_stays_playing() {
    let mut config = open_city_config();
    config.npc.count = 0;
    let mut scene = scene_with_chat(&config, 4, canned_chat(&config));
    let mut presenter = RecordingPresenter::new();

    scene.tick(DT, &InputSnapshot::empty().with_interact_pressed(true), &mut presenter);
    assert_eq!(scene.phase(), GamePhase::Playing);
    assert!(presenter.messages.is_empty());
}

#[test]
fn interact_is_ignored_when_chat_is_unavailable() {
    let config = open_city_config();
    let chat = ChatManager::new(None, GenerationParams::from(&config.chat));
    let mut scene = scene_with_chat(&config, 9, chat);
    let mut presenter = RecordingPresenter::new();

    let target = scene.npcs()[0].position();
    scene.player_mut().set_position(target);
    scene.tick(DT, &InputSnapshot::empty().with_interact_pressed(true), &mut presenter);
    assert_eq!(scene.phase(), GamePhase::Playing);
    assert!(scene.chat().session().is_none());
}

#[test]
fn chatting_freezes_player_but_not_npcs() {
    let config = open_city_config();
    let mut scene = scene_with_chat(&config, 17, canned_chat(&config));
    let mut presenter = RecordingPresenter::new();
    let target = scene.npcs()[0].position();
    scene.player_mut().set_position(target);
    scene.tick(DT, &InputSnapshot::empty().with_interact_pressed(true), &mut presenter);
    assert_eq!(scene.phase(), GamePhase::Chatting);

    let player_before = scene.player().position();
    let yaw_before = scene.player().yaw();
    let npcs_before: Vec<Vec3> = scene.npcs().iter().map(|npc| npc.position()).collect();
    let input = snapshot_from_actions(&[InputAction::MoveForward]).with_look_delta(50.0, 10.0);
    for _ in 0..30 {
        scene.tick(DT, &input, &mut presenter);
    }
    assert_vec3_close(scene.player().position(), player_before);
    assert_eq!(scene.player().yaw(), yaw_before);
    let npcs_after: Vec<Vec3> = scene.npcs().iter().map(|npc| npc.position()).collect();
    assert_ne!(npcs_before, npcs_after);

    scene.tick(
        DT,
        &InputSnapshot::empty().with_end_conversation_pressed(true),
        &mut presenter,
    );
    assert_eq!(scene.phase(), GamePhase::Playing);
    assert!(scene.chat().session().is_none());
    assert_eq!(scene.active_npc(), None);
}

#[test]
fn submitted_text_round_trips_through_chat_window() {
    let config = open_city_config();
    let mut scene = scene_with_chat(&config, 23, canned_chat(&config));
    let mut presenter = RecordingPresenter::new();
    let target = scene.npcs()[2].position();
    scene.player_mut().set_position(target);
    scene.tick(DT, &InputSnapshot::empty().with_interact_pressed(true), &mut presenter);
    tick_until_reply(&mut scene, &mut presenter);

    scene.tick(
        DT,
        &InputSnapshot::empty().with_submitted_text("  what's good around here?  "),
        &mut presenter,
    );
    tick_until_reply(&mut scene, &mut presenter);

    let transcript = presenter.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(
        transcript[1],
        (PLAYER_SPEAKER.to_string(), "what's good around here?".to_string())
    );
    assert_ne!(transcript[2].1, PENDING_REPLY);

    let session = scene.chat().session().expect("session");
    assert_eq!(session.messages.len(), 4);
}

#[test]
fn generation_failure_shows_fallback_without_duplicate_lines() {
    let config = open_city_config();
    let chat = ChatManager::new(
        Some(Box::new(FailingGenerator)),
        GenerationParams::from(&config.chat),
    );
    let mut scene = scene_with_chat(&config, 41, chat);
    let mut presenter = RecordingPresenter::new();
    let target = scene.npcs()[1].position();
    scene.player_mut().set_position(target);

    scene.tick(DT, &InputSnapshot::empty().with_interact_pressed(true), &mut presenter);
    tick_until_reply(&mut scene, &mut presenter);

    let npc = scene.active_npc().expect("active npc").to_string();
    assert_eq!(
        presenter.transcript(),
        vec![(npc, GENERATION_FAILED_REPLY.to_string())]
    );
    let session = scene.chat().session().expect("session");
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].content, GENERATION_FAILED_REPLY);
    assert_eq!(scene.phase(), GamePhase::Chatting);
}

#[test]
fn render_publishes_frame_and_status_stats() {
    let config = GameConfig::default();
    let mut scene = scene_with_chat(&config, 13, canned_chat(&config));
    let mut presenter = RecordingPresenter::new();

    engine::Scene::render(&mut scene, 7, &mut presenter);
    let frame = presenter.frames.last().expect("frame");
    assert_eq!(frame.frame_index, 7);
    assert_eq!(frame.markers.len(), 15);
    assert_eq!(frame.building_count, scene.city().buildings().len());
    assert_vec3_close(frame.camera.position, scene.player().position());

    assert_eq!(
        presenter.stats.get("game_phase"),
        Some(&StatValue::Text("playing".to_string()))
    );
    assert_eq!(presenter.stats.get("npc_count"), Some(&StatValue::Int(15)));
    assert_eq!(
        presenter.stats.get("building_count"),
        Some(&StatValue::Int(scene.city().buildings().len() as i64))
    );
    assert!(presenter.stats.contains_key("player_position"));
    assert!(presenter.stats.contains_key("nearby_npc"));
}

#[test]
fn same_seed_and_input_replay_identically() {
    let config = GameConfig::default();
    let run = |seed: u64| {
        let chat = ChatManager::new(None, GenerationParams::from(&config.chat));
        let mut scene = scene_with_chat(&config, seed, chat);
        let mut presenter = RecordingPresenter::new();
        let input = snapshot_from_actions(&[InputAction::MoveForward]).with_look_delta(3.0, 0.0);
        for _ in 0..240 {
            scene.tick(DT, &input, &mut presenter);
        }
        let npcs: Vec<Vec3> = scene.npcs().iter().map(|npc| npc.position()).collect();
        (scene.player().position(), npcs)
    };
    assert_eq!(run(77), run(77));
}

#[test]
fn headless_loop_drives_scene_from_scripted_input() {
    let config = GameConfig::default();
    let mut scene = build_city_scene(&config, 3, canned_chat(&config));
    let mut input = ScriptedInput::new()
        .at(0, InputEvent::Start)
        .at(1, InputEvent::Pressed(InputAction::MoveForward));
    let mut presenter = RecordingPresenter::new();
    let loop_config = LoopConfig {
        max_render_fps: Some(120),
        max_frames: Some(24),
        ..LoopConfig::default()
    };

    let summary = run_headless(loop_config, &mut scene, &mut input, &mut presenter).expect("loop");
    assert_eq!(summary.frames, 24);
    assert_eq!(summary.exit, LoopExit::FrameBudgetReached);
    assert_eq!(presenter.frames.len(), 24);
    assert_eq!(scene.phase(), GamePhase::Playing);
}
