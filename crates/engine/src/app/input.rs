use std::collections::BTreeMap;

use super::scene::InputSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveForward,
    MoveBack,
    StrafeLeft,
    StrafeRight,
    Interact,
    EndConversation,
    Quit,
}

const ACTION_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::MoveForward => 0,
            InputAction::MoveBack => 1,
            InputAction::StrafeLeft => 2,
            InputAction::StrafeRight => 3,
            InputAction::Interact => 4,
            InputAction::EndConversation => 5,
            InputAction::Quit => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Pressed(InputAction),
    Released(InputAction),
    PointerMoved { dx: f32, dy: f32 },
    PointerLockChanged(bool),
    SubmitText(String),
    Start,
}

/// Source of raw input events, polled once per rendered frame.
pub trait InputSource {
    fn poll_events(&mut self, frame_index: u64) -> Vec<InputEvent>;
}

/// Replays a fixed frame-indexed schedule of events.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    events_by_frame: BTreeMap<u64, Vec<InputEvent>>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, frame_index: u64, event: InputEvent) -> Self {
        self.push(frame_index, event);
        self
    }

    pub fn push(&mut self, frame_index: u64, event: InputEvent) {
        self.events_by_frame
            .entry(frame_index)
            .or_default()
            .push(event);
    }

    pub fn last_scheduled_frame(&self) -> Option<u64> {
        self.events_by_frame.keys().next_back().copied()
    }
}

impl InputSource for ScriptedInput {
    fn poll_events(&mut self, frame_index: u64) -> Vec<InputEvent> {
        self.events_by_frame
            .remove(&frame_index)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct InputCollector {
    quit_requested: bool,
    action_states: ActionStates,
    interact_pressed_edge: bool,
    end_conversation_pressed_edge: bool,
    start_pressed_edge: bool,
    pointer_locked: bool,
    pending_look_delta: (f32, f32),
    pending_text: Option<String>,
}

impl InputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::Pressed(action) => self.handle_action_state(action, true),
            InputEvent::Released(action) => self.handle_action_state(action, false),
            InputEvent::PointerMoved { dx, dy } => {
                if self.pointer_locked && dx.is_finite() && dy.is_finite() {
                    self.pending_look_delta.0 += dx;
                    self.pending_look_delta.1 += dy;
                }
            }
            InputEvent::PointerLockChanged(locked) => {
                self.pointer_locked = locked;
                if !locked {
                    self.pending_look_delta = (0.0, 0.0);
                }
            }
            InputEvent::SubmitText(text) => self.pending_text = Some(text),
            InputEvent::Start => self.start_pressed_edge = true,
        }
    }

    fn handle_action_state(&mut self, action: InputAction, is_pressed: bool) {
        let was_down = self.action_states.is_down(action);
        self.action_states.set(action, is_pressed);
        if !is_pressed || was_down {
            return;
        }
        match action {
            InputAction::Interact => self.interact_pressed_edge = true,
            InputAction::EndConversation => self.end_conversation_pressed_edge = true,
            InputAction::Quit => self.quit_requested = true,
            _ => {}
        }
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn snapshot_for_tick(&mut self) -> InputSnapshot {
        let snapshot = InputSnapshot::new(
            self.quit_requested,
            self.action_states,
            self.interact_pressed_edge,
            self.end_conversation_pressed_edge,
            self.start_pressed_edge,
            self.pending_look_delta,
            self.pending_text.take(),
        );
        self.interact_pressed_edge = false;
        self.end_conversation_pressed_edge = false;
        self.start_pressed_edge = false;
        self.pending_look_delta = (0.0, 0.0);
        snapshot
    }
}
