use super::input::{ActionStates, InputAction};
use super::presenter::Presenter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Quit,
}

#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    quit_requested: bool,
    actions: ActionStates,
    interact_pressed: bool,
    end_conversation_pressed: bool,
    start_pressed: bool,
    look_delta: (f32, f32),
    submitted_text: Option<String>,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(
        quit_requested: bool,
        actions: ActionStates,
        interact_pressed: bool,
        end_conversation_pressed: bool,
        start_pressed: bool,
        look_delta: (f32, f32),
        submitted_text: Option<String>,
    ) -> Self {
        Self {
            quit_requested,
            actions,
            interact_pressed,
            end_conversation_pressed,
            start_pressed,
            look_delta,
            submitted_text,
        }
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.is_down(action)
    }

    pub fn interact_pressed(&self) -> bool {
        self.interact_pressed
    }

    pub fn end_conversation_pressed(&self) -> bool {
        self.end_conversation_pressed
    }

    pub fn start_pressed(&self) -> bool {
        self.start_pressed
    }

    /// Raw pointer movement (pixels) accumulated since the previous tick.
    pub fn look_delta(&self) -> (f32, f32) {
        self.look_delta
    }

    pub fn submitted_text(&self) -> Option<&str> {
        self.submitted_text.as_deref()
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.actions.set(action, is_down);
        self
    }

    pub fn with_interact_pressed(mut self, interact_pressed: bool) -> Self {
        self.interact_pressed = interact_pressed;
        self
    }

    pub fn with_end_conversation_pressed(mut self, end_conversation_pressed: bool) -> Self {
        self.end_conversation_pressed = end_conversation_pressed;
        self
    }

    pub fn with_start_pressed(mut self, start_pressed: bool) -> Self {
        self.start_pressed = start_pressed;
        self
    }

    pub fn with_look_delta(mut self, dx: f32, dy: f32) -> Self {
        self.look_delta = (dx, dy);
        self
    }

    pub fn with_submitted_text(mut self, text: impl Into<String>) -> Self {
        self.submitted_text = Some(text.into());
        self
    }
}

/// One simulation owned by the loop runner. Ticks are strictly sequential.
pub trait Scene {
    fn load(&mut self, presenter: &mut dyn Presenter);
    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        presenter: &mut dyn Presenter,
    ) -> SceneCommand;
    fn render(&mut self, frame_index: u64, presenter: &mut dyn Presenter);
    fn unload(&mut self);
    fn debug_title(&self) -> Option<String> {
        None
    }
}
