use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, trace};

use crate::math::Vec3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameMarker {
    pub label: String,
    pub position: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    pub frame_index: u64,
    pub camera: CameraPose,
    pub markers: Vec<FrameMarker>,
    pub building_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedMessage {
    pub speaker: String,
    pub text: String,
    /// Overwrite the most recent line instead of appending a new one.
    pub replace_last: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Int(value) => write!(f, "{value}"),
            StatValue::Float(value) => write!(f, "{value:.2}"),
            StatValue::Text(value) => f.write_str(value),
        }
    }
}

/// Presentation capabilities the simulation may use. Implemented by whatever
/// front end hosts the game; the simulation never depends on a concrete one.
pub trait Presenter {
    fn render_frame(&mut self, frame: &FrameSnapshot);
    fn show_message(&mut self, message: &PresentedMessage);
    fn update_stat(&mut self, key: &'static str, value: StatValue);
}

/// Headless presenter that turns every UI event into a structured log line.
#[derive(Debug, Default)]
pub struct TracingPresenter {
    frames_rendered: u64,
    stats: BTreeMap<&'static str, StatValue>,
}

impl TracingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn stat(&self, key: &str) -> Option<&StatValue> {
        self.stats.get(key)
    }
}

impl Presenter for TracingPresenter {
    fn render_frame(&mut self, frame: &FrameSnapshot) {
        self.frames_rendered = self.frames_rendered.saturating_add(1);
        trace!(
            frame = frame.frame_index,
            camera_x = frame.camera.position.x,
            camera_z = frame.camera.position.z,
            yaw = frame.camera.yaw,
            pitch = frame.camera.pitch,
            markers = frame.markers.len(),
            buildings = frame.building_count,
            "frame_rendered"
        );
    }

    fn show_message(&mut self, message: &PresentedMessage) {
        info!(
            speaker = message.speaker.as_str(),
            replace_last = message.replace_last,
            "{}",
            message.text
        );
    }

    fn update_stat(&mut self, key: &'static str, value: StatValue) {
        if self.stats.get(key) != Some(&value) {
            debug!(key, value = %value, "stat_updated");
        }
        self.stats.insert(key, value);
    }
}

/// Keeps every UI event in memory; meant for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub frames: Vec<FrameSnapshot>,
    pub messages: Vec<PresentedMessage>,
    pub stats: BTreeMap<&'static str, StatValue>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message log as a chat window would show it, with in-place replacements applied.
    pub fn transcript(&self) -> Vec<(String, String)> {
        let mut lines: Vec<(String, String)> = Vec::new();
        for message in &self.messages {
            match lines.last_mut() {
                Some(last) if message.replace_last => {
                    *last = (message.speaker.clone(), message.text.clone());
                }
                _ => lines.push((message.speaker.clone(), message.text.clone())),
            }
        }
        lines
    }
}

impl Presenter for RecordingPresenter {
    fn render_frame(&mut self, frame: &FrameSnapshot) {
        self.frames.push(frame.clone());
    }

    fn show_message(&mut self, message: &PresentedMessage) {
        self.messages.push(message.clone());
    }

    fn update_stat(&mut self, key: &'static str, value: StatValue) {
        self.stats.insert(key, value);
    }
}
