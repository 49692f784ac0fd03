use super::{ChatMessage, GenerationError, GenerationParams, Role, TextGenerator};

const FRIENDLY_LINES: [&str; 4] = [
    "Hey there! Welcome to Block Walkers, best city around.",
    "Oh, you should see the corner towers at sunset. Gorgeous.",
    "Keep to the roads and you can walk the whole grid in no time.",
    "Nice chatting with you! Come find me again sometime.",
];

const MYSTERIOUS_LINES: [&str; 4] = [
    "The streets remember every step you take.",
    "Every third road leads somewhere. The question is where.",
    "Some buildings are taller on the inside.",
    "We will meet again, when the grid is redrawn.",
];

const GUIDE_LINES: [&str; 4] = [
    "Welcome, visitor! I'm your official guide to Block Walkers.",
    "Roads run every third block, so you'll never get lost.",
    "Our tallest towers reach thirty meters. Look up!",
    "Enjoy the tour, and mind the NPC traffic on the sidewalks.",
];

/// Offline stand-in for a language model. Picks a line from a table chosen by
/// the persona prompt, advancing with each user turn.
#[derive(Debug, Default)]
pub(crate) struct CannedGenerator;

impl CannedGenerator {
    pub(crate) fn new() -> Self {
        Self
    }
}

fn lines_for(persona: &str) -> &'static [&'static str] {
    let persona = persona.to_ascii_lowercase();
    if persona.contains("mysterious") || persona.contains("cryptic") {
        &MYSTERIOUS_LINES
    } else if persona.contains("guide") {
        &GUIDE_LINES
    } else {
        &FRIENDLY_LINES
    }
}

fn truncate_words(line: &str, max_words: u32) -> String {
    line.split_whitespace()
        .take(max_words.max(1) as usize)
        .collect::<Vec<_>>()
        .join(" ")
}

impl TextGenerator for CannedGenerator {
    fn generate(
        &mut self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        if messages.is_empty() {
            return Err(GenerationError::NoOutput);
        }
        let persona = messages
            .iter()
            .find(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let turn = messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
            .saturating_sub(1);

        let lines = lines_for(persona);
        let line = lines[turn.min(lines.len() - 1)];
        Ok(truncate_words(line, params.max_new_tokens))
    }
}
