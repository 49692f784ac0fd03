//! Core-side contract for NPC conversations.
//!
//! Text generation is an external service behind [`TextGenerator`]. It runs on
//! a worker thread so the simulation never waits on it; finished replies are
//! picked up by [`ChatManager::poll`] once per tick.

mod canned;
mod worker;

#[cfg(test)]
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::config::{ChatBackend, ChatConfig};

pub(crate) use canned::CannedGenerator;
use worker::{ChatReply, ChatRequest, ChatWorker, WorkerPoll};

pub(crate) const PENDING_REPLY: &str = "...";
pub(crate) const GREETING_INSTRUCTION: &str = "Introduce yourself with a short, friendly greeting.";
pub(crate) const GENERATION_FAILED_REPLY: &str =
    "I'm having a little trouble thinking. Please try again.";
pub(crate) const NO_GENERATOR_REPLY: &str = "I can't seem to think right now.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChatMessage {
    pub(crate) role: Role,
    pub(crate) content: String,
}

impl ChatMessage {
    pub(crate) fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Message history for the one NPC currently being talked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConversationSession {
    pub(crate) npc_id: String,
    pub(crate) messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GenerationParams {
    pub(crate) max_new_tokens: u32,
    pub(crate) temperature: f32,
    pub(crate) top_p: f32,
}

impl From<&ChatConfig> for GenerationParams {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub(crate) enum GenerationError {
    #[error("text generation failed: {0}")]
    Failed(String),
    #[error("text generation produced no candidates")]
    NoOutput,
}

pub(crate) trait TextGenerator: Send {
    fn generate(
        &mut self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Error)]
pub(crate) enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a reply is still being generated")]
    ReplyPending,
    #[error("no conversation is active")]
    NoConversation,
    #[error("failed to spawn chat worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("chat worker is no longer running")]
    WorkerDisconnected,
}

pub(crate) fn generator_for(config: &ChatConfig) -> Option<Box<dyn TextGenerator>> {
    match config.backend {
        ChatBackend::Canned => Some(Box::new(CannedGenerator::new())),
        ChatBackend::Disabled => None,
    }
}

pub(crate) struct ChatManager {
    worker: Option<ChatWorker>,
    params: GenerationParams,
    session: Option<ConversationSession>,
    epoch: u64,
    reply_pending: bool,
}

impl ChatManager {
    pub(crate) fn new(generator: Option<Box<dyn TextGenerator>>, params: GenerationParams) -> Self {
        let worker = match generator.map(ChatWorker::spawn) {
            Some(Ok(worker)) => Some(worker),
            Some(Err(err)) => {
                warn!(error = %err, "chat_unavailable");
                None
            }
            None => None,
        };
        debug!(
            max_new_tokens = params.max_new_tokens,
            temperature = params.temperature,
            top_p = params.top_p,
            "chat_generation_params"
        );
        Self {
            worker,
            params,
            session: None,
            epoch: 0,
            reply_pending: false,
        }
    }

    pub(crate) fn from_config(config: &ChatConfig) -> Self {
        Self::new(generator_for(config), GenerationParams::from(config))
    }

    pub(crate) fn is_available(&self) -> bool {
        self.worker.is_some()
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn is_reply_pending(&self) -> bool {
        self.reply_pending
    }

    /// Opens a fresh session and asks for a greeting. Any earlier session is
    /// dropped and its in-flight reply will be ignored.
    pub(crate) fn start_conversation(&mut self, npc_id: &str, persona_prompt: &str) {
        self.epoch = self.epoch.wrapping_add(1);
        let system = ChatMessage::new(Role::System, persona_prompt);
        let request = vec![
            system.clone(),
            ChatMessage::new(Role::User, GREETING_INSTRUCTION),
        ];
        self.session = Some(ConversationSession {
            npc_id: npc_id.to_string(),
            messages: vec![system, ChatMessage::new(Role::Assistant, PENDING_REPLY)],
        });
        info!(npc = npc_id, epoch = self.epoch, "conversation_started");
        self.request_reply(request);
    }

    pub(crate) fn send_message(&mut self, text: &str) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.reply_pending {
            return Err(ChatError::ReplyPending);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ChatError::NoConversation);
        };

        session.messages.push(ChatMessage::new(Role::User, text));
        let request = session.messages.clone();
        session
            .messages
            .push(ChatMessage::new(Role::Assistant, PENDING_REPLY));
        debug!(npc = %session.npc_id, chars = text.len(), "chat_message_sent");
        self.request_reply(request);
        Ok(())
    }

    fn request_reply(&mut self, messages: Vec<ChatMessage>) {
        self.reply_pending = true;
        let Some(worker) = self.worker.as_ref() else {
            return;
        };
        let request = ChatRequest {
            epoch: self.epoch,
            messages,
            params: self.params,
        };
        if let Err(err) = worker.submit(request) {
            warn!(error = %err, "chat_request_failed");
            self.worker = None;
        }
    }

    /// Non-blocking. Returns the reply text when the pending assistant line
    /// was just filled in.
    pub(crate) fn poll(&mut self) -> Option<String> {
        loop {
            let next = match self.worker.as_ref() {
                Some(worker) => worker.try_next(),
                None => return self.apply_without_generator(),
            };
            match next {
                WorkerPoll::Reply(reply) => {
                    if let Some(text) = self.accept(reply) {
                        return Some(text);
                    }
                }
                WorkerPoll::Empty => return None,
                WorkerPoll::Disconnected => {
                    warn!("chat_worker_disconnected");
                    self.worker = None;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn wait_for_reply(&mut self, timeout: Duration) -> Option<String> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            let next = match self.worker.as_ref() {
                Some(worker) => worker.wait_next(remaining),
                None => return self.apply_without_generator(),
            };
            match next {
                WorkerPoll::Reply(reply) => {
                    if let Some(text) = self.accept(reply) {
                        return Some(text);
                    }
                }
                WorkerPoll::Empty => return None,
                WorkerPoll::Disconnected => self.worker = None,
            }
        }
    }

    fn accept(&mut self, reply: ChatReply) -> Option<String> {
        if reply.epoch != self.epoch || !self.reply_pending {
            debug!(
                reply_epoch = reply.epoch,
                current_epoch = self.epoch,
                "stale_chat_reply_discarded"
            );
            return None;
        }
        let text = normalize_reply(reply.outcome);
        Some(self.fill_pending(text))
    }

    fn apply_without_generator(&mut self) -> Option<String> {
        if !self.reply_pending {
            return None;
        }
        Some(self.fill_pending(NO_GENERATOR_REPLY.to_string()))
    }

    fn fill_pending(&mut self, text: String) -> String {
        self.reply_pending = false;
        if let Some(session) = self.session.as_mut() {
            match session.messages.last_mut() {
                Some(last) if last.role == Role::Assistant => last.content = text.clone(),
                _ => session
                    .messages
                    .push(ChatMessage::new(Role::Assistant, text.clone())),
            }
            debug!(npc = %session.npc_id, chars = text.len(), "chat_reply_applied");
        }
        text
    }

    pub(crate) fn end_conversation(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                npc = %session.npc_id,
                messages = session.messages.len(),
                "conversation_ended"
            );
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.reply_pending = false;
    }
}

fn normalize_reply(outcome: Result<String, GenerationError>) -> String {
    match outcome {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                PENDING_REPLY.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(err) => {
            warn!(error = %err, "chat_generation_failed");
            GENERATION_FAILED_REPLY.to_string()
        }
    }
}
