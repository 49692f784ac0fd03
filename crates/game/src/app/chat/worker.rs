use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
#[cfg(test)]
use std::time::Duration;

use tracing::debug;

use super::{ChatError, ChatMessage, GenerationError, GenerationParams, TextGenerator};

const WORKER_THREAD_NAME: &str = "chat-worker";

pub(super) struct ChatRequest {
    pub(super) epoch: u64,
    pub(super) messages: Vec<ChatMessage>,
    pub(super) params: GenerationParams,
}

pub(super) struct ChatReply {
    pub(super) epoch: u64,
    pub(super) outcome: Result<String, GenerationError>,
}

pub(super) enum WorkerPoll {
    Reply(ChatReply),
    Empty,
    Disconnected,
}

/// Runs a `TextGenerator` on its own thread. Requests are processed in order;
/// the simulation only ever talks to it through non-blocking channel calls.
pub(super) struct ChatWorker {
    requests: Option<Sender<ChatRequest>>,
    replies: Receiver<ChatReply>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChatWorker {
    pub(super) fn spawn(mut generator: Box<dyn TextGenerator>) -> Result<Self, ChatError> {
        let (request_tx, request_rx) = mpsc::channel::<ChatRequest>();
        let (reply_tx, reply_rx) = mpsc::channel::<ChatReply>();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                for request in request_rx {
                    if worker_stop.load(Ordering::Acquire) {
                        debug!(epoch = request.epoch, "chat_request_skipped_on_shutdown");
                        break;
                    }
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        generator.generate(&request.messages, &request.params)
                    }))
                    .unwrap_or_else(|_| Err(GenerationError::Failed("generator panicked".into())));
                    let reply = ChatReply {
                        epoch: request.epoch,
                        outcome,
                    };
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                debug!("chat_worker_stopped");
            })
            .map_err(ChatError::WorkerSpawn)?;

        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            stop,
            handle: Some(handle),
        })
    }

    pub(super) fn submit(&self, request: ChatRequest) -> Result<(), ChatError> {
        let Some(requests) = self.requests.as_ref() else {
            return Err(ChatError::WorkerDisconnected);
        };
        requests
            .send(request)
            .map_err(|_| ChatError::WorkerDisconnected)
    }

    pub(super) fn try_next(&self) -> WorkerPoll {
        match self.replies.try_recv() {
            Ok(reply) => WorkerPoll::Reply(reply),
            Err(TryRecvError::Empty) => WorkerPoll::Empty,
            Err(TryRecvError::Disconnected) => WorkerPoll::Disconnected,
        }
    }

    #[cfg(test)]
    pub(super) fn wait_next(&self, timeout: Duration) -> WorkerPoll {
        match self.replies.recv_timeout(timeout) {
            Ok(reply) => WorkerPoll::Reply(reply),
            Err(mpsc::RecvTimeoutError::Timeout) => WorkerPoll::Empty,
            Err(mpsc::RecvTimeoutError::Disconnected) => WorkerPoll::Disconnected,
        }
    }
}

impl Drop for ChatWorker {
    fn drop(&mut self) {
        // Queued requests are skipped; only an in-flight generation is awaited.
        self.stop.store(true, Ordering::Release);
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("chat_worker_panicked");
            }
        }
    }
}
