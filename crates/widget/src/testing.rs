use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chatline_backend::{
    BackendError, BackendResult, BoxFuture, ChatReply, ChatRequest, ConversationBackend,
    SessionInfo,
};
use tokio::sync::Notify;

/// One scripted answer to a `send_message` call.
pub(crate) enum Step {
    Reply(ChatReply),
    Fail(BackendError),
    /// Signals `entered` once the call starts, then waits for `release`.
    Hold {
        reply: ChatReply,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// In-process backend that answers chat calls from a queue and records every request.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
    deleted: Mutex<Vec<String>>,
    probe_down: AtomicBool,
    delete_fails: AtomicBool,
}

impl ScriptedBackend {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    pub(crate) fn set_probe_down(&self, down: bool) {
        self.probe_down.store(down, Ordering::SeqCst);
    }

    pub(crate) fn set_delete_fails(&self, fails: bool) {
        self.delete_fails.store(fails, Ordering::SeqCst);
    }
}

pub(crate) fn unreachable() -> BackendError {
    BackendError::Transport {
        stage: "scripted",
        url: "http://scripted/api/chat".to_string(),
        timed_out: false,
        message: "connection refused".to_string(),
    }
}

pub(crate) fn timed_out() -> BackendError {
    BackendError::Transport {
        stage: "scripted",
        url: "http://scripted/api/chat".to_string(),
        timed_out: true,
        message: "operation timed out".to_string(),
    }
}

pub(crate) fn server_fault() -> BackendError {
    BackendError::ServerFault {
        stage: "scripted",
        status: 500,
        body: "internal error".to_string(),
    }
}

pub(crate) fn rejected() -> BackendError {
    BackendError::UnexpectedStatus {
        stage: "scripted",
        status: 422,
        body: "unprocessable".to_string(),
    }
}

impl ConversationBackend for ScriptedBackend {
    fn base_url(&self) -> &str {
        "http://scripted"
    }

    fn send_message<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, BackendResult<ChatReply>> {
        self.requests.lock().expect("requests lock").push(request);
        let step = self.steps.lock().expect("steps lock").pop_front();

        Box::pin(async move {
            match step {
                Some(Step::Reply(reply)) => {
                    // Give concurrently polled futures a chance to run before answering.
                    tokio::task::yield_now().await;
                    Ok(reply)
                }
                Some(Step::Fail(error)) => Err(error),
                Some(Step::Hold {
                    reply,
                    entered,
                    release,
                }) => {
                    entered.notify_one();
                    release.notified().await;
                    Ok(reply)
                }
                None => Err(BackendError::UnexpectedStatus {
                    stage: "scripted",
                    status: 418,
                    body: "script exhausted".to_string(),
                }),
            }
        })
    }

    fn delete_session<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            self.deleted
                .lock()
                .expect("deleted lock")
                .push(session_id.to_string());
            if self.delete_fails.load(Ordering::SeqCst) {
                Err(unreachable())
            } else {
                Ok(())
            }
        })
    }

    fn probe<'a>(&'a self) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            if self.probe_down.load(Ordering::SeqCst) {
                Err(unreachable())
            } else {
                Ok(())
            }
        })
    }

    fn session_info<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, BackendResult<SessionInfo>> {
        Box::pin(async move {
            Ok(SessionInfo {
                session_id: session_id.to_string(),
                created_at: "2024-01-01T00:00:00".to_string(),
                message_count: self.requests.lock().expect("requests lock").len() as u64,
            })
        })
    }
}
