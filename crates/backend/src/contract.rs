use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use snafu::Snafu;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    /// `None` waits for the backend indefinitely.
    pub request_timeout: Option<Duration>,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().to_string(),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
        }
    }
}

/// Citation attached to a bot reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    pub link: String,
}

/// Backend-suggested follow-up the user can pick instead of typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickReply {
    pub id: String,
    pub label: String,
}

impl QuickReply {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Canonical reply, independent of which wire field carried the text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatReply {
    pub session_id: Option<String>,
    /// Trimmed reply text; `None` when the payload carried nothing usable.
    pub text: Option<String>,
    pub sources: Vec<Source>,
    pub quick_replies: Vec<QuickReply>,
}

impl ChatReply {
    pub fn text(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_quick_replies(mut self, quick_replies: Vec<QuickReply>) -> Self {
        self.quick_replies = quick_replies;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: String,
    pub message_count: u64,
}

/// How a failed backend call should be presented and recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request could not be completed at all.
    Unreachable,
    /// The configured client-side timeout elapsed.
    TimedOut,
    /// The backend answered with a 5xx status.
    ServerFault,
    /// Any other unusable answer: 4xx, undecodable body, bad configuration.
    Rejected,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("backend base URL '{base_url}' is invalid: {details}"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
        details: String,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} did not complete on `{stage}`: {message}"))]
    Transport {
        stage: &'static str,
        url: String,
        timed_out: bool,
        message: String,
    },
    #[snafu(display("backend returned server fault {status} on `{stage}`: {body}"))]
    ServerFault {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("backend returned unexpected status {status} on `{stage}`: {body}"))]
    UnexpectedStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode backend payload on `{stage}`: {source}"))]
    DecodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
}

impl BackendError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transport {
                timed_out: true, ..
            } => FailureKind::TimedOut,
            Self::Transport { .. } => FailureKind::Unreachable,
            Self::ServerFault { .. } => FailureKind::ServerFault,
            Self::InvalidBaseUrl { .. }
            | Self::BuildClient { .. }
            | Self::UnexpectedStatus { .. }
            | Self::DecodePayload { .. } => FailureKind::Rejected,
        }
    }

    pub(crate) fn from_status(stage: &'static str, status: u16, body: String) -> Self {
        if (500..600).contains(&status) {
            Self::ServerFault {
                stage,
                status,
                body,
            }
        } else {
            Self::UnexpectedStatus {
                stage,
                status,
                body,
            }
        }
    }
}

/// The remote conversation service the widget talks to.
///
/// Implementations never retry; callers decide how to surface each failure.
pub trait ConversationBackend: Send + Sync {
    fn base_url(&self) -> &str;
    fn send_message<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, BackendResult<ChatReply>>;
    fn delete_session<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, BackendResult<()>>;
    fn probe<'a>(&'a self) -> BoxFuture<'a, BackendResult<()>>;
    fn session_info<'a>(&'a self, session_id: &'a str)
    -> BoxFuture<'a, BackendResult<SessionInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_splits_server_faults() {
        let fault = BackendError::from_status("test", 503, String::new());
        assert_eq!(fault.failure_kind(), FailureKind::ServerFault);

        let rejected = BackendError::from_status("test", 404, "missing".to_string());
        assert_eq!(rejected.failure_kind(), FailureKind::Rejected);
    }

    #[test]
    fn transport_timeouts_are_distinguished_from_unreachable() {
        let timed_out = BackendError::Transport {
            stage: "test",
            url: "http://backend/api/chat".to_string(),
            timed_out: true,
            message: "deadline elapsed".to_string(),
        };
        let refused = BackendError::Transport {
            stage: "test",
            url: "http://backend/api/chat".to_string(),
            timed_out: false,
            message: "connection refused".to_string(),
        };

        assert_eq!(timed_out.failure_kind(), FailureKind::TimedOut);
        assert_eq!(refused.failure_kind(), FailureKind::Unreachable);
    }
}
