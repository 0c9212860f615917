use std::sync::Arc;

mod contract;
mod http;
mod wire;

pub use contract::{
    BackendConfig, BackendError, BackendResult, BoxFuture, ChatReply, ChatRequest,
    ConversationBackend, FailureKind, QuickReply, SessionInfo, Source,
};
pub use http::HttpBackend;

/// Base URL used when the embedding page does not configure one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

pub fn create_backend(config: BackendConfig) -> BackendResult<Arc<dyn ConversationBackend>> {
    Ok(Arc::new(HttpBackend::new(config)?))
}
