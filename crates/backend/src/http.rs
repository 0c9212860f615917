use reqwest::{Client, RequestBuilder, Response, Url};
use snafu::{ResultExt, ensure};

use super::contract::{
    BackendConfig, BackendError, BackendResult, BoxFuture, BuildClientSnafu, ChatReply,
    ChatRequest, ConversationBackend, DecodePayloadSnafu, InvalidBaseUrlSnafu, SessionInfo,
};
use super::wire::{ChatRequestBody, ChatResponseBody, SessionInfoBody};

/// Conversation backend reached over HTTP/JSON.
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
    base: Url,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let base = Url::parse(&config.base_url).map_err(|source| BackendError::InvalidBaseUrl {
            stage: "http-backend-parse-base-url",
            base_url: config.base_url.clone(),
            details: source.to_string(),
        })?;
        ensure!(
            !base.cannot_be_a_base() && matches!(base.scheme(), "http" | "https"),
            InvalidBaseUrlSnafu {
                stage: "http-backend-check-base-url",
                base_url: config.base_url.clone(),
                details: "expected an http(s) URL".to_string(),
            }
        );

        let client = Client::builder().build().context(BuildClientSnafu {
            stage: "http-backend-build-client",
        })?;

        Ok(Self {
            client,
            config,
            base,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so segment editing is always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `{base-url}/`, keeping any path the base URL carries.
    fn probe_url(&self) -> Url {
        self.endpoint(&[""])
    }

    fn with_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn dispatch(
        &self,
        stage: &'static str,
        url: &Url,
        request: RequestBuilder,
    ) -> BackendResult<Response> {
        let response = self
            .with_timeout(request)
            .send()
            .await
            .map_err(|source| transport_error(stage, url, source))?;

        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), stage, "backend responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%url, status = status.as_u16(), body = %body, stage, "backend returned an error status");
        Err(BackendError::from_status(stage, status.as_u16(), body))
    }

    async fn read_text(stage: &'static str, url: &Url, response: Response) -> BackendResult<String> {
        response
            .text()
            .await
            .map_err(|source| transport_error(stage, url, source))
    }
}

impl ConversationBackend for HttpBackend {
    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn send_message<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, BackendResult<ChatReply>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "chat"]);
            let body = ChatRequestBody {
                session_id: &request.session_id,
                message: &request.message,
            };
            tracing::debug!(%url, session_id = %request.session_id, "sending chat message");

            let response = self
                .dispatch("chat-send", &url, self.client.post(url.clone()).json(&body))
                .await?;
            let payload = Self::read_text("chat-read-body", &url, response).await?;
            let decoded: ChatResponseBody =
                serde_json::from_str(&payload).context(DecodePayloadSnafu {
                    stage: "chat-decode-body",
                })?;

            Ok(decoded.into_reply())
        })
    }

    fn delete_session<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "session", session_id]);
            self.dispatch("session-delete", &url, self.client.delete(url.clone()))
                .await?;
            Ok(())
        })
    }

    fn probe<'a>(&'a self) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let url = self.probe_url();
            self.dispatch("liveness-probe", &url, self.client.get(url.clone()))
                .await?;
            Ok(())
        })
    }

    fn session_info<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, BackendResult<SessionInfo>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "session", session_id]);
            let response = self
                .dispatch("session-info", &url, self.client.get(url.clone()))
                .await?;
            let payload = Self::read_text("session-info-read-body", &url, response).await?;
            let decoded: SessionInfoBody =
                serde_json::from_str(&payload).context(DecodePayloadSnafu {
                    stage: "session-info-decode-body",
                })?;
            Ok(decoded.into())
        })
    }
}

fn transport_error(stage: &'static str, url: &Url, source: reqwest::Error) -> BackendError {
    BackendError::Transport {
        stage,
        url: url.to_string(),
        timed_out: source.is_timeout(),
        message: source.to_string(),
    }
}
