use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatline_backend::{
    BackendError, BackendResult, ChatReply, ChatRequest, ConversationBackend, FailureKind,
    QuickReply, SessionInfo, Source, create_backend,
};
use chatline_storage::{KeyValueStore, SessionId, StorageError};
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::{Feedback, Greeting, Role, Transcript, Turn, TurnId, TurnKind, WidgetEvent};
use crate::session::SessionManager;
use crate::settings::{Position, WidgetSettings};

pub const RESET_PROMPT: &str = "Are you sure you want to reset the conversation?";
pub const UNREACHABLE_MESSAGE: &str =
    "Unable to connect to the chat server. Please check that the chat backend is running.";
pub const SERVER_ERROR_MESSAGE: &str =
    "Sorry, I encountered an error processing your request. Please try again.";
pub const TIMEOUT_MESSAGE: &str = "The chat server took too long to respond. Please try again.";
pub const EMPTY_REPLY_MESSAGE: &str = "Sorry, I didn't get a proper response. Please try again.";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WidgetError {
    #[snafu(display("failed to load the persisted chat session on `{stage}`: {source}"))]
    LoadSession {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to create the conversation backend on `{stage}`: {source}"))]
    CreateBackend {
        stage: &'static str,
        source: BackendError,
    },
}

pub type WidgetResult<T> = Result<T, WidgetError>;

/// Why a send request produced no outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    EmptyInput,
    RequestPending,
    UnknownQuickReply,
    UnknownSuggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendOutcome {
    Replied { turn_id: TurnId },
    SoftFailure { turn_id: TurnId },
    Failed { kind: FailureKind, turn_id: TurnId },
    Ignored(IgnoreReason),
    /// The conversation was reset while the request was in flight; the answer was dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Declined,
    Reset {
        previous: SessionId,
        current: SessionId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeOutcome {
    Reachable { cleared_stale_error: bool },
    Unreachable,
}

/// Whether the visible history ends in an error the user has not moved past yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StaleError {
    #[default]
    Clear,
    Connectivity,
    Server,
}

/// Read-only copy of everything a presentation layer needs to draw the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSnapshot {
    pub session_id: SessionId,
    pub open: bool,
    pub typing: bool,
    pub greeting: Option<Greeting>,
    pub turns: Vec<Turn>,
    pub quick_replies: Vec<QuickReply>,
    pub retry_offered: bool,
    pub draft: String,
    pub stale_error: StaleError,
}

struct WidgetState {
    session: SessionManager,
    transcript: Transcript,
    greeting_visible: bool,
    quick_replies: Vec<QuickReply>,
    pending: bool,
    open: bool,
    draft: String,
    stale_error: StaleError,
    retry_offered: bool,
    probe_started: bool,
    // Bumped whenever history is wiped; responses from an older epoch are dropped.
    epoch: u64,
    subscriber: Option<mpsc::UnboundedSender<WidgetEvent>>,
}

impl WidgetState {
    fn emit(&mut self, event: WidgetEvent) {
        if let Some(subscriber) = &self.subscriber
            && subscriber.send(event).is_err()
        {
            self.subscriber = None;
        }
    }

    fn append(&mut self, role: Role, content: &str, sources: Vec<Source>, kind: TurnKind) -> TurnId {
        let turn = self.transcript.push(role, content, sources, kind).clone();
        let turn_id = turn.id;
        self.emit(WidgetEvent::TurnAppended(turn));
        turn_id
    }

    fn hide_greeting(&mut self) {
        if self.greeting_visible {
            self.greeting_visible = false;
            self.emit(WidgetEvent::GreetingHidden);
        }
    }

    fn restore_greeting(&mut self, greeting: Greeting) {
        self.transcript.clear();
        self.clear_quick_replies();
        self.stale_error = StaleError::Clear;
        self.retry_offered = false;
        self.greeting_visible = true;
        self.epoch += 1;
        self.emit(WidgetEvent::GreetingShown(greeting));
    }

    fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
        self.emit(WidgetEvent::TypingChanged { active: pending });
    }

    fn set_draft(&mut self, draft: String) {
        self.draft = draft;
        let can_send = !self.draft.trim().is_empty();
        self.emit(WidgetEvent::DraftChanged { can_send });
    }

    fn install_quick_replies(&mut self, quick_replies: Vec<QuickReply>) {
        self.quick_replies = quick_replies;
        self.emit(WidgetEvent::QuickRepliesChanged(self.quick_replies.clone()));
    }

    fn clear_quick_replies(&mut self) {
        if !self.quick_replies.is_empty() {
            self.quick_replies.clear();
            self.emit(WidgetEvent::QuickRepliesChanged(Vec::new()));
        }
    }

    fn apply_reply(&mut self, reply: ChatReply) -> SendOutcome {
        if let Some(session_id) = reply.session_id.as_deref() {
            self.session.rotate(session_id);
        }
        // Any 2xx proves the backend is healthy again.
        self.stale_error = StaleError::Clear;

        let outcome = match reply.text {
            Some(text) => SendOutcome::Replied {
                turn_id: self.append(Role::Bot, &text, reply.sources, TurnKind::Message),
            },
            None => {
                tracing::error!(session_id = %self.session.current(), "empty bot response received");
                SendOutcome::SoftFailure {
                    turn_id: self.append(
                        Role::Bot,
                        EMPTY_REPLY_MESSAGE,
                        Vec::new(),
                        TurnKind::SoftFailure,
                    ),
                }
            }
        };

        if !reply.quick_replies.is_empty() {
            tracing::debug!(count = reply.quick_replies.len(), "installing quick replies");
            self.install_quick_replies(reply.quick_replies);
        }

        outcome
    }

    fn apply_failure(&mut self, error: &BackendError, sent_with: &str) -> SendOutcome {
        let kind = error.failure_kind();
        tracing::error!(error = %error, ?kind, session_id = %sent_with, "chat request failed");

        if kind == FailureKind::ServerFault {
            tracing::warn!("server fault; rotating session id so the next send starts clean");
            self.session.reset();
        }

        let message = match kind {
            FailureKind::Unreachable => UNREACHABLE_MESSAGE,
            FailureKind::TimedOut => TIMEOUT_MESSAGE,
            FailureKind::ServerFault | FailureKind::Rejected => SERVER_ERROR_MESSAGE,
        };
        let turn_id = self.append(Role::Bot, message, Vec::new(), TurnKind::Error(kind));

        self.stale_error = match kind {
            FailureKind::Unreachable | FailureKind::TimedOut => StaleError::Connectivity,
            FailureKind::ServerFault | FailureKind::Rejected => StaleError::Server,
        };

        if kind == FailureKind::Unreachable {
            self.retry_offered = true;
            self.emit(WidgetEvent::RetryOffered);
        }

        SendOutcome::Failed { kind, turn_id }
    }
}

/// Embeddable chat client. The embedding code constructs it and keeps it alive.
///
/// All methods take `&self`; the internal lock is never held across a backend call,
/// so the presentation layer can keep reading snapshots while a request is in flight.
pub struct ChatWidget {
    settings: WidgetSettings,
    greeting: Greeting,
    backend: Arc<dyn ConversationBackend>,
    state: Mutex<WidgetState>,
}

impl ChatWidget {
    pub fn new(
        settings: WidgetSettings,
        backend: Arc<dyn ConversationBackend>,
        store: Arc<dyn KeyValueStore>,
    ) -> WidgetResult<Self> {
        let settings = settings.normalized();
        let session = SessionManager::load(store).context(LoadSessionSnafu {
            stage: "widget-new-load-session",
        })?;
        let greeting = Greeting::from_settings(&settings);
        tracing::debug!(
            base_url = %backend.base_url(),
            session_id = %session.current(),
            "chat widget initialized"
        );

        Ok(Self {
            settings,
            greeting,
            backend,
            state: Mutex::new(WidgetState {
                session,
                transcript: Transcript::new(),
                greeting_visible: true,
                quick_replies: Vec::new(),
                pending: false,
                open: false,
                draft: String::new(),
                stale_error: StaleError::Clear,
                retry_offered: false,
                probe_started: false,
                epoch: 0,
                subscriber: None,
            }),
        })
    }

    /// Builds the widget against the HTTP backend named in `settings`.
    pub fn connect(settings: WidgetSettings, store: Arc<dyn KeyValueStore>) -> WidgetResult<Self> {
        let settings = settings.normalized();
        let backend = create_backend(settings.to_backend_config()).context(CreateBackendSnafu {
            stage: "widget-connect-create-backend",
        })?;
        Self::new(settings, backend, store)
    }

    fn state(&self) -> MutexGuard<'_, WidgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    pub fn position(&self) -> Position {
        self.settings.position
    }

    /// Replaces any previous subscriber; events from then on go to the returned receiver.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WidgetEvent> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.state().subscriber = Some(event_tx);
        event_rx
    }

    pub fn session_id(&self) -> SessionId {
        self.state().session.current().clone()
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        let state = self.state();
        WidgetSnapshot {
            session_id: state.session.current().clone(),
            open: state.open,
            typing: state.pending,
            greeting: state.greeting_visible.then(|| self.greeting.clone()),
            turns: state.transcript.turns().to_vec(),
            quick_replies: state.quick_replies.clone(),
            retry_offered: state.retry_offered,
            draft: state.draft.clone(),
            stale_error: state.stale_error,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn open(&self) {
        self.set_open(true);
    }

    pub fn close(&self) {
        self.set_open(false);
    }

    pub fn toggle(&self) {
        let open = !self.is_open();
        self.set_open(open);
    }

    fn set_open(&self, open: bool) {
        let mut state = self.state();
        if state.open != open {
            state.open = open;
            state.emit(WidgetEvent::VisibilityChanged { open });
        }
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        self.state().set_draft(draft.into());
    }

    pub fn can_send(&self) -> bool {
        !self.state().draft.trim().is_empty()
    }

    /// Sends the current draft, the keyboard-submit path of the input box.
    pub async fn submit_draft(&self) -> SendOutcome {
        let draft = self.state().draft.clone();
        self.send(&draft).await
    }

    /// Sends one user message and records the outcome as exactly one bot turn.
    ///
    /// At most one request is in flight per widget: a call made while another is
    /// pending returns [`IgnoreReason::RequestPending`] without touching any state.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let message = text.trim();
        if message.is_empty() {
            tracing::debug!("ignoring blank message");
            return SendOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let (request, epoch) = {
            let mut state = self.state();
            if state.pending {
                tracing::debug!("a message is already in flight; ignoring send");
                return SendOutcome::Ignored(IgnoreReason::RequestPending);
            }

            state.hide_greeting();
            state.append(Role::User, message, Vec::new(), TurnKind::Message);
            state.set_draft(String::new());
            state.set_pending(true);
            (
                ChatRequest::new(state.session.current().as_str(), message),
                state.epoch,
            )
        };

        tracing::info!(
            base_url = %self.backend.base_url(),
            session_id = %request.session_id,
            "sending chat message"
        );
        let sent_with = request.session_id.clone();
        let mut in_flight = InFlight {
            widget: self,
            settled: false,
        };
        let result = self.backend.send_message(request).await;
        in_flight.settled = true;

        let mut state = self.state();
        state.set_pending(false);
        if state.epoch != epoch {
            tracing::debug!(session_id = %sent_with, "conversation reset while request was in flight; dropping response");
            return SendOutcome::Superseded;
        }

        match result {
            Ok(reply) => state.apply_reply(reply),
            Err(error) => state.apply_failure(&error, &sent_with),
        }
    }

    /// Picks a quick reply from the active set; the set is withdrawn before sending.
    pub async fn select_quick_reply(&self, id: &str) -> SendOutcome {
        let label = {
            let mut state = self.state();
            if state.pending {
                return SendOutcome::Ignored(IgnoreReason::RequestPending);
            }
            let Some(label) = state
                .quick_replies
                .iter()
                .find(|reply| reply.id == id)
                .map(|reply| reply.label.clone())
            else {
                return SendOutcome::Ignored(IgnoreReason::UnknownQuickReply);
            };
            state.clear_quick_replies();
            label
        };

        self.send(&label).await
    }

    /// Picks one of the greeting's suggested questions; only offered while it is visible.
    pub async fn select_suggested_question(&self, index: usize) -> SendOutcome {
        let question = {
            let state = self.state();
            if !state.greeting_visible {
                None
            } else {
                self.greeting.suggested_questions.get(index).cloned()
            }
        };

        match question {
            Some(question) => self.send(&question).await,
            None => SendOutcome::Ignored(IgnoreReason::UnknownSuggestion),
        }
    }

    /// User-triggered restart. `confirm` receives [`RESET_PROMPT`]; declining changes nothing.
    ///
    /// The backend is asked to forget the old session on a best-effort basis; a failure
    /// there is logged and the local reset still happens.
    pub async fn reset_conversation<F>(&self, confirm: F) -> ResetOutcome
    where
        F: FnOnce(&str) -> bool,
    {
        if !confirm(RESET_PROMPT) {
            tracing::debug!("conversation reset declined");
            return ResetOutcome::Declined;
        }

        let previous = self.session_id();
        if let Err(error) = self.backend.delete_session(previous.as_str()).await {
            tracing::warn!(session_id = %previous, error = %error, "failed to delete backend session");
        }

        let mut state = self.state();
        let current = state.session.reset();
        state.restore_greeting(self.greeting.clone());
        ResetOutcome::Reset { previous, current }
    }

    /// The reconnect affordance offered after an unreachable backend.
    ///
    /// Discards the persisted session and starts over as a fresh load would. Returns
    /// false when no retry is currently offered.
    pub fn retry_connection(&self) -> bool {
        let mut state = self.state();
        if !state.retry_offered {
            return false;
        }

        tracing::info!("retrying connection with a fresh session");
        state.session.reset();
        state.set_draft(String::new());
        state.restore_greeting(self.greeting.clone());
        true
    }

    /// Checks backend reachability once; a healthy backend clears a stale error state.
    pub async fn probe_backend(&self) -> ProbeOutcome {
        match self.backend.probe().await {
            Ok(()) => {
                tracing::info!(base_url = %self.backend.base_url(), "chat backend connected successfully");
                let mut state = self.state();
                if state.stale_error == StaleError::Clear || state.pending {
                    return ProbeOutcome::Reachable {
                        cleared_stale_error: false,
                    };
                }

                tracing::info!(stale_error = ?state.stale_error, "clearing cached error session");
                state.session.reset();
                state.restore_greeting(self.greeting.clone());
                ProbeOutcome::Reachable {
                    cleared_stale_error: true,
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "chat backend not available");
                ProbeOutcome::Unreachable
            }
        }
    }

    /// Schedules the one-off liveness probe after the configured delay.
    ///
    /// Returns `None` if the probe was already started for this instance.
    pub fn start_liveness_probe(self: &Arc<Self>) -> Option<JoinHandle<ProbeOutcome>> {
        {
            let mut state = self.state();
            if state.probe_started {
                return None;
            }
            state.probe_started = true;
        }

        let widget = Arc::clone(self);
        let delay = self.settings.probe_delay();
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            widget.probe_backend().await
        }))
    }

    /// Records one verdict on a bot turn. Later verdicts on the same turn are refused.
    pub fn submit_feedback(&self, turn_id: TurnId, feedback: Feedback) -> bool {
        let mut state = self.state();
        let Some(turn) = state.transcript.get_mut(turn_id) else {
            return false;
        };
        if turn.role != Role::Bot || turn.feedback.is_some() {
            return false;
        }

        turn.feedback = Some(feedback);
        tracing::info!(turn_id = turn_id.0, ?feedback, content = %turn.content, "feedback recorded");
        state.emit(WidgetEvent::FeedbackRecorded { turn_id, feedback });
        true
    }

    /// Asks the backend what it knows about the current session.
    pub async fn session_info(&self) -> BackendResult<SessionInfo> {
        let session_id = self.session_id();
        self.backend.session_info(session_id.as_str()).await
    }
}

/// Clears the pending flag if a send is abandoned before the backend answers.
struct InFlight<'a> {
    widget: &'a ChatWidget,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("send dropped before the backend answered; releasing pending state");
            self.widget.state().set_pending(false);
        }
    }
}
