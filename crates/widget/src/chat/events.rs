use chatline_backend::QuickReply;

use crate::chat::message::{Feedback, Greeting, Turn, TurnId};

/// Notification for the presentation layer; widget state stays the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    VisibilityChanged { open: bool },
    /// History was wiped and the welcome panel is visible again.
    GreetingShown(Greeting),
    /// The first message of a conversation replaced the welcome panel.
    GreetingHidden,
    TurnAppended(Turn),
    TypingChanged { active: bool },
    /// The active quick-reply set; empty means none is offered.
    QuickRepliesChanged(Vec<QuickReply>),
    /// The backend was unreachable; a full reconnect may be offered to the user.
    RetryOffered,
    DraftChanged { can_send: bool },
    FeedbackRecorded { turn_id: TurnId, feedback: Feedback },
}
