/// Event contracts for the presentation layer.
pub mod events;
/// Conversation entities: turns, transcript, greeting.
pub mod message;

pub use chatline_backend::{FailureKind, QuickReply, Source};
pub use events::WidgetEvent;
pub use message::{
    EMPTY_MESSAGE_PLACEHOLDER, Feedback, Greeting, Role, Transcript, Turn, TurnId, TurnKind,
};
