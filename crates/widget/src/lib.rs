//! Headless embeddable chat widget.
//!
//! The widget owns conversation state and talks to the chat backend; a presentation
//! layer renders [`WidgetSnapshot`]s and reacts to [`WidgetEvent`]s.
#![deny(unsafe_code)]

/// Chat domain contracts shared with presentation layers.
pub mod chat;
/// Persisted session identifier lifecycle.
pub mod session;
/// Layered widget settings.
pub mod settings;
pub mod widget;

#[cfg(test)]
mod testing;

pub use chat::{Feedback, Greeting, Role, Turn, TurnId, TurnKind, WidgetEvent};
pub use session::{SessionManager, get_or_create};
pub use settings::{Position, SettingsLoader, WidgetSettings};
pub use widget::{
    ChatWidget, IgnoreReason, ProbeOutcome, RESET_PROMPT, ResetOutcome, SendOutcome, StaleError,
    WidgetError, WidgetResult, WidgetSnapshot,
};
