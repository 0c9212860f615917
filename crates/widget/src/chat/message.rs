use chatline_backend::{FailureKind, Source};

use crate::settings::WidgetSettings;

/// Shown instead of a turn whose content was blank after trimming.
pub const EMPTY_MESSAGE_PLACEHOLDER: &str = "Empty message received";

/// Conversation speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Bot,
}

/// Stable identifier for one turn; never reused within a widget instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Thumbs up/down verdict on a bot turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feedback {
    Positive,
    Negative,
}

/// What a bot turn represents, so presentation never has to inspect its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnKind {
    Message,
    Error(FailureKind),
    /// A successful response that carried no usable reply text.
    SoftFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub sources: Vec<Source>,
    /// Local wall-clock time the turn was appended, formatted `HH:MM`.
    pub timestamp: String,
    pub kind: TurnKind,
    pub feedback: Option<Feedback>,
}

impl Turn {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TurnKind::Error(_))
    }
}

/// Welcome panel shown on a fresh load and after every reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub title: String,
    pub message: String,
    pub suggested_questions: Vec<String>,
}

impl Greeting {
    pub fn from_settings(settings: &WidgetSettings) -> Self {
        Self {
            title: settings.welcome_title.clone(),
            message: settings.welcome_message.clone(),
            suggested_questions: settings.quick_questions.clone(),
        }
    }
}

/// Append-only, insertion-ordered conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        role: Role,
        content: &str,
        sources: Vec<Source>,
        kind: TurnKind,
    ) -> &Turn {
        self.next_id += 1;
        self.turns.push(Turn {
            id: TurnId::new(self.next_id),
            role,
            content: display_text(content),
            sources,
            timestamp: display_timestamp(),
            kind,
            feedback: None,
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get_mut(&mut self, id: TurnId) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|turn| turn.id == id)
    }

    /// Empties the history; identifiers keep counting up so stale ids never match.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

fn display_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!("empty message after trimming");
        EMPTY_MESSAGE_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

fn display_timestamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}
