use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use chatline::chat::{Role, TurnKind, WidgetEvent};
use chatline::{
    ChatWidget, Feedback, RESET_PROMPT, ResetOutcome, SettingsLoader, TurnId, WidgetError,
};
use chatline_storage::{SqliteStore, StorageError};

const SESSION_DATABASE_FILE: &str = "session.db";

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("failed to open session store at {path:?}: {source}"))]
    OpenStore {
        stage: &'static str,
        path: PathBuf,
        source: StorageError,
    },
    #[snafu(display("failed to start chat widget: {source}"))]
    StartWidget {
        stage: &'static str,
        source: WidgetError,
    },
    #[snafu(display("failed to read from stdin: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Open,
    Close,
    Reset,
    Retry,
    Quick(String),
    Ask(usize),
    Feedback(TurnId, Feedback),
    Info,
    Quit,
    Send(String),
    Usage(&'static str),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("open"), None, _) => Self::Open,
            (Some("close"), None, _) => Self::Close,
            (Some("reset"), None, _) => Self::Reset,
            (Some("retry"), None, _) => Self::Retry,
            (Some("info"), None, _) => Self::Info,
            (Some("quit"), None, _) => Self::Quit,
            (Some("quick"), Some(id), None) => Self::Quick(id.to_string()),
            (Some("ask"), Some(index), None) => match index.parse::<usize>() {
                Ok(index) if index > 0 => Self::Ask(index - 1),
                _ => Self::Usage("/ask <number from 1>"),
            },
            (Some("feedback"), Some(turn), Some(verdict)) => {
                let feedback = match verdict {
                    "+" => Feedback::Positive,
                    "-" => Feedback::Negative,
                    _ => return Self::Usage("/feedback <turn> +|-"),
                };
                match turn.parse::<u64>() {
                    Ok(turn) => Self::Feedback(TurnId::new(turn), feedback),
                    Err(_) => Self::Usage("/feedback <turn> +|-"),
                }
            }
            _ => Self::Usage(
                "/open /close /reset /retry /quick <id> /ask <n> /feedback <turn> +|- /info /quit",
            ),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        eprintln!("chatline: {error}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(SettingsLoader::default_config_path);
    let settings = SettingsLoader::new(config_path).load();

    let database_path = session_database_path();
    let store = SqliteStore::open(&database_path.to_string_lossy(), &settings.storage_origin)
        .await
        .context(OpenStoreSnafu {
            stage: "cli-open-session-store",
            path: database_path.clone(),
        })?;

    let widget = Arc::new(
        ChatWidget::connect(settings, Arc::new(store)).context(StartWidgetSnafu {
            stage: "cli-connect-widget",
        })?,
    );
    let events = widget.subscribe();
    let printer = tokio::spawn(print_events(events));
    let _probe = widget.start_liveness_probe();

    print_greeting(&widget);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_line(&mut lines).await? {
        match Command::parse(&line) {
            Command::Open => widget.open(),
            Command::Close => widget.close(),
            Command::Reset => {
                println!("{RESET_PROMPT} [y/N]");
                let answer = next_line(&mut lines).await?.unwrap_or_default();
                let confirmed = matches!(answer.trim(), "y" | "Y" | "yes");
                if let ResetOutcome::Reset { current, .. } =
                    widget.reset_conversation(|_| confirmed).await
                {
                    println!("new session {current}");
                }
            }
            Command::Retry => {
                if !widget.retry_connection() {
                    println!("nothing to retry");
                }
            }
            Command::Quick(id) => {
                widget.select_quick_reply(&id).await;
            }
            Command::Ask(index) => {
                widget.select_suggested_question(index).await;
            }
            Command::Feedback(turn_id, feedback) => {
                if !widget.submit_feedback(turn_id, feedback) {
                    println!("feedback not accepted for turn {}", turn_id.0);
                }
            }
            Command::Info => match widget.session_info().await {
                Ok(info) => println!(
                    "session {} created {} with {} messages",
                    info.session_id, info.created_at, info.message_count
                ),
                Err(error) => println!("session {} (backend: {error})", widget.session_id()),
            },
            Command::Quit => break,
            Command::Send(text) => {
                widget.send(&text).await;
            }
            Command::Usage(usage) => println!("usage: {usage}"),
        }
    }

    printer.abort();
    Ok(())
}

async fn next_line(lines: &mut Lines<BufReader<Stdin>>) -> CliResult<Option<String>> {
    lines.next_line().await.context(ReadInputSnafu {
        stage: "cli-read-stdin",
    })
}

fn session_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|path| path.join("chatline"))
        .unwrap_or_else(|| PathBuf::from(".chatline"))
        .join(SESSION_DATABASE_FILE)
}

fn print_greeting(widget: &ChatWidget) {
    let Some(greeting) = widget.snapshot().greeting else {
        return;
    };
    println!("{}", greeting.title);
    println!("{}", greeting.message);
    for (index, question) in greeting.suggested_questions.iter().enumerate() {
        println!("  /ask {}  {question}", index + 1);
    }
}

async fn print_events(mut events: tokio::sync::mpsc::UnboundedReceiver<WidgetEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            WidgetEvent::VisibilityChanged { open } => {
                println!("[{}]", if open { "opened" } else { "closed" });
            }
            WidgetEvent::GreetingShown(greeting) => {
                println!("{}", greeting.title);
                println!("{}", greeting.message);
            }
            WidgetEvent::TurnAppended(turn) => {
                let speaker = match (turn.role, turn.kind) {
                    (Role::User, _) => "you",
                    (Role::Bot, TurnKind::Error(_)) => "error",
                    (Role::Bot, _) => "bot",
                };
                println!("{} #{} {speaker}: {}", turn.timestamp, turn.id.0, turn.content);
                for source in &turn.sources {
                    println!("    - {} <{}>", source.title, source.link);
                }
            }
            WidgetEvent::TypingChanged { active: true } => println!("..."),
            WidgetEvent::QuickRepliesChanged(replies) => {
                for reply in replies {
                    println!("  /quick {}  {}", reply.id, reply.label);
                }
            }
            WidgetEvent::RetryOffered => println!("type /retry to reconnect"),
            WidgetEvent::FeedbackRecorded { turn_id, .. } => {
                println!("thanks for the feedback on #{}", turn_id.0);
            }
            WidgetEvent::TypingChanged { active: false }
            | WidgetEvent::GreetingHidden
            | WidgetEvent::DraftChanged { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(
            Command::parse("  hello there "),
            Command::Send("hello there".to_string())
        );
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(Command::parse("/reset"), Command::Reset);
        assert_eq!(Command::parse("/quick 2"), Command::Quick("2".to_string()));
        assert_eq!(Command::parse("/ask 1"), Command::Ask(0));
        assert_eq!(
            Command::parse("/feedback 4 -"),
            Command::Feedback(TurnId::new(4), Feedback::Negative)
        );
    }

    #[test]
    fn malformed_commands_print_usage() {
        assert!(matches!(Command::parse("/ask 0"), Command::Usage(_)));
        assert!(matches!(Command::parse("/feedback x +"), Command::Usage(_)));
        assert!(matches!(Command::parse("/dance"), Command::Usage(_)));
    }
}
