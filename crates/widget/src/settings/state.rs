use std::path::{Path, PathBuf};
use std::time::Duration;

use chatline_backend::{BackendConfig, DEFAULT_BASE_URL};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "chatline";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "CHATLINE_";

pub const DEFAULT_WELCOME_TITLE: &str = "Welcome to Absolute App Labs!";
pub const DEFAULT_WELCOME_MESSAGE: &str = "Hi! How can I help you today?";
pub const DEFAULT_PROBE_DELAY_MS: u64 = 100;
pub const DEFAULT_STORAGE_ORIGIN: &str = "default";

/// Screen corner the launcher button is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    BottomRight,
    BottomLeft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_welcome_title")]
    pub welcome_title: String,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    #[serde(default = "default_quick_questions")]
    pub quick_questions: Vec<String>,
    /// Client-side limit for chat requests in milliseconds; unset waits indefinitely.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
    /// Scope of the persisted session entry, the analogue of a page origin.
    #[serde(default = "default_storage_origin")]
    pub storage_origin: String,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            position: Position::default(),
            welcome_title: default_welcome_title(),
            welcome_message: default_welcome_message(),
            quick_questions: default_quick_questions(),
            request_timeout_ms: None,
            probe_delay_ms: default_probe_delay_ms(),
            storage_origin: default_storage_origin(),
        }
    }
}

impl WidgetSettings {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_welcome_message(mut self, welcome_message: impl Into<String>) -> Self {
        self.welcome_message = welcome_message.into();
        self
    }

    pub fn with_quick_questions<I, S>(mut self, questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quick_questions = questions.into_iter().map(Into::into).collect();
        self
    }

    /// Sub-millisecond remainders are dropped; a non-zero timeout never becomes zero.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.request_timeout_ms = if timeout.is_zero() {
            None
        } else {
            Some(millis.max(1))
        };
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn to_backend_config(&self) -> BackendConfig {
        let config = BackendConfig::new(&self.base_url);
        match self.request_timeout() {
            Some(timeout) => config.with_request_timeout(timeout),
            None => config,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.base_url = non_blank_or(self.base_url, default_base_url);
        self.welcome_title = non_blank_or(self.welcome_title, default_welcome_title);
        self.welcome_message = non_blank_or(self.welcome_message, default_welcome_message);
        self.storage_origin = non_blank_or(self.storage_origin, default_storage_origin);
        // An explicitly empty list is honoured; only blank rows are dropped.
        self.quick_questions = self
            .quick_questions
            .into_iter()
            .map(|question| question.trim().to_string())
            .filter(|question| !question.is_empty())
            .collect();
        self.request_timeout_ms = self.request_timeout_ms.filter(|millis| *millis > 0);
        self
    }
}

/// Layers defaults, an optional JSON file and `CHATLINE_*` environment variables.
pub struct SettingsLoader {
    config_path: PathBuf,
}

impl SettingsLoader {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".chatline"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn figment(&self) -> Figment {
        Figment::from(Serialized::defaults(WidgetSettings::default()))
            .merge(Json::file(&self.config_path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn extract(&self) -> Result<WidgetSettings, SettingsError> {
        self.figment()
            .extract::<WidgetSettings>()
            .map(WidgetSettings::normalized)
            .context(ExtractSnafu {
                stage: "extract-widget-settings",
                path: self.config_path.clone(),
            })
    }

    /// Like [`Self::extract`], but a broken file or variable falls back to defaults.
    pub fn load(&self) -> WidgetSettings {
        if !self.config_path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", self.config_path);
        }

        match self.extract() {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!("{error}. using defaults");
                WidgetSettings::default()
            }
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read widget settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: figment::Error,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_welcome_title() -> String {
    DEFAULT_WELCOME_TITLE.to_string()
}

fn default_welcome_message() -> String {
    DEFAULT_WELCOME_MESSAGE.to_string()
}

fn default_quick_questions() -> Vec<String> {
    vec![
        "What services does Absolute App Labs offer?".to_string(),
        "Tell me about your AI capabilities".to_string(),
        "How can I get started with a project?".to_string(),
    ]
}

fn default_probe_delay_ms() -> u64 {
    DEFAULT_PROBE_DELAY_MS
}

fn default_storage_origin() -> String {
    DEFAULT_STORAGE_ORIGIN.to_string()
}
