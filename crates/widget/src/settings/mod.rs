pub mod state;

pub use state::{Position, SettingsError, SettingsLoader, WidgetSettings};
