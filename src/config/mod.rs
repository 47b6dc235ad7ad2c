mod settings;

pub use settings::{RatesConfig, Settings, TelegramConfig, TemplatesConfig, WatcherConfig};
