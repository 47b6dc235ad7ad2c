use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token (required)
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Long-poll timeout in seconds for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Timeout in seconds for individual edit requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retry attempts for a failed outbound request
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatesConfig {
    /// URL of the daily exchange rate document
    #[serde(default = "default_rates_url")]
    pub url: String,
    /// Interval in seconds between rate refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Timeout in seconds for a single fetch
    #[serde(default = "default_rates_timeout")]
    pub request_timeout_secs: u64,
    /// Retry attempts for a failed fetch
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
    /// Currency the price tokens are denominated in
    #[serde(default = "default_source_currency")]
    pub source_currency: String,
    /// Currency the converted amount is shown in
    #[serde(default = "default_target_currency")]
    pub target_currency: String,
    /// Currency the rate document is expressed in (its own rate is 1.0)
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    /// Location of the persisted template document
    #[serde(default = "default_templates_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    /// Grace period in seconds for stopping the watcher
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

fn default_request_retries() -> u32 {
    3
}

fn default_rates_url() -> String {
    "https://www.cbr-xml-daily.ru/daily_json.js".to_string()
}

fn default_refresh_interval() -> u64 {
    3600 // 1 hour
}

fn default_rates_timeout() -> u64 {
    20
}

fn default_source_currency() -> String {
    "UAH".to_string()
}

fn default_target_currency() -> String {
    "RUB".to_string()
}

fn default_reference_currency() -> String {
    "RUB".to_string()
}

fn default_templates_path() -> String {
    "templates.json".to_string()
}

fn default_stop_timeout() -> u64 {
    5
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("rates.url", default_rates_url())?
            .set_default("rates.refresh_interval_secs", default_refresh_interval() as i64)?
            .set_default("templates.path", default_templates_path())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // TELEGRAM_TOKEN, RATES_URL, TEMPLATES_PATH, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            url: default_rates_url(),
            refresh_interval_secs: default_refresh_interval(),
            request_timeout_secs: default_rates_timeout(),
            request_retries: default_request_retries(),
            source_currency: default_source_currency(),
            target_currency: default_target_currency(),
            reference_currency: default_reference_currency(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: default_templates_path(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let rates = RatesConfig::default();
        assert_eq!(rates.url, "https://www.cbr-xml-daily.ru/daily_json.js");
        assert_eq!(rates.refresh_interval_secs, 3600);
        assert_eq!(rates.source_currency, "UAH");
        assert_eq!(rates.target_currency, "RUB");
        assert_eq!(rates.reference_currency, "RUB");

        let templates = TemplatesConfig::default();
        assert_eq!(templates.path, "templates.json");

        let watcher = WatcherConfig::default();
        assert_eq!(watcher.stop_timeout_secs, 5);
    }
}
