//! Remote source of exchange rates.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::config::RatesConfig;
use crate::retry::retry_delay;

use super::RateTable;

/// Rate source error type
#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("malformed rate document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Provider of a full rate table snapshot.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self) -> Result<RateTable, RateError>;
}

/// Daily quote document published by the central bank.
///
/// Maps currency char code to its quote; per-unit rates are obtained by
/// dividing the quoted value by the nominal (some currencies are quoted
/// per 10 or per 100 units).
#[derive(Debug, Deserialize)]
struct DailyQuotes {
    #[serde(rename = "Valute")]
    valute: HashMap<String, Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(rename = "Nominal")]
    nominal: f64,
    #[serde(rename = "Value")]
    value: f64,
}

/// HTTP rate source backed by the central bank's daily JSON document.
pub struct CentralBankSource {
    client: reqwest::Client,
    url: String,
    retries: u32,
}

impl CentralBankSource {
    pub fn new(config: &RatesConfig) -> Result<Self, RateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            retries: config.request_retries,
        })
    }

    async fn try_fetch(&self) -> Result<RateTable, RateError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        parse_rate_document(&body, &self.url)
    }
}

#[async_trait]
impl RateSource for CentralBankSource {
    async fn fetch(&self) -> Result<RateTable, RateError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_fetch().await {
                Ok(table) => return Ok(table),
                Err(err) if attempt <= self.retries => {
                    let delay = retry_delay(attempt);
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Parse the daily quote document into a per-unit rate table.
///
/// Entries with a non-positive nominal are skipped; a single malformed
/// quote never aborts the whole document.
fn parse_rate_document(body: &str, source: &str) -> Result<RateTable, RateError> {
    let quotes: DailyQuotes = serde_json::from_str(body)?;

    let mut rates = HashMap::with_capacity(quotes.valute.len());
    for (code, quote) in quotes.valute {
        if quote.nominal <= 0.0 {
            tracing::warn!(code = %code, nominal = quote.nominal, "skipping quote with bad nominal");
            continue;
        }
        rates.insert(code, quote.value / quote.nominal);
    }

    Ok(RateTable {
        rates,
        source: source.to_string(),
        fetched_at: Utc::now(),
    })
}
