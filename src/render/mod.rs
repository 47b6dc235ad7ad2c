//! Price token detection and substitution.
//!
//! A price token is the literal marker `$price:` followed by an unsigned
//! decimal number, e.g. `$price:123.45`. Rendering replaces every token
//! with a dual-currency string showing the original amount and its
//! conversion through the rate cache.

mod spans;

pub use spans::{format_spans, FormattingSpan, SpanStyle};

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::rates::RateCache;

lazy_static! {
    static ref PRICE_TOKEN_RE: Regex =
        Regex::new(r"\$price:(\d+(\.\d+)?)").expect("price token pattern is valid");
}

/// True iff the text contains at least one well-formed price token.
///
/// Decides both whether a message is tracked and whether it is re-rendered.
pub fn is_template(text: &str) -> bool {
    PRICE_TOKEN_RE.is_match(text)
}

/// The two currencies a rendered price shows: the token's own currency
/// and the one it is converted into.
#[derive(Debug, Clone)]
pub struct CurrencyPair {
    pub source: String,
    pub target: String,
}

impl CurrencyPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Rewrites price tokens into dual-currency strings using current rates.
#[derive(Clone)]
pub struct Renderer {
    rates: Arc<RateCache>,
    pair: CurrencyPair,
}

impl Renderer {
    pub fn new(rates: Arc<RateCache>, pair: CurrencyPair) -> Self {
        Self { rates, pair }
    }

    /// Replace every price token in the text, left to right.
    ///
    /// Text without tokens is returned unchanged. A token whose payload
    /// fails to parse stays literal instead of failing the whole render.
    pub fn render(&self, template: &str) -> String {
        if !is_template(template) {
            return template.to_string();
        }

        PRICE_TOKEN_RE
            .replace_all(template, |caps: &Captures<'_>| match caps[1].parse::<f64>() {
                Ok(amount) => self.format_price(amount),
                Err(_) => caps[0].to_string(),
            })
            .into_owned()
    }

    fn format_price(&self, amount: f64) -> String {
        let converted = self.rates.convert(amount, &self.pair.source, &self.pair.target);

        format!(
            "{:.2}{} ({:.2}{})",
            amount,
            currency_symbol(&self.pair.source),
            converted,
            currency_symbol(&self.pair.target)
        )
    }
}

/// Display symbol for a currency code; unknown codes render as the code.
pub fn currency_symbol(code: &str) -> &str {
    match code {
        "UAH" => "₴",
        "RUB" => "₽",
        "USD" => "$",
        "EUR" => "€",
        _ => code,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::rates::{RateError, RateSource, RateTable};

    use super::*;

    struct FixedSource {
        rates: HashMap<String, f64>,
    }

    #[async_trait]
    impl RateSource for FixedSource {
        async fn fetch(&self) -> Result<RateTable, RateError> {
            Ok(RateTable {
                rates: self.rates.clone(),
                source: "fixed".to_string(),
                fetched_at: Utc::now(),
            })
        }
    }

    async fn test_renderer(rates: &[(&str, f64)]) -> Renderer {
        let source = FixedSource {
            rates: rates.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
        };
        let cache = RateCache::new(Box::new(source), "RUB").await.unwrap();
        Renderer::new(Arc::new(cache), CurrencyPair::new("UAH", "RUB"))
    }

    #[test]
    fn test_is_template_detects_tokens() {
        assert!(is_template("$price:10"));
        assert!(is_template("$price:10.5"));
        assert!(is_template("text around $price:3 here"));

        assert!(!is_template(""));
        assert!(!is_template("just text"));
        assert!(!is_template("$price:"));
        assert!(!is_template("$price:abc"));
        assert!(!is_template("price:10"));
    }

    #[tokio::test]
    async fn test_render_without_tokens_is_identity() {
        let renderer = test_renderer(&[("UAH", 40.0)]).await;

        for text in ["", "hello", "price: 10", "$price: 10"] {
            assert_eq!(renderer.render(text), text);
        }
    }

    #[tokio::test]
    async fn test_render_dual_currency_scenario() {
        let renderer = test_renderer(&[("UAH", 40.0)]).await;

        assert_eq!(
            renderer.render("Price: $price:10.5"),
            "Price: 10.50₴ (420.00₽)"
        );
    }

    #[tokio::test]
    async fn test_render_replaces_every_occurrence() {
        let renderer = test_renderer(&[("UAH", 2.0)]).await;

        let rendered = renderer.render("a $price:1 b $price:2.5 c");
        assert_eq!(rendered, "a 1.00₴ (2.00₽) b 2.50₴ (5.00₽) c");
    }

    #[tokio::test]
    async fn test_render_is_position_independent() {
        let renderer = test_renderer(&[("UAH", 2.0)]).await;

        assert_eq!(renderer.render("$price:1"), "1.00₴ (2.00₽)");
        assert_eq!(renderer.render("x $price:1"), "x 1.00₴ (2.00₽)");
        assert_eq!(renderer.render("$price:1 x"), "1.00₴ (2.00₽) x");
    }

    #[test]
    fn test_currency_symbol_fallback() {
        assert_eq!(currency_symbol("UAH"), "₴");
        assert_eq!(currency_symbol("RUB"), "₽");
        assert_eq!(currency_symbol("CHF"), "CHF");
    }
}
