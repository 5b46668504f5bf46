//! `SentimentSource` adapter: fetches a currency-tagged news RSS feed and
//! scores headline polarity with VADER. Grounded in the teacher's
//! `AlternativeMeSentimentProvider` (reqwest client with a fixed timeout,
//! `anyhow::Context` error plumbing) but reads per-instrument news instead
//! of a single global Fear & Greed index.

use crate::domain::decision::ProviderOpinion;
use crate::domain::fx_ports::SentimentSource;
use crate::domain::fx_types::SignalKind;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use vader_sentiment::SentimentIntensityAnalyzer;

/// Currency code -> search term used to build the feed URL, e.g. "EUR" ->
/// "euro". Unknown currencies fall back to the raw code.
fn search_term(currency: &str) -> &str {
    match currency {
        "EUR" => "euro",
        "USD" => "dollar",
        "GBP" => "pound sterling",
        "JPY" => "yen",
        "AUD" => "australian dollar",
        "CHF" => "swiss franc",
        "CAD" => "canadian dollar",
        "NZD" => "new zealand dollar",
        other => other,
    }
}

fn base_currencies(instrument: &str) -> Vec<&str> {
    if instrument.len() != 6 {
        return vec![instrument];
    }
    vec![&instrument[0..3], &instrument[3..6]]
}

pub struct RssVaderSentimentSource {
    client: Client,
    feed_url_template: String,
}

impl RssVaderSentimentSource {
    /// `feed_url_template` must contain a single `{query}` placeholder,
    /// e.g. Google News's `...&q={query}&...`.
    pub fn new(feed_url_template: String) -> Self {
        Self {
            client: Client::builder().timeout(Duration::from_secs(5)).build().unwrap_or_default(),
            feed_url_template,
        }
    }

    fn url_for(&self, query: &str) -> String {
        self.feed_url_template.replace("{query}", &urlencoding_light(query))
    }
}

fn urlencoding_light(s: &str) -> String {
    s.replace(' ', "+")
}

#[async_trait]
impl SentimentSource for RssVaderSentimentSource {
    async fn sentiment(&self, instrument: &str) -> anyhow::Result<ProviderOpinion> {
        let currencies = base_currencies(instrument);
        let query = currencies
            .iter()
            .map(|c| search_term(c))
            .collect::<Vec<_>>()
            .join(" ");

        let url = self.url_for(&query);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch sentiment feed for {instrument}"))?
            .bytes()
            .await
            .context("failed to read sentiment feed body")?;

        let channel = rss::Channel::read_from(&bytes[..]).context("failed to parse RSS feed")?;
        let headlines: Vec<String> = channel.items().iter().filter_map(|i| i.title().map(str::to_string)).collect();

        if headlines.is_empty() {
            return Ok(ProviderOpinion { kind: SignalKind::Hold, confidence: 0.0, label: "no headlines".to_string() });
        }

        let analyzer = SentimentIntensityAnalyzer::new();
        let mut total = 0.0;
        for headline in &headlines {
            let scores = analyzer.polarity_scores(headline);
            total += scores.get("compound").copied().unwrap_or(0.0);
        }
        let mean = total / headlines.len() as f64;

        let kind = if mean > 0.1 {
            SignalKind::Buy
        } else if mean < -0.1 {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        };

        Ok(ProviderOpinion {
            kind,
            confidence: mean.abs().min(1.0),
            label: format!("vader_mean_compound({} headlines)", headlines.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_currencies_splits_a_six_letter_pair() {
        assert_eq!(base_currencies("EURUSD"), vec!["EUR", "USD"]);
    }

    #[test]
    fn search_term_maps_known_codes() {
        assert_eq!(search_term("EUR"), "euro");
        assert_eq!(search_term("XAU"), "XAU");
    }

    #[test]
    fn url_template_substitutes_query() {
        let source = RssVaderSentimentSource::new("https://news.example/rss?q={query}".to_string());
        assert_eq!(source.url_for("euro dollar"), "https://news.example/rss?q=euro+dollar");
    }
}
