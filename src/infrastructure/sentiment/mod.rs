//! `SentimentSource` adapters.

pub mod rss_vader;

pub use rss_vader::RssVaderSentimentSource;
