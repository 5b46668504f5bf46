//! Capability boundaries the core consumes but does not implement end to
//! end: the broker terminal, the ML predictor, the sentiment source, and
//! the persistence gateway. Concrete adapters live under `infrastructure/`.

use crate::domain::fx_errors::{
    ConnectionError, DataNotAvailable, PersistenceError,
};
use crate::domain::fx_types::{
    AccountInfo, AccountSnapshot, Bar, DailyPerformance, OpenPosition, OrderRequest, OrderResult,
    Signal, Timeframe, Trade,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One session = one account = one OS process. Implementations are
/// process-exclusive (spec.md §4.3) — the trait itself does not enforce
/// that, the Worker's ownership model does.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn connect(
        &self,
        login: &str,
        password: &str,
        server: &str,
        timeout: std::time::Duration,
    ) -> Result<(), ConnectionError>;

    async fn disconnect(&self);

    async fn account_info(&self) -> Result<AccountInfo, ConnectionError>;

    /// Most recent `count` closed bars, oldest first.
    async fn bars(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, DataNotAvailable>;

    async fn send_order(&self, req: OrderRequest) -> OrderResult;

    async fn modify_position(
        &self,
        ticket: i64,
        sl: Option<f64>,
        tp: Option<f64>,
    ) -> Result<(), String>;

    /// `volume` closes only that much of the position (spec.md §4.8 partial
    /// close); `None` closes it in full.
    async fn close_position(&self, ticket: i64, volume: Option<f64>) -> Result<(), String>;

    async fn positions(&self) -> Result<Vec<OpenPosition>, String>;

    async fn auto_trading_enabled(&self) -> bool;
}

/// Prediction label + confidence. The model's internals are out of scope;
/// the core only consumes `(kind, confidence)`.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(
        &self,
        instrument: &str,
        bars: &[Bar],
    ) -> anyhow::Result<crate::domain::decision::ProviderOpinion>;
}

#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn sentiment(
        &self,
        instrument: &str,
    ) -> anyhow::Result<crate::domain::decision::ProviderOpinion>;
}

/// Cross-instrument exposure a Broker Session can supply without a
/// round-trip to the terminal — used by the Intelligent Portfolio Manager
/// when it needs sector/correlation buckets rather than raw positions.
pub trait SectorProvider: Send + Sync {
    fn sector_of(&self, instrument: &str) -> Option<String>;
}

/// Typed, pooled, transaction-scoped facade over the relational store.
/// Every method runs in its own short transaction; failures are reported
/// as `PersistenceError` and never abort the caller's trading cycle
/// (spec.md §4.2, §7).
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_signal(&self, sig: &Signal, account_id: &str) -> Result<i64, PersistenceError>;
    async fn create_trade(&self, trade: &Trade) -> Result<i64, PersistenceError>;
    async fn close_trade(
        &self,
        ticket: i64,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        profit: f64,
        pips: f64,
    ) -> Result<(), PersistenceError>;
    async fn link_signal_to_trade(&self, signal_id: i64, trade_id: i64)
    -> Result<(), PersistenceError>;
    async fn create_snapshot(&self, snap: &AccountSnapshot) -> Result<(), PersistenceError>;
    async fn upsert_daily_performance(
        &self,
        account_id: &str,
        date: chrono::NaiveDate,
        profit: f64,
    ) -> Result<DailyPerformance, PersistenceError>;
    async fn find_trade_by_ticket(&self, ticket: i64) -> Result<Option<Trade>, PersistenceError>;
    async fn recent_signals(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<Signal>, PersistenceError>;
    async fn pending_trades_older_than(
        &self,
        account_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Trade>, PersistenceError>;
    async fn cancel_trade(&self, trade_id: i64) -> Result<(), PersistenceError>;
}
