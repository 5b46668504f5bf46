//! Resolved configuration types — the output of `resolve()`. Every field
//! here is concrete; by the time an `InstrumentConfig` exists, inheritance
//! has already been applied (spec.md §8 property 2: no field is ever
//! unresolved).

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Position,
    Crossover,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyParams {
    pub kind: StrategyKind,
    pub fast_period: usize,
    pub slow_period: usize,
    pub sl_pips: f64,
    pub tp_pips: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingHours {
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            now >= self.start && now <= self.end
        } else {
            // overnight session wrapping midnight
            now >= self.start || now <= self.end
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakevenRule {
    pub trigger_pips: f64,
    pub offset_pips: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailRule {
    pub trigger_pips: f64,
    pub distance_pips: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartialCloseRule {
    pub trigger_pips: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PositionManagementConfig {
    pub breakeven: Option<BreakevenRule>,
    pub trail: Option<TrailRule>,
    pub partial_close: Option<PartialCloseRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub enabled: bool,
    pub risk_percent: f64,
    pub timeframe: crate::domain::fx_types::Timeframe,
    pub strategy: StrategyParams,
    pub max_position_size: f64,
    pub min_position_size: f64,
    pub cooldown_seconds: u64,
    pub trade_on_signal_change: bool,
    pub min_confidence: f64,
    pub trading_hours: Option<TradingHours>,
    pub position_mgmt: PositionManagementConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub interval_seconds: u64,
    pub parallel_execution: bool,
    pub max_workers: usize,
    pub use_intelligent_manager: bool,
    pub use_ml: bool,
    pub use_sentiment: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub portfolio_risk_percent: f64,
    pub max_concurrent_trades: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmergencyConfig {
    pub stop_all: bool,
    pub max_daily_loss_percent: f64,
    pub max_drawdown_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub name: String,
    pub login: String,
    pub password: String,
    pub server: String,
    pub broker: String,
    pub execution: ExecutionConfig,
    pub portfolio: PortfolioConfig,
    pub emergency: EmergencyConfig,
    pub instruments: Vec<InstrumentConfig>,
}

impl AccountProfile {
    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }
}

/// Immutable, fully-resolved configuration. Reload replaces the whole
/// snapshot atomically; in-flight cycles keep their `Arc` clone of the old
/// one (spec.md §4.1 hot-reload semantics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub accounts: Vec<AccountProfile>,
}

impl ConfigSnapshot {
    pub fn account(&self, name: &str) -> Option<&AccountProfile> {
        self.accounts.iter().find(|a| a.name == name)
    }
}
