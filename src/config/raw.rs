//! Raw YAML grammar (spec.md §6). Every level is `deny_unknown_fields` so
//! misconfiguration fails closed at load time rather than being silently
//! ignored.

use crate::config::model::StrategyKind;
use crate::domain::fx_types::Timeframe;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawExecution {
    pub interval_seconds: Option<u64>,
    pub parallel_execution: Option<bool>,
    pub max_workers: Option<usize>,
    pub use_intelligent_manager: Option<bool>,
    pub use_ml: Option<bool>,
    pub use_sentiment: Option<bool>,
}

impl RawExecution {
    fn merge(self, more_specific: RawExecution) -> RawExecution {
        RawExecution {
            interval_seconds: more_specific.interval_seconds.or(self.interval_seconds),
            parallel_execution: more_specific
                .parallel_execution
                .or(self.parallel_execution),
            max_workers: more_specific.max_workers.or(self.max_workers),
            use_intelligent_manager: more_specific
                .use_intelligent_manager
                .or(self.use_intelligent_manager),
            use_ml: more_specific.use_ml.or(self.use_ml),
            use_sentiment: more_specific.use_sentiment.or(self.use_sentiment),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawRisk {
    pub risk_percent: Option<f64>,
    pub max_position_size: Option<f64>,
    pub min_position_size: Option<f64>,
    pub portfolio_risk_percent: Option<f64>,
    pub max_concurrent_trades: Option<usize>,
}

impl RawRisk {
    fn merge(self, more_specific: RawRisk) -> RawRisk {
        RawRisk {
            risk_percent: more_specific.risk_percent.or(self.risk_percent),
            max_position_size: more_specific.max_position_size.or(self.max_position_size),
            min_position_size: more_specific.min_position_size.or(self.min_position_size),
            portfolio_risk_percent: more_specific
                .portfolio_risk_percent
                .or(self.portfolio_risk_percent),
            max_concurrent_trades: more_specific
                .max_concurrent_trades
                .or(self.max_concurrent_trades),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawStrategy {
    pub kind: Option<StrategyKind>,
    pub fast_period: Option<usize>,
    pub slow_period: Option<usize>,
    pub sl_pips: Option<f64>,
    pub tp_pips: Option<f64>,
}

impl RawStrategy {
    fn merge(self, more_specific: RawStrategy) -> RawStrategy {
        RawStrategy {
            kind: more_specific.kind.or(self.kind),
            fast_period: more_specific.fast_period.or(self.fast_period),
            slow_period: more_specific.slow_period.or(self.slow_period),
            sl_pips: more_specific.sl_pips.or(self.sl_pips),
            tp_pips: more_specific.tp_pips.or(self.tp_pips),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawBreakeven {
    pub trigger_pips: f64,
    pub offset_pips: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawTrail {
    pub trigger_pips: f64,
    pub distance_pips: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawPartialClose {
    pub trigger_pips: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawPositionManagement {
    pub breakeven: Option<RawBreakeven>,
    pub trail: Option<RawTrail>,
    pub partial_close: Option<RawPartialClose>,
}

impl RawPositionManagement {
    fn merge(self, more_specific: RawPositionManagement) -> RawPositionManagement {
        RawPositionManagement {
            breakeven: more_specific.breakeven.or(self.breakeven),
            trail: more_specific.trail.or(self.trail),
            partial_close: more_specific.partial_close.or(self.partial_close),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawTradingRules {
    pub cooldown_seconds: Option<u64>,
    pub trade_on_signal_change: Option<bool>,
    pub min_confidence: Option<f64>,
}

impl RawTradingRules {
    fn merge(self, more_specific: RawTradingRules) -> RawTradingRules {
        RawTradingRules {
            cooldown_seconds: more_specific.cooldown_seconds.or(self.cooldown_seconds),
            trade_on_signal_change: more_specific
                .trade_on_signal_change
                .or(self.trade_on_signal_change),
            min_confidence: more_specific.min_confidence.or(self.min_confidence),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawTradingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawGroup {
    pub execution: Option<RawExecution>,
    pub risk: Option<RawRisk>,
    pub strategy: Option<RawStrategy>,
    pub position_management: Option<RawPositionManagement>,
    pub trading_rules: Option<RawTradingRules>,
    pub trading_hours: Option<RawTradingHours>,
    pub timeframe: Option<Timeframe>,
}

impl RawGroup {
    pub fn merge(self, more_specific: RawGroup) -> RawGroup {
        RawGroup {
            execution: merge_opt(self.execution, more_specific.execution, RawExecution::merge),
            risk: merge_opt(self.risk, more_specific.risk, RawRisk::merge),
            strategy: merge_opt(self.strategy, more_specific.strategy, RawStrategy::merge),
            position_management: merge_opt(
                self.position_management,
                more_specific.position_management,
                RawPositionManagement::merge,
            ),
            trading_rules: merge_opt(
                self.trading_rules,
                more_specific.trading_rules,
                RawTradingRules::merge,
            ),
            trading_hours: more_specific.trading_hours.or(self.trading_hours),
            timeframe: more_specific.timeframe.or(self.timeframe),
        }
    }
}

fn merge_opt<T>(base: Option<T>, more_specific: Option<T>, f: impl Fn(T, T) -> T) -> Option<T>
where
    T: Default,
{
    match (base, more_specific) {
        (Some(b), Some(m)) => Some(f(b, m)),
        (Some(b), None) => Some(b),
        (None, Some(m)) => Some(f(T::default(), m)),
        (None, None) => None,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawCurrency {
    pub symbol: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub group: RawGroup,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawAccount {
    pub login: String,
    pub password: String,
    pub server: String,
    #[serde(default)]
    pub broker: String,
    #[serde(flatten)]
    pub group: RawGroup,
    pub currencies: Vec<RawCurrency>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    pub version: u32,
    #[serde(default)]
    pub defaults: RawGroup,
    pub accounts: HashMap<String, RawAccount>,
    #[serde(default)]
    pub strategy_templates: Option<HashMap<String, RawStrategy>>,
    #[serde(default)]
    pub emergency: Option<RawEmergency>,
    #[serde(default)]
    pub notifications: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawEmergency {
    pub stop_all: Option<bool>,
    pub max_daily_loss_percent: Option<f64>,
    pub max_drawdown_percent: Option<f64>,
}
