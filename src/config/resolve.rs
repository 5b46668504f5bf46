//! Turns a `RawConfigFile` into an immutable `ConfigSnapshot` by applying
//! the defaults→account→instrument inheritance rule from spec.md §4.1.

use crate::config::model::*;
use crate::config::raw::*;
use crate::domain::fx_errors::ConfigError;
use crate::domain::fx_types::Timeframe;

pub fn resolve_snapshot(raw: &RawConfigFile) -> Result<ConfigSnapshot, ConfigError> {
    let mut accounts = Vec::with_capacity(raw.accounts.len());
    for (name, account) in &raw.accounts {
        accounts.push(resolve_account(raw, name, account)?);
    }
    accounts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ConfigSnapshot { accounts })
}

fn resolve_account(
    raw: &RawConfigFile,
    name: &str,
    account: &RawAccount,
) -> Result<AccountProfile, ConfigError> {
    let account_group = raw.defaults.clone().merge(account.group.clone());

    let emergency_raw = raw.emergency.clone().unwrap_or_default();

    let execution = resolve_execution(&account_group)?;
    let portfolio = resolve_portfolio(&account_group)?;
    let emergency = EmergencyConfig {
        stop_all: emergency_raw.stop_all.unwrap_or(false),
        max_daily_loss_percent: emergency_raw.max_daily_loss_percent.unwrap_or(0.05),
        max_drawdown_percent: emergency_raw.max_drawdown_percent.unwrap_or(0.20),
    };

    let mut instruments = Vec::with_capacity(account.currencies.len());
    for currency in &account.currencies {
        instruments.push(resolve_instrument(&account_group, currency)?);
    }

    Ok(AccountProfile {
        name: name.to_string(),
        login: account.login.clone(),
        password: account.password.clone(),
        server: account.server.clone(),
        broker: account.broker.clone(),
        execution,
        portfolio,
        emergency,
        instruments,
    })
}

fn resolve_execution(group: &RawGroup) -> Result<ExecutionConfig, ConfigError> {
    let e = group.execution.clone().unwrap_or_default();
    Ok(ExecutionConfig {
        interval_seconds: e.interval_seconds.unwrap_or(30),
        parallel_execution: e.parallel_execution.unwrap_or(false),
        max_workers: e.max_workers.unwrap_or(4),
        use_intelligent_manager: e.use_intelligent_manager.unwrap_or(false),
        use_ml: e.use_ml.unwrap_or(false),
        use_sentiment: e.use_sentiment.unwrap_or(false),
    })
}

fn resolve_portfolio(group: &RawGroup) -> Result<PortfolioConfig, ConfigError> {
    let r = group.risk.clone().unwrap_or_default();
    Ok(PortfolioConfig {
        portfolio_risk_percent: r.portfolio_risk_percent.unwrap_or(5.0),
        max_concurrent_trades: r.max_concurrent_trades.unwrap_or(15),
    })
}

fn resolve_instrument(
    account_group: &RawGroup,
    currency: &RawCurrency,
) -> Result<InstrumentConfig, ConfigError> {
    let group = account_group.clone().merge(currency.group.clone());

    let risk = group.risk.clone().unwrap_or_default();
    let strategy_raw = group.strategy.clone().ok_or_else(|| ConfigError::Missing {
        field: format!("{}.strategy", currency.symbol),
    })?;

    let strategy = StrategyParams {
        kind: strategy_raw.kind.unwrap_or(StrategyKind::Position),
        fast_period: strategy_raw.fast_period.ok_or_else(|| ConfigError::Missing {
            field: format!("{}.strategy.fast_period", currency.symbol),
        })?,
        slow_period: strategy_raw.slow_period.ok_or_else(|| ConfigError::Missing {
            field: format!("{}.strategy.slow_period", currency.symbol),
        })?,
        sl_pips: strategy_raw.sl_pips.unwrap_or(20.0),
        tp_pips: strategy_raw.tp_pips.unwrap_or(40.0),
    };

    if strategy.fast_period == 0 || strategy.fast_period >= strategy.slow_period {
        return Err(ConfigError::Invalid {
            field: format!("{}.strategy", currency.symbol),
            reason: "fast_period must be > 0 and < slow_period".to_string(),
        });
    }

    let trading_rules = group.trading_rules.clone().unwrap_or_default();
    let position_mgmt = resolve_position_management(&group);
    let timeframe = group.timeframe.unwrap_or(Timeframe::H1);

    Ok(InstrumentConfig {
        symbol: currency.symbol.clone(),
        enabled: currency.enabled,
        risk_percent: risk.risk_percent.unwrap_or(1.0),
        timeframe,
        strategy,
        max_position_size: risk.max_position_size.unwrap_or(5.0),
        min_position_size: risk.min_position_size.unwrap_or(0.01),
        cooldown_seconds: trading_rules.cooldown_seconds.unwrap_or(300),
        trade_on_signal_change: trading_rules.trade_on_signal_change.unwrap_or(true),
        min_confidence: trading_rules.min_confidence.unwrap_or(0.55),
        trading_hours: group
            .trading_hours
            .clone()
            .map(|h| TradingHours { start: h.start, end: h.end }),
        position_mgmt,
    })
}

fn resolve_position_management(group: &RawGroup) -> PositionManagementConfig {
    let raw = group.position_management.clone().unwrap_or_default();
    PositionManagementConfig {
        breakeven: raw.breakeven.map(|b| BreakevenRule {
            trigger_pips: b.trigger_pips,
            offset_pips: b.offset_pips,
        }),
        trail: raw.trail.map(|t| TrailRule {
            trigger_pips: t.trigger_pips,
            distance_pips: t.distance_pips,
        }),
        partial_close: raw.partial_close.map(|p| PartialCloseRule {
            trigger_pips: p.trigger_pips,
            percent: p.percent,
        }),
    }
}

/// Public resolver entry point matching spec.md §4.1's contract:
/// `Resolve(snapshot, account_name, instrument) -> InstrumentConfig`.
pub fn resolve(
    snapshot: &ConfigSnapshot,
    account_name: &str,
    instrument: &str,
) -> Result<InstrumentConfig, ConfigError> {
    let account = snapshot
        .account(account_name)
        .ok_or_else(|| ConfigError::Missing {
            field: format!("accounts.{account_name}"),
        })?;
    account
        .instrument(instrument)
        .cloned()
        .ok_or_else(|| ConfigError::Missing {
            field: format!("accounts.{account_name}.currencies.{instrument}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn minimal_raw() -> RawConfigFile {
        let mut currency_group = RawGroup::default();
        currency_group.strategy = Some(RawStrategy {
            kind: None,
            fast_period: Some(10),
            slow_period: Some(20),
            sl_pips: Some(20.0),
            tp_pips: Some(40.0),
        });

        let mut accounts = HashMap::new();
        accounts.insert(
            "default".to_string(),
            RawAccount {
                login: "1000".to_string(),
                password: "secret".to_string(),
                server: "Demo-Server".to_string(),
                broker: "DemoBroker".to_string(),
                group: RawGroup::default(),
                currencies: vec![RawCurrency {
                    symbol: "EURUSD".to_string(),
                    enabled: true,
                    group: currency_group,
                }],
            },
        );

        RawConfigFile {
            version: 2,
            defaults: RawGroup::default(),
            accounts,
            strategy_templates: None,
            emergency: None,
            notifications: None,
        }
    }

    #[test]
    fn every_field_resolves_even_with_sparse_input() {
        let raw = minimal_raw();
        let snapshot = resolve_snapshot(&raw).expect("should resolve");
        let instrument = resolve(&snapshot, "default", "EURUSD").unwrap();
        assert_eq!(instrument.strategy.fast_period, 10);
        assert_eq!(instrument.strategy.slow_period, 20);
        assert!(instrument.risk_percent > 0.0);
        assert!(instrument.min_confidence > 0.0);
    }

    #[test]
    fn instrument_level_overrides_defaults_wholesale_within_section() {
        let mut raw = minimal_raw();
        raw.defaults.risk = Some(RawRisk {
            risk_percent: Some(2.0),
            ..Default::default()
        });
        let snapshot = resolve_snapshot(&raw).unwrap();
        let instrument = resolve(&snapshot, "default", "EURUSD").unwrap();
        // inherited from defaults since instrument didn't set risk_percent
        assert_eq!(instrument.risk_percent, 2.0);
    }

    #[test]
    fn missing_strategy_period_is_a_config_error() {
        let mut raw = minimal_raw();
        raw.accounts
            .get_mut("default")
            .unwrap()
            .currencies[0]
            .group
            .strategy = Some(RawStrategy::default());
        let err = resolve_snapshot(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }
}
