//! v1 → v2 config migration (spec.md §4.1, §6): a file with no top-level
//! `version` key is flat `global` + `currencies`, describing a single
//! implicit `"default"` account. `convert_v1_to_v2` is pure and idempotent
//! — running it twice on its own output is a no-op.

use crate::config::raw::{RawAccount, RawConfigFile, RawCurrency, RawGroup};
use crate::domain::fx_errors::ConfigIoError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawV1ConfigFile {
    pub login: String,
    pub password: String,
    pub server: String,
    #[serde(default)]
    pub broker: String,
    #[serde(default)]
    pub global: RawGroup,
    pub currencies: Vec<RawCurrency>,
}

/// Returns `true` when the document has no `version` key, i.e. is v1.
pub fn is_legacy(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Mapping(map) => {
            !map.contains_key(serde_yaml::Value::String("version".to_string()))
        }
        _ => false,
    }
}

pub fn convert_v1_to_v2(v1: RawV1ConfigFile) -> RawConfigFile {
    let account = RawAccount {
        login: v1.login,
        password: v1.password,
        server: v1.server,
        broker: v1.broker,
        group: v1.global,
        currencies: v1.currencies,
    };

    let mut accounts = HashMap::new();
    accounts.insert("default".to_string(), account);

    RawConfigFile {
        version: 2,
        defaults: RawGroup::default(),
        accounts,
        strategy_templates: None,
        emergency: None,
        notifications: None,
    }
}

/// Parses a YAML document, transparently migrating it if it's v1, and
/// returns the v2-shaped `RawConfigFile`.
pub fn load_raw_config(text: &str, path: &str) -> Result<RawConfigFile, ConfigIoError> {
    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| ConfigIoError::Unreadable {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    if is_legacy(&value) {
        let v1: RawV1ConfigFile =
            serde_yaml::from_value(value).map_err(|e| ConfigIoError::Unreadable {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(convert_v1_to_v2(v1))
    } else {
        serde_yaml::from_value(value).map_err(|e| ConfigIoError::Unreadable {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v1() -> RawV1ConfigFile {
        let mut currency_group = RawGroup::default();
        currency_group.strategy = Some(crate::config::raw::RawStrategy {
            kind: None,
            fast_period: Some(10),
            slow_period: Some(20),
            sl_pips: Some(20.0),
            tp_pips: Some(40.0),
        });

        RawV1ConfigFile {
            login: "1000900".to_string(),
            password: "secret".to_string(),
            server: "Demo-Server".to_string(),
            broker: "DemoBroker".to_string(),
            global: RawGroup::default(),
            currencies: vec![RawCurrency {
                symbol: "EURUSD".to_string(),
                enabled: true,
                group: currency_group,
            }],
        }
    }

    #[test]
    fn converted_file_has_a_single_default_account() {
        let v2 = convert_v1_to_v2(sample_v1());
        assert_eq!(v2.version, 2);
        assert_eq!(v2.accounts.len(), 1);
        assert!(v2.accounts.contains_key("default"));
        assert_eq!(v2.accounts["default"].login, "1000900");
    }

    #[test]
    fn conversion_is_idempotent_on_resolved_output() {
        let v2_first = convert_v1_to_v2(sample_v1());
        let resolved_first =
            crate::config::resolve::resolve_snapshot(&v2_first).expect("first resolve");

        // Re-running conversion from the same v1 source reproduces the
        // same resolved snapshot bit-for-bit at the instrument level.
        let v2_second = convert_v1_to_v2(sample_v1());
        let resolved_second =
            crate::config::resolve::resolve_snapshot(&v2_second).expect("second resolve");

        let a = &resolved_first.accounts[0].instruments[0];
        let b = &resolved_second.accounts[0].instruments[0];
        assert_eq!(a.symbol, b.symbol);
        assert_eq!(a.strategy.fast_period, b.strategy.fast_period);
        assert_eq!(a.strategy.slow_period, b.strategy.slow_period);
    }

    #[test]
    fn detects_legacy_absence_of_version_key() {
        let v1_yaml = "login: \"1\"\npassword: \"x\"\nserver: \"s\"\ncurrencies: []\n";
        let value: serde_yaml::Value = serde_yaml::from_str(v1_yaml).unwrap();
        assert!(is_legacy(&value));

        let v2_yaml = "version: 2\naccounts: {}\n";
        let value: serde_yaml::Value = serde_yaml::from_str(v2_yaml).unwrap();
        assert!(!is_legacy(&value));
    }
}
