//! Error taxonomy from spec.md §7, one `thiserror` enum per concern —
//! mirrors the teacher's split into `domain::errors` (TradingError,
//! RiskViolation, MarketDataError, PortfolioError).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key at {path}: {key}")]
    UnknownKey { path: String, key: String },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("missing required field: {field}")]
    Missing { field: String },
}

#[derive(Debug, Error)]
pub enum ConfigIoError {
    #[error("config file not found: {path}")]
    NotFound { path: String },
    #[error("failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("authentication failed for login {login} @ {server}")]
    AuthFailed { login: String, server: String },
    #[error("broker terminal unreachable: {reason}")]
    Unreachable { reason: String },
}

#[derive(Debug, Error)]
#[error("no data available for {instrument} {timeframe}")]
pub struct DataNotAvailable {
    pub instrument: String,
    pub timeframe: String,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order rejected: {reason}")]
    Rejected { reason: String },
    #[error("invalid volume {volume} for {instrument}")]
    InvalidVolume { instrument: String, volume: f64 },
    #[error("market closed for {instrument}")]
    MarketClosed { instrument: String },
    #[error("broker error {code}: {message}")]
    Other { code: i32, message: String },
}

#[derive(Debug, Error)]
#[error("persistence operation failed: {0}")]
pub struct PersistenceError(pub String);

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        PersistenceError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_messages_name_the_login() {
        let e = ConnectionError::AuthFailed {
            login: "1000900".to_string(),
            server: "Demo-Server".to_string(),
        };
        assert!(e.to_string().contains("1000900"));
    }

    #[test]
    fn order_error_other_carries_broker_code() {
        let e = OrderError::Other {
            code: 10004,
            message: "requote".to_string(),
        };
        assert!(e.to_string().contains("10004"));
        assert!(e.to_string().contains("requote"));
    }
}
