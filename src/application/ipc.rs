//! Pool Manager ↔ Worker wire protocol (spec.md §4.10). Workers are
//! separate OS processes (spec.md §4.3's isolation invariant), so the
//! protocol crosses a real pipe: newline-delimited JSON over the child's
//! stdin/stdout, encoded/decoded with `serde_json` the way the rest of
//! this crate already uses it for persistence and config.

use crate::config::model::AccountProfile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InboundCommand {
    ExecuteCycle,
    StartTrading,
    StopTrading,
    ReloadCurrencies { profile: AccountProfile },
    ClosePositionsForInstrument { symbol: String },
    GetStatus,
    CheckAutoTrading,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub connected: bool,
    pub trading_enabled: bool,
    pub open_position_count: u32,
    pub active_instruments: Vec<String>,
}

/// Response body for `GET /accounts/:id/autotrading` (SPEC_FULL.md §A.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutoTradingReport {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummaryReport {
    pub executed: u32,
    pub skipped: u32,
    pub rejected: u32,
    pub errors: u32,
    pub emergency_halted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutboundEvent {
    WorkerReady { account_id: String },
    WorkerFailed { account_id: String, reason: String },
    CycleComplete { account_id: String, summary: CycleSummaryReport },
    OrderEvent { account_id: String, instrument: String, rejected: bool, detail: String },
    StatusReport { account_id: String, report: StatusReport },
    AutoTradingStatus { account_id: String, enabled: bool },
    Error { account_id: String, where_: String, reason: String },
}

/// Serializes one protocol message as a single line (no embedded newlines
/// in the JSON output, so line-framing over a pipe is unambiguous).
pub fn encode_line<T: Serialize>(message: &T) -> String {
    let mut line = serde_json::to_string(message).expect("protocol messages are always serializable");
    line.push('\n');
    line
}

pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_command_round_trips_through_a_line() {
        let line = encode_line(&InboundCommand::ExecuteCycle);
        assert!(line.ends_with('\n'));
        let decoded: InboundCommand = decode_line(&line).unwrap();
        assert!(matches!(decoded, InboundCommand::ExecuteCycle));
    }

    #[test]
    fn outbound_event_round_trips_through_a_line() {
        let event = OutboundEvent::CycleComplete {
            account_id: "acct-1".to_string(),
            summary: CycleSummaryReport { executed: 1, skipped: 2, rejected: 0, errors: 0, emergency_halted: false },
        };
        let line = encode_line(&event);
        let decoded: OutboundEvent = decode_line(&line).unwrap();
        match decoded {
            OutboundEvent::CycleComplete { account_id, summary } => {
                assert_eq!(account_id, "acct-1");
                assert_eq!(summary.executed, 1);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
