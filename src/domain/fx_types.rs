//! Core trading entities shared across the engine: bars, signals, trades,
//! account snapshots and the rollups derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        write!(f, "{s}")
    }
}

/// One OHLCV candle. `open_time` must strictly increase within a given
/// `(instrument, timeframe)` series; the engine never validates this on
/// construction, only on ingestion from a `BrokerSession`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
            && self.low <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    pub fn is_directional(&self) -> bool {
        !matches!(self, SignalKind::Hold)
    }

    pub fn opposes(&self, other: SignalKind) -> bool {
        matches!(
            (self, other),
            (SignalKind::Buy, SignalKind::Sell) | (SignalKind::Sell, SignalKind::Buy)
        )
    }
}

/// Produced by the Signal Engine and refined by the Decision Pipeline.
/// HOLD signals never carry `stop_loss`/`take_profit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub kind: SignalKind,
    pub generated_at: DateTime<Utc>,
    pub ref_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub confidence: f64,
    pub strategy_name: String,
    pub reason: String,
    pub ml_enhanced: bool,
    pub ml_confidence: Option<f64>,
    pub sentiment_label: Option<String>,
    pub sentiment_confidence: Option<f64>,
}

impl Signal {
    pub fn hold(instrument: &str, strategy_name: &str, reason: &str, ref_price: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            kind: SignalKind::Hold,
            generated_at: Utc::now(),
            ref_price,
            stop_loss: None,
            take_profit: None,
            confidence: 0.0,
            strategy_name: strategy_name.to_string(),
            reason: reason.to_string(),
            ml_enhanced: false,
            ml_confidence: None,
            sentiment_label: None,
            sentiment_confidence: None,
        }
    }

    /// Invariant from spec.md §3 / §8 property 1: for BUY both bounds set
    /// implies stop_loss < ref_price < take_profit, mirrored for SELL.
    pub fn respects_bracket_invariant(&self) -> bool {
        match (self.kind, self.stop_loss, self.take_profit) {
            (SignalKind::Hold, None, None) => true,
            (SignalKind::Hold, _, _) => false,
            (SignalKind::Buy, Some(sl), Some(tp)) => sl < self.ref_price && self.ref_price < tp,
            (SignalKind::Sell, Some(sl), Some(tp)) => tp < self.ref_price && self.ref_price < sl,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Open,
    Closed,
    Cancelled,
    Rejected,
}

impl TradeStatus {
    /// Acyclic transition table from spec.md §3.
    pub fn can_transition_to(self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        matches!(
            (self, next),
            (Pending, Open) | (Pending, Rejected) | (Pending, Cancelled) | (Open, Closed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Option<i64>,
    pub ticket: Option<i64>,
    pub account_id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub status: TradeStatus,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub profit: Option<f64>,
    pub pips: Option<f64>,
    pub strategy_name: String,
    pub ml_enhanced: bool,
    pub ai_approved: bool,
    pub ai_reason: Option<String>,
    pub signal_id: Option<i64>,
    pub audit_created_at: DateTime<Utc>,
    pub audit_updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn is_closed_consistent(&self) -> bool {
        if self.status != TradeStatus::Closed {
            return true;
        }
        let Some(profit) = self.profit else {
            return false;
        };
        if self.exit_price.is_none() || self.exit_time.is_none() {
            return false;
        }
        match self.pips {
            Some(pips) => pips.signum() == profit.signum() || profit == 0.0 || pips == 0.0,
            None => false,
        }
    }
}

/// Ephemeral per-open-trade state owned exclusively by the Worker that
/// submitted the trade. Never persisted; rebuilt from a Trade row the
/// first time it is observed OPEN.
#[derive(Debug, Clone)]
pub struct PositionRuntimeState {
    pub trade_id: i64,
    pub ticket: i64,
    pub breakeven_applied: bool,
    pub trail_high_water: f64,
    pub last_modified_at: DateTime<Utc>,
    pub partial_closes_done: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub broker: String,
    pub server: String,
    pub balance: f64,
    pub equity: f64,
    pub profit: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub open_position_count: u32,
    pub total_volume: f64,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyPerformance {
    pub account_id: String,
    pub date: chrono::NaiveDate,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl DailyPerformance {
    pub fn recompute_derived(&mut self) {
        self.win_rate = if self.trades > 0 {
            Some(self.wins as f64 / self.trades as f64)
        } else {
            None
        };
        self.profit_factor = if self.gross_loss.abs() > f64::EPSILON {
            Some(self.gross_profit / self.gross_loss.abs())
        } else {
            None
        };
    }

    /// Folds one more closed trade's outcome into the rollup. Applying this
    /// twice with the same `profit` is not idempotent by itself — idempotence
    /// at the storage layer comes from the gateway's upsert-by-ticket
    /// dedup, not from this accumulator.
    pub fn accumulate(&mut self, profit: f64) {
        self.trades += 1;
        if profit >= 0.0 {
            self.wins += 1;
            self.gross_profit += profit;
        } else {
            self.losses += 1;
            self.gross_loss += profit;
        }
        self.net_profit = self.gross_profit + self.gross_loss;
        self.recompute_derived();
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: String,
    pub server: String,
    pub broker: String,
    pub balance: f64,
    pub equity: f64,
    pub profit: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub leverage: u32,
    pub trade_allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticket: i64,
    pub instrument: String,
    pub side: OrderSide,
    pub volume: f64,
    pub entry_price: f64,
    pub current_sl: Option<f64>,
    pub current_tp: Option<f64>,
    pub profit: f64,
    pub open_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: OrderSide,
    pub volume: f64,
    pub price: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub magic: u32,
    pub deviation: u32,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub ok: bool,
    pub ticket: Option<i64>,
    pub fill_price: Option<f64>,
    pub error_code: Option<i32>,
    pub error_msg: Option<String>,
}
