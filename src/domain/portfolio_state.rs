//! Inputs and outputs of the Intelligent Portfolio Manager (spec.md §4.6).

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PortfolioState {
    pub open_count: u32,
    pub floating_pnl: f64,
    pub winners: u32,
    pub losers: u32,
    /// ticket -> (instrument, floating profit), used to pick the worst
    /// loser for `CLOSE_WORST`.
    pub positions: Vec<PortfolioPosition>,
    pub exposure_per_instrument: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct PortfolioPosition {
    pub ticket: i64,
    pub instrument: String,
    pub profit: f64,
}

impl PortfolioState {
    pub fn exposure_on(&self, instrument: &str) -> u32 {
        self.exposure_per_instrument
            .get(instrument)
            .copied()
            .unwrap_or(0)
    }

    pub fn worst_loser(&self) -> Option<i64> {
        self.positions
            .iter()
            .filter(|p| p.profit < 0.0)
            .min_by(|a, b| a.profit.total_cmp(&b.profit))
            .map(|p| p.ticket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortfolioAction {
    Open,
    Hold,
    CloseWorst,
}

#[derive(Debug, Clone)]
pub struct PortfolioDecision {
    pub action: PortfolioAction,
    pub allow_new_trade: bool,
    pub confidence_multiplier: f64,
    pub positions_to_close: Vec<i64>,
}

impl PortfolioDecision {
    pub fn passthrough() -> Self {
        Self {
            action: PortfolioAction::Open,
            allow_new_trade: true,
            confidence_multiplier: 1.0,
            positions_to_close: Vec::new(),
        }
    }
}
