//! Intelligent Portfolio Manager (spec.md §4.6, optional). Disabled mode
//! is pointwise equivalent to `PortfolioDecision::passthrough()` (§8
//! property 7) — callers gate this module behind
//! `execution.use_intelligent_manager` and fall back to passthrough.

use crate::domain::portfolio_state::{PortfolioAction, PortfolioDecision, PortfolioState};

pub fn decide(new_instrument: &str, state: &PortfolioState) -> PortfolioDecision {
    if state.floating_pnl <= -150.0 {
        if let Some(worst) = state.worst_loser() {
            return PortfolioDecision {
                action: PortfolioAction::CloseWorst,
                allow_new_trade: false,
                confidence_multiplier: 1.0,
                positions_to_close: vec![worst],
            };
        }
    }

    if state.floating_pnl <= -100.0 || state.losers >= 2 * state.winners {
        return PortfolioDecision {
            action: PortfolioAction::Hold,
            allow_new_trade: false,
            confidence_multiplier: 1.0,
            positions_to_close: Vec::new(),
        };
    }

    let mut limit: i64 = 15;
    if state.floating_pnl <= -100.0 {
        limit -= 5;
    }
    if state.floating_pnl >= 200.0 {
        limit += 5;
    }
    let limit = limit.clamp(3, 20) as u32;

    if state.open_count >= limit {
        return PortfolioDecision {
            action: PortfolioAction::Hold,
            allow_new_trade: false,
            confidence_multiplier: 1.0,
            positions_to_close: Vec::new(),
        };
    }

    let same_instrument_count = state.exposure_on(new_instrument);
    let mut multiplier = 0.7_f64.powi(same_instrument_count as i32);

    multiplier *= if state.open_count >= 10 {
        0.4
    } else if state.open_count >= 8 {
        0.6
    } else if state.open_count >= 5 {
        0.8
    } else {
        1.0
    };

    PortfolioDecision {
        action: PortfolioAction::Open,
        allow_new_trade: true,
        confidence_multiplier: multiplier,
        positions_to_close: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio_state::PortfolioPosition;
    use std::collections::HashMap;

    fn state(floating_pnl: f64, open_count: u32, winners: u32, losers: u32) -> PortfolioState {
        PortfolioState {
            open_count,
            floating_pnl,
            winners,
            losers,
            positions: Vec::new(),
            exposure_per_instrument: HashMap::new(),
        }
    }

    #[test]
    fn deep_drawdown_closes_worst_loser() {
        let mut s = state(-200.0, 3, 0, 3);
        s.positions.push(PortfolioPosition {
            ticket: 1,
            instrument: "EURUSD".to_string(),
            profit: -50.0,
        });
        s.positions.push(PortfolioPosition {
            ticket: 2,
            instrument: "GBPUSD".to_string(),
            profit: -120.0,
        });
        let decision = decide("USDJPY", &s);
        assert_eq!(decision.action, PortfolioAction::CloseWorst);
        assert!(!decision.allow_new_trade);
        assert_eq!(decision.positions_to_close, vec![2]);
    }

    #[test]
    fn moderate_drawdown_blocks_new_trades_without_closing() {
        let s = state(-120.0, 3, 1, 2);
        let decision = decide("EURUSD", &s);
        assert_eq!(decision.action, PortfolioAction::Hold);
        assert!(!decision.allow_new_trade);
    }

    #[test]
    fn crowding_penalty_scales_down_confidence() {
        let s = state(0.0, 8, 5, 3);
        let decision = decide("EURUSD", &s);
        assert_eq!(decision.action, PortfolioAction::Open);
        assert!((decision.confidence_multiplier - 0.6).abs() < 1e-9);
    }

    #[test]
    fn same_instrument_exposure_compounds_with_crowding() {
        let mut s = state(0.0, 2, 2, 0);
        s.exposure_per_instrument.insert("EURUSD".to_string(), 2);
        let decision = decide("EURUSD", &s);
        let expected = 0.7_f64.powi(2);
        assert!((decision.confidence_multiplier - expected).abs() < 1e-9);
    }
}
