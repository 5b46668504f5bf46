//! Indicator & Signal Engine (spec.md §4.4). Pure, deterministic given its
//! inputs: no broker calls, no persistence, no clock reads beyond what's
//! already in the bar series.

use crate::config::model::{StrategyKind, StrategyParams};
use crate::domain::fx_types::{Bar, Signal, SignalKind};
use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// FX pip size: 0.0001 for most pairs, 0.01 for JPY crosses.
pub fn pip_size(instrument: &str) -> f64 {
    crate::domain::pip_table::pip_size(instrument)
}

fn sma_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut sma = SimpleMovingAverage::new(period).expect("period > 0");
    closes.iter().map(|c| sma.next(*c)).collect()
}

pub fn analyse(bars: &[Bar], strategy: &StrategyParams, instrument: &str) -> Signal {
    let strategy_name = match strategy.kind {
        StrategyKind::Position => "position",
        StrategyKind::Crossover => "crossover",
    };

    if bars.len() < strategy.slow_period {
        return Signal::hold(
            instrument,
            strategy_name,
            "insufficient data",
            bars.last().map(|b| b.close).unwrap_or(0.0),
        );
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let fast = sma_series(&closes, strategy.fast_period);
    let slow = sma_series(&closes, strategy.slow_period);

    let last = closes.len() - 1;
    let ref_price = closes[last];
    let pip = pip_size(instrument);

    let kind = match strategy.kind {
        StrategyKind::Position => {
            if fast[last] > slow[last] {
                SignalKind::Buy
            } else if fast[last] < slow[last] {
                SignalKind::Sell
            } else {
                SignalKind::Hold
            }
        }
        StrategyKind::Crossover => {
            if last == 0 {
                SignalKind::Hold
            } else {
                let prev_fast = fast[last - 1];
                let prev_slow = slow[last - 1];
                if prev_fast <= prev_slow && fast[last] > slow[last] {
                    SignalKind::Buy
                } else if prev_fast >= prev_slow && fast[last] < slow[last] {
                    SignalKind::Sell
                } else {
                    SignalKind::Hold
                }
            }
        }
    };

    match kind {
        SignalKind::Hold => Signal::hold(instrument, strategy_name, "no crossover", ref_price),
        SignalKind::Buy => Signal {
            instrument: instrument.to_string(),
            kind,
            generated_at: chrono::Utc::now(),
            ref_price,
            stop_loss: Some(ref_price - strategy.sl_pips * pip),
            take_profit: Some(ref_price + strategy.tp_pips * pip),
            confidence: 0.5,
            strategy_name: strategy_name.to_string(),
            reason: "fast MA above slow MA".to_string(),
            ml_enhanced: false,
            ml_confidence: None,
            sentiment_label: None,
            sentiment_confidence: None,
        },
        SignalKind::Sell => Signal {
            instrument: instrument.to_string(),
            kind,
            generated_at: chrono::Utc::now(),
            ref_price,
            stop_loss: Some(ref_price + strategy.sl_pips * pip),
            take_profit: Some(ref_price - strategy.tp_pips * pip),
            confidence: 0.5,
            strategy_name: strategy_name.to_string(),
            reason: "fast MA below slow MA".to_string(),
            ml_enhanced: false,
            ml_confidence: None,
            sentiment_label: None,
            sentiment_confidence: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(close: f64) -> Bar {
        Bar {
            open_time: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn params(kind: StrategyKind) -> StrategyParams {
        StrategyParams {
            kind,
            fast_period: 3,
            slow_period: 5,
            sl_pips: 20.0,
            tp_pips: 40.0,
        }
    }

    #[test]
    fn insufficient_bars_is_hold() {
        let bars: Vec<Bar> = (0..3).map(|i| bar(1.0 + i as f64 * 0.0001)).collect();
        let signal = analyse(&bars, &params(StrategyKind::Position), "EURUSD");
        assert_eq!(signal.kind, SignalKind::Hold);
        assert_eq!(signal.reason, "insufficient data");
    }

    #[test]
    fn position_strategy_emits_buy_when_fast_above_slow() {
        let mut closes = vec![1.0800; 5];
        closes.extend([1.0810, 1.0820, 1.0830, 1.0840, 1.0860]);
        let bars: Vec<Bar> = closes.into_iter().map(bar).collect();
        let signal = analyse(&bars, &params(StrategyKind::Position), "EURUSD");
        assert_eq!(signal.kind, SignalKind::Buy);
        assert!(signal.respects_bracket_invariant());
    }

    #[test]
    fn hold_signal_never_carries_brackets() {
        let bars: Vec<Bar> = vec![1.0800; 2].into_iter().map(bar).collect();
        let signal = analyse(&bars, &params(StrategyKind::Position), "EURUSD");
        assert!(signal.stop_loss.is_none());
        assert!(signal.take_profit.is_none());
    }
}
