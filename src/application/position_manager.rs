//! Position Manager (spec.md §4.8). Runs at the start of every cycle,
//! before any instrument step. Stateless with respect to the broker — all
//! per-position memory (`breakeven_applied`, trail high-water mark) is
//! carried in the caller-owned `PositionRuntimeState` map, mirroring the
//! state-machine split the teacher uses for trailing stops.

use crate::config::model::PositionManagementConfig;
use crate::domain::fx_types::{OpenPosition, OrderSide, PositionRuntimeState};
use crate::application::signal_engine::pip_size;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Modification {
    SetStopLoss { ticket: i64, new_sl: f64 },
    PartialClose { ticket: i64, close_volume: f64 },
}

fn profit_pips(position: &OpenPosition, current_price: f64, pip: f64) -> f64 {
    let diff = match position.side {
        OrderSide::Buy => current_price - position.entry_price,
        OrderSide::Sell => position.entry_price - current_price,
    };
    diff / pip
}

fn target_price(position: &OpenPosition, current_price: f64, distance: f64, pip: f64) -> f64 {
    match position.side {
        OrderSide::Buy => current_price - distance * pip,
        OrderSide::Sell => current_price + distance * pip,
    }
}

fn tightens(position: &OpenPosition, candidate_sl: f64, previous_sl: f64) -> bool {
    match position.side {
        OrderSide::Buy => candidate_sl > previous_sl,
        OrderSide::Sell => candidate_sl < previous_sl,
    }
}

/// Computes the modification set for one cycle. `current_prices` maps
/// instrument -> last known bid/ask-midpoint; positions with no entry are
/// skipped (handled next cycle once prices arrive).
pub fn step(
    positions: &[OpenPosition],
    current_prices: &HashMap<String, f64>,
    runtime: &mut HashMap<i64, PositionRuntimeState>,
    rules: &PositionManagementConfig,
) -> Vec<Modification> {
    let mut modifications = Vec::new();

    for position in positions {
        let Some(&current_price) = current_prices.get(&position.instrument) else {
            continue;
        };
        let pip = pip_size(&position.instrument);
        let pips = profit_pips(position, current_price, pip);

        let state = runtime.entry(position.ticket).or_insert_with(|| PositionRuntimeState {
            trade_id: position.ticket,
            ticket: position.ticket,
            breakeven_applied: false,
            trail_high_water: current_price,
            last_modified_at: Utc::now(),
            partial_closes_done: 0,
        });

        let previous_sl = position.current_sl.unwrap_or(position.entry_price);
        let mut effective_sl = previous_sl;

        if let Some(rule) = rules.breakeven {
            if pips >= rule.trigger_pips && !state.breakeven_applied {
                let offset = match position.side {
                    OrderSide::Buy => position.entry_price + rule.offset_pips * pip,
                    OrderSide::Sell => position.entry_price - rule.offset_pips * pip,
                };
                if tightens(position, offset, effective_sl) {
                    modifications.push(Modification::SetStopLoss {
                        ticket: position.ticket,
                        new_sl: offset,
                    });
                    effective_sl = offset;
                }
                state.breakeven_applied = true;
                state.last_modified_at = Utc::now();
            }
        }

        if let Some(rule) = rules.trail {
            if pips >= rule.trigger_pips {
                let candidate = target_price(position, current_price, rule.distance_pips, pip);
                if tightens(position, candidate, effective_sl) {
                    modifications.push(Modification::SetStopLoss {
                        ticket: position.ticket,
                        new_sl: candidate,
                    });
                    state.last_modified_at = Utc::now();
                }
            }
        }

        if let Some(rule) = rules.partial_close {
            let milestones_reached = (pips / rule.trigger_pips).floor().max(0.0) as u32;
            if milestones_reached > state.partial_closes_done {
                let close_volume = position.volume * (rule.percent / 100.0);
                modifications.push(Modification::PartialClose {
                    ticket: position.ticket,
                    close_volume,
                });
                state.partial_closes_done = milestones_reached;
                state.last_modified_at = Utc::now();
            }
        }
    }

    if !modifications.is_empty() {
        info!(count = modifications.len(), "position manager issued modifications");
    }
    modifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{BreakevenRule, TrailRule};
    use chrono::Utc;

    fn position(ticket: i64, sl: Option<f64>) -> OpenPosition {
        OpenPosition {
            ticket,
            instrument: "EURUSD".to_string(),
            side: OrderSide::Buy,
            volume: 0.5,
            entry_price: 1.08000,
            current_sl: sl,
            current_tp: None,
            profit: 0.0,
            open_time: Utc::now(),
        }
    }

    fn rules() -> PositionManagementConfig {
        PositionManagementConfig {
            breakeven: Some(BreakevenRule {
                trigger_pips: 20.0,
                offset_pips: 5.0,
            }),
            trail: Some(TrailRule {
                trigger_pips: 15.0,
                distance_pips: 15.0,
            }),
            partial_close: None,
        }
    }

    /// Scenario S5 from spec.md §8: breakeven then trail, SL never loosens.
    #[test]
    fn breakeven_then_trail_never_loosens_the_stop() {
        let mut runtime = HashMap::new();
        let mut pos = position(1, Some(1.07800));
        let mut prices = HashMap::new();

        prices.insert("EURUSD".to_string(), 1.08220);
        let mods = step(std::slice::from_ref(&pos), &prices, &mut runtime, &rules());
        assert_eq!(
            mods,
            vec![Modification::SetStopLoss {
                ticket: 1,
                new_sl: 1.08000 + 5.0 * 0.0001,
            }]
        );
        pos.current_sl = Some(1.08050);

        prices.insert("EURUSD".to_string(), 1.08350);
        let mods = step(std::slice::from_ref(&pos), &prices, &mut runtime, &rules());
        assert_eq!(mods.len(), 1);
        if let Modification::SetStopLoss { new_sl, .. } = mods[0] {
            assert!((new_sl - 1.08200).abs() < 1e-9);
        } else {
            panic!("expected SetStopLoss");
        }
        pos.current_sl = Some(1.08200);

        prices.insert("EURUSD".to_string(), 1.08500);
        let mods = step(std::slice::from_ref(&pos), &prices, &mut runtime, &rules());
        assert_eq!(mods.len(), 1);
        if let Modification::SetStopLoss { new_sl, .. } = mods[0] {
            assert!((new_sl - 1.08350).abs() < 1e-9);
        } else {
            panic!("expected SetStopLoss");
        }
    }

    #[test]
    fn no_modification_when_no_rules_trigger() {
        let mut runtime = HashMap::new();
        let pos = position(2, Some(1.07800));
        let mut prices = HashMap::new();
        prices.insert("EURUSD".to_string(), 1.08050);
        let mods = step(std::slice::from_ref(&pos), &prices, &mut runtime, &rules());
        assert!(mods.is_empty());
    }
}
