//! Account Orchestrator (spec.md §4.9): the per-account tick loop run
//! inside a Worker process. Owns no broker connection itself — it is
//! handed one `BrokerSession` (already connected) plus the capability
//! adapters for the account's lifetime.

use crate::application::instrument_trader::{self, CycleOutcome, TraderState};
use crate::application::position_manager::{self, Modification};
use crate::application::reconciliation;
use crate::config::model::AccountProfile;
use crate::domain::fx_ports::{BrokerSession, PersistenceGateway, Predictor, SentimentSource};
use crate::domain::fx_types::{AccountSnapshot, OpenPosition, OrderSide, PositionRuntimeState, Timeframe, TradeStatus};
use crate::domain::pip_table;
use crate::domain::portfolio_state::{PortfolioPosition, PortfolioState};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleSummary {
    pub executed: u32,
    pub skipped: u32,
    pub rejected: u32,
    pub errors: u32,
    pub emergency_halted: bool,
}

/// Worker-owned, carried across ticks: the balance observed at the first
/// tick of each UTC day, used to derive `max_daily_loss_percent` (spec.md
/// §4.9 item 1 / SPEC_FULL.md §B — left implicit by spec.md, made concrete
/// here since `AccountSnapshot` history is the only place a daily anchor
/// can come from).
#[derive(Debug, Clone, Copy)]
pub struct DailyAnchor {
    pub date: NaiveDate,
    pub start_balance: f64,
}

impl DailyAnchor {
    fn roll(anchor: &mut Option<DailyAnchor>, now: DateTime<Utc>, balance: f64) {
        let today = now.date_naive();
        match anchor {
            Some(a) if a.date == today => {}
            _ => *anchor = Some(DailyAnchor { date: today, start_balance: balance }),
        }
    }
}

/// Decides whether new submissions must halt this tick: the static
/// `stop_all` flag, equity drawdown off current balance, or today's
/// realised+floating loss off the day's opening balance.
fn emergency_tripped(
    emergency: &crate::config::model::EmergencyConfig,
    info: &crate::domain::fx_types::AccountInfo,
    daily_anchor: Option<&DailyAnchor>,
) -> bool {
    if emergency.stop_all {
        return true;
    }
    if info.balance <= 0.0 {
        return false;
    }
    let drawdown_percent = ((info.balance - info.equity) / info.balance * 100.0).max(0.0);
    if drawdown_percent >= emergency.max_drawdown_percent {
        return true;
    }
    if let Some(anchor) = daily_anchor {
        if anchor.start_balance > 0.0 {
            let daily_loss_percent = ((anchor.start_balance - info.equity) / anchor.start_balance * 100.0).max(0.0);
            if daily_loss_percent >= emergency.max_daily_loss_percent {
                return true;
            }
        }
    }
    false
}

fn portfolio_state_from(positions: &[OpenPosition]) -> PortfolioState {
    let mut exposure = HashMap::new();
    let mut winners = 0u32;
    let mut losers = 0u32;
    let mut floating_pnl = 0.0;
    let mut items = Vec::with_capacity(positions.len());

    for p in positions {
        *exposure.entry(p.instrument.clone()).or_insert(0u32) += 1;
        floating_pnl += p.profit;
        if p.profit >= 0.0 {
            winners += 1;
        } else {
            losers += 1;
        }
        items.push(PortfolioPosition { ticket: p.ticket, instrument: p.instrument.clone(), profit: p.profit });
    }

    PortfolioState {
        open_count: positions.len() as u32,
        floating_pnl,
        winners,
        losers,
        positions: items,
        exposure_per_instrument: exposure,
    }
}

/// Runs one tick for one account. `trader_states`/`position_runtime`/
/// `reconcile_missing`/`last_open_positions` are owned by the Worker and
/// carried across ticks.
#[allow(clippy::too_many_arguments)]
pub async fn run_tick(
    account: &AccountProfile,
    account_id: &str,
    broker: &dyn BrokerSession,
    predictor: Option<&dyn Predictor>,
    sentiment: Option<&dyn SentimentSource>,
    persistence: &dyn PersistenceGateway,
    trader_states: &mut HashMap<String, TraderState>,
    position_runtime: &mut HashMap<i64, PositionRuntimeState>,
    daily_anchor: &mut Option<DailyAnchor>,
    reconcile_missing: &mut HashMap<i64, u32>,
    last_open_positions: &mut HashMap<i64, OpenPosition>,
    trading_enabled: bool,
    now: DateTime<Utc>,
) -> CycleSummary {
    let mut summary = CycleSummary::default();

    let account_info = match broker.account_info().await {
        Ok(info) => info,
        Err(e) => {
            error!(account_id, error = %e, "account_info failed, skipping cycle");
            summary.errors += 1;
            return summary;
        }
    };

    DailyAnchor::roll(daily_anchor, now, account_info.balance);

    if emergency_tripped(&account.emergency, &account_info, daily_anchor.as_ref()) {
        warn!(account_id, "emergency condition tripped, halting new submissions");
        summary.emergency_halted = true;
    }

    let positions = broker.positions().await.unwrap_or_else(|e| {
        warn!(account_id, error = %e, "positions fetch failed, position manager skipped this tick");
        Vec::new()
    });

    close_vanished_positions(account_id, &positions, persistence, position_runtime, last_open_positions, now).await;

    run_position_manager(account, account_id, broker, persistence, &positions, position_runtime, now).await;

    let reconciliation = reconciliation::reconcile(account_id, &positions, persistence, reconcile_missing, now).await;
    if reconciliation.adopted > 0 || reconciliation.cancelled > 0 {
        info!(
            account_id,
            adopted = reconciliation.adopted,
            cancelled = reconciliation.cancelled,
            "reconciliation sweep made changes"
        );
    }

    if !summary.emergency_halted && trading_enabled {
        let portfolio_state = portfolio_state_from(&positions);

        if account.execution.parallel_execution {
            run_instruments_parallel(
                account,
                account_id,
                &account_info,
                broker,
                predictor,
                sentiment,
                persistence,
                trader_states,
                &portfolio_state,
                now,
                &mut summary,
            )
            .await;
        } else {
            run_instruments_sequential(
                account,
                account_id,
                &account_info,
                broker,
                predictor,
                sentiment,
                persistence,
                trader_states,
                &portfolio_state,
                now,
                &mut summary,
            )
            .await;
        }
    }

    let snapshot = AccountSnapshot {
        account_id: account_id.to_string(),
        broker: account.broker.clone(),
        server: account.server.clone(),
        balance: account_info.balance,
        equity: account_info.equity,
        profit: account_info.profit,
        margin: account_info.margin,
        free_margin: account_info.free_margin,
        open_position_count: positions.len() as u32,
        total_volume: positions.iter().map(|p| p.volume).sum(),
        sampled_at: now,
    };
    if let Err(e) = persistence.create_snapshot(&snapshot).await {
        warn!(account_id, error = %e, "snapshot persistence failed, cycle continues");
    }

    info!(
        account_id,
        executed = summary.executed,
        skipped = summary.skipped,
        rejected = summary.rejected,
        errors = summary.errors,
        "cycle_complete"
    );
    summary
}

/// Detects broker-side closes (SL/TP hit, manual close, or a close issued
/// through any of the engine's own `broker.close_position` call sites) by
/// diffing the tickets open at the end of the previous tick against the
/// tickets the broker reports open now. A ticket that drops out is closed
/// at its last observed price/profit (spec.md §3: Trade reaches CLOSED
/// only through this path; §8 invariant 3 requires exit_price/exit_time/
/// profit on every CLOSED row), `DailyPerformance` is updated, and the
/// ticket's `PositionRuntimeState` is destroyed.
async fn close_vanished_positions(
    account_id: &str,
    positions: &[OpenPosition],
    persistence: &dyn PersistenceGateway,
    position_runtime: &mut HashMap<i64, PositionRuntimeState>,
    last_open_positions: &mut HashMap<i64, OpenPosition>,
    now: DateTime<Utc>,
) {
    let still_open: HashSet<i64> = positions.iter().map(|p| p.ticket).collect();

    for (ticket, last_known) in last_open_positions.iter() {
        if still_open.contains(ticket) {
            continue;
        }
        close_trade_for_ticket(account_id, last_known, persistence, now).await;
        position_runtime.remove(ticket);
    }

    *last_open_positions = positions.iter().map(|p| (p.ticket, p.clone())).collect();
}

/// Estimates exit price/pips off the last observed floating profit -
/// the broker interface only reports a position's running P/L, not its
/// realised exit fill, so this is the same approximation used for sizing
/// in `instrument_trader`.
async fn close_trade_for_ticket(
    account_id: &str,
    position: &OpenPosition,
    persistence: &dyn PersistenceGateway,
    now: DateTime<Utc>,
) {
    let trade = match persistence.find_trade_by_ticket(position.ticket).await {
        Ok(Some(trade)) if trade.status == TradeStatus::Open => trade,
        Ok(_) => return,
        Err(e) => {
            warn!(account_id, ticket = position.ticket, error = %e, "close lookup failed, trade left open");
            return;
        }
    };
    if trade.id.is_none() {
        return;
    }

    let pip = crate::application::signal_engine::pip_size(&position.instrument);
    let pip_value = pip_table::pip_value_per_lot(&position.instrument);
    let pips = if position.volume > 0.0 { position.profit / (pip_value * position.volume) } else { 0.0 };
    let sign = match position.side {
        OrderSide::Buy => 1.0,
        OrderSide::Sell => -1.0,
    };
    let exit_price = position.entry_price + sign * pips * pip;

    if let Err(e) = persistence.close_trade(position.ticket, exit_price, now, position.profit, pips).await {
        warn!(account_id, ticket = position.ticket, error = %e, "close_trade persistence failed");
        return;
    }
    if let Err(e) = persistence.upsert_daily_performance(account_id, now.date_naive(), position.profit).await {
        warn!(account_id, ticket = position.ticket, error = %e, "daily performance upsert failed");
    }
}

async fn run_position_manager(
    account: &AccountProfile,
    account_id: &str,
    broker: &dyn BrokerSession,
    persistence: &dyn PersistenceGateway,
    positions: &[OpenPosition],
    position_runtime: &mut HashMap<i64, PositionRuntimeState>,
    now: DateTime<Utc>,
) {
    if positions.is_empty() {
        return;
    }

    let distinct_instruments: HashSet<&str> = positions.iter().map(|p| p.instrument.as_str()).collect();
    let mut current_prices = HashMap::new();
    for instrument in distinct_instruments {
        if let Ok(bars) = broker.bars(instrument, Timeframe::M1, 1).await {
            if let Some(last) = bars.last() {
                current_prices.insert(instrument.to_string(), last.close);
            }
        }
    }

    let mut modifications = Vec::new();
    for instr in &account.instruments {
        let positions_for_instr: Vec<OpenPosition> =
            positions.iter().filter(|p| p.instrument == instr.symbol).cloned().collect();
        if positions_for_instr.is_empty() {
            continue;
        }
        modifications.extend(position_manager::step(
            &positions_for_instr,
            &current_prices,
            position_runtime,
            &instr.position_mgmt,
        ));
    }

    for modification in modifications {
        match modification {
            Modification::SetStopLoss { ticket, new_sl } => {
                if let Err(e) = broker.modify_position(ticket, Some(new_sl), None).await {
                    warn!(ticket, error = %e, "stop-loss modification failed, retried next cycle");
                }
            }
            Modification::PartialClose { ticket, close_volume } => match broker.close_position(ticket, Some(close_volume)).await {
                Ok(()) => {
                    // The ticket stays open at reduced volume (no Trade status
                    // transition), but the realised slice of profit still
                    // belongs in the day's rollup.
                    if let Some(position) = positions.iter().find(|p| p.ticket == ticket) {
                        let realized = if position.volume > 0.0 { position.profit * (close_volume / position.volume) } else { 0.0 };
                        if let Err(e) = persistence.upsert_daily_performance(account_id, now.date_naive(), realized).await {
                            warn!(account_id, ticket, error = %e, "daily performance upsert failed after partial close");
                        }
                    }
                }
                Err(e) => warn!(ticket, error = %e, "partial close failed, retried next cycle"),
            },
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_instruments_sequential(
    account: &AccountProfile,
    account_id: &str,
    account_info: &crate::domain::fx_types::AccountInfo,
    broker: &dyn BrokerSession,
    predictor: Option<&dyn Predictor>,
    sentiment: Option<&dyn SentimentSource>,
    persistence: &dyn PersistenceGateway,
    trader_states: &mut HashMap<String, TraderState>,
    portfolio_state: &PortfolioState,
    now: DateTime<Utc>,
    summary: &mut CycleSummary,
) {
    for instr in &account.instruments {
        if !instr.enabled {
            continue;
        }
        let state = trader_states.entry(instr.symbol.clone()).or_default();
        let outcome = instrument_trader::run_cycle(
            account, account_id, account_info, instr, state, broker, predictor, sentiment,
            persistence, portfolio_state, now,
        )
        .await;
        record(summary, outcome);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_instruments_parallel(
    account: &AccountProfile,
    account_id: &str,
    account_info: &crate::domain::fx_types::AccountInfo,
    broker: &dyn BrokerSession,
    predictor: Option<&dyn Predictor>,
    sentiment: Option<&dyn SentimentSource>,
    persistence: &dyn PersistenceGateway,
    trader_states: &mut HashMap<String, TraderState>,
    portfolio_state: &PortfolioState,
    now: DateTime<Utc>,
    summary: &mut CycleSummary,
) {
    // Broker writes (SendOrder/ModifyPosition/ClosePosition) are serialised
    // by the trait's `&self` receiver plus the adapter's own internal mutex
    // (spec.md §4.9); reads here run concurrently up to `max_workers`.
    use futures::stream::{self, StreamExt};

    let enabled: Vec<_> = account.instruments.iter().filter(|i| i.enabled).collect();
    let max_workers = account.execution.max_workers.max(1);

    let mut states: HashMap<String, TraderState> = enabled
        .iter()
        .map(|i| (i.symbol.clone(), trader_states.get(&i.symbol).cloned().unwrap_or_default()))
        .collect();

    let outcomes: Vec<(String, CycleOutcome, TraderState)> = stream::iter(enabled)
        .map(|instr| {
            let mut state = states.get(&instr.symbol).cloned().unwrap_or_default();
            async move {
                let outcome = instrument_trader::run_cycle(
                    account, account_id, account_info, instr, &mut state, broker, predictor,
                    sentiment, persistence, portfolio_state, now,
                )
                .await;
                (instr.symbol.clone(), outcome, state)
            }
        })
        .buffer_unordered(max_workers)
        .collect()
        .await;

    for (symbol, outcome, state) in outcomes {
        states.insert(symbol, state);
        record(summary, outcome);
    }
    trader_states.extend(states);
}

fn record(summary: &mut CycleSummary, outcome: CycleOutcome) {
    match outcome {
        CycleOutcome::Executed { .. } => summary.executed += 1,
        CycleOutcome::Skipped { .. } => summary.skipped += 1,
        CycleOutcome::OrderRejected { .. } => summary.rejected += 1,
        CycleOutcome::Failed { .. } => summary.errors += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::EmergencyConfig;
    use crate::domain::fx_types::AccountInfo;
    use chrono::Utc;

    fn info(balance: f64, equity: f64) -> AccountInfo {
        AccountInfo {
            login: "1".to_string(),
            server: "demo".to_string(),
            broker: "demo".to_string(),
            balance,
            equity,
            profit: equity - balance,
            margin: 0.0,
            free_margin: equity,
            leverage: 100,
            trade_allowed: true,
        }
    }

    fn emergency(max_drawdown_percent: f64) -> EmergencyConfig {
        EmergencyConfig { stop_all: false, max_daily_loss_percent: 5.0, max_drawdown_percent }
    }

    #[test]
    fn stop_all_flag_always_trips() {
        assert!(emergency_tripped(
            &EmergencyConfig { stop_all: true, max_daily_loss_percent: 100.0, max_drawdown_percent: 100.0 },
            &info(10_000.0, 10_000.0),
            None,
        ));
    }

    #[test]
    fn drawdown_beyond_limit_trips() {
        let e = emergency(10.0);
        assert!(emergency_tripped(&e, &info(10_000.0, 8_500.0), None));
        assert!(!emergency_tripped(&e, &info(10_000.0, 9_500.0), None));
    }

    #[test]
    fn daily_loss_beyond_limit_trips_even_without_drawdown() {
        let e = emergency(50.0);
        let anchor = DailyAnchor { date: Utc::now().date_naive(), start_balance: 10_000.0 };
        assert!(emergency_tripped(&e, &info(10_000.0, 9_400.0), Some(&anchor)));
    }

    fn position(ticket: i64, instrument: &str, profit: f64) -> OpenPosition {
        OpenPosition {
            ticket,
            instrument: instrument.to_string(),
            side: OrderSide::Buy,
            volume: 0.1,
            entry_price: 1.0,
            current_sl: None,
            current_tp: None,
            profit,
            open_time: Utc::now(),
        }
    }

    #[test]
    fn portfolio_state_tallies_winners_losers_and_exposure() {
        let positions = vec![
            position(1, "EURUSD", 30.0),
            position(2, "EURUSD", -10.0),
            position(3, "GBPUSD", -5.0),
        ];
        let state = portfolio_state_from(&positions);
        assert_eq!(state.open_count, 3);
        assert_eq!(state.winners, 1);
        assert_eq!(state.losers, 2);
        assert!((state.floating_pnl - 15.0).abs() < 1e-9);
        assert_eq!(state.exposure_on("EURUSD"), 2);
    }

    use crate::domain::fx_errors::PersistenceError;
    use crate::domain::fx_types::{DailyPerformance, Signal, Trade};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakePersistence {
        open_trade: Option<Trade>,
        closed: Mutex<Vec<(i64, f64, f64, f64)>>,
        daily_profits: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl PersistenceGateway for FakePersistence {
        async fn create_signal(&self, _: &Signal, _: &str) -> Result<i64, PersistenceError> {
            Ok(1)
        }
        async fn create_trade(&self, _: &Trade) -> Result<i64, PersistenceError> {
            Ok(1)
        }
        async fn close_trade(&self, ticket: i64, exit_price: f64, _: DateTime<Utc>, profit: f64, pips: f64) -> Result<(), PersistenceError> {
            self.closed.lock().unwrap().push((ticket, exit_price, profit, pips));
            Ok(())
        }
        async fn link_signal_to_trade(&self, _: i64, _: i64) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn create_snapshot(&self, _: &AccountSnapshot) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn upsert_daily_performance(&self, _: &str, _: chrono::NaiveDate, profit: f64) -> Result<DailyPerformance, PersistenceError> {
            self.daily_profits.lock().unwrap().push(profit);
            Ok(DailyPerformance::default())
        }
        async fn find_trade_by_ticket(&self, _: i64) -> Result<Option<Trade>, PersistenceError> {
            Ok(self.open_trade.clone())
        }
        async fn recent_signals(&self, _: &str, _: i64) -> Result<Vec<Signal>, PersistenceError> {
            Ok(Vec::new())
        }
        async fn pending_trades_older_than(&self, _: &str, _: DateTime<Utc>) -> Result<Vec<Trade>, PersistenceError> {
            Ok(Vec::new())
        }
        async fn cancel_trade(&self, _: i64) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    fn open_trade(ticket: i64) -> Trade {
        Trade {
            id: Some(7),
            ticket: Some(ticket),
            account_id: "acct-1".to_string(),
            instrument: "EURUSD".to_string(),
            side: OrderSide::Buy,
            status: TradeStatus::Open,
            entry_price: 1.0,
            entry_time: Utc::now(),
            volume: 0.1,
            stop_loss: None,
            take_profit: None,
            exit_price: None,
            exit_time: None,
            profit: None,
            pips: None,
            strategy_name: "position".to_string(),
            ml_enhanced: false,
            ai_approved: true,
            ai_reason: None,
            signal_id: None,
            audit_created_at: Utc::now(),
            audit_updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn a_ticket_that_drops_out_of_broker_positions_is_closed_and_rolled_up() {
        let persistence = FakePersistence { open_trade: Some(open_trade(1)), closed: Mutex::new(Vec::new()), daily_profits: Mutex::new(Vec::new()) };
        let mut position_runtime = HashMap::new();
        position_runtime.insert(1, PositionRuntimeState {
            trade_id: 1,
            ticket: 1,
            breakeven_applied: false,
            trail_high_water: 1.0,
            last_modified_at: Utc::now(),
            partial_closes_done: 0,
        });
        let mut last_open_positions = HashMap::new();
        last_open_positions.insert(1, position(1, "EURUSD", 25.0));

        close_vanished_positions("acct-1", &[], &persistence, &mut position_runtime, &mut last_open_positions, Utc::now()).await;

        let closed = persistence.closed.lock().unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0, 1);
        assert!((closed[0].2 - 25.0).abs() < 1e-9, "profit should be carried through to close_trade");
        assert_eq!(*persistence.daily_profits.lock().unwrap(), vec![25.0]);
        assert!(!position_runtime.contains_key(&1), "PositionRuntimeState must be destroyed on close");
        assert!(last_open_positions.is_empty());
    }

    #[tokio::test]
    async fn a_ticket_still_reported_by_the_broker_is_left_untouched() {
        let persistence = FakePersistence { open_trade: Some(open_trade(1)), closed: Mutex::new(Vec::new()), daily_profits: Mutex::new(Vec::new()) };
        let mut position_runtime = HashMap::new();
        let mut last_open_positions = HashMap::new();
        last_open_positions.insert(1, position(1, "EURUSD", 25.0));
        let still_open = [position(1, "EURUSD", 30.0)];

        close_vanished_positions("acct-1", &still_open, &persistence, &mut position_runtime, &mut last_open_positions, Utc::now()).await;

        assert!(persistence.closed.lock().unwrap().is_empty());
        assert!(persistence.daily_profits.lock().unwrap().is_empty());
        assert_eq!(last_open_positions.get(&1).unwrap().profit, 30.0, "snapshot should refresh to the latest observed state");
    }
}
