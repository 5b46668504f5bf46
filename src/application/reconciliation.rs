//! Reconciliation sweep (spec.md §4.10, §7 item 5, §9 open question): on
//! every `positions()` call the Account Orchestrator diffs the broker's
//! open tickets against the local `trades` table. A broker ticket with no
//! local row is adopted as a `reconciled` trade (the account was likely
//! traded outside this engine, or a previous run crashed after
//! `send_order` but before `create_trade`). A local `PENDING` row whose
//! ticket is absent from the broker's open positions for
//! [`RECONCILE_GRACE_CYCLES`] consecutive cycles is cancelled, on the
//! theory that a pending order which never appeared as a live position
//! was rejected or expired upstream without the engine observing it.

use crate::domain::fx_ports::PersistenceGateway;
use crate::domain::fx_types::{OpenPosition, OrderSide, Trade, TradeStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Consecutive cycles a PENDING trade may go without a matching broker
/// ticket before it's cancelled (spec.md §9, policy not specified by the
/// source material — see DESIGN.md Open Question 3).
const RECONCILE_GRACE_CYCLES: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub adopted: u32,
    pub cancelled: u32,
}

/// `missing_streak` is owned by the Worker and carried across cycles,
/// keyed by local trade id.
pub async fn reconcile(
    account_id: &str,
    positions: &[OpenPosition],
    persistence: &dyn PersistenceGateway,
    missing_streak: &mut HashMap<i64, u32>,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    for position in positions {
        match persistence.find_trade_by_ticket(position.ticket).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if adopt(account_id, position, persistence, now).await {
                    outcome.adopted += 1;
                }
            }
            Err(e) => warn!(account_id, ticket = position.ticket, error = %e, "reconciliation lookup failed, skipping ticket"),
        }
    }

    let broker_tickets: HashSet<i64> = positions.iter().map(|p| p.ticket).collect();
    outcome.cancelled = sweep_stale_pending(account_id, &broker_tickets, persistence, missing_streak, now).await;

    outcome
}

async fn adopt(account_id: &str, position: &OpenPosition, persistence: &dyn PersistenceGateway, now: DateTime<Utc>) -> bool {
    let trade = Trade {
        id: None,
        ticket: Some(position.ticket),
        account_id: account_id.to_string(),
        instrument: position.instrument.clone(),
        side: position.side,
        status: TradeStatus::Open,
        entry_price: position.entry_price,
        entry_time: position.open_time,
        volume: position.volume,
        stop_loss: position.current_sl,
        take_profit: position.current_tp,
        exit_price: None,
        exit_time: None,
        profit: None,
        pips: None,
        strategy_name: "reconciled".to_string(),
        ml_enhanced: false,
        ai_approved: true,
        ai_reason: Some("adopted from a broker-side position with no local trade record".to_string()),
        signal_id: None,
        audit_created_at: now,
        audit_updated_at: now,
    };

    match persistence.create_trade(&trade).await {
        Ok(_) => true,
        Err(e) => {
            warn!(account_id, ticket = position.ticket, error = %e, "failed to adopt reconciled trade");
            false
        }
    }
}

async fn sweep_stale_pending(
    account_id: &str,
    broker_tickets: &HashSet<i64>,
    persistence: &dyn PersistenceGateway,
    missing_streak: &mut HashMap<i64, u32>,
    now: DateTime<Utc>,
) -> u32 {
    let pending = match persistence.pending_trades_older_than(account_id, now).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(account_id, error = %e, "failed to list pending trades for reconciliation");
            return 0;
        }
    };

    let mut still_pending = HashSet::new();
    let mut cancelled = 0;

    for trade in pending {
        let Some(trade_id) = trade.id else { continue };
        still_pending.insert(trade_id);

        let matched = trade.ticket.map(|t| broker_tickets.contains(&t)).unwrap_or(false);
        if matched {
            missing_streak.remove(&trade_id);
            continue;
        }

        let streak = missing_streak.entry(trade_id).or_insert(0);
        *streak += 1;
        if *streak >= RECONCILE_GRACE_CYCLES {
            match persistence.cancel_trade(trade_id).await {
                Ok(()) => {
                    cancelled += 1;
                    missing_streak.remove(&trade_id);
                }
                Err(e) => warn!(account_id, trade_id, error = %e, "failed to cancel stale pending trade"),
            }
        }
    }

    // A trade that closed/was cancelled through some other path no longer
    // shows up as pending; drop its streak so the map doesn't grow forever.
    missing_streak.retain(|id, _| still_pending.contains(id));
    cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fx_errors::PersistenceError;
    use crate::domain::fx_types::{AccountSnapshot, DailyPerformance, Signal};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakePersistence {
        by_ticket: Mutex<HashMap<i64, Trade>>,
        pending: Mutex<Vec<Trade>>,
        created: Mutex<Vec<Trade>>,
        cancelled: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl PersistenceGateway for FakePersistence {
        async fn create_signal(&self, _: &Signal, _: &str) -> Result<i64, PersistenceError> {
            Ok(1)
        }
        async fn create_trade(&self, trade: &Trade) -> Result<i64, PersistenceError> {
            self.created.lock().unwrap().push(trade.clone());
            Ok(self.created.lock().unwrap().len() as i64)
        }
        async fn close_trade(&self, _: i64, _: f64, _: DateTime<Utc>, _: f64, _: f64) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn link_signal_to_trade(&self, _: i64, _: i64) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn create_snapshot(&self, _: &AccountSnapshot) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn upsert_daily_performance(&self, _: &str, _: chrono::NaiveDate, _: f64) -> Result<DailyPerformance, PersistenceError> {
            Ok(DailyPerformance::default())
        }
        async fn find_trade_by_ticket(&self, ticket: i64) -> Result<Option<Trade>, PersistenceError> {
            Ok(self.by_ticket.lock().unwrap().get(&ticket).cloned())
        }
        async fn recent_signals(&self, _: &str, _: i64) -> Result<Vec<Signal>, PersistenceError> {
            Ok(Vec::new())
        }
        async fn pending_trades_older_than(&self, _: &str, _: DateTime<Utc>) -> Result<Vec<Trade>, PersistenceError> {
            Ok(self.pending.lock().unwrap().clone())
        }
        async fn cancel_trade(&self, trade_id: i64) -> Result<(), PersistenceError> {
            self.cancelled.lock().unwrap().push(trade_id);
            Ok(())
        }
    }

    fn position(ticket: i64) -> OpenPosition {
        OpenPosition {
            ticket,
            instrument: "EURUSD".to_string(),
            side: OrderSide::Buy,
            volume: 0.1,
            entry_price: 1.08,
            current_sl: None,
            current_tp: None,
            profit: 0.0,
            open_time: Utc::now(),
        }
    }

    fn pending_trade(id: i64, ticket: Option<i64>) -> Trade {
        Trade {
            id: Some(id),
            ticket,
            account_id: "acct-1".to_string(),
            instrument: "EURUSD".to_string(),
            side: OrderSide::Buy,
            status: TradeStatus::Pending,
            entry_price: 1.08,
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
    async fn unmatched_broker_ticket_is_adopted_as_a_reconciled_trade() {
        let persistence =
            FakePersistence { by_ticket: Mutex::new(HashMap::new()), pending: Mutex::new(Vec::new()), created: Mutex::new(Vec::new()), cancelled: Mutex::new(Vec::new()) };
        let mut streak = HashMap::new();

        let outcome = reconcile("acct-1", &[position(99)], &persistence, &mut streak, Utc::now()).await;

        assert_eq!(outcome.adopted, 1);
        let created = persistence.created.lock().unwrap();
        assert_eq!(created[0].ticket, Some(99));
        assert_eq!(created[0].strategy_name, "reconciled");
    }

    #[tokio::test]
    async fn known_ticket_is_left_untouched() {
        let mut by_ticket = HashMap::new();
        by_ticket.insert(99, pending_trade(1, Some(99)));
        let persistence = FakePersistence { by_ticket: Mutex::new(by_ticket), pending: Mutex::new(Vec::new()), created: Mutex::new(Vec::new()), cancelled: Mutex::new(Vec::new()) };
        let mut streak = HashMap::new();

        let outcome = reconcile("acct-1", &[position(99)], &persistence, &mut streak, Utc::now()).await;

        assert_eq!(outcome.adopted, 0);
        assert!(persistence.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_trade_missing_for_grace_period_is_cancelled() {
        let persistence = FakePersistence {
            by_ticket: Mutex::new(HashMap::new()),
            pending: Mutex::new(vec![pending_trade(7, Some(1234))]),
            created: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        };
        let mut streak = HashMap::new();

        let first = reconcile("acct-1", &[], &persistence, &mut streak, Utc::now()).await;
        assert_eq!(first.cancelled, 0);
        assert!(persistence.cancelled.lock().unwrap().is_empty());

        let second = reconcile("acct-1", &[], &persistence, &mut streak, Utc::now()).await;
        assert_eq!(second.cancelled, 1);
        assert_eq!(*persistence.cancelled.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn pending_trade_reappearing_resets_the_streak() {
        let persistence = FakePersistence {
            by_ticket: Mutex::new(HashMap::new()),
            pending: Mutex::new(vec![pending_trade(7, Some(1234))]),
            created: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        };
        let mut streak = HashMap::new();

        reconcile("acct-1", &[], &persistence, &mut streak, Utc::now()).await;
        assert_eq!(streak.get(&7), Some(&1));

        reconcile("acct-1", &[position(1234)], &persistence, &mut streak, Utc::now()).await;
        assert!(streak.get(&7).is_none(), "a broker-matched ticket must reset its streak");
    }
}
