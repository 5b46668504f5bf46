use crate::domain::fx_errors::PersistenceError;
use crate::domain::fx_ports::PersistenceGateway;
use crate::domain::fx_types::{
    AccountSnapshot, DailyPerformance, OrderSide, Signal, SignalKind, Trade, TradeStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

pub struct SqlitePersistenceGateway {
    pool: SqlitePool,
}

impl SqlitePersistenceGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn signal_kind_str(kind: SignalKind) -> &'static str {
    match kind {
        SignalKind::Buy => "BUY",
        SignalKind::Sell => "SELL",
        SignalKind::Hold => "HOLD",
    }
}

fn parse_signal_kind(s: &str) -> SignalKind {
    match s {
        "BUY" => SignalKind::Buy,
        "SELL" => SignalKind::Sell,
        _ => SignalKind::Hold,
    }
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn parse_side(s: &str) -> OrderSide {
    if s == "SELL" {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    }
}

fn status_str(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Pending => "PENDING",
        TradeStatus::Open => "OPEN",
        TradeStatus::Closed => "CLOSED",
        TradeStatus::Cancelled => "CANCELLED",
        TradeStatus::Rejected => "REJECTED",
    }
}

fn parse_status(s: &str) -> TradeStatus {
    match s {
        "OPEN" => TradeStatus::Open,
        "CLOSED" => TradeStatus::Closed,
        "CANCELLED" => TradeStatus::Cancelled,
        "REJECTED" => TradeStatus::Rejected,
        _ => TradeStatus::Pending,
    }
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| PersistenceError(e.to_string()))
}

fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> Result<Trade, PersistenceError> {
    let err = |e: sqlx::Error| PersistenceError(e.to_string());
    let status_s: String = row.try_get("status").map_err(err)?;
    let side_s: String = row.try_get("side").map_err(err)?;
    let entry_time_s: String = row.try_get("entry_time").map_err(err)?;
    let exit_time_s: Option<String> = row.try_get("exit_time").map_err(err)?;
    let created_s: String = row.try_get("audit_created_at").map_err(err)?;
    let updated_s: String = row.try_get("audit_updated_at").map_err(err)?;

    Ok(Trade {
        id: row.try_get("id").map_err(err)?,
        ticket: row.try_get("ticket").map_err(err)?,
        account_id: row.try_get("account_id").map_err(err)?,
        instrument: row.try_get("instrument").map_err(err)?,
        side: parse_side(&side_s),
        status: parse_status(&status_s),
        entry_price: row.try_get("entry_price").map_err(err)?,
        entry_time: parse_dt(&entry_time_s)?,
        volume: row.try_get("volume").map_err(err)?,
        stop_loss: row.try_get("stop_loss").map_err(err)?,
        take_profit: row.try_get("take_profit").map_err(err)?,
        exit_price: row.try_get("exit_price").map_err(err)?,
        exit_time: exit_time_s.map(|s| parse_dt(&s)).transpose()?,
        profit: row.try_get("profit").map_err(err)?,
        pips: row.try_get("pips").map_err(err)?,
        strategy_name: row.try_get("strategy_name").map_err(err)?,
        ml_enhanced: row.try_get("ml_enhanced").map_err(err)?,
        ai_approved: row.try_get("ai_approved").map_err(err)?,
        ai_reason: row.try_get("ai_reason").map_err(err)?,
        signal_id: row.try_get("signal_id").map_err(err)?,
        audit_created_at: parse_dt(&created_s)?,
        audit_updated_at: parse_dt(&updated_s)?,
    })
}

fn row_to_signal(row: &sqlx::sqlite::SqliteRow) -> Result<Signal, PersistenceError> {
    let err = |e: sqlx::Error| PersistenceError(e.to_string());
    let kind_s: String = row.try_get("kind").map_err(err)?;
    let generated_s: String = row.try_get("generated_at").map_err(err)?;
    Ok(Signal {
        instrument: row.try_get("instrument").map_err(err)?,
        kind: parse_signal_kind(&kind_s),
        generated_at: parse_dt(&generated_s)?,
        ref_price: row.try_get("ref_price").map_err(err)?,
        stop_loss: row.try_get("stop_loss").map_err(err)?,
        take_profit: row.try_get("take_profit").map_err(err)?,
        confidence: row.try_get("confidence").map_err(err)?,
        strategy_name: row.try_get("strategy_name").map_err(err)?,
        reason: row.try_get("reason").map_err(err)?,
        ml_enhanced: row.try_get("ml_enhanced").map_err(err)?,
        ml_confidence: row.try_get("ml_confidence").map_err(err)?,
        sentiment_label: row.try_get("sentiment_label").map_err(err)?,
        sentiment_confidence: row.try_get("sentiment_confidence").map_err(err)?,
    })
}

#[async_trait]
impl PersistenceGateway for SqlitePersistenceGateway {
    async fn create_signal(&self, sig: &Signal, account_id: &str) -> Result<i64, PersistenceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO signals (
                account_id, instrument, kind, generated_at, ref_price,
                stop_loss, take_profit, confidence, strategy_name, reason,
                ml_enhanced, ml_confidence, sentiment_label, sentiment_confidence
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account_id)
        .bind(&sig.instrument)
        .bind(signal_kind_str(sig.kind))
        .bind(sig.generated_at.to_rfc3339())
        .bind(sig.ref_price)
        .bind(sig.stop_loss)
        .bind(sig.take_profit)
        .bind(sig.confidence)
        .bind(&sig.strategy_name)
        .bind(&sig.reason)
        .bind(sig.ml_enhanced)
        .bind(sig.ml_confidence)
        .bind(&sig.sentiment_label)
        .bind(sig.sentiment_confidence)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(signal_id = id, instrument = %sig.instrument, "signal persisted");
        Ok(id)
    }

    async fn create_trade(&self, trade: &Trade) -> Result<i64, PersistenceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                ticket, account_id, instrument, side, status, entry_price,
                entry_time, volume, stop_loss, take_profit, exit_price, exit_time,
                profit, pips, strategy_name, ml_enhanced, ai_approved, ai_reason,
                signal_id, audit_created_at, audit_updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.ticket)
        .bind(&trade.account_id)
        .bind(&trade.instrument)
        .bind(side_str(trade.side))
        .bind(status_str(trade.status))
        .bind(trade.entry_price)
        .bind(trade.entry_time.to_rfc3339())
        .bind(trade.volume)
        .bind(trade.stop_loss)
        .bind(trade.take_profit)
        .bind(trade.exit_price)
        .bind(trade.exit_time.map(|t| t.to_rfc3339()))
        .bind(trade.profit)
        .bind(trade.pips)
        .bind(&trade.strategy_name)
        .bind(trade.ml_enhanced)
        .bind(trade.ai_approved)
        .bind(&trade.ai_reason)
        .bind(trade.signal_id)
        .bind(trade.audit_created_at.to_rfc3339())
        .bind(trade.audit_updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(trade_id = id, instrument = %trade.instrument, "trade persisted");
        Ok(id)
    }

    async fn close_trade(
        &self,
        ticket: i64,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        profit: f64,
        pips: f64,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            UPDATE trades
            SET status = 'CLOSED', exit_price = ?, exit_time = ?, profit = ?, pips = ?,
                audit_updated_at = ?
            WHERE ticket = ?
            "#,
        )
        .bind(exit_price)
        .bind(exit_time.to_rfc3339())
        .bind(profit)
        .bind(pips)
        .bind(Utc::now().to_rfc3339())
        .bind(ticket)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_signal_to_trade(
        &self,
        signal_id: i64,
        trade_id: i64,
    ) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE trades SET signal_id = ? WHERE id = ?")
            .bind(signal_id)
            .bind(trade_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_snapshot(&self, snap: &AccountSnapshot) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO account_snapshots (
                account_id, broker, server, balance, equity, profit, margin,
                free_margin, open_position_count, total_volume, sampled_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snap.account_id)
        .bind(&snap.broker)
        .bind(&snap.server)
        .bind(snap.balance)
        .bind(snap.equity)
        .bind(snap.profit)
        .bind(snap.margin)
        .bind(snap.free_margin)
        .bind(snap.open_position_count as i64)
        .bind(snap.total_volume)
        .bind(snap.sampled_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_daily_performance(
        &self,
        account_id: &str,
        date: NaiveDate,
        profit: f64,
    ) -> Result<DailyPerformance, PersistenceError> {
        let day = date.format("%Y-%m-%d").to_string();
        let row = sqlx::query("SELECT * FROM daily_performance WHERE account_id = ? AND trading_day = ?")
            .bind(account_id)
            .bind(&day)
            .fetch_optional(&self.pool)
            .await?;

        let mut perf = match row {
            Some(r) => {
                let err = |e: sqlx::Error| PersistenceError(e.to_string());
                DailyPerformance {
                    account_id: r.try_get("account_id").map_err(err)?,
                    date,
                    trades: r.try_get::<i64, _>("trades").map_err(err)? as u32,
                    wins: r.try_get::<i64, _>("wins").map_err(err)? as u32,
                    losses: r.try_get::<i64, _>("losses").map_err(err)? as u32,
                    gross_profit: r.try_get("gross_profit").map_err(err)?,
                    gross_loss: r.try_get("gross_loss").map_err(err)?,
                    net_profit: r.try_get("net_profit").map_err(err)?,
                    win_rate: r.try_get("win_rate").map_err(err)?,
                    profit_factor: r.try_get("profit_factor").map_err(err)?,
                    updated_at: Utc::now(),
                }
            }
            None => DailyPerformance {
                account_id: account_id.to_string(),
                date,
                ..Default::default()
            },
        };

        perf.accumulate(profit);

        sqlx::query(
            r#"
            INSERT INTO daily_performance (
                account_id, trading_day, trades, wins, losses, gross_profit,
                gross_loss, net_profit, win_rate, profit_factor, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, trading_day) DO UPDATE SET
                trades = excluded.trades,
                wins = excluded.wins,
                losses = excluded.losses,
                gross_profit = excluded.gross_profit,
                gross_loss = excluded.gross_loss,
                net_profit = excluded.net_profit,
                win_rate = excluded.win_rate,
                profit_factor = excluded.profit_factor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&perf.account_id)
        .bind(&day)
        .bind(perf.trades as i64)
        .bind(perf.wins as i64)
        .bind(perf.losses as i64)
        .bind(perf.gross_profit)
        .bind(perf.gross_loss)
        .bind(perf.net_profit)
        .bind(perf.win_rate)
        .bind(perf.profit_factor)
        .bind(perf.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(perf)
    }

    async fn find_trade_by_ticket(&self, ticket: i64) -> Result<Option<Trade>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM trades WHERE ticket = ?")
            .bind(ticket)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_trade).transpose()
    }

    async fn recent_signals(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<Signal>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM signals WHERE account_id = ? ORDER BY generated_at DESC LIMIT ?",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_signal).collect()
    }

    async fn pending_trades_older_than(
        &self,
        account_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Trade>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM trades WHERE account_id = ? AND status = 'PENDING' \
             AND entry_time < ?",
        )
        .bind(account_id)
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_trade).collect()
    }

    async fn cancel_trade(&self, trade_id: i64) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE trades SET status = 'CANCELLED', audit_updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(trade_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_status_round_trips_through_its_string_encoding() {
        for s in [
            TradeStatus::Pending,
            TradeStatus::Open,
            TradeStatus::Closed,
            TradeStatus::Cancelled,
            TradeStatus::Rejected,
        ] {
            assert_eq!(parse_status(status_str(s)), s);
        }
    }

    #[test]
    fn signal_kind_round_trips() {
        for k in [SignalKind::Buy, SignalKind::Sell, SignalKind::Hold] {
            assert_eq!(parse_signal_kind(signal_kind_str(k)), k);
        }
    }
}
