//! Paper-trading `BrokerSession` adapter. Broker wire protocols are a
//! non-goal (spec.md §1) — this simulates fills and a random-walk price
//! feed in the style of the teacher's `MockMarketDataService`/
//! `MockExecutionService`, but against the FX-shaped `BrokerSession` port
//! instead of the stock/crypto `ExecutionService`/`MarketDataService` pair.

use crate::domain::fx_errors::{ConnectionError, DataNotAvailable};
use crate::domain::fx_types::{
    AccountInfo, Bar, OpenPosition, OrderRequest, OrderResult, OrderSide, Timeframe,
};
use crate::domain::fx_ports::BrokerSession;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

struct SimulatedPosition {
    ticket: i64,
    instrument: String,
    side: OrderSide,
    volume: f64,
    entry_price: f64,
    sl: Option<f64>,
    tp: Option<f64>,
    open_time: chrono::DateTime<Utc>,
}

/// One instance per Worker process — mirrors the real isolation invariant
/// (spec.md §4.3) even though nothing here is actually process-global.
pub struct MockBrokerSession {
    connected: AtomicBool,
    next_ticket: AtomicI64,
    balance: RwLock<f64>,
    prices: RwLock<HashMap<String, f64>>,
    positions: RwLock<Vec<SimulatedPosition>>,
    auto_trading_enabled: AtomicBool,
}

impl MockBrokerSession {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            connected: AtomicBool::new(false),
            next_ticket: AtomicI64::new(1),
            balance: RwLock::new(starting_balance),
            prices: RwLock::new(HashMap::new()),
            positions: RwLock::new(Vec::new()),
            auto_trading_enabled: AtomicBool::new(true),
        }
    }

    async fn price_for(&self, instrument: &str) -> f64 {
        let mut prices = self.prices.write().await;
        *prices.entry(instrument.to_string()).or_insert_with(|| base_price(instrument))
    }

    fn walk(price: f64, seed: i64) -> f64 {
        let wiggle = (((seed.wrapping_mul(1_103_515_245).wrapping_add(12_345)) / 65_536) % 1000) as f64 / 1000.0 - 0.5;
        price * (1.0 + wiggle * 0.0005)
    }
}

fn base_price(instrument: &str) -> f64 {
    if instrument.ends_with("JPY") {
        150.0
    } else {
        1.1000
    }
}

#[async_trait]
impl BrokerSession for MockBrokerSession {
    async fn connect(
        &self,
        login: &str,
        _password: &str,
        server: &str,
        _timeout: std::time::Duration,
    ) -> Result<(), ConnectionError> {
        if login.is_empty() {
            return Err(ConnectionError::AuthFailed { login: login.to_string(), server: server.to_string() });
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(login, server, "mock broker session connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn account_info(&self) -> Result<AccountInfo, ConnectionError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectionError::Unreachable { reason: "not connected".to_string() });
        }
        let balance = *self.balance.read().await;
        let positions = self.positions.read().await;
        let mut floating = 0.0;
        for p in positions.iter() {
            let current = self.price_for(&p.instrument).await;
            let diff = match p.side {
                OrderSide::Buy => current - p.entry_price,
                OrderSide::Sell => p.entry_price - current,
            };
            floating += diff * p.volume * 100_000.0;
        }
        Ok(AccountInfo {
            login: "demo".to_string(),
            server: "demo-server".to_string(),
            broker: "paper".to_string(),
            balance,
            equity: balance + floating,
            profit: floating,
            margin: 0.0,
            free_margin: balance + floating,
            leverage: 100,
            trade_allowed: self.auto_trading_enabled.load(Ordering::SeqCst),
        })
    }

    async fn bars(&self, instrument: &str, _timeframe: Timeframe, count: usize) -> Result<Vec<Bar>, DataNotAvailable> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut price = self.price_for(instrument).await;
        let now = Utc::now();
        let mut bars = Vec::with_capacity(count);
        for i in 0..count {
            let open = price;
            price = Self::walk(price, i as i64);
            let (high, low) = if price >= open { (price, open) } else { (open, price) };
            bars.push(Bar {
                open_time: now - Duration::hours((count - i) as i64),
                open,
                high,
                low,
                close: price,
                volume: 1.0,
            });
        }
        self.prices.write().await.insert(instrument.to_string(), price);
        Ok(bars)
    }

    async fn send_order(&self, req: OrderRequest) -> OrderResult {
        if !self.auto_trading_enabled.load(Ordering::SeqCst) {
            return OrderResult {
                ok: false,
                ticket: None,
                fill_price: None,
                error_code: Some(10_027),
                error_msg: Some("AutoTrading disabled by client".to_string()),
            };
        }
        let fill_price = self.price_for(&req.instrument).await;
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.positions.write().await.push(SimulatedPosition {
            ticket,
            instrument: req.instrument,
            side: req.side,
            volume: req.volume,
            entry_price: fill_price,
            sl: req.sl,
            tp: req.tp,
            open_time: Utc::now(),
        });
        OrderResult { ok: true, ticket: Some(ticket), fill_price: Some(fill_price), error_code: None, error_msg: None }
    }

    async fn modify_position(&self, ticket: i64, sl: Option<f64>, tp: Option<f64>) -> Result<(), String> {
        let mut positions = self.positions.write().await;
        let Some(p) = positions.iter_mut().find(|p| p.ticket == ticket) else {
            return Err(format!("no open position with ticket {ticket}"));
        };
        if sl.is_some() {
            p.sl = sl;
        }
        if tp.is_some() {
            p.tp = tp;
        }
        Ok(())
    }

    async fn close_position(&self, ticket: i64, volume: Option<f64>) -> Result<(), String> {
        let mut positions = self.positions.write().await;
        let Some(idx) = positions.iter().position(|p| p.ticket == ticket) else {
            return Err(format!("no open position with ticket {ticket}"));
        };
        match volume {
            Some(v) if v < positions[idx].volume => {
                positions[idx].volume -= v;
            }
            _ => {
                positions.remove(idx);
            }
        }
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<OpenPosition>, String> {
        let positions = self.positions.read().await;
        let mut result = Vec::with_capacity(positions.len());
        for p in positions.iter() {
            let current = self.price_for(&p.instrument).await;
            let diff = match p.side {
                OrderSide::Buy => current - p.entry_price,
                OrderSide::Sell => p.entry_price - current,
            };
            result.push(OpenPosition {
                ticket: p.ticket,
                instrument: p.instrument.clone(),
                side: p.side,
                volume: p.volume,
                entry_price: p.entry_price,
                current_sl: p.sl,
                current_tp: p.tp,
                profit: diff * p.volume * 100_000.0,
                open_time: p.open_time,
            });
        }
        Ok(result)
    }

    async fn auto_trading_enabled(&self) -> bool {
        self.auto_trading_enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_send_order_opens_a_position() {
        let broker = MockBrokerSession::new(10_000.0);
        broker.connect("1000", "pw", "Demo-Server", std::time::Duration::from_secs(5)).await.unwrap();
        let result = broker
            .send_order(OrderRequest {
                instrument: "EURUSD".to_string(),
                side: OrderSide::Buy,
                volume: 0.1,
                price: None,
                sl: Some(1.0),
                tp: Some(1.2),
                magic: 1,
                deviation: 10,
                comment: "test".to_string(),
            })
            .await;
        assert!(result.ok);
        let positions = broker.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, result.ticket.unwrap());
    }

    #[tokio::test]
    async fn modify_then_close_updates_and_removes_position() {
        let broker = MockBrokerSession::new(10_000.0);
        broker.connect("1000", "pw", "Demo-Server", std::time::Duration::from_secs(5)).await.unwrap();
        let result = broker
            .send_order(OrderRequest {
                instrument: "EURUSD".to_string(),
                side: OrderSide::Buy,
                volume: 0.1,
                price: None,
                sl: Some(1.0),
                tp: Some(1.2),
                magic: 1,
                deviation: 10,
                comment: "test".to_string(),
            })
            .await;
        let ticket = result.ticket.unwrap();
        broker.modify_position(ticket, Some(1.05), None).await.unwrap();
        let positions = broker.positions().await.unwrap();
        assert_eq!(positions[0].current_sl, Some(1.05));

        broker.close_position(ticket, None).await.unwrap();
        assert!(broker.positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_auto_trading_rejects_orders() {
        let broker = MockBrokerSession::new(10_000.0);
        broker.connect("1000", "pw", "Demo-Server", std::time::Duration::from_secs(5)).await.unwrap();
        broker.auto_trading_enabled.store(false, Ordering::SeqCst);
        let result = broker
            .send_order(OrderRequest {
                instrument: "EURUSD".to_string(),
                side: OrderSide::Buy,
                volume: 0.1,
                price: None,
                sl: Some(1.0),
                tp: Some(1.2),
                magic: 1,
                deviation: 10,
                comment: "test".to_string(),
            })
            .await;
        assert!(!result.ok);
        assert_eq!(result.error_code, Some(10_027));
    }
}
