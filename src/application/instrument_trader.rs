//! Instrument Trader (spec.md §4.7): the per-instrument, per-cycle
//! pipeline. One `TraderState` is owned by the Account Orchestrator per
//! instrument and threaded across cycles; everything else here is a pure
//! function of its arguments plus the injected capability ports.

use crate::application::{decision_pipeline, portfolio_manager, signal_engine};
use crate::config::model::{AccountProfile, InstrumentConfig};
use crate::domain::decision::FusionFlags;
use crate::domain::fx_ports::{BrokerSession, PersistenceGateway, Predictor, SentimentSource};
use crate::domain::fx_types::{
    AccountInfo, OrderRequest, OrderSide, SignalKind, Timeframe, Trade, TradeStatus,
};
use crate::domain::portfolio_state::PortfolioState;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Number of bars requested from the broker per cycle. Enough for the
/// longest strategy period plus headroom for the crossover lookback.
const BAR_COUNT: usize = 200;
const LOT_STEP: f64 = 0.01;

/// Carried across cycles by the caller. `last_executed_kind` starts at
/// `Hold` so the very first signal of any direction is never suppressed
/// by the signal-change dedup rule.
#[derive(Debug, Clone)]
pub struct TraderState {
    pub last_executed_kind: SignalKind,
    pub last_trade_time: DateTime<Utc>,
}

impl Default for TraderState {
    fn default() -> Self {
        Self {
            last_executed_kind: SignalKind::Hold,
            last_trade_time: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Executed { ticket: i64, side: OrderSide, volume: f64 },
    Skipped { reason: &'static str },
    OrderRejected { broker_error_code: Option<i32>, reason: String },
    Failed { reason: String },
}

#[allow(clippy::too_many_arguments)]
pub async fn run_cycle(
    account: &AccountProfile,
    account_id: &str,
    account_info: &AccountInfo,
    instrument: &InstrumentConfig,
    state: &mut TraderState,
    broker: &dyn BrokerSession,
    predictor: Option<&dyn Predictor>,
    sentiment: Option<&dyn SentimentSource>,
    persistence: &dyn PersistenceGateway,
    portfolio: &PortfolioState,
    now: DateTime<Utc>,
) -> CycleOutcome {
    if let Some(hours) = instrument.trading_hours {
        if !hours.contains(now.time()) {
            return CycleOutcome::Skipped { reason: "outside trading hours" };
        }
    }

    let cooldown = chrono::Duration::seconds(instrument.cooldown_seconds as i64);
    if now - state.last_trade_time < cooldown {
        return CycleOutcome::Skipped { reason: "cooldown active" };
    }

    let bars = match broker
        .bars(&instrument.symbol, instrument.timeframe, BAR_COUNT)
        .await
    {
        Ok(bars) => bars,
        Err(e) => {
            warn!(instrument = %instrument.symbol, error = %e, "bars fetch failed");
            return CycleOutcome::Failed { reason: e.to_string() };
        }
    };

    let technical = signal_engine::analyse(&bars, &instrument.strategy, &instrument.symbol);

    let flags = FusionFlags {
        use_ml: account.execution.use_ml,
        use_sentiment: account.execution.use_sentiment,
    };

    let (ml, sentiment_opinion) = tokio::join!(
        fetch_with_timeout(predictor, &instrument.symbol, &bars),
        fetch_sentiment_with_timeout(sentiment, &instrument.symbol),
    );

    let mut fused = decision_pipeline::fuse(
        &technical,
        ml.as_ref(),
        sentiment_opinion.as_ref(),
        flags,
        instrument.min_confidence,
    );

    if instrument.strategy.kind == crate::config::model::StrategyKind::Position
        && fused.kind == state.last_executed_kind
        && !instrument.trade_on_signal_change
    {
        fused.kind = SignalKind::Hold;
    }

    // One Signal row per cycle: persisted here, once the fusion outcome
    // (including the above dedup-to-hold override) is final, then linked
    // to the Trade below if an order results.
    let signal_id = if fused.kind != SignalKind::Hold {
        match persistence.create_signal(&fused, account_id).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(instrument = %instrument.symbol, error = %e, "signal persistence failed");
                None
            }
        }
    } else {
        None
    };

    let portfolio_decision = if account.execution.use_intelligent_manager {
        portfolio_manager::decide(&instrument.symbol, portfolio)
    } else {
        crate::domain::portfolio_state::PortfolioDecision::passthrough()
    };

    for ticket in &portfolio_decision.positions_to_close {
        if let Err(e) = broker.close_position(*ticket, None).await {
            warn!(ticket, error = %e, "portfolio-driven close failed");
        }
    }

    if !portfolio_decision.allow_new_trade || fused.kind == SignalKind::Hold {
        return CycleOutcome::Skipped { reason: "no actionable signal" };
    }

    let confidence = fused.confidence * portfolio_decision.confidence_multiplier;
    if confidence < instrument.min_confidence {
        return CycleOutcome::Skipped { reason: "confidence below floor after sizing penalty" };
    }

    let (stop_loss, take_profit) = match (fused.stop_loss, fused.take_profit) {
        (Some(sl), Some(tp)) => (sl, tp),
        _ => return CycleOutcome::Skipped { reason: "directional signal missing brackets" },
    };

    let distance_price = (fused.ref_price - stop_loss).abs();
    if distance_price <= f64::EPSILON {
        return CycleOutcome::Failed { reason: "zero stop distance, cannot size position".into() };
    }

    let risk_amount = account_info.balance * instrument.risk_percent / 100.0;
    let pip_value = crate::domain::pip_table::pip_value_per_lot(&instrument.symbol);
    let raw_volume = risk_amount / (distance_price / signal_engine::pip_size(&instrument.symbol) * pip_value);
    let stepped = (raw_volume / LOT_STEP).floor() * LOT_STEP;
    let volume = stepped.clamp(instrument.min_position_size, instrument.max_position_size);

    let side = match fused.kind {
        SignalKind::Buy => OrderSide::Buy,
        SignalKind::Sell => OrderSide::Sell,
        SignalKind::Hold => unreachable!("filtered above"),
    };

    let request = OrderRequest {
        instrument: instrument.symbol.clone(),
        side,
        volume,
        price: None,
        sl: Some(stop_loss),
        tp: Some(take_profit),
        magic: 20_260_731,
        deviation: 10,
        comment: format!("{}:{}", fused.strategy_name, account_id),
    };

    let result = broker.send_order(request).await;

    if !result.ok {
        return CycleOutcome::OrderRejected {
            broker_error_code: result.error_code,
            reason: result.error_msg.unwrap_or_else(|| "order rejected".to_string()),
        };
    }

    let Some(ticket) = result.ticket else {
        return CycleOutcome::Failed { reason: "broker reported success with no ticket".into() };
    };
    let fill_price = result.fill_price.unwrap_or(fused.ref_price);

    let trade = Trade {
        id: None,
        ticket: Some(ticket),
        account_id: account_id.to_string(),
        instrument: instrument.symbol.clone(),
        side,
        status: TradeStatus::Open,
        entry_price: fill_price,
        entry_time: now,
        volume,
        stop_loss: Some(stop_loss),
        take_profit: Some(take_profit),
        exit_price: None,
        exit_time: None,
        profit: None,
        pips: None,
        strategy_name: fused.strategy_name.clone(),
        ml_enhanced: fused.ml_enhanced,
        ai_approved: true,
        ai_reason: Some(fused.reason.clone()),
        signal_id,
        audit_created_at: now,
        audit_updated_at: now,
    };

    match persistence.create_trade(&trade).await {
        Ok(trade_id) => {
            if let Some(signal_id) = signal_id {
                if let Err(e) = persistence.link_signal_to_trade(signal_id, trade_id).await {
                    warn!(error = %e, "failed to link signal to trade");
                }
            }
        }
        Err(e) => warn!(error = %e, "failed to persist executed trade"),
    }

    state.last_executed_kind = fused.kind;
    state.last_trade_time = now;

    info!(instrument = %instrument.symbol, ticket, volume, "order executed");
    CycleOutcome::Executed { ticket, side, volume }
}

async fn fetch_with_timeout(
    predictor: Option<&dyn Predictor>,
    instrument: &str,
    bars: &[crate::domain::fx_types::Bar],
) -> Option<crate::domain::decision::ProviderOpinion> {
    let predictor = predictor?;
    match tokio::time::timeout(std::time::Duration::from_secs(2), predictor.predict(instrument, bars)).await {
        Ok(Ok(opinion)) => Some(opinion),
        Ok(Err(e)) => {
            warn!(instrument, error = %e, "ml predictor failed, treating as absent");
            None
        }
        Err(_) => {
            warn!(instrument, "ml predictor timed out, treating as absent");
            None
        }
    }
}

async fn fetch_sentiment_with_timeout(
    sentiment: Option<&dyn SentimentSource>,
    instrument: &str,
) -> Option<crate::domain::decision::ProviderOpinion> {
    let sentiment = sentiment?;
    match tokio::time::timeout(std::time::Duration::from_secs(2), sentiment.sentiment(instrument)).await {
        Ok(Ok(opinion)) => Some(opinion),
        Ok(Err(e)) => {
            warn!(instrument, error = %e, "sentiment source failed, treating as absent");
            None
        }
        Err(_) => {
            warn!(instrument, "sentiment source timed out, treating as absent");
            None
        }
    }
}
