//! Worker process (spec.md §4.10): one OS process, one `BrokerSession`,
//! one Account Orchestrator. Talks to the Pool Manager over line-delimited
//! JSON on stdin (commands in) / stdout (events out) — see `ipc`.
//!
//! This module implements the loop; `src/bin/worker.rs` is the thin
//! process entrypoint that wires real adapters and calls [`run`].

use crate::application::account_orchestrator::{self, DailyAnchor};
use crate::application::instrument_trader::TraderState;
use crate::application::ipc::{CycleSummaryReport, InboundCommand, OutboundEvent, StatusReport};
use crate::config::model::AccountProfile;
use crate::domain::fx_ports::{BrokerSession, PersistenceGateway, Predictor, SentimentSource};
use crate::domain::fx_types::{OpenPosition, PositionRuntimeState};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);
const RECONNECT_MAX_ATTEMPTS: u32 = 5;

pub struct WorkerContext<'a> {
    pub account_id: String,
    pub account: AccountProfile,
    pub broker: &'a dyn BrokerSession,
    pub predictor: Option<&'a dyn Predictor>,
    pub sentiment: Option<&'a dyn SentimentSource>,
    pub persistence: &'a dyn PersistenceGateway,
}

struct WorkerState {
    trading_enabled: bool,
    trader_states: HashMap<String, TraderState>,
    position_runtime: HashMap<i64, PositionRuntimeState>,
    daily_anchor: Option<DailyAnchor>,
    reconcile_missing: HashMap<i64, u32>,
    last_open_positions: HashMap<i64, OpenPosition>,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            trading_enabled: true,
            trader_states: HashMap::new(),
            position_runtime: HashMap::new(),
            daily_anchor: None,
            reconcile_missing: HashMap::new(),
            last_open_positions: HashMap::new(),
        }
    }
}

/// Drives the command loop until `Shutdown` or an unrecoverable broker
/// disconnect. `reader`/`writer` are generic so tests can swap in an
/// in-memory pipe instead of real stdio.
pub async fn run<R, W>(mut ctx: WorkerContext<'_>, reader: R, mut writer: W)
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut state = WorkerState::default();

    match ctx
        .broker
        .connect(&ctx.account.login, &ctx.account.password, &ctx.account.server, Duration::from_secs(30))
        .await
    {
        Ok(()) => {
            send(&mut writer, &OutboundEvent::WorkerReady { account_id: ctx.account_id.clone() }).await;
        }
        Err(e) => {
            send(&mut writer, &OutboundEvent::WorkerFailed { account_id: ctx.account_id.clone(), reason: e.to_string() }).await;
            return;
        }
    }

    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // pool closed the pipe
            Err(e) => {
                error!(account_id = %ctx.account_id, error = %e, "failed to read command");
                break;
            }
        };

        let command: InboundCommand = match crate::application::ipc::decode_line(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(account_id = %ctx.account_id, error = %e, "dropping malformed command");
                continue;
            }
        };

        match command {
            InboundCommand::ExecuteCycle => {
                if !handle_cycle(&mut ctx, &mut state, &mut writer).await {
                    break;
                }
            }
            InboundCommand::StartTrading => state.trading_enabled = true,
            InboundCommand::StopTrading => state.trading_enabled = false,
            InboundCommand::ReloadCurrencies { profile } => {
                ctx.account = profile;
                info!(account_id = %ctx.account_id, "account profile reloaded");
            }
            InboundCommand::ClosePositionsForInstrument { symbol } => {
                close_positions_for_instrument(&ctx, &symbol).await;
            }
            InboundCommand::GetStatus => {
                let report = status_report(&ctx, &state).await;
                send(&mut writer, &OutboundEvent::StatusReport { account_id: ctx.account_id.clone(), report }).await;
            }
            InboundCommand::CheckAutoTrading => {
                let enabled = ctx.broker.auto_trading_enabled().await;
                send(&mut writer, &OutboundEvent::AutoTradingStatus { account_id: ctx.account_id.clone(), enabled }).await;
            }
            InboundCommand::Shutdown => {
                ctx.broker.disconnect().await;
                break;
            }
        }
    }
}

/// Closes every open position on `symbol`, used when an instrument is
/// disabled via the control API with `close_positions=true`.
async fn close_positions_for_instrument(ctx: &WorkerContext<'_>, symbol: &str) {
    let positions = match ctx.broker.positions().await {
        Ok(p) => p,
        Err(e) => {
            warn!(account_id = %ctx.account_id, symbol, error = %e, "failed to fetch positions for instrument close");
            return;
        }
    };
    for position in positions.into_iter().filter(|p| p.instrument == symbol) {
        if let Err(e) = ctx.broker.close_position(position.ticket, None).await {
            warn!(account_id = %ctx.account_id, ticket = position.ticket, error = %e, "failed to close position on instrument disable");
        }
    }
}

async fn status_report(ctx: &WorkerContext<'_>, state: &WorkerState) -> StatusReport {
    let positions = ctx.broker.positions().await.unwrap_or_default();
    StatusReport {
        connected: true,
        trading_enabled: state.trading_enabled,
        open_position_count: positions.len() as u32,
        active_instruments: ctx.account.instruments.iter().filter(|i| i.enabled).map(|i| i.symbol.clone()).collect(),
    }
}

/// Runs one cycle, reconnecting with exponential backoff if the broker
/// reports itself disconnected. Returns `false` if the worker should
/// terminate (reconnect exhausted).
async fn handle_cycle<W: AsyncWrite + Unpin>(ctx: &mut WorkerContext<'_>, state: &mut WorkerState, writer: &mut W) -> bool {
    if !reconnect_if_needed(ctx, writer).await {
        return false;
    }

    let summary = account_orchestrator::run_tick(
        &ctx.account,
        &ctx.account_id,
        ctx.broker,
        ctx.predictor,
        ctx.sentiment,
        ctx.persistence,
        &mut state.trader_states,
        &mut state.position_runtime,
        &mut state.daily_anchor,
        &mut state.reconcile_missing,
        &mut state.last_open_positions,
        state.trading_enabled,
        chrono::Utc::now(),
    )
    .await;

    send(
        writer,
        &OutboundEvent::CycleComplete {
            account_id: ctx.account_id.clone(),
            summary: CycleSummaryReport {
                executed: summary.executed,
                skipped: summary.skipped,
                rejected: summary.rejected,
                errors: summary.errors,
                emergency_halted: summary.emergency_halted,
            },
        },
    )
    .await;
    true
}

async fn reconnect_if_needed<W: AsyncWrite + Unpin>(ctx: &mut WorkerContext<'_>, writer: &mut W) -> bool {
    if ctx.broker.account_info().await.is_ok() {
        return true;
    }

    let mut backoff = RECONNECT_INITIAL_BACKOFF;
    for attempt in 1..=RECONNECT_MAX_ATTEMPTS {
        warn!(account_id = %ctx.account_id, attempt, "broker disconnected, attempting reconnect");
        tokio::time::sleep(backoff).await;
        match ctx
            .broker
            .connect(&ctx.account.login, &ctx.account.password, &ctx.account.server, Duration::from_secs(30))
            .await
        {
            Ok(()) => return true,
            Err(_) => backoff = (backoff * 2).min(RECONNECT_MAX_BACKOFF),
        }
    }

    send(
        writer,
        &OutboundEvent::WorkerFailed { account_id: ctx.account_id.clone(), reason: "reconnect exhausted".to_string() },
    )
    .await;
    false
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, event: &OutboundEvent) {
    let line = crate::application::ipc::encode_line(event);
    if let Err(e) = writer.write_all(line.as_bytes()).await {
        error!(error = %e, "failed to write event to pool");
    }
}
