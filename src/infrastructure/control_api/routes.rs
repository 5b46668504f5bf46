//! REST surface for the control plane (spec.md §6, SPEC_FULL.md §A.5).
//! Grounded in the teacher pack's axum control APIs (e.g. the `axum` +
//! `tower-http` CORS stack used by retrieved sBot/invest-iq repos): one
//! `Router` built over a shared `AppState`, JSON in and out, a
//! `StatusCode`-carrying error path for bad requests.

use super::state::AppState;
use crate::application::ipc::{AutoTradingReport, InboundCommand, OutboundEvent, StatusReport};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/trading/start", post(start_all_trading))
        .route("/trading/stop", post(stop_all_trading))
        .route("/accounts/:id/connect", post(connect_account))
        .route("/accounts/:id/disconnect", post(disconnect_account))
        .route("/accounts/:id/start", post(start_account))
        .route("/accounts/:id/stop", post(stop_account))
        .route("/accounts/:id/status", get(account_status))
        .route("/accounts/:id/autotrading", get(account_autotrading))
        .route("/accounts/:id/instruments/:symbol/enable", post(enable_instrument))
        .route("/accounts/:id/instruments/:symbol/disable", post(disable_instrument))
        .route("/events", get(super::ws::events_handler))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.into() }))
}

async fn start_all_trading(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut pool = state.pool.lock().await;
    for account_id in pool.running_accounts() {
        if let Err(e) = pool.send(&account_id, InboundCommand::StartTrading) {
            warn!(account_id, error = %e, "failed to start trading");
        }
    }
    StatusCode::NO_CONTENT
}

async fn stop_all_trading(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut pool = state.pool.lock().await;
    for account_id in pool.running_accounts() {
        if let Err(e) = pool.send(&account_id, InboundCommand::StopTrading) {
            warn!(account_id, error = %e, "failed to stop trading");
        }
    }
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct ConnectRequest {
    profile: crate::config::model::AccountProfile,
    #[serde(default)]
    force: bool,
}

async fn connect_account(
    Path(account_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    let mut pool = state.pool.lock().await;
    match pool.start_worker(&account_id, &req.profile, req.force).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}

async fn disconnect_account(Path(account_id): Path<String>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut pool = state.pool.lock().await;
    match pool.stop_worker(&account_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}

async fn start_account(Path(account_id): Path<String>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    send_or_bad_request(&state, &account_id, InboundCommand::StartTrading).await
}

async fn stop_account(Path(account_id): Path<String>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    send_or_bad_request(&state, &account_id, InboundCommand::StopTrading).await
}

async fn send_or_bad_request(state: &Arc<AppState>, account_id: &str, command: InboundCommand) -> axum::response::Response {
    let pool = state.pool.lock().await;
    match pool.send(account_id, command) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}

async fn account_status(Path(account_id): Path<String>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut rx = state.subscribe().await;
    {
        let pool = state.pool.lock().await;
        if let Err(e) = pool.send(&account_id, InboundCommand::GetStatus) {
            return bad_request(e.to_string()).into_response();
        }
    }

    match await_reply(&mut rx, &account_id, |event| match event {
        OutboundEvent::StatusReport { account_id: id, report } if id == account_id => Some(report.clone()),
        _ => None,
    })
    .await
    {
        Some(report) => Json(report).into_response(),
        None => (StatusCode::GATEWAY_TIMEOUT, Json(ErrorBody { error: "worker did not reply in time".to_string() }))
            .into_response(),
    }
}

async fn account_autotrading(Path(account_id): Path<String>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut rx = state.subscribe().await;
    {
        let pool = state.pool.lock().await;
        if let Err(e) = pool.send(&account_id, InboundCommand::CheckAutoTrading) {
            return bad_request(e.to_string()).into_response();
        }
    }

    match await_reply(&mut rx, &account_id, |event| match event {
        OutboundEvent::AutoTradingStatus { account_id: id, enabled } if *id == account_id => {
            Some(AutoTradingReport { enabled: *enabled })
        }
        _ => None,
    })
    .await
    {
        Some(report) => Json(report).into_response(),
        None => (StatusCode::GATEWAY_TIMEOUT, Json(ErrorBody { error: "worker did not reply in time".to_string() }))
            .into_response(),
    }
}

async fn await_reply<T>(
    rx: &mut tokio::sync::broadcast::Receiver<OutboundEvent>,
    _account_id: &str,
    extract: impl Fn(&OutboundEvent) -> Option<T>,
) -> Option<T> {
    tokio::time::timeout(REPLY_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(value) = extract(&event) {
                        return value;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => std::future::pending::<T>().await,
            }
        }
    })
    .await
    .ok()
}

#[derive(Deserialize)]
struct DisableQuery {
    #[serde(default)]
    close_positions: bool,
}

async fn enable_instrument(
    Path((account_id, symbol)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    set_instrument_enabled(&state, &account_id, &symbol, true, false).await
}

async fn disable_instrument(
    Path((account_id, symbol)): Path<(String, String)>,
    Query(query): Query<DisableQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    set_instrument_enabled(&state, &account_id, &symbol, false, query.close_positions).await
}

async fn set_instrument_enabled(
    state: &Arc<AppState>,
    account_id: &str,
    symbol: &str,
    enabled: bool,
    close_positions: bool,
) -> axum::response::Response {
    let mut pool = state.pool.lock().await;
    let Some(current) = pool.current_profile(account_id) else {
        return bad_request(format!("no running worker for account {account_id}")).into_response();
    };

    let mut profile = current.clone();
    let Some(instrument) = profile.instruments.iter_mut().find(|i| i.symbol == symbol) else {
        return bad_request(format!("account {account_id} has no instrument {symbol}")).into_response();
    };
    instrument.enabled = enabled;

    if let Err(e) = pool.reload_profile(account_id, profile) {
        return bad_request(e.to_string()).into_response();
    }

    if !enabled && close_positions {
        if let Err(e) = pool.send(account_id, InboundCommand::ClosePositionsForInstrument { symbol: symbol.to_string() }) {
            warn!(account_id, symbol, error = %e, "failed to request position close on instrument disable");
        }
    }

    StatusCode::NO_CONTENT.into_response()
}
