//! End-to-end Worker loop smoke test (SPEC_FULL.md §A.6, scenario S1): a
//! Worker wired to a real SQLite-backed `PersistenceGateway` and a paper
//! `MockBrokerSession`, driven over several `ExecuteCycle` commands exactly
//! as the Pool Manager would drive it, asserting the process produces a
//! clean `WorkerReady` -> `CycleComplete`* -> exit sequence.

use multifx::application::ipc::{InboundCommand, OutboundEvent};
use multifx::application::worker::{self, WorkerContext};
use multifx::config::model::{
    AccountProfile, EmergencyConfig, ExecutionConfig, InstrumentConfig, PortfolioConfig,
    PositionManagementConfig, StrategyKind, StrategyParams,
};
use multifx::domain::fx_types::Timeframe;
use multifx::infrastructure::broker::mock::MockBrokerSession;
use multifx::infrastructure::persistence::{Database, SqlitePersistenceGateway};

fn account() -> AccountProfile {
    AccountProfile {
        name: "acct-e2e".to_string(),
        login: "1000".to_string(),
        password: "demo".to_string(),
        server: "Demo-Server".to_string(),
        broker: "paper".to_string(),
        execution: ExecutionConfig {
            interval_seconds: 1,
            parallel_execution: false,
            max_workers: 1,
            use_intelligent_manager: false,
            use_ml: false,
            use_sentiment: false,
        },
        portfolio: PortfolioConfig { portfolio_risk_percent: 10.0, max_concurrent_trades: 10 },
        emergency: EmergencyConfig { stop_all: false, max_daily_loss_percent: 50.0, max_drawdown_percent: 50.0 },
        instruments: vec![InstrumentConfig {
            symbol: "EURUSD".to_string(),
            enabled: true,
            risk_percent: 1.0,
            timeframe: Timeframe::H1,
            strategy: StrategyParams { kind: StrategyKind::Crossover, fast_period: 3, slow_period: 8, sl_pips: 20.0, tp_pips: 40.0 },
            max_position_size: 1.0,
            min_position_size: 0.01,
            cooldown_seconds: 0,
            trade_on_signal_change: true,
            min_confidence: 0.0,
            trading_hours: None,
            position_mgmt: PositionManagementConfig::default(),
        }],
    }
}

#[tokio::test]
async fn worker_runs_several_cycles_against_real_persistence_without_errors() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let database = Database::new("sqlite::memory:").await.expect("in-memory db should initialize");
    let persistence = SqlitePersistenceGateway::new(database.pool.clone());
    let broker = MockBrokerSession::new(10_000.0);

    let ctx = WorkerContext {
        account_id: "acct-e2e".to_string(),
        account: account(),
        broker: &broker,
        predictor: None,
        sentiment: None,
        persistence: &persistence,
    };

    let mut input = String::new();
    for _ in 0..5 {
        input.push_str(&multifx::application::ipc::encode_line(&InboundCommand::ExecuteCycle));
    }
    input.push_str(&multifx::application::ipc::encode_line(&InboundCommand::Shutdown));

    let reader = std::io::Cursor::new(input.into_bytes());
    let mut output = Vec::new();

    worker::run(ctx, reader, &mut output).await;

    let text = String::from_utf8(output).expect("worker output must be valid utf8");
    let events: Vec<OutboundEvent> =
        text.lines().map(|line| multifx::application::ipc::decode_line(line).expect("each line is a valid OutboundEvent")).collect();

    assert!(matches!(events.first(), Some(OutboundEvent::WorkerReady { account_id }) if account_id == "acct-e2e"));

    let cycle_count = events.iter().filter(|e| matches!(e, OutboundEvent::CycleComplete { .. })).count();
    assert_eq!(cycle_count, 5, "every ExecuteCycle command should produce exactly one CycleComplete event");

    for event in &events {
        if let OutboundEvent::CycleComplete { summary, .. } = event {
            assert_eq!(summary.errors, 0, "a healthy broker/persistence pair should never error out a cycle");
        }
    }
}

#[tokio::test]
async fn start_stop_trading_toggle_is_respected_across_cycles() {
    let database = Database::new("sqlite::memory:").await.unwrap();
    let persistence = SqlitePersistenceGateway::new(database.pool.clone());
    let broker = MockBrokerSession::new(10_000.0);

    let ctx = WorkerContext {
        account_id: "acct-e2e".to_string(),
        account: account(),
        broker: &broker,
        predictor: None,
        sentiment: None,
        persistence: &persistence,
    };

    let mut input = String::new();
    input.push_str(&multifx::application::ipc::encode_line(&InboundCommand::StopTrading));
    input.push_str(&multifx::application::ipc::encode_line(&InboundCommand::GetStatus));
    input.push_str(&multifx::application::ipc::encode_line(&InboundCommand::Shutdown));

    let reader = std::io::Cursor::new(input.into_bytes());
    let mut output = Vec::new();
    worker::run(ctx, reader, &mut output).await;

    let text = String::from_utf8(output).unwrap();
    let events: Vec<OutboundEvent> = text.lines().map(|l| multifx::application::ipc::decode_line(l).unwrap()).collect();

    let status = events.iter().find_map(|e| match e {
        OutboundEvent::StatusReport { report, .. } => Some(report),
        _ => None,
    });
    assert_eq!(status.map(|r| r.trading_enabled), Some(false));
}
