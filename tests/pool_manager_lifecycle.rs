//! Worker Pool Manager process lifecycle (SPEC_FULL.md §A.6, scenario S6:
//! multi-account isolation). Spawns `/bin/true` as a stand-in child process
//! for two independent accounts — real `worker` IPC behavior is covered by
//! `application::worker`'s own tests; this exercises the Pool Manager's
//! spawn/stop bookkeeping and the one-worker-per-account invariant against
//! real OS processes rather than in-memory state alone.

use multifx::application::ipc::InboundCommand;
use multifx::application::pool_manager::{PoolError, PoolManager};
use multifx::config::model::{AccountProfile, EmergencyConfig, ExecutionConfig, PortfolioConfig};

fn profile(name: &str) -> AccountProfile {
    AccountProfile {
        name: name.to_string(),
        login: "1".to_string(),
        password: "x".to_string(),
        server: "demo".to_string(),
        broker: "demo".to_string(),
        execution: ExecutionConfig {
            interval_seconds: 60,
            parallel_execution: false,
            max_workers: 1,
            use_intelligent_manager: false,
            use_ml: false,
            use_sentiment: false,
        },
        portfolio: PortfolioConfig { portfolio_risk_percent: 5.0, max_concurrent_trades: 10 },
        emergency: EmergencyConfig { stop_all: false, max_daily_loss_percent: 5.0, max_drawdown_percent: 20.0 },
        instruments: Vec::new(),
    }
}

#[tokio::test]
async fn two_accounts_are_spawned_and_stopped_independently() {
    let mut pool = PoolManager::new("/bin/true".into());

    pool.start_worker("acct-a", &profile("acct-a"), false).await.expect("spawn /bin/true for acct-a");
    pool.start_worker("acct-b", &profile("acct-b"), false).await.expect("spawn /bin/true for acct-b");

    assert!(pool.is_running("acct-a"));
    assert!(pool.is_running("acct-b"));
    let mut running = pool.running_accounts();
    running.sort();
    assert_eq!(running, vec!["acct-a".to_string(), "acct-b".to_string()]);

    // Isolation: stopping one account's worker must not disturb the other.
    pool.stop_worker("acct-a").await.expect("stop acct-a");
    assert!(!pool.is_running("acct-a"));
    assert!(pool.is_running("acct-b"));

    pool.stop_worker("acct-b").await.expect("stop acct-b");
    assert!(!pool.is_running("acct-b"));
}

#[tokio::test]
async fn starting_a_second_worker_without_force_is_rejected() {
    let mut pool = PoolManager::new("/bin/true".into());
    pool.start_worker("acct-a", &profile("acct-a"), false).await.unwrap();

    let result = pool.start_worker("acct-a", &profile("acct-a"), false).await;
    assert!(matches!(result, Err(PoolError::AlreadyRunning(account)) if account == "acct-a"));

    // force=true tears down the old worker and spawns a fresh one.
    pool.start_worker("acct-a", &profile("acct-a"), true).await.expect("forced restart should succeed");
    assert!(pool.is_running("acct-a"));

    pool.stop_worker("acct-a").await.unwrap();
}

#[tokio::test]
async fn stopping_an_unknown_account_reports_not_running() {
    let mut pool = PoolManager::new("/bin/true".into());
    let result = pool.stop_worker("nonexistent").await;
    assert!(matches!(result, Err(PoolError::NotRunning(account)) if account == "nonexistent"));
}

#[tokio::test]
async fn sending_a_command_to_an_exited_worker_eventually_fails_quietly() {
    // /bin/true exits immediately; stop_worker must still complete within
    // its grace period instead of hanging on a process that is already gone.
    let mut pool = PoolManager::new("/bin/true".into());
    pool.start_worker("acct-a", &profile("acct-a"), false).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    // The command may or may not reach a writer task racing the process
    // exit; either outcome is acceptable as long as it doesn't panic.
    let _ = pool.send("acct-a", InboundCommand::GetStatus);

    pool.stop_worker("acct-a").await.expect("stopping an already-exited process should still succeed");
}
