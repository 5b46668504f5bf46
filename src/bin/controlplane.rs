//! `controlplane`: a thin CLI client for the Pool Manager's control API
//! (SPEC_FULL.md §A.5) — an operator convenience, not part of the core
//! engine. Talks plain HTTP/JSON to whatever `--server` is serving.

use clap::{Parser, Subcommand};
use multifx::application::ipc::{AutoTradingReport, StatusReport};
use reqwest::Client;

#[derive(Parser)]
#[command(author, version, about = "multifx control-plane CLI", long_about = None)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start trading on every running account.
    StartAll,
    /// Stop trading on every running account.
    StopAll,
    /// Start trading on one account.
    Start { account_id: String },
    /// Stop trading on one account.
    Stop { account_id: String },
    /// Disconnect (stop) the worker for one account.
    Disconnect { account_id: String },
    /// Fetch an account's status report.
    Status { account_id: String },
    /// Fetch whether the broker terminal's auto-trading is enabled.
    Autotrading { account_id: String },
    /// Enable an instrument for an account.
    EnableInstrument { account_id: String, symbol: String },
    /// Disable an instrument for an account.
    DisableInstrument {
        account_id: String,
        symbol: String,
        #[arg(long)]
        close_positions: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = Client::new();

    match args.command {
        Command::StartAll => {
            client.post(format!("{}/trading/start", args.server)).send().await?.error_for_status()?;
            println!("trading started on all accounts");
        }
        Command::StopAll => {
            client.post(format!("{}/trading/stop", args.server)).send().await?.error_for_status()?;
            println!("trading stopped on all accounts");
        }
        Command::Start { account_id } => {
            client.post(format!("{}/accounts/{account_id}/start", args.server)).send().await?.error_for_status()?;
            println!("trading started on {account_id}");
        }
        Command::Stop { account_id } => {
            client.post(format!("{}/accounts/{account_id}/stop", args.server)).send().await?.error_for_status()?;
            println!("trading stopped on {account_id}");
        }
        Command::Disconnect { account_id } => {
            client
                .post(format!("{}/accounts/{account_id}/disconnect", args.server))
                .send()
                .await?
                .error_for_status()?;
            println!("worker for {account_id} disconnected");
        }
        Command::Status { account_id } => {
            let report: StatusReport = client
                .get(format!("{}/accounts/{account_id}/status", args.server))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            println!("{report:#?}");
        }
        Command::Autotrading { account_id } => {
            let report: AutoTradingReport = client
                .get(format!("{}/accounts/{account_id}/autotrading", args.server))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            println!("{report:#?}");
        }
        Command::EnableInstrument { account_id, symbol } => {
            client
                .post(format!("{}/accounts/{account_id}/instruments/{symbol}/enable", args.server))
                .send()
                .await?
                .error_for_status()?;
            println!("{symbol} enabled on {account_id}");
        }
        Command::DisableInstrument { account_id, symbol, close_positions } => {
            client
                .post(format!("{}/accounts/{account_id}/instruments/{symbol}/disable", args.server))
                .query(&[("close_positions", close_positions.to_string())])
                .send()
                .await?
                .error_for_status()?;
            println!("{symbol} disabled on {account_id}");
        }
    }

    Ok(())
}
