//! Worker process entrypoint (spec.md §4.10). One process per account: the
//! Pool Manager spawns this binary with `--account-id`/`--profile` and talks
//! to it over stdin/stdout using the protocol in `application::ipc`.

use clap::Parser;
use multifx::application::worker::{self, WorkerContext};
use multifx::config::model::AccountProfile;
use multifx::domain::fx_ports::{PersistenceGateway, Predictor, SentimentSource};
use multifx::infrastructure::broker::MockBrokerSession;
use multifx::infrastructure::ml::SmartCorePredictor;
use multifx::infrastructure::persistence::{Database, SqlitePersistenceGateway};
use multifx::infrastructure::sentiment::RssVaderSentimentSource;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "multifx worker process", long_about = None)]
struct Args {
    #[arg(long)]
    account_id: String,

    /// JSON-encoded, already-resolved `AccountProfile`.
    #[arg(long)]
    profile: String,

    #[arg(long, default_value = "sqlite://data/multifx.db")]
    database_url: String,

    #[arg(long, default_value = "https://news.google.com/rss/search?q={query}")]
    sentiment_feed_url: String,

    #[arg(long)]
    ml_model_path: Option<std::path::PathBuf>,

    #[arg(long, default_value_t = 10_000.0)]
    starting_balance: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    let account: AccountProfile = serde_json::from_str(&args.profile)?;

    info!(account_id = %args.account_id, "worker starting");

    let database = Database::new(&args.database_url).await?;
    let persistence = SqlitePersistenceGateway::new(database.pool.clone());

    let broker = MockBrokerSession::new(args.starting_balance);

    let predictor = if account.execution.use_ml {
        args.ml_model_path.map(SmartCorePredictor::load)
    } else {
        None
    };
    let predictor: Option<&dyn Predictor> = predictor.as_ref().map(|p| p as &dyn Predictor);

    let sentiment = if account.execution.use_sentiment {
        Some(RssVaderSentimentSource::new(args.sentiment_feed_url.clone()))
    } else {
        None
    };
    let sentiment: Option<&dyn SentimentSource> = sentiment.as_ref().map(|s| s as &dyn SentimentSource);
    let persistence_ref: &dyn PersistenceGateway = &persistence;

    let ctx = WorkerContext {
        account_id: args.account_id.clone(),
        account,
        broker: &broker,
        predictor,
        sentiment,
        persistence: persistence_ref,
    };

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    worker::run(ctx, stdin, stdout).await;

    info!(account_id = %args.account_id, "worker exiting");
    Ok(())
}
