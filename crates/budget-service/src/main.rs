use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use budget_api::BudgetApi;
use budget_service::{app, ServiceState};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "budget-service")]
#[command(about = "Local HTTP service for the household budget tracker")]
struct Args {
    #[arg(long, env = "BUDGET_DB", default_value = "./household_budget.sqlite3")]
    db: PathBuf,
    #[arg(long, env = "BUDGET_BIND", default_value = "127.0.0.1:4010")]
    bind: SocketAddr,
    /// Create tables and seed the budget row before accepting requests.
    #[arg(long)]
    auto_migrate: bool,
    #[arg(long, env = "BUDGET_LOG", default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let api = BudgetApi::new(args.db.clone());
    if args.auto_migrate {
        let result = api.migrate()?;
        tracing::info!(
            schema_version = result.schema_version,
            budget_seeded = result.budget_seeded,
            "database migrated at startup"
        );
    }

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, db = %args.db.display(), "budget service listening");
    axum::serve(listener, app(ServiceState::new(api))).await?;
    Ok(())
}

