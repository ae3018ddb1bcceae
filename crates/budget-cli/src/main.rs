use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use budget_core::{
    parse_date, Budget, Category, Dashboard, DashboardState, ExpenseFilter, NewExpense, YearMonth,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use time::Date;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod client;
mod text;

use client::ApiClient;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "hb")]
#[command(about = "Household budget CLI")]
struct Cli {
    #[arg(long, global = true, env = "BUDGET_API", default_value = "http://127.0.0.1:4010")]
    api: String,

    #[arg(long, global = true, default_value_t = 10)]
    timeout_secs: u64,

    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summary, category progress and the filtered expense table.
    Dashboard(DashboardArgs),
    Expense {
        #[command(subcommand)]
        command: ExpenseCommand,
    },
    Budget {
        #[command(subcommand)]
        command: BudgetCommand,
    },
    /// Create tables and seed the default budget on the server.
    Migrate,
    Health,
}

#[derive(Debug, Subcommand)]
enum ExpenseCommand {
    List,
    Add(ExpenseAddArgs),
    Delete(ExpenseDeleteArgs),
}

#[derive(Debug, Subcommand)]
enum BudgetCommand {
    Show,
    Set(BudgetSetArgs),
}

#[derive(Debug, Args)]
struct DashboardArgs {
    #[arg(long, value_enum)]
    category: Option<CategoryArg>,
    /// Year and month, e.g. 2024-02.
    #[arg(long, value_parser = parse_month_arg)]
    month: Option<YearMonth>,
}

#[derive(Debug, Args)]
struct ExpenseAddArgs {
    #[arg(long, value_enum)]
    category: CategoryArg,
    #[arg(long)]
    description: String,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    amount: i64,
    /// Calendar date, YYYY-MM-DD.
    #[arg(long, value_parser = parse_date_arg)]
    date: Date,
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Debug, Args)]
struct ExpenseDeleteArgs {
    id: String,
    /// Skip the confirmation prompt.
    #[arg(long, default_value_t = false)]
    yes: bool,
}

#[derive(Debug, Args)]
struct BudgetSetArgs {
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    total: i64,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    construction: i64,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    interior: i64,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    garden: i64,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    other: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CategoryArg {
    Construction,
    Interior,
    Garden,
    Other,
}

impl From<CategoryArg> for Category {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Construction => Self::Construction,
            CategoryArg::Interior => Self::Interior,
            CategoryArg::Garden => Self::Garden,
            CategoryArg::Other => Self::Other,
        }
    }
}

fn parse_month_arg(raw: &str) -> Result<YearMonth, String> {
    raw.parse::<YearMonth>().map_err(|err| err.to_string())
}

fn parse_date_arg(raw: &str) -> Result<Date, String> {
    parse_date(raw).ok_or_else(|| format!("invalid date `{raw}`; expected YYYY-MM-DD"))
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let client = ApiClient::new(&cli.api, Duration::from_secs(cli.timeout_secs));
    let format = cli.format;
    match cli.command {
        Command::Dashboard(args) => run_dashboard(&client, format, &args),
        Command::Expense { command } => run_expense(&client, format, command),
        Command::Budget { command } => run_budget(&client, format, command),
        Command::Migrate => run_migrate(&client, format),
        Command::Health => run_health(&client, format),
    }
}

/// Health probe first, then expenses; either failure switches to sample data.
fn load_dashboard(client: &ApiClient) -> DashboardState {
    let mut state = DashboardState::new();
    state.begin_loading();
    match client.health().and_then(|()| client.expenses()) {
        Ok(expenses) => state.load_live(expenses, budget_or_default(client)),
        Err(err) => {
            tracing::warn!(
                api = client.base_url(),
                error = %err,
                "backend unavailable; using sample data"
            );
            state.load_sample();
        }
    }
    state
}

/// Live state for mutating flows, which never fall back to sample data.
fn load_live(client: &ApiClient) -> Result<DashboardState> {
    let mut state = DashboardState::new();
    state.begin_loading();
    let expenses = client.expenses()?;
    state.load_live(expenses, budget_or_default(client));
    Ok(state)
}

fn budget_or_default(client: &ApiClient) -> Budget {
    client.budget().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "budget unavailable; using defaults");
        Budget::default()
    })
}

fn run_dashboard(client: &ApiClient, format: OutputFormat, args: &DashboardArgs) -> Result<()> {
    let filter = ExpenseFilter { category: args.category.map(Category::from), month: args.month };
    let dashboard = load_dashboard(client).render(&filter);
    emit_dashboard(format, &dashboard, None)
}

fn emit_dashboard(
    format: OutputFormat,
    dashboard: &Dashboard,
    headline: Option<String>,
) -> Result<()> {
    match format {
        OutputFormat::Json => emit_json(serde_json::to_value(dashboard)?),
        OutputFormat::Text => {
            if let Some(headline) = headline {
                println!("{headline}");
            }
            println!("{}", text::render_dashboard(dashboard));
            Ok(())
        }
    }
}

fn run_expense(client: &ApiClient, format: OutputFormat, command: ExpenseCommand) -> Result<()> {
    match command {
        ExpenseCommand::List => {
            let state = load_live(client)?;
            match format {
                OutputFormat::Json => emit_json(json!({ "expenses": state.expenses() })),
                OutputFormat::Text => {
                    let table = state.render(&ExpenseFilter::default()).table;
                    println!("{}", text::render_table(&table));
                    Ok(())
                }
            }
        }
        ExpenseCommand::Add(args) => run_expense_add(client, format, args),
        ExpenseCommand::Delete(args) => run_expense_delete(client, format, &args),
    }
}

fn run_expense_add(client: &ApiClient, format: OutputFormat, args: ExpenseAddArgs) -> Result<()> {
    let input = NewExpense {
        category: args.category.into(),
        description: args.description,
        amount: args.amount,
        date: args.date,
        notes: args.notes,
    };
    if input.description.trim().is_empty() {
        return Err(anyhow!("description must not be empty"));
    }

    let mut state = load_live(client)?;
    let created = client.create_expense(&input).context("failed to add expense")?;
    tracing::info!(expense_id = %created.expense.id, "expense added");
    state.replace_expenses(client.expenses()?);
    let dashboard = state.render(&ExpenseFilter::default());

    match format {
        OutputFormat::Json => emit_json(json!({
            "created": created,
            "dashboard": dashboard
        })),
        OutputFormat::Text => {
            let headline = format!("Added expense {}", created.expense.id);
            emit_dashboard(format, &dashboard, Some(headline))
        }
    }
}

fn run_expense_delete(
    client: &ApiClient,
    format: OutputFormat,
    args: &ExpenseDeleteArgs,
) -> Result<()> {
    if !args.yes && !confirm(&format!("Delete expense {}?", args.id))? {
        return match format {
            OutputFormat::Json => emit_json(json!({ "deleted": false, "id": args.id })),
            OutputFormat::Text => {
                println!("Cancelled");
                Ok(())
            }
        };
    }

    let mut state = load_live(client)?;
    let deleted = client.delete_expense(&args.id).context("failed to delete expense")?;
    tracing::info!(expense_id = %args.id, "expense deleted");
    state.replace_expenses(client.expenses()?);
    let dashboard = state.render(&ExpenseFilter::default());

    match format {
        OutputFormat::Json => emit_json(json!({
            "deleted": true,
            "id": args.id,
            "deletedExpense": deleted.deleted_expense,
            "dashboard": dashboard
        })),
        OutputFormat::Text => {
            emit_dashboard(format, &dashboard, Some(format!("Deleted expense {}", args.id)))
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt} [y/N] ")?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer).context("failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

fn run_budget(client: &ApiClient, format: OutputFormat, command: BudgetCommand) -> Result<()> {
    match command {
        BudgetCommand::Show => {
            let budget = client.budget()?;
            match format {
                OutputFormat::Json => emit_json(serde_json::to_value(budget)?),
                OutputFormat::Text => {
                    println!("{}", text::render_budget(&budget));
                    Ok(())
                }
            }
        }
        BudgetCommand::Set(args) => {
            let budget = Budget {
                total: args.total,
                construction: args.construction,
                interior: args.interior,
                garden: args.garden,
                other: args.other,
            };
            let mut state = load_live(client)?;
            let updated = client.replace_budget(&budget).context("failed to update budget")?;
            state.set_budget(client.budget()?);
            let dashboard = state.render(&ExpenseFilter::default());
            match format {
                OutputFormat::Json => emit_json(json!({
                    "success": updated.success,
                    "message": updated.message,
                    "budget": dashboard.budget,
                    "dashboard": dashboard
                })),
                OutputFormat::Text => emit_dashboard(format, &dashboard, Some(updated.message)),
            }
        }
    }
}

fn run_migrate(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.migrate().context("migration request failed")?;
    match format {
        OutputFormat::Json => emit_json(serde_json::to_value(result)?),
        OutputFormat::Text => {
            println!(
                "{} (schema v{}, tables: {}, budget seeded: {})",
                result.message,
                result.schema_version,
                result.tables.join(", "),
                result.budget_seeded
            );
            Ok(())
        }
    }
}

fn run_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    client.health().context("health probe failed")?;
    match format {
        OutputFormat::Json => emit_json(json!({ "status": "ok", "api": client.base_url() })),
        OutputFormat::Text => {
            println!("ok ({})", client.base_url());
            Ok(())
        }
    }
}
