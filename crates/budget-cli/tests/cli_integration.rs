use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use budget_api::BudgetApi;
use budget_service::{app, ServiceState};
use jsonschema::JSONSchema;
use serde_json::Value;

/// Nothing listens on port 1, so every request fails fast at connect time.
const UNREACHABLE_API: &str = "http://127.0.0.1:1";

fn hb_command<I, S>(api: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(env!("CARGO_BIN_EXE_hb"));
    command.args(["--api", api, "--timeout-secs", "5"]).args(args).env_remove("BUDGET_API");
    command
}

fn run_hb_against<I, S>(api: &str, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    hb_command(api, args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute hb binary: {err}"))
}

fn run_hb<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_hb_against(UNREACHABLE_API, args)
}

fn parse_success(output: &Output) -> Value {
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "hb command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    parse_success(&run_hb(args))
}

fn run_json_against<I, S>(api: &str, args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    parse_success(&run_hb_against(api, args))
}

/// The real service router on an ephemeral port, backed by a fresh temp database.
struct LiveService {
    /// Serves the router until the fixture is dropped.
    _runtime: tokio::runtime::Runtime,
    base_url: String,
    db_path: PathBuf,
}

impl LiveService {
    fn start() -> Self {
        let db_path = std::env::temp_dir()
            .join(format!("household-budget-cli-{}.sqlite3", ulid::Ulid::new()));
        let runtime = tokio::runtime::Runtime::new()
            .unwrap_or_else(|err| panic!("failed to build tokio runtime: {err}"));
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap_or_else(|err| panic!("failed to bind ephemeral port: {err}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|err| panic!("listener has no local address: {err}"));

        let router = app(ServiceState::new(BudgetApi::new(db_path.clone())));
        runtime.spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { _runtime: runtime, base_url: format!("http://{addr}"), db_path }
    }

    fn url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for LiveService {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.db_path.clone().into_os_string();
            path.push(suffix);
            let _ = fs::remove_file(path);
        }
    }
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn read_json_file(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read JSON file {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("invalid JSON in {}: {err}", path.display()))
}

fn validate_schema(schema_file: &str, instance: &Value) {
    let schema_path = repo_root().join("contracts/v1/schemas").join(schema_file);
    let schema_json = read_json_file(&schema_path);
    let compiled = JSONSchema::compile(&schema_json)
        .unwrap_or_else(|err| panic!("failed to compile schema {}: {err}", schema_path.display()));

    let errors = compiled
        .validate(instance)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>());
    if let Some(errors) = errors {
        panic!("schema validation failed for {}:\n{}", schema_file, errors.join("\n"));
    }
}

fn table_rows(dashboard: &Value) -> &Vec<Value> {
    dashboard
        .get("table")
        .and_then(|table| table.get("rows"))
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing table.rows in payload: {dashboard}"))
}

fn summary_i64(dashboard: &Value, key: &str) -> i64 {
    dashboard
        .get("summary")
        .and_then(|summary| summary.get(key))
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer summary.{key} in payload: {dashboard}"))
}

#[test]
fn unreachable_api_renders_sample_dashboard() {
    let dashboard = run_json(["dashboard"]);

    assert_eq!(dashboard.get("contract_version").and_then(Value::as_str), Some("cli.v1"));
    assert_eq!(dashboard.get("data_source").and_then(Value::as_str), Some("sample"));
    assert_eq!(dashboard.get("phase").and_then(Value::as_str), Some("degraded"));
    assert!(dashboard.get("notice").and_then(Value::as_str).is_some());

    assert_eq!(summary_i64(&dashboard, "total_spent"), 83_000_000);
    assert_eq!(summary_i64(&dashboard, "remaining"), 617_000_000);
    assert_eq!(summary_i64(&dashboard, "transaction_count"), 4);

    let dates = table_rows(&dashboard)
        .iter()
        .filter_map(|row| row.get("date").and_then(Value::as_str))
        .collect::<Vec<_>>();
    assert_eq!(dates, vec!["10/2/2024", "5/2/2024", "20/1/2024", "15/1/2024"]);
}

#[test]
fn dashboard_filters_compose() {
    let construction = run_json(["dashboard", "--category", "construction"]);
    assert_eq!(table_rows(&construction).len(), 2);
    // Summary always covers every expense, not just the filtered rows.
    assert_eq!(summary_i64(&construction, "total_spent"), 83_000_000);

    let february = run_json(["dashboard", "--month", "2024-02"]);
    assert_eq!(table_rows(&february).len(), 2);

    let none = run_json(["dashboard", "--category", "construction", "--month", "2024-02"]);
    assert!(table_rows(&none).is_empty());
    assert!(none
        .get("table")
        .and_then(|table| table.get("placeholder"))
        .and_then(Value::as_str)
        .is_some());
}

#[test]
fn dashboard_text_output_flags_sample_data() {
    let output = run_hb(["--format", "text", "dashboard"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[sample data]"), "{stdout}");
    assert!(stdout.contains("83.000.000 ₫"), "{stdout}");
}

#[test]
fn mutating_commands_fail_without_backend() {
    let add = run_hb([
        "expense",
        "add",
        "--category",
        "interior",
        "--description",
        "Sofa",
        "--amount",
        "15000000",
        "--date",
        "2024-02-05",
    ]);
    assert!(!add.status.success());
    assert!(add.stdout.is_empty());

    let delete = run_hb(["expense", "delete", "01HZY0000000000000000000AB", "--yes"]);
    assert!(!delete.status.success());

    let health = run_hb(["health"]);
    assert!(!health.status.success());
    let stderr = String::from_utf8_lossy(&health.stderr);
    assert!(stderr.contains("health probe failed"), "{stderr}");
}

#[test]
fn invalid_arguments_are_rejected_before_any_request() {
    let bad_month = run_hb(["dashboard", "--month", "2024-13"]);
    assert_eq!(bad_month.status.code(), Some(2));

    let negative = run_hb([
        "expense",
        "add",
        "--category",
        "garden",
        "--description",
        "Hedge",
        "--amount=-5",
        "--date",
        "2024-02-05",
    ]);
    assert_eq!(negative.status.code(), Some(2));

    let bad_category = run_hb(["dashboard", "--category", "pool"]);
    assert_eq!(bad_category.status.code(), Some(2));
}

#[test]
fn cli_outputs_validate_against_versioned_schemas() {
    let unfiltered = run_json(["dashboard"]);
    validate_schema("dashboard.schema.json", &unfiltered);

    let filtered = run_json(["dashboard", "--category", "garden", "--month", "2024-01"]);
    validate_schema("dashboard.schema.json", &filtered);
}

fn row_ids(dashboard: &Value) -> Vec<String> {
    table_rows(dashboard)
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field {key} in payload: {value}"))
}

fn nested<'a>(value: &'a Value, key: &str) -> &'a Value {
    value.get(key).unwrap_or_else(|| panic!("missing field {key} in payload: {value}"))
}

fn run_delete_with_answer(api: &str, id: &str, answer: &str) -> Output {
    let mut child = hb_command(api, ["expense", "delete", id])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|err| panic!("failed to spawn hb binary: {err}"));
    match child.stdin.take() {
        Some(mut stdin) => stdin
            .write_all(answer.as_bytes())
            .unwrap_or_else(|err| panic!("failed to answer confirmation prompt: {err}")),
        None => panic!("hb stdin was not piped"),
    }
    child.wait_with_output().unwrap_or_else(|err| panic!("failed to wait for hb binary: {err}"))
}

#[test]
fn live_service_migrates_and_renders_empty_dashboard() {
    let service = LiveService::start();

    let migrated = run_json_against(service.url(), ["migrate"]);
    assert_eq!(str_field(&migrated, "message"), "Database migrated successfully");
    assert_eq!(migrated.get("budget_seeded").and_then(Value::as_bool), Some(true));
    assert_eq!(migrated.get("schema_version").and_then(Value::as_i64), Some(1));

    let again = run_json_against(service.url(), ["migrate"]);
    assert_eq!(again.get("budget_seeded").and_then(Value::as_bool), Some(false));

    let health = run_json_against(service.url(), ["health"]);
    assert_eq!(str_field(&health, "status"), "ok");

    let dashboard = run_json_against(service.url(), ["dashboard"]);
    validate_schema("dashboard.schema.json", &dashboard);
    assert_eq!(str_field(&dashboard, "data_source"), "live");
    assert_eq!(str_field(&dashboard, "phase"), "rendered");
    assert_eq!(dashboard.get("notice"), Some(&Value::Null));
    assert!(table_rows(&dashboard).is_empty());
    assert_eq!(summary_i64(&dashboard, "total_spent"), 0);
    assert_eq!(summary_i64(&dashboard, "remaining"), 700_000_000);
}

#[test]
fn live_service_add_then_delete_refreshes_the_dashboard() {
    let service = LiveService::start();
    run_json_against(service.url(), ["migrate"]);

    let added = run_json_against(
        service.url(),
        [
            "expense",
            "add",
            "--category",
            "interior",
            "--description",
            "Sofa",
            "--amount",
            "15000000",
            "--date",
            "2024-02-05",
            "--notes",
            "3 seats",
        ],
    );
    let created = nested(&added, "created");
    assert_eq!(created.get("success").and_then(Value::as_bool), Some(true));
    assert_eq!(str_field(created, "message"), "Expense added successfully");
    assert_eq!(str_field(created, "category"), "interior");
    assert_eq!(str_field(created, "date"), "2024-02-05");
    let id = str_field(created, "id").to_string();

    let after_add = nested(&added, "dashboard");
    assert_eq!(row_ids(after_add), vec![id.clone()]);
    assert_eq!(summary_i64(after_add, "total_spent"), 15_000_000);
    assert_eq!(summary_i64(after_add, "transaction_count"), 1);

    let listed = run_json_against(service.url(), ["dashboard", "--category", "interior"]);
    validate_schema("dashboard.schema.json", &listed);
    assert_eq!(row_ids(&listed), vec![id.clone()]);
    let row = &table_rows(&listed)[0];
    assert_eq!(str_field(row, "date"), "5/2/2024");
    assert_eq!(str_field(row, "amount_display"), "15.000.000 ₫");
    assert_eq!(str_field(row, "notes"), "3 seats");

    let deleted = run_json_against(service.url(), ["expense", "delete", &id, "--yes"]);
    assert_eq!(deleted.get("deleted").and_then(Value::as_bool), Some(true));
    assert_eq!(str_field(nested(&deleted, "deletedExpense"), "id"), id);
    let after_delete = nested(&deleted, "dashboard");
    assert!(row_ids(after_delete).is_empty());
    assert_eq!(summary_i64(after_delete, "total_spent"), 0);

    let dashboard = run_json_against(service.url(), ["dashboard"]);
    assert!(!row_ids(&dashboard).contains(&id));

    let repeat = run_hb_against(service.url(), ["expense", "delete", &id, "--yes"]);
    assert!(!repeat.status.success());
    let stderr = String::from_utf8_lossy(&repeat.stderr);
    assert!(stderr.contains("Expense not found"), "{stderr}");
}

#[test]
fn live_service_declined_confirmation_keeps_the_expense() {
    let service = LiveService::start();
    run_json_against(service.url(), ["migrate"]);

    let added = run_json_against(
        service.url(),
        [
            "expense",
            "add",
            "--category",
            "garden",
            "--description",
            "Hedge",
            "--amount",
            "500000",
            "--date",
            "2024-03-01",
        ],
    );
    let id = str_field(nested(&added, "created"), "id").to_string();

    let declined = parse_success(&run_delete_with_answer(service.url(), &id, "n\n"));
    assert_eq!(declined.get("deleted").and_then(Value::as_bool), Some(false));
    assert_eq!(str_field(&declined, "id"), id);

    let dashboard = run_json_against(service.url(), ["dashboard"]);
    assert_eq!(row_ids(&dashboard), vec![id.clone()]);

    let confirmed = parse_success(&run_delete_with_answer(service.url(), &id, "y\n"));
    assert_eq!(confirmed.get("deleted").and_then(Value::as_bool), Some(true));
    assert!(row_ids(&run_json_against(service.url(), ["dashboard"])).is_empty());
}

#[test]
fn live_service_budget_set_updates_remaining_and_allocations() {
    let service = LiveService::start();
    run_json_against(service.url(), ["migrate"]);
    run_json_against(
        service.url(),
        [
            "expense",
            "add",
            "--category",
            "construction",
            "--description",
            "Foundation",
            "--amount",
            "50000000",
            "--date",
            "2024-01-15",
        ],
    );

    let updated = run_json_against(
        service.url(),
        [
            "budget",
            "set",
            "--total",
            "100000000",
            "--construction",
            "50000000",
            "--interior",
            "20000000",
            "--garden",
            "20000000",
            "--other",
            "10000000",
        ],
    );
    assert_eq!(updated.get("success").and_then(Value::as_bool), Some(true));
    assert_eq!(str_field(&updated, "message"), "Budget updated successfully");
    assert_eq!(
        nested(&updated, "budget").get("total").and_then(Value::as_i64),
        Some(100_000_000)
    );

    let dashboard = nested(&updated, "dashboard");
    assert_eq!(summary_i64(dashboard, "remaining"), 50_000_000);
    let construction = dashboard
        .get("categories")
        .and_then(Value::as_array)
        .and_then(|categories| categories.first())
        .unwrap_or_else(|| panic!("missing categories in payload: {dashboard}"));
    assert_eq!(construction.get("percentage").and_then(Value::as_f64), Some(100.0));
    assert_eq!(construction.get("warning").and_then(Value::as_bool), Some(true));

    let shown = run_json_against(service.url(), ["budget", "show"]);
    assert_eq!(shown.get("construction").and_then(Value::as_i64), Some(50_000_000));
    assert_eq!(shown.get("other").and_then(Value::as_i64), Some(10_000_000));
}
