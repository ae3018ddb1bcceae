use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use budget_api::{
    BudgetUpdated, CreatedExpense, DeletedExpense, MigrateResult, API_CONTRACT_VERSION,
};
use budget_core::{Budget, Expense, NewExpense};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Blocking HTTP client for the budget service.
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn health(&self) -> Result<()> {
        let body: Value = self.get("/api/health")?;
        check_health(&body)
    }

    pub fn expenses(&self) -> Result<Vec<Expense>> {
        self.get("/api/expenses")
    }

    pub fn budget(&self) -> Result<Budget> {
        self.get("/api/budget")
    }

    pub fn replace_budget(&self, budget: &Budget) -> Result<BudgetUpdated> {
        let response = self
            .agent
            .put(&self.url("/api/budget"))
            .send_json(budget)
            .map_err(request_error)?;
        decode(response)
    }

    pub fn create_expense(&self, input: &NewExpense) -> Result<CreatedExpense> {
        let response = self
            .agent
            .post(&self.url("/api/expenses"))
            .send_json(input)
            .map_err(request_error)?;
        decode(response)
    }

    pub fn delete_expense(&self, id: &str) -> Result<DeletedExpense> {
        let response = self
            .agent
            .delete(&self.url("/api/expenses"))
            .query("id", id)
            .call()
            .map_err(request_error)?;
        decode(response)
    }

    pub fn migrate(&self) -> Result<MigrateResult> {
        let response =
            self.agent.post(&self.url("/api/migrate")).call().map_err(request_error)?;
        decode(response)
    }

    fn get<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(path, "GET");
        let response = self.agent.get(&self.url(path)).call().map_err(request_error)?;
        decode(response)
    }
}

fn decode<T>(response: ureq::Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let url = response.get_url().to_string();
    response.into_json::<T>().with_context(|| format!("failed to decode response from {url}"))
}

/// Collapse transport and status failures into one error carrying the server's message.
fn request_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let message = response
                .into_json::<Value>()
                .ok()
                .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());
            anyhow!("API returned {code}: {message}")
        }
        ureq::Error::Transport(transport) => anyhow!("API unreachable: {transport}"),
    }
}

/// The service must be up and speak the API contract this client was built against.
fn check_health(body: &Value) -> Result<()> {
    if body.get("status").and_then(Value::as_str) != Some("ok") {
        return Err(anyhow!("unexpected health response: {body}"));
    }
    match body.get("contract_version").and_then(Value::as_str) {
        Some(API_CONTRACT_VERSION) => Ok(()),
        Some(other) => Err(anyhow!(
            "API contract mismatch: service speaks {other}, client expects {API_CONTRACT_VERSION}"
        )),
        None => Err(anyhow!("health response has no contract_version: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = ApiClient::new("http://127.0.0.1:4010/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://127.0.0.1:4010");
        assert_eq!(client.url("/api/health"), "http://127.0.0.1:4010/api/health");
    }

    #[test]
    fn health_requires_matching_contract_version() {
        assert!(check_health(&json!({ "status": "ok", "contract_version": "api.v1" })).is_ok());

        match check_health(&json!({ "status": "ok", "contract_version": "api.v2" })) {
            Ok(()) => panic!("contract mismatch was accepted"),
            Err(err) => assert!(err.to_string().contains("contract mismatch"), "{err}"),
        }
        assert!(check_health(&json!({ "status": "ok" })).is_err());
        assert!(check_health(&json!({ "status": "down", "contract_version": "api.v1" })).is_err());
    }

    #[test]
    fn unreachable_api_reports_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(1));
        match client.health() {
            Ok(()) => panic!("health probe unexpectedly succeeded"),
            Err(err) => assert!(err.to_string().starts_with("API unreachable"), "{err}"),
        }
    }
}
