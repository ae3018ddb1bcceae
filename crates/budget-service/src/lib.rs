use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Extension, Json, Router};
use budget_api::{ApiError, BudgetApi, API_CONTRACT_VERSION};
use budget_core::{Budget, Category, DashboardState, ExpenseFilter, NewExpense, YearMonth};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

mod dashboard;

const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");
const REQUEST_ID_HEADER: &str = "x-request-id";
const CORS_ALLOW_METHODS: &str = "GET,OPTIONS,PATCH,DELETE,POST,PUT";
const CORS_ALLOW_HEADERS: &str = "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, \
Content-Length, Content-MD5, Content-Type, Date, X-Api-Version";

#[derive(Debug, Clone)]
pub struct ServiceState {
    api: BudgetApi,
}

impl ServiceState {
    #[must_use]
    pub fn new(api: BudgetApi) -> Self {
        Self { api }
    }
}

/// Per-request correlation id, attached by [`request_context`].
#[derive(Debug, Clone)]
struct RequestId(String);

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Debug, Clone)]
struct ServiceError {
    status: StatusCode,
    body: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    contract_version: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct DeleteParams {
    id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PageParams {
    category: Option<String>,
    month: Option<String>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                success: false,
                error: message.into(),
                field: None,
                request_id: None,
            },
        }
    }

    fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    fn internal(request_id: &RequestId, message: &str) -> Self {
        let mut error = Self::new(StatusCode::INTERNAL_SERVER_ERROR, message);
        error.body.request_id = Some(request_id.0.clone());
        error
    }

    fn invalid_json(rejection: &JsonRejection) -> Self {
        tracing::warn!(reason = %rejection.body_text(), "rejected unreadable request body");
        Self::new(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", rejection.body_text()))
    }

    fn from_api(err: ApiError, request_id: &RequestId) -> Self {
        match err {
            ApiError::Validation(err) => {
                tracing::warn!(field = err.field(), reason = %err, "rejected invalid request body");
                let mut error = Self::new(StatusCode::BAD_REQUEST, err.to_string());
                error.body.field = err.field();
                error
            }
            ApiError::MissingId => {
                tracing::warn!("delete requested without an expense id");
                Self::new(StatusCode::BAD_REQUEST, "Missing expense id")
            }
            ApiError::NotFound(id) => {
                tracing::warn!(expense_id = %id, "expense not found");
                Self::new(StatusCode::NOT_FOUND, "Expense not found")
            }
            ApiError::Store(err) => {
                let detail = format!("{err:#}");
                tracing::error!(error = %detail, "store operation failed");
                Self::internal(request_id, "Internal server error")
            }
        }
    }
}

impl PageParams {
    fn filter(&self) -> Result<ExpenseFilter, budget_core::ParseError> {
        let category = match non_empty(self.category.as_deref()) {
            Some(raw) => Some(Category::from_str(raw)?),
            None => None,
        };
        let month = match non_empty(self.month.as_deref()) {
            Some(raw) => Some(YearMonth::from_str(raw)?),
            None => None,
        };
        Ok(ExpenseFilter { category, month })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// The full service router: JSON API under `/api` plus the HTML dashboard at `/`.
#[must_use]
pub fn app(state: ServiceState) -> Router {
    let api_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/openapi", get(openapi))
        .route("/api/schema", get(schema_status))
        .route("/api/migrate", any(migrate))
        .route("/api/budget", get(budget_show).put(budget_replace).fallback(method_not_allowed))
        .route(
            "/api/expenses",
            get(expenses_list)
                .post(expense_create)
                .delete(expense_delete)
                .fallback(method_not_allowed),
        )
        .layer(middleware::from_fn(cors));

    Router::new()
        .route("/", get(dashboard_page))
        .merge(api_routes)
        .layer(middleware::from_fn(request_context))
        .with_state(state)
}

async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(ulid::Ulid::new().to_string());
    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id.0,
    );
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| {
        tracing::debug!(status = response.status().as_u16(), "request completed");
    });
    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    apply_cors_headers(response.headers_mut());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

async fn method_not_allowed() -> ServiceError {
    ServiceError::method_not_allowed()
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", contract_version: API_CONTRACT_VERSION })
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn schema_status(
    State(state): State<ServiceState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<budget_store_sqlite::SchemaStatus>, ServiceError> {
    let status = state.api.schema_status().map_err(|err| ServiceError::from_api(err, &request_id))?;
    Ok(Json(status))
}

async fn migrate(
    State(state): State<ServiceState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<budget_api::MigrateResult>, ServiceError> {
    match state.api.migrate() {
        Ok(result) => {
            tracing::info!(
                schema_version = result.schema_version,
                budget_seeded = result.budget_seeded,
                "database migrated"
            );
            Ok(Json(result))
        }
        Err(err) => {
            let detail = format!("{err:#}");
            tracing::error!(error = %detail, "migration failed");
            Err(ServiceError::internal(&request_id, "Migration failed"))
        }
    }
}

async fn budget_show(
    State(state): State<ServiceState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Budget>, ServiceError> {
    let budget = state.api.budget().map_err(|err| ServiceError::from_api(err, &request_id))?;
    Ok(Json(budget))
}

async fn budget_replace(
    State(state): State<ServiceState>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<budget_api::BudgetUpdated>, ServiceError> {
    let Json(body) = body.map_err(|rejection| ServiceError::invalid_json(&rejection))?;
    let budget = Budget::from_json(&body)
        .map_err(|err| ServiceError::from_api(err.into(), &request_id))?;
    let updated =
        state.api.replace_budget(budget).map_err(|err| ServiceError::from_api(err, &request_id))?;
    tracing::info!(total = budget.total, "budget replaced");
    Ok(Json(updated))
}

async fn expenses_list(
    State(state): State<ServiceState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<budget_core::Expense>>, ServiceError> {
    let expenses =
        state.api.list_expenses().map_err(|err| ServiceError::from_api(err, &request_id))?;
    Ok(Json(expenses))
}

async fn expense_create(
    State(state): State<ServiceState>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<budget_api::CreatedExpense>), ServiceError> {
    let Json(body) = body.map_err(|rejection| ServiceError::invalid_json(&rejection))?;
    let input = NewExpense::from_json(&body)
        .map_err(|err| ServiceError::from_api(err.into(), &request_id))?;
    let created =
        state.api.create_expense(input).map_err(|err| ServiceError::from_api(err, &request_id))?;
    tracing::info!(
        expense_id = %created.expense.id,
        category = created.expense.category.as_str(),
        amount = created.expense.amount,
        "expense created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn expense_delete(
    State(state): State<ServiceState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<budget_api::DeletedExpense>, ServiceError> {
    let deleted = state
        .api
        .delete_expense(params.id.as_deref())
        .map_err(|err| ServiceError::from_api(err, &request_id))?;
    tracing::info!(expense_id = %deleted.deleted_expense.id, "expense deleted");
    Ok(Json(deleted))
}

async fn dashboard_page(
    State(state): State<ServiceState>,
    Query(params): Query<PageParams>,
) -> Response {
    let filter = match params.filter() {
        Ok(filter) => filter,
        Err(err) => {
            tracing::warn!(reason = %err, "rejected dashboard filter");
            return (StatusCode::BAD_REQUEST, Html(dashboard::render_error(&err.to_string())))
                .into_response();
        }
    };

    let view = load_dashboard(&state.api).render(&filter);
    Html(dashboard::render_page(&view)).into_response()
}

fn load_dashboard(api: &BudgetApi) -> DashboardState {
    let mut dashboard = DashboardState::new();
    dashboard.begin_loading();
    match api.list_expenses() {
        Ok(expenses) => {
            let budget = api.budget().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "budget unavailable; using defaults");
                Budget::default()
            });
            dashboard.load_live(expenses, budget);
        }
        Err(err) => {
            tracing::warn!(error = %err, "expenses unavailable; rendering sample data");
            dashboard.load_sample();
        }
    }
    dashboard
}
