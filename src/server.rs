use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderName, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::domain::{GramFilter, TaxonId};
use crate::entrez::EntrezHttpClient;
use crate::error::ApiError;
use crate::gbif::GbifHttpClient;
use crate::wiki::WikiHttpClient;

/// Search and legacy-lookup responses are cached briefly; enriched detail
/// records change rarely and cache for a day.
const CACHE_SEARCH_SECS: u32 = 3600;
const CACHE_DETAIL_SECS: u32 = 86400;

pub type GatewayApp = App<EntrezHttpClient, WikiHttpClient, GbifHttpClient>;
type SharedApp = Arc<GatewayApp>;

pub fn router(app: SharedApp) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/detail", get(detail))
        .route("/details", post(batch_details))
        .route("/suggest_scientific_name", get(suggest_scientific_name))
        .route("/", any(legacy_lookup))
        .fallback(legacy_lookup)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(app)
}

pub async fn serve(app: SharedApp, addr: SocketAddr) -> Result<(), ApiError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Server(format!("failed to bind {addr}: {err}")))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ApiError::Server(err.to_string()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(Duration::from_secs(3600))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    name: Option<String>,
    gram_filter: Option<String>,
}

async fn search(State(app): State<SharedApp>, Query(params): Query<SearchParams>) -> Response {
    let name = match required_param(params.name, "name") {
        Ok(name) => name,
        Err(response) => return response,
    };
    let filter = match params
        .gram_filter
        .as_deref()
        .unwrap_or("any")
        .parse::<GramFilter>()
    {
        Ok(filter) => filter,
        Err(err) => return error_response(&err),
    };

    match run_blocking(move || app.search(&name, filter)).await {
        Ok(results) => cached_json(CACHE_SEARCH_SECS, &results),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
struct DetailParams {
    tax_id: Option<String>,
}

async fn detail(State(app): State<SharedApp>, Query(params): Query<DetailParams>) -> Response {
    let raw = match required_param(params.tax_id, "tax_id") {
        Ok(raw) => raw,
        Err(response) => return response,
    };
    let tax_id: TaxonId = match raw.parse() {
        Ok(tax_id) => tax_id,
        Err(err) => return error_response(&err),
    };

    match run_blocking(move || app.fetch_detail(&tax_id)).await {
        Ok(detail) => cached_json(CACHE_DETAIL_SECS, &detail),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    #[serde(default)]
    tax_ids: Vec<String>,
}

async fn batch_details(
    State(app): State<SharedApp>,
    body: Result<Json<BatchBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(&ApiError::InvalidRequest(format!(
                "request body must be JSON with a 'tax_ids' list: {rejection}"
            )));
        }
    };

    match run_blocking(move || app.batch_details(&body.tax_ids)).await {
        Ok(batch) => cached_json(CACHE_DETAIL_SECS, &batch),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
struct SuggestParams {
    common_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SuggestionResponse {
    suggested_scientific_name: String,
    common_name_searched: String,
}

async fn suggest_scientific_name(
    State(app): State<SharedApp>,
    Query(params): Query<SuggestParams>,
) -> Response {
    let common_name = match required_param(params.common_name, "common_name") {
        Ok(name) => name,
        Err(response) => return response,
    };

    let searched = common_name.clone();
    match run_blocking(move || app.suggest_scientific_name(&common_name)).await {
        Ok(Some(suggested)) => cached_json(
            CACHE_SEARCH_SECS,
            &SuggestionResponse {
                suggested_scientific_name: suggested,
                common_name_searched: searched,
            },
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("no scientific name suggestion found for {searched:?}")
            })),
        )
            .into_response(),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
struct LegacyBody {
    name: Option<String>,
}

/// Combined GBIF + encyclopedia lookup kept for existing clients; also the
/// fallback for unmatched paths. GET takes `name` from the query string,
/// POST from a JSON body.
async fn legacy_lookup(
    State(app): State<SharedApp>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let name = match method {
        Method::GET => params.get("name").cloned(),
        Method::POST => match serde_json::from_slice::<LegacyBody>(&body) {
            Ok(parsed) => parsed.name,
            Err(err) => {
                return error_response(&ApiError::InvalidRequest(format!(
                    "request body must be JSON: {err}"
                )));
            }
        },
        _ => {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({"error": "only GET and POST are supported"})),
            )
                .into_response();
        }
    };
    let name = match required_param(name.filter(|n| !n.trim().is_empty()), "name") {
        Ok(name) => name,
        Err(response) => return response,
    };

    let searched = name.clone();
    match run_blocking(move || Ok(app.lookup(&name))).await {
        Ok(result) => {
            if result.found_anything() {
                cached_json(CACHE_SEARCH_SECS, &result)
            } else {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({
                        "error": format!("no information found for name {searched:?}")
                    })),
                )
                    .into_response()
            }
        }
        Err(response) => response,
    }
}

fn required_param(value: Option<String>, name: &str) -> Result<String, Response> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(error_response(&ApiError::InvalidRequest(format!(
            "missing required parameter '{name}'"
        )))),
    }
}

async fn run_blocking<T, F>(op: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(error_response(&err)),
        Err(err) => {
            tracing::error!(error = %err, "request task failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            )
                .into_response())
        }
    }
}

fn cached_json<T: Serialize>(max_age: u32, value: &T) -> Response {
    (
        [(
            header::CACHE_CONTROL,
            format!("public, max-age={max_age}"),
        )],
        Json(value),
    )
        .into_response()
}

fn error_response(err: &ApiError) -> Response {
    let status = match err {
        ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ApiError::TaxonNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
    }
    (status, Json(json!({"error": err.to_string()}))).into_response()
}
