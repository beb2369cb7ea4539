use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::forecast::{ForecastRecord, SummaryRecord};
use crate::store::ForecastStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ForecastStore>,
}

#[derive(Serialize)]
struct ForecastResp {
    message: &'static str,
    forecasts: Vec<ForecastRecord>,
    #[serde(rename = "forecast-summary")]
    forecast_summary: Option<SummaryRecord>,
}

pub fn router(state: AppState, allow_origin: &str) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/forecast", get(get_forecast))
        .layer(cors(allow_origin))
        .with_state(state)
}

/// Empty origin means any origin.
fn cors(allow_origin: &str) -> CorsLayer {
    let origin = allow_origin.trim();
    if origin.is_empty() {
        return CorsLayer::very_permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(v) => CorsLayer::new()
            .allow_origin(v)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            tracing::warn!(%origin, "invalid CORS origin; falling back to permissive");
            CorsLayer::very_permissive()
        }
    }
}

async fn get_forecast(State(state): State<AppState>) -> Response {
    let result = async {
        let forecasts = state.store.forecasts().await?;
        let forecast_summary = state.store.latest_summary().await?;
        Ok::<_, crate::error::SyncError>(ForecastResp {
            message: "success",
            forecasts,
            forecast_summary,
        })
    }
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "GET /forecast failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": "failure", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
