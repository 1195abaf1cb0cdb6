#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! HTTP front for the resolution-time predictor: a JSON endpoint, an HTML form,
//! health and schema introspection. Every route shares one immutable predictor.

/// Structured error responses.
pub mod error;
/// HTML form rendering and submission.
pub mod form;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use eta_pipeline::{PipelineTelemetry, Predictor, RawTicket};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

pub use error::{ApiError, ErrorBody};

/// Application state shared across handlers.
#[derive(Debug)]
pub struct AppState {
    /// Loaded artifacts.
    pub predictor: Predictor,
    /// Request telemetry.
    pub telemetry: PipelineTelemetry,
}

type SharedState = Arc<AppState>;

/// Successful `/predict` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    /// Hours, rounded to two decimals.
    pub predicted_resolution_time_hours: f64,
}

/// `/health` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always `ok` once the artifacts are loaded.
    pub status: String,
    /// Run that produced the loaded artifacts.
    pub run_id: String,
    /// Loaded model.
    pub model: String,
}

/// `/v1/schema` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaResponse {
    /// Run that produced the loaded artifacts.
    pub run_id: String,
    /// Layout version.
    pub schema_version: u32,
    /// Feature columns in model order.
    pub columns: Vec<String>,
    /// Vocabulary size.
    pub vocabulary_size: usize,
    /// Quantile used for outlier removal.
    pub outlier_quantile: f64,
    /// Training cutoff in hours.
    pub outlier_cutoff_hours: f64,
    /// Rows the model was trained on.
    pub training_rows: usize,
}

/// Builds the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(form::show_form).post(form::submit_form))
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/v1/schema", get(schema))
        .with_state(state)
}

async fn predict(
    State(state): State<SharedState>,
    body: Result<Json<RawTicket>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(ticket) = body.map_err(|rejection| {
        let err = ApiError::from(rejection);
        state.telemetry.record(
            LogLevel::Warn,
            "predict.rejected",
            json!({ "status": err.status().as_u16(), "error": err.message() }),
        );
        err
    })?;
    match state.predictor.predict(&ticket) {
        Ok(prediction) => {
            state.telemetry.record(
                LogLevel::Info,
                "predict.completed",
                json!({
                    "ticket": ticket.ticket_id,
                    "hours": prediction.hours,
                    "filled_cells": prediction.filled_cells,
                    "unknown_fields": prediction.unknown_fields,
                }),
            );
            Ok(Json(PredictResponse {
                predicted_resolution_time_hours: prediction.hours,
            }))
        }
        Err(err) => {
            let level = if err.is_client_error() {
                LogLevel::Warn
            } else {
                LogLevel::Error
            };
            state.telemetry.record(
                level,
                "predict.failed",
                json!({ "ticket": ticket.ticket_id, "kind": err.kind(), "error": err.to_string() }),
            );
            Err(err.into())
        }
    }
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        run_id: state.predictor.run_id().to_string(),
        model: state.predictor.model_name().into(),
    })
}

async fn schema(State(state): State<SharedState>) -> Json<SchemaResponse> {
    let schema = state.predictor.schema();
    Json(SchemaResponse {
        run_id: schema.run_id.to_string(),
        schema_version: schema.schema_version,
        columns: schema.columns(),
        vocabulary_size: state.predictor.vocabulary_size(),
        outlier_quantile: schema.outlier_quantile,
        outlier_cutoff_hours: schema.outlier_cutoff_hours,
        training_rows: schema.training_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use eta_pipeline::{
        model::BoostingParams, synthetic_tickets, PipelineConfig, TrainingPipeline,
    };
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn app() -> Router {
        app_with_telemetry(PipelineTelemetry::disabled("serve"))
    }

    fn app_with_telemetry(telemetry: PipelineTelemetry) -> Router {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.artifacts.dir = dir.path().join("models");
        config.model.gradient_boosting = BoostingParams {
            rounds: 20,
            ..BoostingParams::default()
        };
        TrainingPipeline::new(config.clone(), PipelineTelemetry::disabled("train"))
            .run_on(synthetic_tickets(80, 42))
            .unwrap();
        let predictor = Predictor::load(&config.artifacts.dir).unwrap();
        router(Arc::new(AppState { predictor, telemetry }))
    }

    fn logging_app(log: &std::path::Path) -> Router {
        app_with_telemetry(PipelineTelemetry::builder("serve").log_path(log).build().unwrap())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::post("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn predict_returns_rounded_hours() {
        let (status, body) = send(
            app(),
            json_request(
                r#"{"Priority":"High","Category":"Software","Department":"IT",
                    "Created Time":"2024-01-15T09:30:00","Description":"Outlook not working"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let response: PredictResponse = serde_json::from_slice(&body).unwrap();
        let hours = response.predicted_resolution_time_hours;
        assert!((0.0..=500.0).contains(&hours), "{hours}");
    }

    #[tokio::test]
    async fn numeric_ticket_id_is_accepted_and_logged() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("serve.log");
        let (status, body) = send(
            logging_app(&log),
            json_request(
                r#"{"Ticket ID":123,"Priority":"Medium","Category":"Network","Department":"IT",
                    "Created Time":"2024-01-15T09:30:00","Description":"VPN drops"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let response: PredictResponse = serde_json::from_slice(&body).unwrap();
        assert!(response.predicted_resolution_time_hours >= 0.0);
        let log = std::fs::read_to_string(log).unwrap();
        assert!(log.contains("predict.completed"));
        assert!(log.contains("\"ticket\":\"123\""), "{log}");
    }

    #[tokio::test]
    async fn unknown_category_still_predicts() {
        let (status, _) = send(
            app(),
            json_request(
                r#"{"Priority":"Low","Category":"Facilities","Department":"HR",
                    "Created Time":"2024-01-15T09:30:00","Description":""}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn bad_timestamp_is_a_structured_client_error() {
        let (status, body) = send(
            app(),
            json_request(r#"{"Priority":"Low","Created Time":"yesterday"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(err["kind"], "timestamp_error");
        assert!(err["error"].as_str().unwrap().contains("yesterday"));
    }

    #[tokio::test]
    async fn malformed_json_gets_the_error_shape() {
        let (status, body) = send(app(), json_request("{not json")).await;
        assert!(status.is_client_error());
        let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(err["kind"], "invalid_request");
        assert!(err["error"].is_string());
    }

    #[tokio::test]
    async fn health_and_schema_describe_the_loaded_run() {
        let app = app();
        let (status, body) = send(
            app.clone(),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");

        let (_, body) = send(app, Request::get("/v1/schema").body(Body::empty()).unwrap()).await;
        let schema: SchemaResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(schema.run_id, health.run_id);
        assert_eq!(schema.columns.len(), 6 + schema.vocabulary_size);
        assert_eq!(schema.columns[0], "priority");
    }

    #[tokio::test]
    async fn form_lists_table_values_and_renders_predictions() {
        let (status, body) = send(app(), Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        for value in ["Urgent", "Access Request", "Engineering"] {
            assert!(page.contains(&format!("<option value=\"{value}\">")), "{value}");
        }

        assert!(page.contains("name=\"ticket_id\""));

        let form = "ticket_id=TCK-42&priority=High&category=Software&department=IT\
                    &created_time=2024-01-15T09%3A30&description=Outlook+not+working";
        let dir = tempdir().unwrap();
        let log = dir.path().join("serve.log");
        let (status, body) = send(
            logging_app(&log),
            Request::post("/")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("Estimated resolution time"));
        assert!(page.contains("<option value=\"High\" selected>"));
        assert!(page.contains("value=\"TCK-42\""));
        let log = std::fs::read_to_string(log).unwrap();
        assert!(log.contains("form.predicted"));
        assert!(log.contains("\"ticket\":\"TCK-42\""), "{log}");
    }
}
