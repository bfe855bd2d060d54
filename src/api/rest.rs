//! HTTP exposure of the orchestrator's control surface (spec §6), grounded on
//! the teacher's `api/rest/server.rs` `RestApiServer` (an `Arc`-wrapped engine
//! behind a `Router`) and `api/rest/handlers.rs`'s `State`/`Path`/`Json`
//! extractor pattern. Unlike the teacher's router (left empty there due to a
//! `Sync` constraint on its storage layer), this one is fully wired — nothing
//! here carries that constraint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;

use crate::api::models::StartRunRequest;
use crate::orchestrator::{CancelOutcome, ControlStatus, Orchestrator, StartOutcome, StatusOutcome};
use crate::workflow::history::RunId;

pub struct RestApiServer {
    orchestrator: Arc<Orchestrator>,
}

impl RestApiServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/runs", post(start_run))
            .route("/runs/:id", get(get_status))
            .route("/runs/:id/cancel", post(cancel_run))
            .route("/stats", get(stats))
            .with_state(self.orchestrator.clone())
    }
}

fn status_code_for(status: ControlStatus) -> StatusCode {
    match status {
        ControlStatus::Accepted => StatusCode::OK,
        ControlStatus::RejectedInvalidPayload => StatusCode::BAD_REQUEST,
        ControlStatus::RejectedOverloaded => StatusCode::SERVICE_UNAVAILABLE,
        ControlStatus::NotFound => StatusCode::NOT_FOUND,
        ControlStatus::Conflict => StatusCode::CONFLICT,
    }
}

async fn health(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orchestrator.health())
}

async fn start_run(State(orchestrator): State<Arc<Orchestrator>>, Json(request): Json<StartRunRequest>) -> axum::response::Response {
    let outcome: StartOutcome = orchestrator.start(&request.workflow, request.payload, &request.client_id);
    let code = status_code_for(outcome.status);
    (code, Json(outcome)).into_response()
}

async fn get_status(State(orchestrator): State<Arc<Orchestrator>>, Path(id): Path<String>) -> axum::response::Response {
    let outcome: StatusOutcome = orchestrator.status(&RunId(id));
    let code = status_code_for(outcome.status);
    (code, Json(outcome)).into_response()
}

async fn cancel_run(State(orchestrator): State<Arc<Orchestrator>>, Path(id): Path<String>) -> axum::response::Response {
    let outcome: CancelOutcome = orchestrator.cancel(&RunId(id));
    let code = status_code_for(outcome.status);
    (code, Json(outcome)).into_response()
}

async fn stats(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orchestrator.stats())
}
