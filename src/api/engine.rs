use crate::control::ControlChannel;
use crate::registry::{EntityClass, Placement, Registry, RegistrySession, SqliteRegistry};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Shared state for the engine page API
pub struct EngineAppState {
    pub control: Arc<ControlChannel>,
    pub registry: SqliteRegistry,
}

/// Choices offered on the engine form
#[derive(Debug, Serialize)]
pub struct EngineOptions {
    /// Cubes an agent can be sent to
    pub destinations: Vec<Placement>,
    pub agents: Vec<Placement>,
}

#[derive(Debug, Serialize)]
pub struct EngineStatus {
    pub running: bool,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create engine API router
pub fn create_engine_router(state: Arc<EngineAppState>) -> Router {
    Router::new()
        .route("/api/engine/options", get(get_options))
        .route("/api/engine/status", get(get_status))
        .with_state(state)
}

/// GET /api/engine/status - current run/stop flag
async fn get_status(State(state): State<Arc<EngineAppState>>) -> Json<EngineStatus> {
    Json(EngineStatus {
        running: state.control.is_running(),
    })
}

/// GET /api/engine/options - destinations and agents for the engine form
///
/// Rows whose location or position cannot be parsed are left out.
async fn get_options(
    State(state): State<Arc<EngineAppState>>,
) -> Result<Json<EngineOptions>, AppError> {
    let session = state
        .registry
        .open()
        .map_err(|e| AppError::RegistryUnavailable(format!("{:#}", e)))?;

    let destinations = placements(&session, EntityClass::Cube)?;
    let agents = placements(&session, EntityClass::Agent)?;

    Ok(Json(EngineOptions {
        destinations,
        agents,
    }))
}

fn placements<S: RegistrySession>(
    session: &S,
    class: EntityClass,
) -> Result<Vec<Placement>, AppError> {
    let rows = session
        .list_placements(class)
        .map_err(|e| AppError::RegistryUnavailable(format!("{:#}", e)))?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match Placement::try_from(row) {
                Ok(placement) => Some(placement),
                Err(e) => {
                    warn!(class = class.label(), id = %id, error = %e, "Skipping row with bad location");
                    None
                }
            }
        })
        .collect())
}

/// Application error types
enum AppError {
    RegistryUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::RegistryUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}
