//! API request handlers
//!
//! Every engine call does blocking file I/O, so handlers move it onto the
//! blocking pool and map `EngineError` onto HTTP statuses.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::core::CalculationEngine;
use crate::error::{EngineError, EngineResult};
use crate::mapping::builtin::{PROFILE_MATRIZ_BASIC, PROFILE_PROJECT_SUMMARY};
use crate::types::{
    CalculationRequest, CalculationResult, CostReport, EquipmentCosts, InfrastructureCosts,
};

use super::server::AppState;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error kind, e.g. `SheetNotFoundError`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_sheets: Option<Vec<String>>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
            details: None,
        }
    }

    pub fn err(kind: impl Into<String>, details: ErrorDetails) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(kind.into()),
            details: Some(details),
        }
    }
}

//==============================================================================
// Errors
//==============================================================================

/// Error side of every engine-backed handler
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// The blocking task panicked or was cancelled
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

/// HTTP status for an engine error
pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::MissingInput(_) | EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::SheetNotFound { .. } | EngineError::UnknownProfile(_) => StatusCode::NOT_FOUND,
        EngineError::WorkbookLoad { .. }
        | EngineError::WorkbookWrite { .. }
        | EngineError::InvalidCellRef(_)
        | EngineError::Mapping(_)
        | EngineError::Serialization(_)
        | EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, details) = match self {
            ApiError::Engine(e) => {
                let status = status_for(&e);
                let available_sheets = match &e {
                    EngineError::SheetNotFound {
                        available_sheets, ..
                    } => Some(available_sheets.clone()),
                    _ => None,
                };
                let details = ErrorDetails {
                    message: e.to_string(),
                    available_sheets,
                };
                (status, e.kind().to_string(), details)
            }
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError".to_string(),
                ErrorDetails {
                    message,
                    available_sheets: None,
                },
            ),
        };

        if status.is_server_error() {
            error!(kind = %kind, message = %details.message, "request failed");
        } else {
            warn!(kind = %kind, message = %details.message, "request rejected");
        }
        (status, Json(ApiResponse::<()>::err(kind, details))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run a blocking engine call off the async runtime
async fn run_engine<T, F>(state: &Arc<AppState>, f: F) -> ApiResult<T>
where
    T: Serialize + Send + 'static,
    F: FnOnce(&CalculationEngine) -> EngineResult<T> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    let outcome = tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::Internal(format!("engine task failed: {}", e)))?;
    Ok(Json(ApiResponse::ok(outcome?)))
}

/// Parse a JSON request body; an empty body is missing input
pub fn parse_request(body: &[u8]) -> EngineResult<CalculationRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(EngineError::MissingInput("request body is empty".to_string()));
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| EngineError::InvalidInput(format!("malformed JSON: {}", e)))?;
    CalculationRequest::from_json(value)
}

//==============================================================================
// Info endpoints
//==============================================================================

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub profiles: Vec<String>,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(method: &str, path: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Aforo Engine API".to_string(),
        version: state.version.clone(),
        description: "School capacity and infrastructure calculations over master workbooks"
            .to_string(),
        profiles: state.engine.registry().profile_names(),
        endpoints: vec![
            endpoint("GET", "/health", "Health check endpoint"),
            endpoint("GET", "/version", "Get server version"),
            endpoint(
                "POST",
                "/api/v1/calculate/:profile",
                "Write inputs under a profile and return recalculated results",
            ),
            endpoint(
                "POST",
                "/api/v1/update-project-excel",
                "Update the project summary workbook",
            ),
            endpoint(
                "GET",
                "/api/v1/get-project-excel",
                "Current project workbook values",
            ),
            endpoint(
                "POST",
                "/api/v1/readMatriz",
                "Calculate capacity from an uploaded template",
            ),
            endpoint(
                "GET",
                "/api/v1/costos/infraestructura",
                "Infrastructure budget",
            ),
            endpoint("GET", "/api/v1/costos/equipamiento", "Equipment budget"),
            endpoint("GET", "/api/v1/costos/completo", "Combined budget"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub profiles: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        profiles: state.engine.registry().profile_names(),
    }))
}

//==============================================================================
// Calculation endpoints
//==============================================================================

/// POST /api/v1/calculate/:profile
pub async fn calculate(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
    body: Bytes,
) -> ApiResult<CalculationResult> {
    let request = parse_request(&body)?;
    run_engine(&state, move |engine| engine.calculate(&profile, Some(request))).await
}

/// POST /api/v1/update-project-excel
pub async fn update_project_excel(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<CalculationResult> {
    let request = parse_request(&body)?;
    run_engine(&state, move |engine| {
        engine.calculate(PROFILE_PROJECT_SUMMARY, Some(request))
    })
    .await
}

/// GET /api/v1/get-project-excel
pub async fn get_project_excel(
    State(state): State<Arc<AppState>>,
) -> ApiResult<BTreeMap<String, f64>> {
    run_engine(&state, |engine| engine.project_snapshot()).await
}

#[derive(Debug, Deserialize)]
pub struct ReadMatrizParams {
    #[serde(default = "default_matriz_profile")]
    pub profile: String,
}

fn default_matriz_profile() -> String {
    PROFILE_MATRIZ_BASIC.to_string()
}

/// POST /api/v1/readMatriz - multipart upload, field `file`
pub async fn read_matriz(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadMatrizParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<CalculationResult> {
    let upload = match multipart {
        Ok(multipart) => uploaded_file(multipart).await?,
        Err(rejection) => {
            warn!(reason = %rejection, "request is not a multipart upload");
            None
        }
    };
    run_engine(&state, move |engine| {
        engine.calculate_upload(&params.profile, upload.as_deref())
    })
    .await
}

async fn uploaded_file(mut multipart: Multipart) -> EngineResult<Option<Vec<u8>>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| EngineError::InvalidInput(format!("malformed upload: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| EngineError::InvalidInput(format!("malformed upload: {}", e)))?;
            return Ok(Some(bytes.to_vec()));
        }
    }
    Ok(None)
}

//==============================================================================
// Cost endpoints
//==============================================================================

/// GET /api/v1/costos/infraestructura
pub async fn costos_infraestructura(
    State(state): State<Arc<AppState>>,
) -> ApiResult<InfrastructureCosts> {
    run_engine(&state, |engine| engine.infrastructure_costs()).await
}

/// GET /api/v1/costos/equipamiento
pub async fn costos_equipamiento(State(state): State<Arc<AppState>>) -> ApiResult<EquipmentCosts> {
    run_engine(&state, |engine| engine.equipment_costs()).await
}

/// GET /api/v1/costos/completo
pub async fn costos_completo(State(state): State<Arc<AppState>>) -> ApiResult<CostReport> {
    run_engine(&state, |engine| engine.cost_report()).await
}
