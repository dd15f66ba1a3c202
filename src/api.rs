//! HTTP routes for the study workflow.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use uuid::Uuid;

use crate::engine::{CompletionTarget, StudentDetail, StudentStateEngine};
use crate::error::EngineError;
use crate::models::{CheckInStatus, Intervention, InterventionStatus, Student, StudentState};
use crate::stats::RollingAverages;

const ROUTES: [&str; 6] = [
    "/api/health",
    "/api/students",
    "/api/student/{id}",
    "/api/daily-checkin",
    "/api/assign-intervention",
    "/api/complete-task",
];

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StudentStateEngine>,
    /// Include internal error text in 500 responses.
    pub expose_error_details: bool,
}

impl AppState {
    pub fn new(engine: Arc<StudentStateEngine>, expose_error_details: bool) -> Self {
        Self {
            engine,
            expose_error_details,
        }
    }

    fn fail(&self, action: &'static str, err: EngineError) -> ApiError {
        match err {
            EngineError::Validation(message) => ApiError::validation(message),
            ref e if e.is_not_found() => ApiError {
                status: StatusCode::NOT_FOUND,
                error: e.to_string(),
                details: None,
            },
            e => {
                error!(error = %e, action, "request failed");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: action.to_string(),
                    details: self.expose_error_details.then(|| e.to_string()),
                }
            }
        }
    }
}

/// Structured failure body: `{ "error": ..., "details"?: ... }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl ApiError {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: message.into(),
            details: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(format!("invalid request body: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_router())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/students", get(list_students).post(create_student))
        .route("/student/{id}", get(get_student))
        .route("/daily-checkin", post(daily_checkin))
        .route("/assign-intervention", post(assign_intervention))
        .route("/complete-task", post(complete_task))
}

async fn not_found() -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        error: "Not Found".to_string(),
        details: None,
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "routes": ROUTES,
    }))
}

fn parse_id(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::validation(format!("{field} must be a valid UUID")))
}

#[derive(Deserialize)]
struct CreateStudentRequest {
    name: Option<String>,
}

/// POST /api/students
async fn create_student(
    State(state): State<AppState>,
    payload: Result<Json<CreateStudentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = payload?;
    let name = request
        .name
        .ok_or_else(|| ApiError::validation("Name is required"))?;

    let student = state
        .engine
        .create_student(&name)
        .await
        .map_err(|e| state.fail("Failed to create student", e))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Student created successfully",
            "student": student,
        })),
    ))
}

/// GET /api/students
async fn list_students(State(state): State<AppState>) -> Result<Json<Vec<Student>>, ApiError> {
    let students = state
        .engine
        .list_students()
        .await
        .map_err(|e| state.fail("Failed to fetch students", e))?;
    Ok(Json(students))
}

#[derive(Serialize)]
struct CurrentTask {
    id: Uuid,
    task: String,
    status: InterventionStatus,
    assigned_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct StatsBody {
    #[serde(flatten)]
    averages: RollingAverages,
    last_updated: DateTime<Utc>,
}

#[derive(Serialize)]
struct RecentLog {
    quiz_score: i32,
    focus_minutes: i32,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct StudentDetailBody {
    id: Uuid,
    name: String,
    state: StudentState,
    task: Option<String>,
    pending_intervention_id: Option<Uuid>,
    current_task: Option<CurrentTask>,
    stats: StatsBody,
    recent_logs: Vec<RecentLog>,
}

impl From<StudentDetail> for StudentDetailBody {
    fn from(detail: StudentDetail) -> Self {
        let last_updated = detail.student.last_updated();
        let current_task = detail.current_task.map(|i| CurrentTask {
            id: i.id,
            task: i.task,
            status: i.status,
            assigned_at: i.created_at,
        });

        Self {
            id: detail.student.id,
            name: detail.student.name,
            state: detail.student.state,
            task: current_task.as_ref().map(|t| t.task.clone()),
            pending_intervention_id: current_task.as_ref().map(|t| t.id),
            current_task,
            stats: StatsBody {
                averages: detail.averages,
                last_updated,
            },
            recent_logs: detail
                .recent_logs
                .into_iter()
                .map(|log| RecentLog {
                    quiz_score: log.quiz_score,
                    focus_minutes: log.focus_minutes,
                    created_at: log.created_at,
                })
                .collect(),
        }
    }
}

/// GET /api/student/{id}
async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StudentDetailBody>, ApiError> {
    let id = parse_id("id", &id)?;
    let detail = state
        .engine
        .student_detail(id)
        .await
        .map_err(|e| state.fail("Failed to retrieve student data", e))?;
    Ok(Json(detail.into()))
}

#[derive(Deserialize)]
struct CheckInRequest {
    student_id: Option<String>,
    quiz_score: Option<i64>,
    focus_minutes: Option<i64>,
}

struct ValidCheckIn {
    student_id: Uuid,
    quiz_score: i32,
    focus_minutes: i32,
}

impl CheckInRequest {
    fn validate(self) -> Result<ValidCheckIn, ApiError> {
        let (Some(student_id), Some(quiz_score), Some(focus_minutes)) =
            (self.student_id, self.quiz_score, self.focus_minutes)
        else {
            return Err(ApiError::validation(
                "Missing required fields: student_id, quiz_score, and focus_minutes are required",
            ));
        };

        let student_id = parse_id("student_id", &student_id)?;
        let quiz_score = i32::try_from(quiz_score)
            .ok()
            .filter(|score| (1..=10).contains(score))
            .ok_or_else(|| ApiError::validation("quiz_score must be between 1 and 10"))?;
        let focus_minutes = i32::try_from(focus_minutes)
            .ok()
            .filter(|minutes| *minutes >= 0)
            .ok_or_else(|| ApiError::validation("focus_minutes must be a non-negative integer"))?;

        Ok(ValidCheckIn {
            student_id,
            quiz_score,
            focus_minutes,
        })
    }
}

#[derive(Serialize)]
struct CheckInBody {
    status: CheckInStatus,
}

/// POST /api/daily-checkin
async fn daily_checkin(
    State(state): State<AppState>,
    payload: Result<Json<CheckInRequest>, JsonRejection>,
) -> Result<Json<CheckInBody>, ApiError> {
    let Json(request) = payload?;
    let check_in = request.validate()?;

    let outcome = state
        .engine
        .check_in(
            check_in.student_id,
            check_in.quiz_score,
            check_in.focus_minutes,
        )
        .await
        .map_err(|e| state.fail("Internal server error", e))?;

    debug!(
        student_id = %outcome.student.id,
        state = %outcome.student.state,
        alerted = outcome.notification.is_some(),
        "check-in handled"
    );
    Ok(Json(CheckInBody {
        status: outcome.status,
    }))
}

#[derive(Deserialize)]
struct AssignInterventionRequest {
    student_id: Option<String>,
    task: Option<String>,
}

#[derive(Serialize)]
struct InterventionBody {
    message: &'static str,
    intervention: Intervention,
}

/// POST /api/assign-intervention
async fn assign_intervention(
    State(state): State<AppState>,
    payload: Result<Json<AssignInterventionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InterventionBody>), ApiError> {
    let Json(request) = payload?;
    let (Some(student_id), Some(task)) = (request.student_id, request.task) else {
        return Err(ApiError::validation(
            "Missing required fields: student_id and task are required",
        ));
    };
    let student_id = parse_id("student_id", &student_id)?;

    let intervention = state
        .engine
        .assign_intervention(student_id, &task)
        .await
        .map_err(|e| state.fail("Failed to assign intervention", e))?;

    Ok((
        StatusCode::CREATED,
        Json(InterventionBody {
            message: "Intervention assigned successfully",
            intervention,
        }),
    ))
}

#[derive(Deserialize)]
struct CompleteTaskRequest {
    intervention_id: Option<String>,
    student_id: Option<String>,
}

impl CompleteTaskRequest {
    /// An explicit intervention id wins over a student id.
    fn target(self) -> Result<CompletionTarget, ApiError> {
        match (self.intervention_id, self.student_id) {
            (Some(id), _) => Ok(CompletionTarget::ById(parse_id("intervention_id", &id)?)),
            (None, Some(id)) => Ok(CompletionTarget::LatestForStudent(parse_id(
                "student_id",
                &id,
            )?)),
            (None, None) => Err(ApiError::validation(
                "Missing required field: intervention_id or student_id is required",
            )),
        }
    }
}

/// POST /api/complete-task
async fn complete_task(
    State(state): State<AppState>,
    payload: Result<Json<CompleteTaskRequest>, JsonRejection>,
) -> Result<Json<InterventionBody>, ApiError> {
    let Json(request) = payload?;
    let target = request.target()?;

    let intervention = state
        .engine
        .complete_task(target)
        .await
        .map_err(|e| state.fail("Failed to complete task", e))?;

    Ok(Json(InterventionBody {
        message: "Task marked as completed",
        intervention,
    }))
}
