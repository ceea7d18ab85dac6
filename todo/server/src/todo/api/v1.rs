use crate::todo::stats::{AdvancedStats, DailyStats, TodoSummary};
use crate::todo::web::TodoState;
use crate::todo::{
    NewTodo, Priority, Todo, TodoChanges, TodoFilter, TodoServiceError, ValidationError,
};
use axum::{
    Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// JSON representation of a Todo for API responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodoJson {
    /// Unique identifier assigned by the store
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    /// 1 = Low, 2 = Medium, 3 = High
    pub priority: i32,
    /// Whether the due date has passed and the todo is not completed
    pub is_overdue: bool,
    /// Human-readable priority
    pub priority_text: String,
}

impl TodoJson {
    fn new(todo: Todo, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: todo.is_overdue_at(now),
            priority_text: todo.priority_text().to_string(),
            id: todo.id,
            title: todo.title,
            description: todo.description,
            is_completed: todo.is_completed,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
            due_date: todo.due_date,
            priority: todo.priority,
        }
    }
}

/// API response for listing todos.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodosResponse {
    /// List of todos
    pub todos: Vec<TodoJson>,
    /// Number of todos in this response
    pub count: usize,
}

impl TodosResponse {
    fn new(todos: Vec<Todo>, now: DateTime<Utc>) -> Self {
        let todos: Vec<TodoJson> = todos
            .into_iter()
            .map(|todo| TodoJson::new(todo, now))
            .collect();
        let count = todos.len();
        Self { todos, count }
    }
}

/// Request body for creating a todo.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTodoRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// 1 = Low (default), 2 = Medium, 3 = High
    #[serde(default = "default_priority")]
    pub priority: i32,
}

impl TryFrom<CreateTodoRequest> for NewTodo {
    type Error = ValidationError;

    fn try_from(request: CreateTodoRequest) -> Result<Self, Self::Error> {
        Ok(NewTodo {
            title: request.title,
            description: request.description,
            due_date: request.due_date,
            priority: Priority::try_from(request.priority)?,
        })
    }
}

/// Request body for replacing a todo's fields.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTodoRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

impl TryFrom<UpdateTodoRequest> for TodoChanges {
    type Error = ValidationError;

    fn try_from(request: UpdateTodoRequest) -> Result<Self, Self::Error> {
        Ok(TodoChanges {
            title: request.title,
            description: request.description,
            is_completed: request.is_completed,
            due_date: request.due_date,
            priority: Priority::try_from(request.priority)?,
        })
    }
}

fn default_priority() -> i32 {
    Priority::default().value()
}

/// Query parameters for filtering and paging todos.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TodosQuery {
    /// Only todos with this completion status
    pub is_completed: Option<bool>,
    /// Only todos with this priority
    pub priority: Option<i32>,
    /// Substring of the title or description
    pub search_term: Option<String>,
    /// Inclusive lower bound on the due date
    pub due_date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the due date
    pub due_date_to: Option<DateTime<Utc>>,
    /// 1-based page, enables paging
    pub page: Option<u64>,
    /// Page size (1-100), enables paging
    pub page_size: Option<u64>,
}

impl From<TodosQuery> for TodoFilter {
    fn from(query: TodosQuery) -> Self {
        Self {
            is_completed: query.is_completed,
            priority: query.priority,
            search_term: query.search_term,
            due_date_from: query.due_date_from,
            due_date_to: query.due_date_to,
            page: query.page,
            page_size: query.page_size,
        }
    }
}

/// Query parameters for the ranked search.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Text to look for in titles and descriptions
    pub term: String,
}

/// Query parameters bounding the daily statistics.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DailyStatsQuery {
    /// Inclusive lower bound on the creation time
    pub from_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the creation time
    pub to_date: Option<DateTime<Utc>>,
}

/// Query parameters for moving todos between priorities.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BulkUpdatePriorityQuery {
    pub old_priority: i32,
    pub new_priority: i32,
}

/// API response for a bulk priority update.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkUpdatePriorityResponse {
    pub message: String,
    pub updated_count: u64,
}

/// JSON response for API errors
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error type for the todo JSON API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] TodoServiceError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Query string that does not deserialize into the expected parameters.
    #[error(transparent)]
    InvalidQuery(#[from] QueryRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self {
            ApiError::Service(error) => error,
            ApiError::Validation(error) => TodoServiceError::Validation(error),
            ApiError::InvalidQuery(rejection) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: "VALIDATION_ERROR".to_string(),
                        message: rejection.body_text(),
                    }),
                )
                    .into_response();
            }
        };

        let (status_code, code, message) = match &error {
            TodoServiceError::Validation(validation_error) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                validation_error.to_string(),
            ),
            TodoServiceError::TodoNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", error.to_string())
            }
            TodoServiceError::Database(db_error) => {
                tracing::error!("Todo request failed: {}", db_error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An unexpected error occurred while processing your request. Please try again later."
                        .to_string(),
                )
            }
        };

        (
            status_code,
            Json(ErrorResponse {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Handler for GET /api/v1/todos - Returns the todos matching the filter, newest first.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos",
    params(TodosQuery),
    responses(
        (status = 200, description = "Successfully retrieved todos", body = TodosResponse),
        (status = 400, description = "Invalid paging parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn list_todos_handler(
    State(state): State<TodoState>,
    query: Result<Query<TodosQuery>, QueryRejection>,
) -> Result<Json<TodosResponse>, ApiError> {
    let Query(query) = query?;
    let now = state.now();
    let todos = state.todo_service().list(&query.into()).await?;
    Ok(Json(TodosResponse::new(todos, now)))
}

/// Handler for GET /api/v1/todos/search - Returns ranked search results.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Ranked search results", body = TodosResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn search_todos_handler(
    State(state): State<TodoState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<TodosResponse>, ApiError> {
    let Query(query) = query?;
    let now = state.now();
    let todos = state.todo_service().search(&query.term).await?;
    Ok(Json(TodosResponse::new(todos, now)))
}

/// Handler for GET /api/v1/todos/{id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/{id}",
    params(("id" = i32, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "The todo", body = TodoJson),
        (status = 404, description = "Todo not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn get_todo_handler(
    State(state): State<TodoState>,
    Path(id): Path<i32>,
) -> Result<Json<TodoJson>, ApiError> {
    let now = state.now();
    let todo = state
        .todo_service()
        .get_by_id(id)
        .await?
        .ok_or(TodoServiceError::TodoNotFound(id))?;
    Ok(Json(TodoJson::new(todo, now)))
}

/// Handler for POST /api/v1/todos - Creates a todo and points `Location` at it.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/todos",
    request_body = CreateTodoRequest,
    responses(
        (status = 201, description = "Todo created", body = TodoJson),
        (status = 400, description = "Invalid todo", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn create_todo_handler(
    State(state): State<TodoState>,
    Json(request): Json<CreateTodoRequest>,
) -> Result<(StatusCode, HeaderMap, Json<TodoJson>), ApiError> {
    let new_todo = NewTodo::try_from(request)?;
    let todo = state.todo_service().create(new_todo).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/todos/{}", todo.id)) {
        headers.insert(header::LOCATION, location);
    }
    let now = state.now();
    Ok((StatusCode::CREATED, headers, Json(TodoJson::new(todo, now))))
}

/// Handler for PUT /api/v1/todos/{id} - Replaces every mutable field of a todo.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    put,
    path = "/api/v1/todos/{id}",
    params(("id" = i32, Path, description = "Todo ID")),
    request_body = UpdateTodoRequest,
    responses(
        (status = 200, description = "Todo updated", body = TodoJson),
        (status = 400, description = "Invalid todo", body = ErrorResponse),
        (status = 404, description = "Todo not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn update_todo_handler(
    State(state): State<TodoState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateTodoRequest>,
) -> Result<Json<TodoJson>, ApiError> {
    let changes = TodoChanges::try_from(request)?;
    let todo = state.todo_service().update(id, changes).await?;
    let now = state.now();
    Ok(Json(TodoJson::new(todo, now)))
}

/// Handler for PATCH /api/v1/todos/{id}/toggle - Flips the completion status.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    patch,
    path = "/api/v1/todos/{id}/toggle",
    params(("id" = i32, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "Todo toggled", body = TodoJson),
        (status = 404, description = "Todo not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn toggle_todo_handler(
    State(state): State<TodoState>,
    Path(id): Path<i32>,
) -> Result<Json<TodoJson>, ApiError> {
    let todo = state.todo_service().toggle(id).await?;
    let now = state.now();
    Ok(Json(TodoJson::new(todo, now)))
}

/// Handler for DELETE /api/v1/todos/{id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/v1/todos/{id}",
    params(("id" = i32, Path, description = "Todo ID")),
    responses(
        (status = 204, description = "Todo deleted"),
        (status = 404, description = "Todo not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn delete_todo_handler(
    State(state): State<TodoState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    if state.todo_service().delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TodoServiceError::TodoNotFound(id).into())
    }
}

/// Handler for GET /api/v1/todos/summary.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/summary",
    responses(
        (status = 200, description = "Summary of every todo", body = [TodoSummary]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Stats"
)]
pub async fn summary_handler(
    State(state): State<TodoState>,
) -> Result<Json<Vec<TodoSummary>>, ApiError> {
    let summary = state.stats_service().summary().await?;
    Ok(Json(summary))
}

/// Handler for GET /api/v1/todos/daily-stats.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/daily-stats",
    params(DailyStatsQuery),
    responses(
        (status = 200, description = "Per-day creation and completion counts", body = [DailyStats]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Stats"
)]
pub async fn daily_stats_handler(
    State(state): State<TodoState>,
    query: Result<Query<DailyStatsQuery>, QueryRejection>,
) -> Result<Json<Vec<DailyStats>>, ApiError> {
    let Query(query) = query?;
    let daily_stats = state
        .stats_service()
        .daily_stats(query.from_date, query.to_date)
        .await?;
    Ok(Json(daily_stats))
}

/// Handler for GET /api/v1/todos/stats.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/stats",
    responses(
        (status = 200, description = "Table-wide statistics", body = AdvancedStats),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Stats"
)]
pub async fn advanced_stats_handler(
    State(state): State<TodoState>,
) -> Result<Json<AdvancedStats>, ApiError> {
    let stats = state.stats_service().advanced_stats().await?;
    Ok(Json(stats))
}

/// Handler for PUT /api/v1/todos/bulk-update-priority.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    put,
    path = "/api/v1/todos/bulk-update-priority",
    params(BulkUpdatePriorityQuery),
    responses(
        (status = 200, description = "Todos moved to the new priority", body = BulkUpdatePriorityResponse),
        (status = 400, description = "Priority out of range", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn bulk_update_priority_handler(
    State(state): State<TodoState>,
    query: Result<Query<BulkUpdatePriorityQuery>, QueryRejection>,
) -> Result<Json<BulkUpdatePriorityResponse>, ApiError> {
    let Query(query) = query?;
    let old_priority = Priority::try_from(query.old_priority)?;
    let new_priority = Priority::try_from(query.new_priority)?;

    let updated_count = state
        .stats_service()
        .bulk_update_priority(old_priority, new_priority)
        .await?;

    Ok(Json(BulkUpdatePriorityResponse {
        message: format!(
            "Updated {} todos from priority {} to {}",
            updated_count,
            old_priority.value(),
            new_priority.value()
        ),
        updated_count,
    }))
}

/// Creates and returns the todos API router.
pub fn create_api_router(state: TodoState) -> Router {
    Router::new()
        .route(
            "/todos",
            get(list_todos_handler).post(create_todo_handler),
        )
        .route("/todos/search", get(search_todos_handler))
        .route("/todos/summary", get(summary_handler))
        .route("/todos/daily-stats", get(daily_stats_handler))
        .route("/todos/stats", get(advanced_stats_handler))
        .route(
            "/todos/bulk-update-priority",
            put(bulk_update_priority_handler),
        )
        .route(
            "/todos/{id}",
            get(get_todo_handler)
                .put(update_todo_handler)
                .delete(delete_todo_handler),
        )
        .route("/todos/{id}/toggle", patch(toggle_todo_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_convert_create_request_with_default_priority() {
        let request: CreateTodoRequest =
            serde_json::from_str(r#"{"title": "Buy milk"}"#).expect("valid request");
        let new_todo = NewTodo::try_from(request).expect("valid todo");
        assert_eq!(new_todo, NewTodo::new("Buy milk"));
    }

    #[test]
    fn rejects_create_request_with_invalid_priority() {
        let request: CreateTodoRequest =
            serde_json::from_str(r#"{"title": "Buy milk", "priority": 5}"#)
                .expect("valid request");
        assert_eq!(
            NewTodo::try_from(request),
            Err(ValidationError::InvalidPriority(5))
        );
    }

    #[tokio::test]
    async fn can_map_not_found_to_404() {
        let response = ApiError::from(TodoServiceError::TodoNotFound(7)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "NOT_FOUND");
        assert_eq!(error.message, "Todo with ID 7 not found");
    }

    #[tokio::test]
    async fn can_map_validation_error_to_400() {
        let response = ApiError::from(ValidationError::EmptyTitle).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "VALIDATION_ERROR");
        assert_eq!(error.message, "Title is required");
    }

    #[tokio::test]
    async fn can_map_malformed_query_to_json_400() {
        let app = Router::new().route(
            "/check",
            get(|query: Result<Query<BulkUpdatePriorityQuery>, QueryRejection>| async move {
                let Query(query) = query?;
                Ok::<_, ApiError>(query.old_priority.to_string())
            }),
        );
        let request = axum::http::Request::builder()
            .uri("/check?old_priority=abc")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "VALIDATION_ERROR");
        assert!(error.message.starts_with("Failed to deserialize query string"));
    }

    #[tokio::test]
    async fn hides_database_details_from_clients() {
        let db_error = sea_orm::DbErr::Custom("connection reset".to_string());
        let response = ApiError::from(TodoServiceError::Database(db_error)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_text = std::str::from_utf8(&body).unwrap();
        assert!(!body_text.contains("connection reset"));
    }
}
