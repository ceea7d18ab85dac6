use crate::todo::api::v1;
use crate::todo::web::TodoState;

use axum::Router;
use utoipa::OpenApi;

/// OpenAPI document for the JSON API, served by the Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        v1::list_todos_handler,
        v1::create_todo_handler,
        v1::search_todos_handler,
        v1::get_todo_handler,
        v1::update_todo_handler,
        v1::toggle_todo_handler,
        v1::delete_todo_handler,
        v1::summary_handler,
        v1::daily_stats_handler,
        v1::advanced_stats_handler,
        v1::bulk_update_priority_handler,
    ),
    tags(
        (name = "Todos", description = "Create, read, update and delete todos"),
        (name = "Stats", description = "Aggregated views over all todos")
    )
)]
pub struct ApiDoc;

/// Creates the API routes for JSON API endpoints.
pub fn create_api_router(todo_state: TodoState) -> Router {
    let todos_router = v1::create_api_router(todo_state);
    Router::new().nest("/api/v1", todos_router)
}
