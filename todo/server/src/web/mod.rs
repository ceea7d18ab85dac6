use axum::Router;
use axum::http::HeaderValue;
use migration::MigratorTrait;
use sea_orm::Database;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::todo::web::{TodoState, create_dashboard_router};

pub mod api;

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let todo_state = TodoState::new(db);

    if config.seed_welcome_todos {
        let inserted = todo_state.todo_service().seed_welcome_todos().await?;
        tracing::info!("Inserted {} welcome todos", inserted);
    }

    let cors = cors_layer(config.cors_allowed_origin.as_deref())?;
    let app = create_app(todo_state, cors);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Assembles the full application: health check, dashboard, JSON API and Swagger UI.
pub fn create_app(todo_state: TodoState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(create_dashboard_router(todo_state.clone()))
        .merge(api::create_api_router(todo_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api::ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Builds the CORS layer. Without an allowed origin no cross-origin access is granted.
pub fn cors_layer(allowed_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = allowed_origin else {
        return Ok(CorsLayer::new());
    };
    let origin: HeaderValue = origin.parse()?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}
