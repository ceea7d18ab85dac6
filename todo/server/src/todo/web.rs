use askama::Template;
use axum::{Router, extract::State, http::StatusCode, response::Html, routing::get};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::todo::{TodoService, TodoServiceError};
use crate::todo::stats::{AdvancedStats, DailyStats, StatsService, TodoSummary};

/// Shared state for every todo route.
#[derive(Clone)]
pub struct TodoState {
    pub db: Arc<DatabaseConnection>,
    pub clock: Arc<dyn Clock>,
}

impl TodoState {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: DatabaseConnection, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Arc::new(db),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn todo_service(&self) -> TodoService<'_> {
        TodoService::with_clock(&self.db, self.clock.as_ref())
    }

    pub fn stats_service(&self) -> StatsService<'_> {
        StatsService::with_clock(&self.db, self.clock.as_ref())
    }
}

/// Custom error type for dashboard handler operations.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a failure loading the statistics.
    #[error("Todo service error")]
    Service(#[from] TodoServiceError),
}

impl axum::response::IntoResponse for DashboardError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("Dashboard failed: {}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    stats: AdvancedStats,
    completion_rate: String,
    avg_completion_days: String,
    summary: Vec<TodoSummary>,
    daily_stats: Vec<DailyStats>,
}

impl DashboardTemplate {
    pub fn new(
        stats: AdvancedStats,
        summary: Vec<TodoSummary>,
        daily_stats: Vec<DailyStats>,
    ) -> Self {
        Self {
            completion_rate: format!("{:.2}", stats.overall_completion_rate),
            avg_completion_days: format!("{:.2}", stats.avg_completion_days),
            stats,
            summary,
            daily_stats,
        }
    }
}

/// Handler for the dashboard page showing the statistics and the todo summary.
#[tracing::instrument(skip(state))]
pub async fn dashboard_handler(
    State(state): State<TodoState>,
) -> Result<Html<String>, DashboardError> {
    let stats_service = state.stats_service();
    let stats = stats_service.advanced_stats().await?;
    let summary = stats_service.summary().await?;
    let daily_stats = stats_service.daily_stats(None, None).await?;

    let template = DashboardTemplate::new(stats, summary, daily_stats);
    template.render().map(Html).map_err(DashboardError::from)
}

/// Creates and returns the dashboard router.
pub fn create_dashboard_router(state: TodoState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .with_state(state)
}
