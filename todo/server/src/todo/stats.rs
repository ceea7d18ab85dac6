//! Aggregate views over the whole todo table.
//!
//! Every operation reads the clock once, so all rows of a single result are judged against the
//! same instant.

use crate::clock::{Clock, SystemClock};
use crate::entities::*;
use crate::todo::{Priority, TodoServiceError, is_overdue, priority_text};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Maximum number of days returned by [`StatsService::daily_stats`].
pub const DAILY_STATS_LIMIT: usize = 30;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// One row of the todo summary.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TodoSummary {
    pub title: String,
    pub priority: i32,
    pub priority_text: String,
    pub is_completed: bool,
    /// Whole days since the todo was created
    pub days_old: i64,
    pub is_overdue: bool,
}

/// Creation and completion counts for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyStats {
    /// Day formatted as `YYYY-MM-DD`
    pub date: String,
    pub todos_created: u64,
    pub todos_completed: u64,
    /// Percentage of the day's todos that are completed, two decimals
    pub completion_rate: f64,
}

/// Table-wide counters and rates.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AdvancedStats {
    pub total_todos: u64,
    pub completed_todos: u64,
    pub pending_todos: u64,
    pub overdue_todos: u64,
    pub low_priority: u64,
    pub medium_priority: u64,
    pub high_priority: u64,
    /// Mean days between creation and last update of completed todos, two decimals
    pub avg_completion_days: f64,
    /// Percentage of all todos that are completed, two decimals
    pub overall_completion_rate: f64,
}

/// Rounds half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole` as a percentage with two decimals, `0.0` for an empty whole.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / whole as f64)
}

pub struct StatsService<'a> {
    db: &'a DatabaseConnection,
    clock: &'a dyn Clock,
}

impl<'a> StatsService<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self::with_clock(db, &SystemClock)
    }

    pub fn with_clock(db: &'a DatabaseConnection, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Summarises every todo, highest priority first and newest first within a priority.
    #[tracing::instrument(skip(self))]
    pub async fn summary(&self) -> Result<Vec<TodoSummary>, TodoServiceError> {
        let now = self.clock.now();
        let summary = todo::Entity::find()
            .order_by_desc(todo::Column::Priority)
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(|model| TodoSummary {
                priority_text: priority_text(model.priority).to_string(),
                days_old: (now - model.created_at).num_days(),
                is_overdue: is_overdue(model.due_date, model.is_completed, now),
                title: model.title,
                priority: model.priority,
                is_completed: model.is_completed,
            })
            .collect();
        Ok(summary)
    }

    /// Groups todos by the day they were created, most recent day first.
    ///
    /// # Arguments
    ///
    /// * `from` - Optional inclusive lower bound on `created_at`.
    /// * `to` - Optional inclusive upper bound on `created_at`.
    ///
    /// # Returns
    ///
    /// At most [`DAILY_STATS_LIMIT`] rows.
    #[tracing::instrument(skip(self))]
    pub async fn daily_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DailyStats>, TodoServiceError> {
        let mut query = todo::Entity::find()
            .select_only()
            .column(todo::Column::CreatedAt)
            .column(todo::Column::IsCompleted);
        if let Some(from) = from {
            query = query.filter(todo::Column::CreatedAt.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(todo::Column::CreatedAt.lte(to));
        }
        let rows: Vec<(DateTime<Utc>, bool)> = query.into_tuple().all(self.db).await?;

        let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
        for (created_at, is_completed) in rows {
            let (created, completed) = days.entry(created_at.date_naive()).or_default();
            *created += 1;
            if is_completed {
                *completed += 1;
            }
        }

        let daily_stats = days
            .into_iter()
            .rev()
            .take(DAILY_STATS_LIMIT)
            .map(|(date, (created, completed))| DailyStats {
                date: date.format("%Y-%m-%d").to_string(),
                todos_created: created,
                todos_completed: completed,
                completion_rate: percentage(completed, created),
            })
            .collect();
        Ok(daily_stats)
    }

    /// Computes counters, the priority distribution and completion metrics for the whole table.
    #[tracing::instrument(skip(self))]
    pub async fn advanced_stats(&self) -> Result<AdvancedStats, TodoServiceError> {
        let now = self.clock.now();
        let todos = todo::Entity::find().all(self.db).await?;

        let mut stats = AdvancedStats {
            total_todos: 0,
            completed_todos: 0,
            pending_todos: 0,
            overdue_todos: 0,
            low_priority: 0,
            medium_priority: 0,
            high_priority: 0,
            avg_completion_days: 0.0,
            overall_completion_rate: 0.0,
        };
        let mut completion_days = 0.0;

        for todo in &todos {
            stats.total_todos += 1;
            if todo.is_completed {
                stats.completed_todos += 1;
                completion_days +=
                    (todo.updated_at - todo.created_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
            }
            if is_overdue(todo.due_date, todo.is_completed, now) {
                stats.overdue_todos += 1;
            }
            match Priority::try_from(todo.priority) {
                Ok(Priority::Low) => stats.low_priority += 1,
                Ok(Priority::Medium) => stats.medium_priority += 1,
                Ok(Priority::High) => stats.high_priority += 1,
                Err(_) => {}
            }
        }

        stats.pending_todos = stats.total_todos - stats.completed_todos;
        if stats.completed_todos > 0 {
            stats.avg_completion_days = round2(completion_days / stats.completed_todos as f64);
        }
        stats.overall_completion_rate = percentage(stats.completed_todos, stats.total_todos);
        Ok(stats)
    }

    /// Moves every todo at `old_priority` to `new_priority` in a single statement.
    ///
    /// # Returns
    ///
    /// A `Result` containing the number of todos changed.
    #[tracing::instrument(skip(self))]
    pub async fn bulk_update_priority(
        &self,
        old_priority: Priority,
        new_priority: Priority,
    ) -> Result<u64, TodoServiceError> {
        let now = self.clock.now();
        // updated_at never moves backwards, even if the clock does
        let updated_at = Expr::case(
            Expr::col(todo::Column::UpdatedAt).gt(now),
            Expr::col(todo::Column::UpdatedAt),
        )
        .finally(Expr::value(now));
        let result = todo::Entity::update_many()
            .col_expr(todo::Column::Priority, Expr::value(new_priority.value()))
            .col_expr(todo::Column::UpdatedAt, updated_at.into())
            .filter(todo::Column::Priority.eq(old_priority.value()))
            .exec(self.db)
            .await?;

        tracing::info!(
            "Updated {} todos from priority {} to {}",
            result.rows_affected,
            old_priority,
            new_priority
        );
        Ok(result.rows_affected)
    }
}
