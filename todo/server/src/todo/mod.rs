use crate::clock::{Clock, SystemClock};
use crate::entities::*;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LikeExpr};
use sea_orm::*;
use std::fmt;

pub mod api;
pub mod stats;
pub mod validation;
pub mod web;

pub use validation::ValidationError;

/// Priority tier of a todo, persisted as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Priority {
    /// Returns the persisted integer value.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Returns the human-readable name of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl TryFrom<i32> for Priority {
    type Error = ValidationError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::High),
            other => Err(ValidationError::InvalidPriority(other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks up the display text for a stored priority value.
///
/// Rows written outside the API may carry values other than 1-3, those read as `"Unknown"`.
pub fn priority_text(priority: i32) -> &'static str {
    Priority::try_from(priority)
        .map(Priority::as_str)
        .unwrap_or("Unknown")
}

/// A todo is overdue when it has a due date in the past and is not completed.
pub fn is_overdue(due_date: Option<DateTime<Utc>>, is_completed: bool, now: DateTime<Utc>) -> bool {
    !is_completed && due_date.is_some_and(|due_date| due_date < now)
}

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Todo {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl Todo {
    /// Returns whether the todo is overdue relative to `now`.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        is_overdue(self.due_date, self.is_completed, now)
    }

    /// Returns the display text of the todo's priority.
    pub fn priority_text(&self) -> &'static str {
        priority_text(self.priority)
    }
}

impl From<todo::Model> for Todo {
    fn from(model: todo::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            is_completed: model.is_completed,
            priority: model.priority,
            created_at: model.created_at,
            updated_at: model.updated_at,
            due_date: model.due_date,
        }
    }
}

/// Client-supplied fields for a new todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
}

impl NewTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_date: None,
            priority: Priority::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_title(&self.title)?;
        validation::validate_description(self.description.as_deref())
    }
}

/// Replacement values for every mutable field of an existing todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoChanges {
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
}

impl TodoChanges {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_title(&self.title)?;
        validation::validate_description(self.description.as_deref())
    }
}

/// Optional predicates combined with AND when listing todos.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoFilter {
    pub is_completed: Option<bool>,
    pub priority: Option<i32>,
    /// Substring matched against the title or the description.
    pub search_term: Option<String>,
    pub due_date_from: Option<DateTime<Utc>>,
    pub due_date_to: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

pub const DEFAULT_PAGE_SIZE: u64 = 10;

impl TodoFilter {
    /// Returns the `(offset, limit)` pair to apply, or `None` when neither page nor size was requested.
    pub fn pagination(&self) -> Result<Option<(u64, u64)>, ValidationError> {
        if self.page.is_none() && self.page_size.is_none() {
            return Ok(None);
        }
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = validation::page_offset(page, page_size)?;
        Ok(Some((offset, page_size)))
    }
}

/// Error type for TodoService operations.
#[derive(Debug, thiserror::Error)]
pub enum TodoServiceError {
    /// Input rejected before reaching the database.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Represents a todo not found error.
    #[error("Todo with ID {0} not found")]
    TodoNotFound(i32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

const WELCOME_TODOS: [(&str, &str, Priority); 2] = [
    (
        "Welcome to your Todo App!",
        "This is your first todo item. You can edit or delete it.",
        Priority::Medium,
    ),
    (
        "Learn about SeaORM",
        "Understanding entities, active models and migrations is key to Rust web development.",
        Priority::High,
    ),
];

pub struct TodoService<'a> {
    db: &'a DatabaseConnection,
    clock: &'a dyn Clock,
}

impl<'a> TodoService<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self::with_clock(db, &SystemClock)
    }

    pub fn with_clock(db: &'a DatabaseConnection, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Lists todos matching every predicate of `filter`, newest first.
    ///
    /// # Returns
    ///
    /// A `Result` containing the matching todos, or an error if the page is invalid or the query fails.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: &TodoFilter) -> Result<Vec<Todo>, TodoServiceError> {
        let pagination = filter.pagination()?;

        let mut query = todo::Entity::find();
        if let Some(is_completed) = filter.is_completed {
            query = query.filter(todo::Column::IsCompleted.eq(is_completed));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(todo::Column::Priority.eq(priority));
        }
        if let Some(term) = filter.search_term.as_deref().filter(|term| !term.is_empty()) {
            query = query.filter(matches_term(term));
        }
        if let Some(due_date_from) = filter.due_date_from {
            query = query.filter(todo::Column::DueDate.gte(due_date_from));
        }
        if let Some(due_date_to) = filter.due_date_to {
            query = query.filter(todo::Column::DueDate.lte(due_date_to));
        }

        let mut query = query
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id);
        if let Some((offset, limit)) = pagination {
            query = query.offset(offset).limit(limit);
        }

        let todos = query
            .all(self.db)
            .await?
            .into_iter()
            .map(Todo::from)
            .collect();
        Ok(todos)
    }

    /// Retrieves a todo by its ID, `None` when it does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Todo>, TodoServiceError> {
        let todo = todo::Entity::find_by_id(id).one(self.db).await?;
        Ok(todo.map(Todo::from))
    }

    /// Creates a new todo.
    ///
    /// # Arguments
    ///
    /// * `new_todo` - The client-supplied fields. Timestamps are assigned here.
    ///
    /// # Returns
    ///
    /// A `Result` containing the persisted `Todo` with its generated ID.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, new_todo: NewTodo) -> Result<Todo, TodoServiceError> {
        new_todo.validate()?;

        let now = self.clock.now();
        let active_model = todo::ActiveModel {
            title: ActiveValue::Set(new_todo.title),
            description: ActiveValue::Set(new_todo.description),
            is_completed: ActiveValue::Set(false),
            priority: ActiveValue::Set(new_todo.priority.value()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            due_date: ActiveValue::Set(new_todo.due_date),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Todo::from(created_model))
    }

    /// Overwrites every mutable field of a todo and stamps `updated_at`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the updated `Todo`, or `TodoNotFound` if the ID does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: i32, changes: TodoChanges) -> Result<Todo, TodoServiceError> {
        changes.validate()?;

        let todo_to_update = self.find_model(id).await?;
        let updated_at = self.next_updated_at(&todo_to_update);

        let mut active_model: todo::ActiveModel = todo_to_update.into();
        active_model.title = ActiveValue::Set(changes.title);
        active_model.description = ActiveValue::Set(changes.description);
        active_model.is_completed = ActiveValue::Set(changes.is_completed);
        active_model.due_date = ActiveValue::Set(changes.due_date);
        active_model.priority = ActiveValue::Set(changes.priority.value());
        active_model.updated_at = ActiveValue::Set(updated_at);

        self.save(id, active_model).await
    }

    /// Flips the completion status of a todo.
    #[tracing::instrument(skip(self))]
    pub async fn toggle(&self, id: i32) -> Result<Todo, TodoServiceError> {
        let todo_to_toggle = self.find_model(id).await?;
        let updated_at = self.next_updated_at(&todo_to_toggle);
        let is_completed = !todo_to_toggle.is_completed;

        let mut active_model: todo::ActiveModel = todo_to_toggle.into();
        active_model.is_completed = ActiveValue::Set(is_completed);
        active_model.updated_at = ActiveValue::Set(updated_at);

        self.save(id, active_model).await
    }

    /// Deletes a todo by its ID.
    ///
    /// # Returns
    ///
    /// A `Result` containing `true` if a row was removed, `false` if the ID did not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<bool, TodoServiceError> {
        let result = todo::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Checks whether a todo with the given ID exists without loading it.
    #[tracing::instrument(skip(self))]
    pub async fn exists(&self, id: i32) -> Result<bool, TodoServiceError> {
        let count = todo::Entity::find_by_id(id).count(self.db).await?;
        Ok(count > 0)
    }

    /// Searches titles and descriptions for `term`.
    ///
    /// Results are ranked: exact title match, title prefix, description prefix, then any other
    /// match. Within a rank the newest todo comes first.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, term: &str) -> Result<Vec<Todo>, TodoServiceError> {
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let mut todos: Vec<Todo> = todo::Entity::find()
            .filter(matches_term(term))
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Todo::from)
            .collect();

        let term_lowercase = term.to_lowercase();
        todos.sort_by_cached_key(|todo| search_rank(todo, term, &term_lowercase));
        Ok(todos)
    }

    /// Inserts the welcome todos when the table is empty.
    ///
    /// # Returns
    ///
    /// A `Result` containing the number of todos inserted.
    #[tracing::instrument(skip(self))]
    pub async fn seed_welcome_todos(&self) -> Result<u64, TodoServiceError> {
        if todo::Entity::find().count(self.db).await? > 0 {
            tracing::info!("Todo table is not empty, skipping welcome todos");
            return Ok(0);
        }

        let mut inserted = 0;
        for (title, description, priority) in WELCOME_TODOS {
            self.create(NewTodo {
                title: title.to_string(),
                description: Some(description.to_string()),
                due_date: None,
                priority,
            })
            .await?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn find_model(&self, id: i32) -> Result<todo::Model, TodoServiceError> {
        todo::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TodoServiceError::TodoNotFound(id))
    }

    async fn save(&self, id: i32, active_model: todo::ActiveModel) -> Result<Todo, TodoServiceError> {
        match active_model.update(self.db).await {
            Ok(model) => Ok(Todo::from(model)),
            // The row disappeared between the read and the write
            Err(DbErr::RecordNotUpdated) => Err(TodoServiceError::TodoNotFound(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// `updated_at` never moves backwards, even if the clock does.
    fn next_updated_at(&self, model: &todo::Model) -> DateTime<Utc> {
        self.clock.now().max(model.updated_at)
    }
}

/// Substring match on title or description, with LIKE wildcards in `term` taken literally.
fn matches_term(term: &str) -> Condition {
    let pattern = format!("%{}%", escape_like(term));
    Condition::any()
        .add(Expr::col(todo::Column::Title).like(LikeExpr::new(pattern.clone()).escape('\\')))
        .add(Expr::col(todo::Column::Description).like(LikeExpr::new(pattern).escape('\\')))
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn search_rank(todo: &Todo, term: &str, term_lowercase: &str) -> u8 {
    if todo.title == term {
        1
    } else if todo.title.to_lowercase().starts_with(term_lowercase) {
        2
    } else if todo
        .description
        .as_deref()
        .is_some_and(|description| description.to_lowercase().starts_with(term_lowercase))
    {
        3
    } else {
        4
    }
}
