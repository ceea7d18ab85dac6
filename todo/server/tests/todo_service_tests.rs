use chrono::Duration;
use sea_orm::DatabaseConnection;
use todo_server::clock::FixedClock;
use todo_server::todo::{
    NewTodo, Priority, TodoChanges, TodoFilter, TodoService, TodoServiceError, ValidationError,
};

mod common;

use common::utc;

pub struct TestContext {
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let db = common::setup_sqlite_db().await?;
    Ok(TestContext { db })
}

fn new_todo(title: &str, priority: Priority) -> NewTodo {
    NewTodo {
        priority,
        ..NewTodo::new(title)
    }
}

#[tokio::test]
async fn can_create_and_get_todo() {
    let state = setup().await.expect("Failed to setup test context");
    let now = utc(2024, 4, 1, 9, 30);
    let clock = FixedClock(now);
    let service = TodoService::with_clock(&state.db, &clock);

    let input = NewTodo {
        title: "Write report".to_string(),
        description: Some("Quarterly numbers".to_string()),
        due_date: Some(utc(2024, 4, 5, 17, 0)),
        priority: Priority::High,
    };
    let created = service
        .create(input.clone())
        .await
        .expect("Failed to create todo");

    assert_eq!(created.title, input.title);
    assert_eq!(created.description, input.description);
    assert_eq!(created.due_date, input.due_date);
    assert_eq!(created.priority, 3);
    assert!(!created.is_completed);
    assert_eq!(created.created_at, now);
    assert_eq!(created.updated_at, now);

    let fetched = service
        .get_by_id(created.id)
        .await
        .expect("Failed to get todo")
        .expect("Todo should exist");
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn get_by_id_returns_none_for_missing_todo() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let todo = service.get_by_id(404).await.expect("Failed to query");
    assert!(todo.is_none());
}

#[tokio::test]
async fn cannot_create_todo_with_invalid_fields() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let result = service.create(NewTodo::new("")).await;
    assert!(matches!(
        result,
        Err(TodoServiceError::Validation(ValidationError::EmptyTitle))
    ));

    let result = service.create(NewTodo::new("x".repeat(501))).await;
    assert!(matches!(
        result,
        Err(TodoServiceError::Validation(ValidationError::TitleTooLong(501)))
    ));

    let todos = service
        .list(&TodoFilter::default())
        .await
        .expect("Failed to list todos");
    assert!(todos.is_empty());
}

#[tokio::test]
async fn can_list_todos_newest_first() {
    let state = setup().await.expect("Failed to setup test context");
    let start = utc(2024, 4, 1, 9, 0);

    for (offset, title) in ["First", "Second", "Third"].into_iter().enumerate() {
        let clock = FixedClock(start + Duration::hours(offset as i64));
        TodoService::with_clock(&state.db, &clock)
            .create(NewTodo::new(title))
            .await
            .expect("Failed to create todo");
    }

    let todos = TodoService::new(&state.db)
        .list(&TodoFilter::default())
        .await
        .expect("Failed to list todos");

    let titles: Vec<&str> = todos.iter().map(|todo| todo.title.as_str()).collect();
    assert_eq!(titles, vec!["Third", "Second", "First"]);
}

#[tokio::test]
async fn can_filter_by_completion_and_priority() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let done_high = service
        .create(new_todo("Done high", Priority::High))
        .await
        .expect("Failed to create todo");
    service.toggle(done_high.id).await.expect("Failed to toggle");
    let open_high = service
        .create(new_todo("Open high", Priority::High))
        .await
        .expect("Failed to create todo");
    service
        .create(new_todo("Open low", Priority::Low))
        .await
        .expect("Failed to create todo");

    let filter = TodoFilter {
        is_completed: Some(false),
        priority: Some(3),
        ..Default::default()
    };
    let todos = service.list(&filter).await.expect("Failed to list todos");

    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].id, open_high.id);

    let filter = TodoFilter {
        is_completed: Some(true),
        ..Default::default()
    };
    let todos = service.list(&filter).await.expect("Failed to list todos");
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].id, done_high.id);
}

#[tokio::test]
async fn can_filter_by_search_term_in_title_or_description() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    service
        .create(NewTodo::new("Buy groceries"))
        .await
        .expect("Failed to create todo");
    service
        .create(NewTodo {
            description: Some("Remember the groceries list".to_string()),
            ..NewTodo::new("Errands")
        })
        .await
        .expect("Failed to create todo");
    service
        .create(NewTodo::new("Call plumber"))
        .await
        .expect("Failed to create todo");

    let filter = TodoFilter {
        search_term: Some("groceries".to_string()),
        ..Default::default()
    };
    let todos = service.list(&filter).await.expect("Failed to list todos");

    let mut titles: Vec<&str> = todos.iter().map(|todo| todo.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Buy groceries", "Errands"]);
}

#[tokio::test]
async fn can_filter_by_due_date_range() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    for (title, due_date) in [
        ("Early", Some(utc(2024, 5, 1, 12, 0))),
        ("Middle", Some(utc(2024, 5, 10, 12, 0))),
        ("Late", Some(utc(2024, 5, 20, 12, 0))),
        ("Undated", None),
    ] {
        service
            .create(NewTodo {
                due_date,
                ..NewTodo::new(title)
            })
            .await
            .expect("Failed to create todo");
    }

    let filter = TodoFilter {
        due_date_from: Some(utc(2024, 5, 5, 0, 0)),
        due_date_to: Some(utc(2024, 5, 20, 12, 0)),
        ..Default::default()
    };
    let todos = service.list(&filter).await.expect("Failed to list todos");

    let titles: Vec<&str> = todos.iter().map(|todo| todo.title.as_str()).collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Middle"));
    assert!(titles.contains(&"Late"));
}

#[tokio::test]
async fn can_paginate_when_requested() {
    let state = setup().await.expect("Failed to setup test context");
    let start = utc(2024, 4, 1, 0, 0);

    for index in 0..5 {
        let clock = FixedClock(start + Duration::minutes(index));
        TodoService::with_clock(&state.db, &clock)
            .create(NewTodo::new(format!("Todo {}", index)))
            .await
            .expect("Failed to create todo");
    }
    let service = TodoService::new(&state.db);

    let all = service
        .list(&TodoFilter::default())
        .await
        .expect("Failed to list todos");
    assert_eq!(all.len(), 5);

    let filter = TodoFilter {
        page: Some(2),
        page_size: Some(2),
        ..Default::default()
    };
    let page = service.list(&filter).await.expect("Failed to list todos");
    let titles: Vec<&str> = page.iter().map(|todo| todo.title.as_str()).collect();
    assert_eq!(titles, vec!["Todo 2", "Todo 1"]);

    let filter = TodoFilter {
        page: Some(0),
        ..Default::default()
    };
    let result = service.list(&filter).await;
    assert!(matches!(
        result,
        Err(TodoServiceError::Validation(ValidationError::InvalidPage { .. }))
    ));
}

#[tokio::test]
async fn can_update_todo() {
    let state = setup().await.expect("Failed to setup test context");
    let created_at = utc(2024, 4, 1, 9, 0);
    let created = TodoService::with_clock(&state.db, &FixedClock(created_at))
        .create(NewTodo::new("Draft"))
        .await
        .expect("Failed to create todo");

    let later = created_at + Duration::hours(2);
    let changes = TodoChanges {
        title: "Final".to_string(),
        description: Some("Ready to send".to_string()),
        is_completed: true,
        due_date: Some(utc(2024, 4, 2, 9, 0)),
        priority: Priority::Medium,
    };
    let updated = TodoService::with_clock(&state.db, &FixedClock(later))
        .update(created.id, changes)
        .await
        .expect("Failed to update todo");

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.description.as_deref(), Some("Ready to send"));
    assert!(updated.is_completed);
    assert_eq!(updated.priority, 2);
    assert_eq!(updated.created_at, created_at);
    assert_eq!(updated.updated_at, later);
}

#[tokio::test]
async fn updated_at_never_moves_backwards() {
    let state = setup().await.expect("Failed to setup test context");
    let created_at = utc(2024, 4, 1, 9, 0);
    let created = TodoService::with_clock(&state.db, &FixedClock(created_at))
        .create(NewTodo::new("Clock skew"))
        .await
        .expect("Failed to create todo");

    let earlier = FixedClock(created_at - Duration::days(1));
    let toggled = TodoService::with_clock(&state.db, &earlier)
        .toggle(created.id)
        .await
        .expect("Failed to toggle todo");

    assert!(toggled.updated_at >= created.updated_at);
    assert!(toggled.updated_at >= toggled.created_at);
}

#[tokio::test]
async fn can_handle_update_when_todo_not_found() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let created = service
        .create(NewTodo::new("Exists"))
        .await
        .expect("Failed to create todo");
    let non_existent_id = created.id + 1;

    let changes = TodoChanges {
        title: "Nope".to_string(),
        description: None,
        is_completed: false,
        due_date: None,
        priority: Priority::Low,
    };
    let result = service.update(non_existent_id, changes).await;
    assert!(result.is_err());
    if let Err(e) = result {
        assert_eq!(
            e.to_string(),
            format!("Todo with ID {} not found", non_existent_id)
        );
    }
}

#[tokio::test]
async fn can_toggle_todo_back_and_forth() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let created = service
        .create(NewTodo::new("Flip me"))
        .await
        .expect("Failed to create todo");

    let toggled = service.toggle(created.id).await.expect("Failed to toggle");
    assert!(toggled.is_completed);
    let toggled = service.toggle(created.id).await.expect("Failed to toggle");
    assert!(!toggled.is_completed);

    let result = service.toggle(created.id + 100).await;
    assert!(matches!(result, Err(TodoServiceError::TodoNotFound(_))));
}

#[tokio::test]
async fn delete_reports_absence_on_repeat() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let created = service
        .create(NewTodo::new("Temporary"))
        .await
        .expect("Failed to create todo");

    assert!(service.delete(created.id).await.expect("Failed to delete"));
    assert!(!service.delete(created.id).await.expect("Failed to delete"));
    assert!(!service.delete(9999).await.expect("Failed to delete"));
    assert!(
        service
            .get_by_id(created.id)
            .await
            .expect("Failed to get todo")
            .is_none()
    );
}

#[tokio::test]
async fn can_check_existence() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let created = service
        .create(NewTodo::new("Here"))
        .await
        .expect("Failed to create todo");

    assert!(service.exists(created.id).await.expect("Failed to check"));
    assert!(!service.exists(created.id + 1).await.expect("Failed to check"));
}

#[tokio::test]
async fn ids_are_not_reused_after_delete() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let first = service
        .create(NewTodo::new("First"))
        .await
        .expect("Failed to create todo");
    service.delete(first.id).await.expect("Failed to delete");

    let second = service
        .create(NewTodo::new("Second"))
        .await
        .expect("Failed to create todo");
    assert!(second.id > first.id);
}

#[tokio::test]
async fn can_rank_search_results() {
    let state = setup().await.expect("Failed to setup test context");
    let start = utc(2024, 4, 1, 0, 0);

    let inputs = [
        ("Write the report", None),
        ("Quarterly", Some("report for the board")),
        ("Report draft", None),
        ("report", None),
        ("Unrelated", Some("nothing here")),
    ];
    for (offset, (title, description)) in inputs.into_iter().enumerate() {
        let clock = FixedClock(start + Duration::minutes(offset as i64));
        TodoService::with_clock(&state.db, &clock)
            .create(NewTodo {
                description: description.map(str::to_string),
                ..NewTodo::new(title)
            })
            .await
            .expect("Failed to create todo");
    }

    let results = TodoService::new(&state.db)
        .search("report")
        .await
        .expect("Failed to search");

    let titles: Vec<&str> = results.iter().map(|todo| todo.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["report", "Report draft", "Quarterly", "Write the report"]
    );

    let results = TodoService::new(&state.db)
        .search("")
        .await
        .expect("Failed to search");
    assert!(results.is_empty());
}

#[tokio::test]
async fn can_seed_welcome_todos_once() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let inserted = service
        .seed_welcome_todos()
        .await
        .expect("Failed to seed todos");
    assert_eq!(inserted, 2);

    let inserted = service
        .seed_welcome_todos()
        .await
        .expect("Failed to seed todos");
    assert_eq!(inserted, 0);

    let todos = service
        .list(&TodoFilter::default())
        .await
        .expect("Failed to list todos");
    assert_eq!(todos.len(), 2);
}

#[tokio::test]
async fn treats_like_wildcards_in_terms_literally() {
    let state = setup().await.expect("Failed to setup test context");
    let start = utc(2024, 4, 1, 0, 0);

    let titles = [
        "Raise budget by 50%",
        "Order 500 chairs",
        "snake_case rename",
        "snakeXcase rename",
    ];
    for (offset, title) in titles.into_iter().enumerate() {
        let clock = FixedClock(start + Duration::minutes(offset as i64));
        TodoService::with_clock(&state.db, &clock)
            .create(NewTodo::new(title))
            .await
            .expect("Failed to create todo");
    }
    let service = TodoService::new(&state.db);

    let filter = TodoFilter {
        search_term: Some("50%".to_string()),
        ..Default::default()
    };
    let todos = service.list(&filter).await.expect("Failed to list todos");
    let found: Vec<&str> = todos.iter().map(|todo| todo.title.as_str()).collect();
    assert_eq!(found, vec!["Raise budget by 50%"]);

    let todos = service.search("snake_case").await.expect("Failed to search");
    let found: Vec<&str> = todos.iter().map(|todo| todo.title.as_str()).collect();
    assert_eq!(found, vec!["snake_case rename"]);

    let todos = service.search("%").await.expect("Failed to search");
    let found: Vec<&str> = todos.iter().map(|todo| todo.title.as_str()).collect();
    assert_eq!(found, vec!["Raise budget by 50%"]);
}

#[tokio::test]
async fn rejects_page_whose_offset_overflows() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TodoService::new(&state.db);

    let filter = TodoFilter {
        page: Some(u64::MAX),
        page_size: Some(100),
        ..Default::default()
    };
    let result = service.list(&filter).await;
    assert!(matches!(
        result,
        Err(TodoServiceError::Validation(ValidationError::InvalidPage {
            page: u64::MAX,
            page_size: 100
        }))
    ));
}
