use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const IDX_IS_COMPLETED: &str = "idx_todo_is_completed";
const IDX_DUE_DATE: &str = "idx_todo_due_date";
const IDX_IS_COMPLETED_PRIORITY: &str = "idx_todo_is_completed_priority";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name(IDX_IS_COMPLETED)
                    .table(Todo::Table)
                    .col(Todo::IsCompleted)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_DUE_DATE)
                    .table(Todo::Table)
                    .col(Todo::DueDate)
                    .to_owned(),
            )
            .await?;

        // Serves the completion + priority filter combination used by the list endpoint
        manager
            .create_index(
                Index::create()
                    .name(IDX_IS_COMPLETED_PRIORITY)
                    .table(Todo::Table)
                    .col(Todo::IsCompleted)
                    .col(Todo::Priority)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for index in [IDX_IS_COMPLETED_PRIORITY, IDX_DUE_DATE, IDX_IS_COMPLETED] {
            manager
                .drop_index(Index::drop().name(index).table(Todo::Table).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Todo {
    Table,
    IsCompleted,
    Priority,
    DueDate,
}
