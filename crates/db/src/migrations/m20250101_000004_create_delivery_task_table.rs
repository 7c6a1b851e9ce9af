//! Create delivery task table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryTask::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryTask::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryTask::ActivityId).string_len(1024).not_null())
                    .col(ColumnDef::new(DeliveryTask::ObjectId).string_len(1024).not_null())
                    .col(ColumnDef::new(DeliveryTask::SenderIri).string_len(1024).not_null())
                    .col(ColumnDef::new(DeliveryTask::InboxUrl).string_len(1024).not_null())
                    .col(ColumnDef::new(DeliveryTask::Payload).json().not_null())
                    .col(ColumnDef::new(DeliveryTask::Attempt).integer().not_null().default(0))
                    .col(ColumnDef::new(DeliveryTask::Status).string_len(16).not_null())
                    .col(ColumnDef::new(DeliveryTask::LastError).text())
                    .col(
                        ColumnDef::new(DeliveryTask::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTask::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (status, next_attempt_at) - due task polling
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_task_status_next_attempt")
                    .table(DeliveryTask::Table)
                    .col(DeliveryTask::Status)
                    .col(DeliveryTask::NextAttemptAt)
                    .to_owned(),
            )
            .await?;

        // Index: (object_id, inbox_url) - per-object ordering checks
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_task_object_inbox")
                    .table(DeliveryTask::Table)
                    .col(DeliveryTask::ObjectId)
                    .col(DeliveryTask::InboxUrl)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryTask::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeliveryTask {
    Table,
    Id,
    ActivityId,
    ObjectId,
    SenderIri,
    InboxUrl,
    Payload,
    Attempt,
    Status,
    LastError,
    NextAttemptAt,
    CreatedAt,
}
