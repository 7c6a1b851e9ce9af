//! Create note table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Note::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Note::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Note::AuthorId).string_len(32).not_null())
                    .col(ColumnDef::new(Note::Content).text().not_null())
                    .col(ColumnDef::new(Note::Summary).string_len(512))
                    .col(ColumnDef::new(Note::Visibility).string_len(16))
                    .col(ColumnDef::new(Note::Mentions).json().not_null())
                    .col(ColumnDef::new(Note::Sensitive).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Note::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Note::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_note_author")
                            .from(Note::Table, Note::AuthorId)
                            .to(Actor::Table, Actor::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: author_id (for listing an actor's notes)
        manager
            .create_index(
                Index::create()
                    .name("idx_note_author_id")
                    .table(Note::Table)
                    .col(Note::AuthorId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Note::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Note {
    Table,
    Id,
    AuthorId,
    Content,
    Summary,
    Visibility,
    Mentions,
    Sensitive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Actor {
    Table,
    Id,
}
