//! Create follow table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Follow::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Follow::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Follow::FollowerId).string_len(32).not_null())
                    .col(ColumnDef::new(Follow::FollowingId).string_len(32).not_null())
                    .col(ColumnDef::new(Follow::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Follow::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Follow::AcceptedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_follow_follower")
                            .from(Follow::Table, Follow::FollowerId)
                            .to(Actor::Table, Actor::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_follow_following")
                            .from(Follow::Table, Follow::FollowingId)
                            .to(Actor::Table, Actor::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (follower_id, following_id) - at most one edge per ordered pair
        manager
            .create_index(
                Index::create()
                    .name("idx_follow_follower_following")
                    .table(Follow::Table)
                    .col(Follow::FollowerId)
                    .col(Follow::FollowingId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (following_id, status) - follower enumeration for fan-out
        manager
            .create_index(
                Index::create()
                    .name("idx_follow_following_status")
                    .table(Follow::Table)
                    .col(Follow::FollowingId)
                    .col(Follow::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Follow::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Follow {
    Table,
    Id,
    FollowerId,
    FollowingId,
    Status,
    CreatedAt,
    AcceptedAt,
}

#[derive(Iden)]
enum Actor {
    Table,
    Id,
}
