//! Create actor table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Actor::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Actor::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Actor::Iri).string_len(1024).not_null())
                    .col(ColumnDef::new(Actor::Username).string_len(128).not_null())
                    .col(ColumnDef::new(Actor::Domain).string_len(256).not_null())
                    .col(ColumnDef::new(Actor::IsLocal).boolean().not_null().default(false))
                    .col(ColumnDef::new(Actor::UserId).string_len(32))
                    .col(ColumnDef::new(Actor::InboxUrl).string_len(1024).not_null())
                    .col(ColumnDef::new(Actor::SharedInboxUrl).string_len(1024))
                    .col(
                        ColumnDef::new(Actor::ManuallyApprovesFollowers)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Actor::FollowersCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Actor::FollowingCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Actor::DisplayName).string_len(256))
                    .col(ColumnDef::new(Actor::Summary).text())
                    .col(ColumnDef::new(Actor::AvatarUrl).string_len(1024))
                    .col(ColumnDef::new(Actor::PublicKeyPem).text())
                    .col(ColumnDef::new(Actor::LastFetchedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Actor::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Actor::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Unique index: iri - one row per federated identity
        manager
            .create_index(
                Index::create()
                    .name("idx_actor_iri")
                    .table(Actor::Table)
                    .col(Actor::Iri)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Unique index: user_id - NULL for remote actors
        manager
            .create_index(
                Index::create()
                    .name("idx_actor_user_id")
                    .table(Actor::Table)
                    .col(Actor::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (username, is_local) - local username lookup
        manager
            .create_index(
                Index::create()
                    .name("idx_actor_username_local")
                    .table(Actor::Table)
                    .col(Actor::Username)
                    .col(Actor::IsLocal)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Actor::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Actor {
    Table,
    Id,
    Iri,
    Username,
    Domain,
    IsLocal,
    UserId,
    InboxUrl,
    SharedInboxUrl,
    ManuallyApprovesFollowers,
    FollowersCount,
    FollowingCount,
    DisplayName,
    Summary,
    AvatarUrl,
    PublicKeyPem,
    LastFetchedAt,
    CreatedAt,
    UpdatedAt,
}
