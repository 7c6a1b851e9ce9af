//! Follow entity (directed, stateful edge between two actors).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persisted follow status.
///
/// Rejected and undone edges are deleted, so only live states are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "follow")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The actor who is following
    pub follower_id: String,

    /// The actor being followed
    pub following_id: String,

    pub status: FollowStatus,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub accepted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::actor::Entity",
        from = "Column::FollowerId",
        to = "super::actor::Column::Id",
        on_delete = "Restrict"
    )]
    Follower,

    #[sea_orm(
        belongs_to = "super::actor::Entity",
        from = "Column::FollowingId",
        to = "super::actor::Column::Id",
        on_delete = "Restrict"
    )]
    Following,
}

impl ActiveModelBehavior for ActiveModel {}
