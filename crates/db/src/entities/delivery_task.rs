//! Delivery task entity (persisted retry queue entry).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryTaskStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Gave up after the maximum number of attempts.
    #[sea_orm(string_value = "dead")]
    Dead,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_task")]
pub struct Model {
    /// ULID, so ordering by id is enqueue order.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub activity_id: String,

    /// The object the activity is about. Tasks for the same object and inbox
    /// are delivered oldest first.
    pub object_id: String,

    /// Actor IRI the activity is sent on behalf of
    pub sender_iri: String,

    pub inbox_url: String,

    #[sea_orm(column_type = "Json")]
    pub payload: Json,

    /// Number of failed attempts so far
    pub attempt: i32,

    pub status: DeliveryTaskStatus,

    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,

    pub next_attempt_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
