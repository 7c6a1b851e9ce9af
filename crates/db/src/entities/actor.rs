//! Actor entity (local and remote federated identities).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "actor")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Canonical global identifier. Exactly one row per IRI.
    #[sea_orm(unique)]
    pub iri: String,

    pub username: String,

    /// Host part of the IRI.
    pub domain: String,

    pub is_local: bool,

    /// Owning local user (local actors only)
    #[sea_orm(nullable, unique)]
    pub user_id: Option<String>,

    pub inbox_url: String,

    #[sea_orm(nullable)]
    pub shared_inbox_url: Option<String>,

    pub manually_approves_followers: bool,

    pub followers_count: i32,

    pub following_count: i32,

    #[sea_orm(nullable)]
    pub display_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,

    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub public_key_pem: Option<String>,

    /// When the remote profile was last fetched. Always `None` for local actors.
    #[sea_orm(nullable)]
    pub last_fetched_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::note::Entity")]
    Notes,
}

impl Related<super::note::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The actor's followers collection IRI.
    #[must_use]
    pub fn followers_iri(&self) -> String {
        format!("{}/followers", self.iri)
    }

    /// The inbox deliveries to this actor should target.
    #[must_use]
    pub fn delivery_inbox(&self) -> &str {
        self.shared_inbox_url.as_deref().unwrap_or(&self.inbox_url)
    }
}
