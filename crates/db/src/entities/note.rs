//! Note entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Addressing policy of a note.
///
/// Stored as free text in `note.visibility` so rows written by other
/// software (e.g. `specified`, `home`) still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Followers,
    Direct,
}

impl Visibility {
    /// Column value for this visibility.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Followers => "followers",
            Self::Direct => "direct",
        }
    }

    /// Parse a column value. Unrecognised values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "unlisted" => Some(Self::Unlisted),
            "followers" => Some(Self::Followers),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// A mentioned actor, stored as `{"iri": ...}` in the `mentions` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub iri: String,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "note")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub author_id: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Content warning
    #[sea_orm(nullable)]
    pub summary: Option<String>,

    /// Raw visibility; see [`Model::effective_visibility`].
    #[sea_orm(nullable)]
    pub visibility: Option<String>,

    /// JSON array of [`Mention`].
    #[sea_orm(column_type = "Json")]
    pub mentions: Json,

    pub sensitive: bool,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::actor::Entity",
        from = "Column::AuthorId",
        to = "super::actor::Column::Id",
        on_delete = "Restrict"
    )]
    Author,
}

impl Related<super::actor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Visibility with unset and unknown values resolved to public.
    #[must_use]
    pub fn effective_visibility(&self) -> Visibility {
        self.visibility
            .as_deref()
            .and_then(Visibility::parse)
            .unwrap_or(Visibility::Public)
    }

    /// Decode the mentions column. Malformed entries are skipped.
    #[must_use]
    pub fn mention_list(&self) -> Vec<Mention> {
        match &self.mentions {
            Json::Array(items) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn note(visibility: Option<&str>, mentions: Json) -> Model {
        Model {
            id: "n1".to_string(),
            author_id: "a1".to_string(),
            content: "hello".to_string(),
            summary: None,
            visibility: visibility.map(str::to_string),
            mentions,
            sensitive: false,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_unset_visibility_is_public() {
        assert_eq!(note(None, json!([])).effective_visibility(), Visibility::Public);
        assert_eq!(
            note(Some("direct"), json!([])).effective_visibility(),
            Visibility::Direct
        );
    }

    #[test]
    fn test_unknown_visibility_is_public() {
        for raw in ["specified", "home", "", "PUBLIC"] {
            assert_eq!(
                note(Some(raw), json!([])).effective_visibility(),
                Visibility::Public,
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_visibility_column_values_parse_back() {
        for v in [
            Visibility::Public,
            Visibility::Unlisted,
            Visibility::Followers,
            Visibility::Direct,
        ] {
            assert_eq!(Visibility::parse(v.as_str()), Some(v));
        }
    }

    #[test]
    fn test_mention_list_skips_malformed() {
        let n = note(
            None,
            json!([{"iri": "https://remote.example/users/b"}, {"name": "x"}, 3]),
        );
        assert_eq!(
            n.mention_list(),
            vec![Mention {
                iri: "https://remote.example/users/b".to_string()
            }]
        );
    }
}
