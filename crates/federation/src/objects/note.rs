//! `ActivityPub` Note object.

use activitypub_federation::kinds::{link::MentionType, object::NoteType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// `ActivityPub` Note object.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApNote {
    #[serde(rename = "type")]
    pub kind: NoteType,
    pub id: Url,
    pub attributed_to: Url,
    pub content: String,
    pub published: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub sensitive: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<ApTag>,
}

/// `ActivityPub` mention tag.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApTag {
    #[serde(rename = "type")]
    pub kind: MentionType,
    pub href: Url,
}

impl ApTag {
    /// A mention of `href`.
    #[must_use]
    pub const fn mention(href: Url) -> Self {
        Self {
            kind: MentionType::Mention,
            href,
        }
    }
}
