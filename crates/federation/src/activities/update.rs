//! Update activity.

use activitypub_federation::kinds::activity::UpdateType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::objects::ApNote;

/// `ActivityPub` Update activity for a note.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActivity {
    #[serde(rename = "type")]
    pub kind: UpdateType,
    pub id: Url,
    pub actor: Url,
    /// The note as it is after the edit.
    pub object: ApNote,
    pub published: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,
}

impl UpdateActivity {
    /// Create a new Update activity. Addressing is copied from the note.
    #[must_use]
    pub fn new(id: Url, actor: Url, object: ApNote, published: DateTime<Utc>) -> Self {
        Self {
            kind: UpdateType::Update,
            id,
            actor,
            published,
            to: object.to.clone(),
            cc: object.cc.clone(),
            object,
        }
    }
}
