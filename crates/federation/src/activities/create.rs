//! Create activity.

use activitypub_federation::kinds::activity::CreateType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::objects::ApNote;

/// `ActivityPub` Create activity.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivity {
    #[serde(rename = "type")]
    pub kind: CreateType,
    pub id: Url,
    pub actor: Url,
    pub object: ApNote,
    pub published: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,
}

impl CreateActivity {
    /// Create a new Create activity. Addressing is copied from the note.
    #[must_use]
    pub fn new(id: Url, actor: Url, object: ApNote) -> Self {
        Self {
            kind: CreateType::Create,
            id,
            actor,
            published: object.published,
            to: object.to.clone(),
            cc: object.cc.clone(),
            object,
        }
    }
}
