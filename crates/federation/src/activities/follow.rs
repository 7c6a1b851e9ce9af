//! Follow activity.

use activitypub_federation::kinds::activity::FollowType;
use serde::{Deserialize, Serialize};
use url::Url;

/// `ActivityPub` Follow activity.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowActivity {
    #[serde(rename = "type")]
    pub kind: FollowType,
    pub id: Url,
    pub actor: Url,
    pub object: Url,
}

impl FollowActivity {
    /// Create a new Follow activity.
    #[must_use]
    pub const fn new(id: Url, actor: Url, object: Url) -> Self {
        Self {
            kind: FollowType::Follow,
            id,
            actor,
            object,
        }
    }
}

/// The Follow referenced by an Accept, Reject or Undo.
///
/// Most servers embed the whole Follow; some send only its id.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FollowObject {
    Activity(FollowActivity),
    Id(Url),
}

impl FollowObject {
    /// The Follow activity's id.
    #[must_use]
    pub const fn id(&self) -> &Url {
        match self {
            Self::Activity(follow) => &follow.id,
            Self::Id(id) => id,
        }
    }
}

impl From<FollowActivity> for FollowObject {
    fn from(follow: FollowActivity) -> Self {
        Self::Activity(follow)
    }
}
