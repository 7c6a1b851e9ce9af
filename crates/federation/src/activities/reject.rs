//! Reject activity.

use activitypub_federation::kinds::activity::RejectType;
use activitypub_federation::protocol::helpers::deserialize_one_or_many;
use serde::{Deserialize, Serialize};
use url::Url;

use super::FollowObject;

/// `ActivityPub` Reject activity.
/// Used to refuse a Follow request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectActivity {
    #[serde(rename = "type")]
    pub kind: RejectType,
    pub id: Url,
    pub actor: Url,
    pub object: FollowObject,

    #[serde(
        default,
        deserialize_with = "deserialize_one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub to: Vec<Url>,
}

impl RejectActivity {
    /// Create a new Reject activity.
    #[must_use]
    pub fn new(id: Url, actor: Url, object: impl Into<FollowObject>) -> Self {
        Self {
            kind: RejectType::Reject,
            id,
            actor,
            object: object.into(),
            to: Vec::new(),
        }
    }

    /// Address the activity.
    #[must_use]
    pub fn to(mut self, to: Vec<Url>) -> Self {
        self.to = to;
        self
    }
}
