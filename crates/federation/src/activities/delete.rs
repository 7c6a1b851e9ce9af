//! Delete activity.

use activitypub_federation::kinds::activity::DeleteType;
use serde::{Deserialize, Serialize};
use url::Url;

/// `ActivityPub` Delete activity.
///
/// Carries only the object IRI, since the object may no longer be fetchable.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteActivity {
    #[serde(rename = "type")]
    pub kind: DeleteType,
    pub id: Url,
    pub actor: Url,
    pub object: Url,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,
}

impl DeleteActivity {
    /// Create a new Delete activity.
    #[must_use]
    pub const fn new(id: Url, actor: Url, object: Url, to: Vec<Url>, cc: Vec<Url>) -> Self {
        Self {
            kind: DeleteType::Delete,
            id,
            actor,
            object,
            to,
            cc,
        }
    }
}
