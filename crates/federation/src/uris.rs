//! IRIs minted for local actors, notes and activities.

use fedigraph_common::{AppError, AppResult};
use url::Url;

/// Builds and recognises IRIs under this instance's base URL.
///
/// | resource | pattern |
/// |---|---|
/// | actor | `{base}/users/{username}` |
/// | inbox | `{actor}/inbox` |
/// | shared inbox | `{base}/inbox` |
/// | followers | `{actor}/followers` |
/// | note | `{base}/notes/{note_id}` |
/// | Follow | `{follower}/follows/{target_id}` |
/// | Accept / Reject | `{target}/accepts/{follower_id}`, `{target}/rejects/{follower_id}` |
/// | Undo | `{activity}/undo` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUris {
    base: Url,
}

impl LocalUris {
    /// Create from the public base URL. Only `http` and `https` are accepted.
    pub fn new(base: Url) -> AppResult<Self> {
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(AppError::Config(format!("invalid base URL: {base}")));
        }
        Ok(Self { base })
    }

    /// Parse the public base URL.
    pub fn parse(base: &str) -> AppResult<Self> {
        let url = Url::parse(base).map_err(|e| AppError::Config(format!("{base}: {e}")))?;
        Self::new(url)
    }

    /// The base URL.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Whether `iri` is served by this instance.
    #[must_use]
    pub fn is_local(&self, iri: &Url) -> bool {
        iri.scheme() == self.base.scheme()
            && iri.host_str() == self.base.host_str()
            && iri.port_or_known_default() == self.base.port_or_known_default()
    }

    /// Host of this instance.
    #[must_use]
    pub fn domain(&self) -> String {
        crate::profile::host_of(&self.base)
    }

    #[must_use]
    pub fn actor(&self, username: &str) -> Url {
        append(&self.base, &["users", username])
    }

    #[must_use]
    pub fn inbox(actor: &Url) -> Url {
        append(actor, &["inbox"])
    }

    #[must_use]
    pub fn shared_inbox(&self) -> Url {
        append(&self.base, &["inbox"])
    }

    #[must_use]
    pub fn followers(actor: &Url) -> Url {
        append(actor, &["followers"])
    }

    #[must_use]
    pub fn note(&self, note_id: &str) -> Url {
        append(&self.base, &["notes", note_id])
    }

    #[must_use]
    pub fn create_activity(note: &Url) -> Url {
        append(note, &["activity"])
    }

    #[must_use]
    pub fn update_activity(note: &Url, updated_at_millis: i64) -> Url {
        append(note, &["activity", "update", &updated_at_millis.to_string()])
    }

    #[must_use]
    pub fn delete_activity(note: &Url) -> Url {
        append(note, &["activity", "delete"])
    }

    /// Follow id for one edge. A refollow creates a new edge and so a new id.
    #[must_use]
    pub fn follow_activity(follower: &Url, target_id: &str, edge_id: &str) -> Url {
        append(follower, &["follows", target_id, edge_id])
    }

    #[must_use]
    pub fn accept_activity(target: &Url, edge_id: &str) -> Url {
        append(target, &["accepts", edge_id])
    }

    #[must_use]
    pub fn reject_activity(target: &Url, edge_id: &str) -> Url {
        append(target, &["rejects", edge_id])
    }

    #[must_use]
    pub fn undo_activity(activity: &Url) -> Url {
        append(activity, &["undo"])
    }

    /// Username of a local actor IRI, if `iri` is one.
    #[must_use]
    pub fn local_username(&self, iri: &Url) -> Option<String> {
        match self.local_segments(iri)?.as_slice() {
            ["users", username] if !username.is_empty() => Some((*username).to_string()),
            _ => None,
        }
    }

    /// Split a Follow activity IRI minted here into the follower's username
    /// and the target actor id.
    #[must_use]
    pub fn parse_follow_activity(&self, iri: &Url) -> Option<(String, String)> {
        match self.local_segments(iri)?.as_slice() {
            ["users", username, "follows", target_id]
            | ["users", username, "follows", target_id, _] => {
                Some(((*username).to_string(), (*target_id).to_string()))
            }
            _ => None,
        }
    }

    fn local_segments<'a>(&self, iri: &'a Url) -> Option<Vec<&'a str>> {
        if !self.is_local(iri) || iri.query().is_some() {
            return None;
        }
        let prefix: Vec<&str> = self
            .base
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        let segments: Vec<&str> = iri.path_segments()?.filter(|s| !s.is_empty()).collect();
        if !segments.starts_with(&prefix) {
            return None;
        }
        Some(segments[prefix.len()..].to_vec())
    }
}

fn append(url: &Url, segments: &[&str]) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
