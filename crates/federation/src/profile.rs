//! Remote actor profiles as returned by a [`crate::RemoteActorFetcher`].

#![allow(missing_docs)]

use serde_json::Value;
use url::Url;

use crate::FetchError;

/// The fields of a remote actor document this crate stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorProfile {
    pub id: Url,
    pub preferred_username: String,
    pub inbox: Url,
    pub shared_inbox: Option<Url>,
    pub manually_approves_followers: bool,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub icon: Option<String>,
    pub public_key_pem: Option<String>,
}

impl ActorProfile {
    /// Parse an actor document.
    pub fn from_json(json: &Value) -> Result<Self, FetchError> {
        let id = url_field(json.get("id"))
            .ok_or_else(|| FetchError::Invalid("missing or invalid id".to_string()))?;
        let preferred_username = json
            .get("preferredUsername")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::Invalid(format!("{id}: missing preferredUsername")))?
            .to_string();
        let inbox = url_field(json.get("inbox"))
            .ok_or_else(|| FetchError::Invalid(format!("{id}: missing or invalid inbox")))?;

        // Mastodon puts the shared inbox under endpoints; some servers use a top-level field
        let shared_inbox = url_field(json.get("endpoints").and_then(|e| e.get("sharedInbox")))
            .or_else(|| url_field(json.get("sharedInbox")));

        let manually_approves_followers = json
            .get("manuallyApprovesFollowers")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let name = string_field(json.get("name"));
        let summary = string_field(json.get("summary"));

        let icon = json
            .get("icon")
            .and_then(|i| {
                if i.is_object() {
                    i.get("url").and_then(Value::as_str)
                } else {
                    i.as_str()
                }
            })
            .map(String::from);

        let public_key_pem = json
            .get("publicKey")
            .and_then(|k| k.get("publicKeyPem"))
            .and_then(Value::as_str)
            .map(String::from);

        Ok(Self {
            id,
            preferred_username,
            inbox,
            shared_inbox,
            manually_approves_followers,
            name,
            summary,
            icon,
            public_key_pem,
        })
    }

    /// Host of the actor IRI.
    #[must_use]
    pub fn domain(&self) -> String {
        host_of(&self.id)
    }
}

/// Host of a URL, including a non-default port.
#[must_use]
pub fn host_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

fn url_field(value: Option<&Value>) -> Option<Url> {
    value.and_then(Value::as_str).and_then(|s| Url::parse(s).ok())
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(String::from)
}
