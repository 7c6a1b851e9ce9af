//! `ActivityPub` HTTP client.
//!
//! Fetches remote actor documents and posts activities to remote inboxes.
//! Requests are signed by an injected [`RequestSigner`] when one is set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fedigraph_common::{AppError, AppResult, FederationConfig};
use reqwest::{Client, Method, StatusCode, header};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    ActivityTransport, ActorProfile, DeliveryError, FetchError, RemoteActorFetcher, RequestSigner,
};

const ACTIVITY_JSON: &str = "application/activity+json";
const ACCEPT_ACTIVITY: &str =
    "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Longest error body kept in a [`DeliveryError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for remote servers.
#[derive(Clone)]
pub struct ApClient {
    client: Client,
    user_agent: String,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl ApClient {
    /// Create a client with the configured timeout and user agent.
    pub fn new(config: &FederationConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            signer: None,
        })
    }

    /// Sign every outgoing request with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Fetch a JSON document with the `ActivityStreams` accept header.
    pub async fn fetch_json(&self, url: &Url) -> Result<Value, FetchError> {
        debug!(url = %url, "Fetching remote document");

        let response = self
            .client
            .get(url.clone())
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, ACCEPT_ACTIVITY)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Transport(format!("{url} answered {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Invalid(format!("{url}: {e}")))
    }
}

#[async_trait]
impl RemoteActorFetcher for ApClient {
    async fn fetch(&self, iri: &Url) -> Result<ActorProfile, FetchError> {
        let document = self.fetch_json(iri).await?;
        ActorProfile::from_json(&document)
    }
}

#[async_trait]
impl ActivityTransport for ApClient {
    async fn deliver(&self, sender: &Url, inbox: &Url, body: &[u8]) -> Result<(), DeliveryError> {
        if !matches!(inbox.scheme(), "http" | "https") {
            return Err(DeliveryError::InvalidInbox(inbox.to_string()));
        }

        let mut request = self
            .client
            .request(Method::POST, inbox.clone())
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::CONTENT_TYPE, ACTIVITY_JSON)
            .header(header::ACCEPT, ACCEPT_ACTIVITY)
            .body(body.to_vec())
            .build()
            .map_err(|e| DeliveryError::InvalidInbox(format!("{inbox}: {e}")))?;

        if let Some(signer) = &self.signer {
            signer.sign(sender, &mut request).await?;
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(inbox = %inbox, status = %status, "Activity delivered");
            return Ok(());
        }
        if status == StatusCode::GONE {
            // The actor is gone; nothing left to deliver to.
            info!(inbox = %inbox, "Remote inbox is gone (410)");
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        warn!(inbox = %inbox, status = %status, "Remote inbox refused activity");
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_inbox() {
        let client = ApClient::new(&FederationConfig::default()).unwrap();
        let sender = Url::parse("https://local.example/users/alice").unwrap();
        let inbox = Url::parse("ftp://remote.example/inbox").unwrap();

        let result = client.deliver(&sender, &inbox, b"{}").await;

        assert!(matches!(result, Err(DeliveryError::InvalidInbox(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let config = FederationConfig {
            request_timeout_secs: 1,
            ..FederationConfig::default()
        };
        let client = ApClient::new(&config).unwrap();
        let iri = Url::parse("http://127.0.0.1:9/users/nobody").unwrap();

        let result = client.fetch(&iri).await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
