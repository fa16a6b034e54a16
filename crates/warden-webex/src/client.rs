//! # Platform REST Client
//!
//! Bearer-token client for the calling platform API. Implements the
//! identity, subscription, termination and notification collaborators.
//!
//! | Collaborator | Request |
//! |--------------|---------|
//! | `IdentityResolver::resolve` | `GET people?email=<email>`, first item |
//! | `SubscriptionManager::create_subscription` | `POST webhooks` |
//! | `SubscriptionManager::delete_all` | `GET webhooks?max=100`, then `DELETE webhooks/<id>` each |
//! | `TerminationCommand::terminate` | `DELETE callMemberships/<id>` |
//! | `Notifier::send_direct_message` | `POST messages` with `toPersonId` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_core::{
    CollaboratorError, CollaboratorResult, IdentityResolver, MembershipId, Notifier, PersonId,
    PlatformConfig, SubscriptionManager, SubscriptionSpec, TerminationCommand,
};

use crate::error::{Result, WebexError};

/// Page size used when listing feeds for deletion.
pub const WEBHOOK_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Person {
    id: String,
}

/// A registered feed, as returned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// Feed id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Where the feed delivers.
    #[serde(default)]
    pub target_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest<'a> {
    #[serde(flatten)]
    spec: &'a SubscriptionSpec,
    target_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectMessage<'a> {
    to_person_id: &'a PersonId,
    text: &'a str,
}

/// Client for the calling platform REST API.
#[derive(Debug, Clone)]
pub struct WebexClient {
    http: Client,
    api_base: String,
    token: String,
}

impl WebexClient {
    /// Creates a client for `api_base` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or the HTTP client cannot
    /// be built.
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(WebexError::Config("access token is empty".to_string()));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Creates a client from the `[platform]` section.
    ///
    /// # Errors
    ///
    /// Returns [`WebexError::Config`] if no token is configured.
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        let token = config
            .token()
            .map_err(|e| WebexError::Config(e.to_string()))?;
        Self::new(&config.api_base, token, config.request_timeout())
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Looks up the person registered under `email`.
    ///
    /// # Errors
    ///
    /// Returns [`WebexError::NotFound`] if no person matches.
    pub async fn lookup_person(&self, email: &str) -> Result<PersonId> {
        let response = self
            .request(Method::GET, "people")
            .query(&[("email", email)])
            .send()
            .await?;
        let people: ListResponse<Person> = check(response).await?.json().await?;
        people
            .items
            .into_iter()
            .next()
            .map(|person| PersonId::new(person.id))
            .ok_or_else(|| WebexError::NotFound(email.to_string()))
    }

    /// Registers one feed. Returns the created feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the registration.
    pub async fn create_webhook(&self, spec: &SubscriptionSpec, target_url: &str) -> Result<Webhook> {
        let body = WebhookRequest { spec, target_url };
        let response = self
            .request(Method::POST, "webhooks")
            .json(&body)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Lists up to `max` registered feeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list_webhooks(&self, max: u32) -> Result<Vec<Webhook>> {
        let response = self
            .request(Method::GET, "webhooks")
            .query(&[("max", max)])
            .send()
            .await?;
        let list: ListResponse<Webhook> = check(response).await?.json().await?;
        Ok(list.items)
    }

    /// Deletes one feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub async fn delete_webhook(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("webhooks/{id}"))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Hangs up one call membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses.
    pub async fn hang_up(&self, membership: &MembershipId) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("callMemberships/{membership}"))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Sends a direct message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is rejected.
    pub async fn send_message(&self, person: &PersonId, text: &str) -> Result<()> {
        let body = DirectMessage {
            to_person_id: person,
            text,
        };
        let response = self
            .request(Method::POST, "messages")
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
    }
}

/// Passes success responses through; turns the rest into errors.
pub(crate) async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(WebexError::status(status.as_u16(), body))
}

#[async_trait]
impl IdentityResolver for WebexClient {
    async fn resolve(&self, email: &str) -> CollaboratorResult<PersonId> {
        Ok(self.lookup_person(email).await?)
    }
}

#[async_trait]
impl SubscriptionManager for WebexClient {
    async fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
        target_url: &str,
    ) -> CollaboratorResult<String> {
        Ok(self.create_webhook(spec, target_url).await?.id)
    }

    async fn delete_all(&self) -> CollaboratorResult<usize> {
        let hooks = self.list_webhooks(WEBHOOK_PAGE_SIZE).await?;
        let mut removed = 0;
        let mut last_error = None;
        for hook in hooks {
            match self.delete_webhook(&hook.id).await {
                Ok(()) => {
                    debug!(webhook_id = %hook.id, name = %hook.name, "webhook deleted");
                    removed += 1;
                }
                Err(error) => {
                    warn!(webhook_id = %hook.id, error = %error, "webhook delete failed");
                    last_error = Some(error);
                }
            }
        }
        match last_error {
            Some(error) if removed == 0 => Err(CollaboratorError::from(error)),
            _ => Ok(removed),
        }
    }
}

#[async_trait]
impl TerminationCommand for WebexClient {
    async fn terminate(&self, membership: &MembershipId) -> CollaboratorResult<()> {
        Ok(self.hang_up(membership).await?)
    }
}

#[async_trait]
impl Notifier for WebexClient {
    async fn send_direct_message(&self, person: &PersonId, text: &str) -> CollaboratorResult<()> {
        Ok(self.send_message(person, text).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve_once;
    use warden_core::subscription_plan;

    fn client(base: &str) -> WebexClient {
        WebexClient::new(base, "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let client = client("https://webexapis.com/v1/");
        assert_eq!(client.url("people"), "https://webexapis.com/v1/people");
        assert_eq!(
            client.url("/callMemberships/m1"),
            "https://webexapis.com/v1/callMemberships/m1"
        );
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = WebexClient::new("https://webexapis.com/v1", " ", Duration::from_secs(1));
        assert!(matches!(err, Err(WebexError::Config(_))));
    }

    #[test]
    fn test_webhook_request_shape() {
        let plan = subscription_plan(&[PersonId::new("p1")]);
        let body = serde_json::to_value(WebhookRequest {
            spec: &plan[0],
            target_url: "http://relay/in/",
        })
        .unwrap();

        assert_eq!(body["resource"], "callMemberships");
        assert_eq!(body["event"], "created");
        assert_eq!(body["filter"], "status=joined&personId=p1");
        assert_eq!(body["ownedBy"], "org");
        assert_eq!(body["targetUrl"], "http://relay/in/");
    }

    #[test]
    fn test_direct_message_shape() {
        let person = PersonId::new("p1");
        let body = serde_json::to_value(DirectMessage {
            to_person_id: &person,
            text: "hi",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "toPersonId": "p1", "text": "hi" }));
    }

    #[tokio::test]
    async fn test_lookup_person_takes_first_item() {
        let (base, request) = serve_once(200, r#"{"items":[{"id":"p1"},{"id":"p2"}]}"#).await;

        let person = client(&base).lookup_person("a@example.com").await.unwrap();

        assert_eq!(person, PersonId::new("p1"));
        let request = request.await.unwrap();
        assert!(request.starts_with("GET /people?email=a%40example.com "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_lookup_person_empty_is_not_found() {
        let (base, _request) = serve_once(200, r#"{"items":[]}"#).await;

        let err = client(&base).resolve("a@example.com").await.unwrap_err();

        assert_eq!(err, CollaboratorError::NotFound("a@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_hang_up_failure_maps_status() {
        let (base, request) = serve_once(409, "conflict").await;

        let err = client(&base)
            .terminate(&MembershipId::new("m1"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CollaboratorError::Status {
                code: 409,
                body: "conflict".to_string()
            }
        );
        assert!(request.await.unwrap().starts_with("DELETE /callMemberships/m1 "));
    }
}
