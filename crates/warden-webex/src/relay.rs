//! # Relay Inbox
//!
//! The platform delivers webhooks to a public URL. Instead of running a
//! server, callwarden creates an inbox on a webhook relay and reads the
//! deliveries back as one long-lived HTTP stream.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create | `POST <relay>/create/`, response `base_url` |
//! | target URL | `<base_url>in/` |
//! | stream | `GET <base_url>stream/` |
//! | keep-alive | `POST <base_url>refresh/` |
//!
//! The stream body is newline-delimited delivery envelopes, possibly
//! preceded by an `[opened]` line.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::info;
use warden_core::{CollaboratorResult, EventChannel, RelayConfig};
use warden_events::{ChunkSource, DecodeError};

use crate::client::check;
use crate::error::{Result, WebexError};

#[derive(Debug, Deserialize)]
struct CreateResponse {
    base_url: String,
}

/// An inbox on the webhook relay.
#[derive(Debug, Clone)]
pub struct RelayInbox {
    http: Client,
    api_base: String,
    base_url: String,
    request_timeout: Duration,
}

impl RelayInbox {
    /// Creates a fresh inbox on the relay at `api_base`.
    ///
    /// `timeout` bounds connection setup and the create and refresh
    /// requests. The stream itself has no deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay refuses or answers without a
    /// `base_url`.
    pub async fn create(api_base: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().connect_timeout(timeout).build()?;
        let api_base = api_base.trim_end_matches('/').to_string();
        let response = http
            .post(format!("{api_base}/create/"))
            .timeout(timeout)
            .send()
            .await?;
        let created: CreateResponse = check(response).await?.json().await?;
        if created.base_url.is_empty() {
            return Err(WebexError::InvalidResponse("empty base_url".to_string()));
        }

        let inbox = Self::from_parts(http, api_base, &created.base_url, timeout);
        match inbox.viewer_url() {
            Some(viewer) => info!(base_url = %inbox.base_url, viewer = %viewer, "relay inbox created"),
            None => info!(base_url = %inbox.base_url, "relay inbox created"),
        }
        Ok(inbox)
    }

    /// Creates an inbox using the `[relay]` section.
    ///
    /// # Errors
    ///
    /// See [`RelayInbox::create`].
    pub async fn from_config(config: &RelayConfig, timeout: Duration) -> Result<Self> {
        Self::create(&config.api_base, timeout).await
    }

    fn from_parts(http: Client, api_base: String, base_url: &str, request_timeout: Duration) -> Self {
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            http,
            api_base,
            base_url,
            request_timeout,
        }
    }

    /// The inbox base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Browser URL for watching deliveries, when the inbox id is known.
    #[must_use]
    pub fn viewer_url(&self) -> Option<String> {
        let id = self
            .base_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty() && !id.contains(':'))?;
        let site = self.api_base.replacen("://api.", "://", 1);
        Some(format!("{site}/view/{id}/"))
    }
}

/// A relay stream response read chunk by chunk.
struct ResponseSource {
    response: Response,
}

#[async_trait]
impl ChunkSource for ResponseSource {
    async fn next_chunk(&mut self) -> warden_events::Result<Option<Bytes>> {
        self.response
            .chunk()
            .await
            .map_err(|e| DecodeError::Transport(e.to_string()))
    }
}

#[async_trait]
impl EventChannel for RelayInbox {
    fn target_url(&self) -> String {
        format!("{}in/", self.base_url)
    }

    async fn open_stream(&self) -> CollaboratorResult<Box<dyn ChunkSource>> {
        let response = self
            .http
            .get(format!("{}stream/", self.base_url))
            .send()
            .await
            .map_err(WebexError::from)?;
        let response = check(response).await?;
        Ok(Box::new(ResponseSource { response }))
    }

    async fn keep_alive(&self) -> CollaboratorResult<()> {
        let response = self
            .http
            .post(format!("{}refresh/", self.base_url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(WebexError::from)?;
        check(response).await?;
        Ok(())
    }
}
