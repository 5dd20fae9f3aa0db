//! Long-text fetch-and-post.
//!
//! For a qualifying status the pipeline fetches its extended content from the
//! long-text API and, when there is any, posts it to the publishing API. The
//! same operation serves the handler's first attempt and every retry.
//!
//! Fetch is a GET on the configured fetch URL with `mids=<message id>` added
//! to its query and the configured credential in the `Authorization` header.
//! The response maps message id strings to [`LongText`] entries.
//!
//! Post is a GET on the configured post URL with the query
//! `action=write&company=weibo&uid=..&mid=..&title=title<mid>&content=..`.
//! Only HTTP 200 counts as success.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::{HttpClientConfig, LongTextConfig};
use crate::constants::{POST_ACTION, POST_COMPANY};
use crate::errors::PublishError;

/// One entry of the long-text fetch response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LongText {
    #[serde(rename = "longTextContent", default)]
    pub long_text_content: String,
    #[serde(rename = "pic_ids", default)]
    pub pic_ids: Vec<String>,
}

/// Successful outcomes of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Content was fetched and the post endpoint returned 200.
    Posted,
    /// The status has no long text; nothing was posted.
    NothingToPost,
}

#[async_trait]
pub trait LongTextPublisher: Send + Sync {
    /// Fetch the long text for `message_id` and post it on behalf of
    /// `author_id`. Any error is retryable.
    async fn publish(&self, author_id: u64, message_id: u64)
    -> Result<PublishOutcome, PublishError>;
}

/// Builds the HTTP client shared by every ingester.
pub fn build_http_client(config: &HttpClientConfig) -> Result<reqwest::Client, PublishError> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(*config.timeout.as_ref())
        .connect_timeout(*config.connect_timeout.as_ref())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()
        .map_err(PublishError::ClientCreationFailed)
}

/// [`LongTextPublisher`] over the long-text and posting HTTP APIs.
pub struct HttpLongTextPublisher {
    http_client: Arc<reqwest::Client>,
    fetch_url: url::Url,
    post_url: url::Url,
    auth: String,
}

impl HttpLongTextPublisher {
    pub fn new(http_client: Arc<reqwest::Client>, config: &LongTextConfig) -> Self {
        Self {
            http_client,
            fetch_url: config.fetch_url.clone(),
            post_url: config.post_url.clone(),
            auth: config.auth.clone(),
        }
    }

    /// Returns the long text for `message_id`; empty when there is none.
    async fn fetch(&self, message_id: u64) -> Result<String, PublishError> {
        let response = self
            .http_client
            .get(self.fetch_url.clone())
            .query(&[("mids", message_id)])
            .header(reqwest::header::AUTHORIZATION, &self.auth)
            .send()
            .await
            .map_err(PublishError::FetchFailed)?;

        if response.status() != StatusCode::OK {
            return Err(PublishError::FetchStatus {
                status_code: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(PublishError::FetchFailed)?;
        if body.is_empty() {
            return Ok(String::new());
        }

        let mut entries: HashMap<String, LongText> =
            serde_json::from_slice(&body).map_err(PublishError::FetchDecode)?;
        Ok(entries
            .remove(&message_id.to_string())
            .map(|entry| entry.long_text_content)
            .unwrap_or_default())
    }

    async fn post(&self, author_id: u64, message_id: u64, content: &str) -> Result<(), PublishError> {
        let uid = author_id.to_string();
        let mid = message_id.to_string();
        let title = format!("title{}", message_id);

        let response = self
            .http_client
            .get(self.post_url.clone())
            .query(&[
                ("action", POST_ACTION),
                ("company", POST_COMPANY),
                ("uid", uid.as_str()),
                ("mid", mid.as_str()),
                ("title", title.as_str()),
                ("content", content),
            ])
            .send()
            .await
            .map_err(PublishError::PostFailed)?;

        let status = response.status();
        // Drain the body so the connection goes back to the pool.
        let _ = response.bytes().await;

        if status != StatusCode::OK {
            return Err(PublishError::PostStatus {
                status_code: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LongTextPublisher for HttpLongTextPublisher {
    #[instrument(skip(self), err(level = "debug"))]
    async fn publish(
        &self,
        author_id: u64,
        message_id: u64,
    ) -> Result<PublishOutcome, PublishError> {
        let content = self.fetch(message_id).await?;
        if content.is_empty() {
            debug!(author_id, message_id, "No long text to post");
            return Ok(PublishOutcome::NothingToPost);
        }

        self.post(author_id, message_id, &content).await?;
        info!(author_id, message_id, "Posted long text");
        Ok(PublishOutcome::Posted)
    }
}
