//! Sends comments to per-service-user scoring endpoints

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use tracing::{debug, error, info};

use super::error::ScoringError;
use super::payload::build_payload;
use super::sink::{ScoreData, ScoreSink};
use crate::config::Config;
use crate::domain::{Comment, ServiceUser};
use crate::store::ContentStore;

/// Submits comments for automated scoring and hands each score to a
/// [`ScoreSink`]
///
/// Every call is a single attempt. Retry and backoff are left to the caller.
pub struct ScoringDispatcher {
    api_url: String,
    auth: String,
    http: Client,
    content: Arc<dyn ContentStore>,
    sink: Arc<dyn ScoreSink>,
}

impl std::fmt::Debug for ScoringDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringDispatcher")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Build a dispatcher from configuration
///
/// Resolves the API base URL and auth token, and applies the configured
/// request timeout.
pub fn create_shim(
    config: &Config,
    content: Arc<dyn ContentStore>,
    sink: Arc<dyn ScoreSink>,
) -> Result<ScoringDispatcher, ScoringError> {
    debug!("create_shim: called");
    let auth = config
        .scoring
        .get_auth()
        .ok_or_else(|| ScoringError::MissingAuth(config.scoring.auth_env.clone()))?;
    ScoringDispatcher::new(&config.api.api_url(), auth, config.scoring.timeout(), content, sink)
}

impl ScoringDispatcher {
    pub fn new(
        api_url: &str,
        auth: impl Into<String>,
        timeout: Duration,
        content: Arc<dyn ContentStore>,
        sink: Arc<dyn ScoreSink>,
    ) -> Result<Self, ScoringError> {
        debug!(%api_url, ?timeout, "ScoringDispatcher::new: called");
        let http = Client::builder().timeout(timeout).build().map_err(ScoringError::Client)?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            auth: auth.into(),
            http,
            content,
            sink,
        })
    }

    /// Base URL used for self and callback links
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Score a single comment
    ///
    /// `correlator` is echoed in the callback link so the scorer can match
    /// any out-of-band response to this request. On a 200 response the body
    /// is passed to the sink; any other status is an upstream failure and the
    /// sink is not called.
    pub async fn send_to_scorer(
        &self,
        comment: &Comment,
        service_user: &ServiceUser,
        correlator: &str,
    ) -> Result<(), ScoringError> {
        debug!(comment_id = %comment.id, service_user_id = %service_user.id, "ScoringDispatcher::send_to_scorer: called");

        let Some(article) = self.content.find_article(comment.article_id).await? else {
            error!(
                comment_id = %comment.id,
                article_id = %comment.article_id,
                "send_to_scorer: Article not found for comment"
            );
            return Err(ScoringError::MissingArticle {
                comment_id: comment.id,
                article_id: comment.article_id,
            });
        };

        let parent = match comment.reply_to_id {
            Some(parent_id) => match self.content.find_comment(parent_id).await? {
                Some(parent) => Some(parent),
                None => {
                    error!(comment_id = %comment.id, %parent_id, "send_to_scorer: Parent comment not found");
                    return Err(ScoringError::MissingParent {
                        comment_id: comment.id,
                        parent_id,
                    });
                }
            },
            None => None,
        };

        let payload = build_payload(comment, &article, &self.api_url, correlator, parent.as_ref())?;

        info!(
            comment_id = %comment.id,
            service_user_id = %service_user.id,
            endpoint = %service_user.endpoint,
            ?payload,
            "Sending comment for scoring"
        );

        let response = self
            .http
            .post(&service_user.endpoint)
            .header(AUTHORIZATION, self.auth.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|source| {
                error!(comment_id = %comment.id, error = %source, "send_to_scorer: request failed");
                ScoringError::Transport {
                    comment_id: comment.id,
                    source,
                }
            })?;

        let status = response.status().as_u16();
        info!(comment_id = %comment.id, %status, "Scoring endpoint response");

        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            error!(comment_id = %comment.id, %status, %body, "Error posting comment for scoring");
            return Err(ScoringError::Upstream {
                comment_id: comment.id,
                status,
                body,
            });
        }

        let score: ScoreData = response.json().await.map_err(|source| ScoringError::InvalidResponse {
            comment_id: comment.id,
            source,
        })?;

        self.sink
            .process_machine_score(comment.id, service_user.id, score)
            .await
            .map_err(|e| ScoringError::Callback {
                comment_id: comment.id,
                source: e.into(),
            })
    }
}
