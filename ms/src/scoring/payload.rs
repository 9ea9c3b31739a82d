//! Outbound scoring request and the builder that shapes it

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ScoringError;
use crate::domain::{Article, Comment, DomainId};

/// HTML comments, then tags, then a tag left open at the end of the input.
/// Quoted attribute values may contain `>`. A `<` not followed by a tag name
/// is left alone (`1 < 2`).
const TAG_REGEX: &str = r#"(?s)<!--.*?-->|</?[A-Za-z!][^>"']*(?:(?:"[^"]*"|'[^']*')[^>"']*)*>|</?[A-Za-z!][^>]*\z"#;

static TAG_PATTERN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(TAG_REGEX));

/// Body POSTed to a scoring endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRequest {
    /// Ask for the score in the response body, not only via callback
    pub sync: bool,
    pub include_summary_scores: bool,
    pub comment: CommentPayload,
    pub article: ArticlePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_comment: Option<CommentPayload>,
    pub links: CallbackLinks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub comment_id: DomainId,
    pub plain_text: String,
    pub html_text: String,
    pub links: SelfLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePayload {
    pub article_id: DomainId,
    pub plain_text: String,
    pub links: SelfLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfLink {
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackLinks {
    pub callback: String,
}

impl CommentPayload {
    fn from_comment(comment: &Comment, api_url: &str) -> Result<Self, ScoringError> {
        Ok(Self {
            comment_id: comment.id,
            plain_text: strip_tags(&comment.text)?,
            html_text: comment.text.clone(),
            links: SelfLink {
                self_link: format!("{}/rest/comments/{}", api_url, comment.id),
            },
        })
    }
}

/// Build the request for `comment`
///
/// `api_url` must already have its trailing slash trimmed. `parent` is the
/// comment being replied to, if any; the caller resolves it.
pub fn build_payload(
    comment: &Comment,
    article: &Article,
    api_url: &str,
    correlator: &str,
    parent: Option<&Comment>,
) -> Result<ScoringRequest, ScoringError> {
    debug!(comment_id = %comment.id, article_id = %article.id, %correlator, "build_payload: called");
    Ok(ScoringRequest {
        sync: true,
        include_summary_scores: true,
        comment: CommentPayload::from_comment(comment, api_url)?,
        article: ArticlePayload {
            article_id: article.id,
            plain_text: strip_tags(&article.text)?,
            links: SelfLink {
                self_link: format!("{}/rest/articles/{}", api_url, article.id),
            },
        },
        in_reply_to_comment: parent
            .map(|parent| CommentPayload::from_comment(parent, api_url))
            .transpose()?,
        links: CallbackLinks {
            callback: format!("{}/assistant/scores/{}", api_url, correlator),
        },
    })
}

/// Remove markup tags and HTML comments, keeping text and entities
///
/// A tag still open at the end of the input is dropped along with
/// everything after its `<`.
pub fn strip_tags(html: &str) -> Result<String, ScoringError> {
    let pattern = TAG_PATTERN.as_ref().map_err(|e| ScoringError::Markup(e.clone()))?;
    Ok(pattern.replace_all(html, "").into_owned())
}
