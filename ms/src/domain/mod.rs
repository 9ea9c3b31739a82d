//! Domain types consumed by the coordinator and the scoring dispatcher
//!
//! These mirror the rows the surrounding moderation system stores. Only the
//! fields this crate reads are modelled.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier for articles, comments and users
pub type DomainId = u64;

/// An article that comments are attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: DomainId,
    /// Article body, may contain HTML
    pub text: String,
}

impl Article {
    pub fn new(id: DomainId, text: impl Into<String>) -> Self {
        Self { id, text: text.into() }
    }
}

/// A user comment on an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: DomainId,
    #[serde(rename = "article-id")]
    pub article_id: DomainId,
    /// Comment body, may contain HTML
    pub text: String,
    /// Parent comment when this comment is a reply
    #[serde(rename = "reply-to-id", default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<DomainId>,
}

impl Comment {
    /// Create a top-level comment
    pub fn new(id: DomainId, article_id: DomainId, text: impl Into<String>) -> Self {
        Self {
            id,
            article_id,
            text: text.into(),
            reply_to_id: None,
        }
    }

    /// Mark this comment as a reply to `parent_id`
    pub fn in_reply_to(mut self, parent_id: DomainId) -> Self {
        debug!(comment_id = %self.id, %parent_id, "Comment::in_reply_to: called");
        self.reply_to_id = Some(parent_id);
        self
    }
}

/// An external scoring destination
///
/// Service users are ordinary user rows whose endpoint points at an automated
/// scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUser {
    pub id: DomainId,
    pub endpoint: String,
}

impl ServiceUser {
    pub fn new(id: DomainId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_reply_builder() {
        let comment = Comment::new(7, 1, "hello");
        assert_eq!(comment.reply_to_id, None);

        let reply = Comment::new(8, 1, "hi back").in_reply_to(7);
        assert_eq!(reply.reply_to_id, Some(7));
    }

    #[test]
    fn test_comment_serialization_omits_missing_parent() {
        let json = serde_json::to_string(&Comment::new(3, 1, "text")).unwrap();
        assert!(json.contains("article-id"));
        assert!(!json.contains("reply-to-id"));
    }
}
