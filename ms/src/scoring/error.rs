//! Scoring error types

use thiserror::Error;

use crate::domain::DomainId;
use crate::store::StoreError;

/// Errors that can occur while submitting a comment for scoring
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("No article for comment {comment_id}. Can't score.")]
    MissingArticle { comment_id: DomainId, article_id: DomainId },

    #[error("Parent comment {parent_id} missing for comment {comment_id}. Can't score.")]
    MissingParent { comment_id: DomainId, parent_id: DomainId },

    #[error("Comment {comment_id}: server failed to score (status {status})")]
    Upstream {
        comment_id: DomainId,
        status: u16,
        body: String,
    },

    #[error("Comment {comment_id}: request to scorer failed: {source}")]
    Transport {
        comment_id: DomainId,
        #[source]
        source: reqwest::Error,
    },

    #[error("Comment {comment_id}: invalid score response: {source}")]
    InvalidResponse {
        comment_id: DomainId,
        #[source]
        source: reqwest::Error,
    },

    #[error("Comment {comment_id}: score callback failed: {source}")]
    Callback {
        comment_id: DomainId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scoring auth token not found. Set scoring.auth or the {0} environment variable.")]
    MissingAuth(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Invalid markup pattern: {0}")]
    Markup(#[source] regex::Error),
}

impl ScoringError {
    /// Referenced data is missing; retrying will not help
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ScoringError::MissingArticle { .. } | ScoringError::MissingParent { .. }
        )
    }

    /// The scoring endpoint failed or could not be reached
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ScoringError::Upstream { .. } | ScoringError::Transport { .. } | ScoringError::InvalidResponse { .. }
        )
    }

    /// The comment this error concerns, when known
    pub fn comment_id(&self) -> Option<DomainId> {
        match self {
            ScoringError::MissingArticle { comment_id, .. }
            | ScoringError::MissingParent { comment_id, .. }
            | ScoringError::Upstream { comment_id, .. }
            | ScoringError::Transport { comment_id, .. }
            | ScoringError::InvalidResponse { comment_id, .. }
            | ScoringError::Callback { comment_id, .. } => Some(*comment_id),
            ScoringError::Store(_)
            | ScoringError::MissingAuth(_)
            | ScoringError::Client(_)
            | ScoringError::Markup(_) => None,
        }
    }
}
