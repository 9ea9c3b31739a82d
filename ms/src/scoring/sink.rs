//! Callback receiving scores returned by the scorer

use async_trait::async_trait;
use eyre::Result;

use crate::domain::DomainId;

/// Score result returned by the scoring endpoint (summary scores and
/// whatever else the scorer includes)
pub type ScoreData = serde_json::Value;

/// Receives the synchronous score for each submitted comment
///
/// Implementations persist or act on the score. The dispatcher does nothing
/// after calling this.
#[async_trait]
pub trait ScoreSink: Send + Sync {
    async fn process_machine_score(
        &self,
        comment_id: DomainId,
        service_user_id: DomainId,
        score: ScoreData,
    ) -> Result<()>;
}
