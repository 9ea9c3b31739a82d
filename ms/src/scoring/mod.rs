//! Automated scoring of comments
//!
//! [`build_payload`] shapes a comment and its context into the request body
//! scorers expect. [`ScoringDispatcher`] POSTs it to a service user's
//! endpoint and passes the synchronous score to a [`ScoreSink`].

mod dispatcher;
mod error;
mod payload;
mod sink;

pub use dispatcher::{ScoringDispatcher, create_shim};
pub use error::ScoringError;
pub use payload::{ArticlePayload, CallbackLinks, CommentPayload, ScoringRequest, SelfLink, build_payload, strip_tags};
pub use sink::{ScoreData, ScoreSink};
