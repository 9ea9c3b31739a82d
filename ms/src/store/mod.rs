//! Storage collaborators
//!
//! Two narrow traits describe what the rest of the crate needs from the
//! persistence layer:
//! - [`CounterStore`] - the shared Counter Record used as a cross-process dirty flag
//! - [`ContentStore`] - id lookups for articles, comments and service users
//!
//! [`SqliteStore`] backs both with a single database file that every process
//! opens. [`MemoryStore`] keeps everything in-process and can be shared between
//! several coordinators to simulate several processes.

use async_trait::async_trait;

use crate::domain::{Article, Comment, DomainId, ServiceUser};

mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::{CounterRecord, SqliteStore};

/// Fixed key of the singleton Counter Record
pub const COUNTER_RECORD_ID: i64 = 1;

/// Value the Counter Record is created with
pub const COUNTER_INITIAL_VALUE: u64 = 1;

/// Access to the shared Counter Record
///
/// Both methods create the record lazily (with [`COUNTER_INITIAL_VALUE`]) when
/// it does not exist yet. The value never decreases.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current counter value
    async fn current(&self) -> Result<u64, StoreError>;

    /// Bump the counter by exactly one and return the new value
    async fn increment(&self) -> Result<u64, StoreError>;
}

/// Id lookups for the entities the scoring dispatcher reads
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_article(&self, id: DomainId) -> Result<Option<Article>, StoreError>;

    async fn find_comment(&self, id: DomainId) -> Result<Option<Comment>, StoreError>;

    async fn find_service_user(&self, id: DomainId) -> Result<Option<ServiceUser>, StoreError>;
}
