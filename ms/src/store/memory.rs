//! In-process store
//!
//! Clones share the same state, so one `MemoryStore` handed to several
//! coordinators behaves like a database shared by several processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::{COUNTER_INITIAL_VALUE, ContentStore, CounterStore, StoreError};
use crate::domain::{Article, Comment, DomainId, ServiceUser};

#[derive(Debug, Default)]
struct MemoryState {
    counter: Option<u64>,
    articles: HashMap<DomainId, Article>,
    comments: HashMap<DomainId, Comment>,
    service_users: HashMap<DomainId, ServiceUser>,
}

/// [`CounterStore`] and [`ContentStore`] kept in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        debug!("MemoryStore::new: called");
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Overwrite the counter, simulating a write by a process that does not
    /// share this store's coordinator
    pub fn set_counter(&self, value: u64) -> Result<(), StoreError> {
        debug!(%value, "MemoryStore::set_counter: called");
        self.lock()?.counter = Some(value);
        Ok(())
    }

    pub fn insert_article(&self, article: Article) -> Result<(), StoreError> {
        self.lock()?.articles.insert(article.id, article);
        Ok(())
    }

    pub fn insert_comment(&self, comment: Comment) -> Result<(), StoreError> {
        self.lock()?.comments.insert(comment.id, comment);
        Ok(())
    }

    pub fn insert_service_user(&self, user: ServiceUser) -> Result<(), StoreError> {
        self.lock()?.service_users.insert(user.id, user);
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn current(&self) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        Ok(*state.counter.get_or_insert(COUNTER_INITIAL_VALUE))
    }

    async fn increment(&self) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let value = state.counter.get_or_insert(COUNTER_INITIAL_VALUE);
        *value += 1;
        let value = *value;
        debug!(%value, "MemoryStore::increment: bumped");
        Ok(value)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_article(&self, id: DomainId) -> Result<Option<Article>, StoreError> {
        Ok(self.lock()?.articles.get(&id).cloned())
    }

    async fn find_comment(&self, id: DomainId) -> Result<Option<Comment>, StoreError> {
        Ok(self.lock()?.comments.get(&id).cloned())
    }

    async fn find_service_user(&self, id: DomainId) -> Result<Option<ServiceUser>, StoreError> {
        Ok(self.lock()?.service_users.get(&id).cloned())
    }
}
