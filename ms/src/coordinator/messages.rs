//! Notification and metrics types for the update coordinator

use crate::domain::DomainId;

/// What a listener is told
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Something changed; the changed item is unknown
    Full,
    /// This specific item changed
    Partial(DomainId),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full update"),
            Self::Partial(item_id) => write!(f, "partial update of {}", item_id),
        }
    }
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    pub registered_listeners: usize,
    pub cached_counter: u64,
    pub polling: bool,
    pub poll_timers_started: u64,
    pub polls: u64,
    pub polls_with_changes: u64,
    pub full_notifications: u64,
    pub partial_notifications: u64,
    pub detached_failures: u64,
}
