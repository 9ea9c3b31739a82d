//! Update listeners and the two ways notices reach them
//!
//! Write-triggered notices use [`deliver_in_order`]: the writer awaits every
//! listener in registration order and sees the first failure. Poll-triggered
//! notices use [`deliver_detached`]: nobody is waiting on the poll loop, so
//! each listener runs in its own task and a failure is logged and counted
//! without reaching the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::messages::Notice;
use crate::domain::DomainId;

/// Capability implemented by anything that reacts to dataset changes
/// (cache invalidators, websocket broadcasters, ...)
#[async_trait]
pub trait UpdateListener: Send + Sync {
    /// Something changed, possibly in another process
    async fn update_happened(&self) -> Result<()>;

    /// The item `item_id` changed in this process
    async fn partial_update_happened(&self, item_id: DomainId) -> Result<()>;

    /// Name used in logs and error context
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl Notice {
    async fn deliver_to(self, listener: &dyn UpdateListener) -> Result<()> {
        match self {
            Notice::Full => listener.update_happened().await,
            Notice::Partial(item_id) => listener.partial_update_happened(item_id).await,
        }
    }
}

/// Awaited delivery for the write path
///
/// Listeners run one after another in registration order. The first error
/// stops delivery and is returned to the writer.
pub async fn deliver_in_order(listeners: &[Arc<dyn UpdateListener>], notice: Notice) -> Result<()> {
    debug!(listener_count = listeners.len(), %notice, "deliver_in_order: called");
    for (index, listener) in listeners.iter().enumerate() {
        notice
            .deliver_to(listener.as_ref())
            .await
            .wrap_err_with(|| format!("Listener #{} ({}) failed on {}", index, listener.name(), notice))?;
    }
    Ok(())
}

/// Fire-and-forget delivery for the poll path
///
/// Every listener gets its own task. Failures are logged and added to
/// `failures`; they never propagate. The returned handles may be ignored.
pub fn deliver_detached(
    listeners: Vec<Arc<dyn UpdateListener>>,
    notice: Notice,
    failures: Arc<AtomicU64>,
) -> Vec<JoinHandle<()>> {
    debug!(listener_count = listeners.len(), %notice, "deliver_detached: called");
    listeners
        .into_iter()
        .map(|listener| {
            let failures = Arc::clone(&failures);
            tokio::spawn(async move {
                if let Err(e) = notice.deliver_to(listener.as_ref()).await {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!(listener = %listener.name(), %notice, error = %e, "Listener failed on polled update");
                }
            })
        })
        .collect()
}
