//! Cross-process update notification
//!
//! Processes share nothing but a single counter row. Every write bumps it and
//! notifies the writer's local listeners; every process polls it once a
//! period and tells its own listeners when another process has bumped it.
//!
//! - **Write path:** counter bump, then awaited in-order delivery
//! - **Poll path:** counter read, then detached delivery of a full update
//!
//! Delivery is at-least-once across processes: a listener may hear a full
//! update for a change it already learned about through a partial update.

mod config;
mod core;
mod listener;
mod messages;

pub use config::{CoordinatorConfig, DEFAULT_POLL_INTERVAL_SECS};
pub use self::core::UpdateCoordinator;
pub use listener::{UpdateListener, deliver_detached, deliver_in_order};
pub use messages::{CoordinatorMetrics, Notice};
