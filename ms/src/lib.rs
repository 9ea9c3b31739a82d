//! modsync - shared update signalling and comment scoring for moderation backends
//!
//! Several independent server processes share one database. Each process
//! needs to learn when any of them changed the dataset, and some requests
//! need a comment scored by an external service.
//!
//! # Core Concepts
//!
//! - **Shared counter**: one database row bumped on every write. A process
//!   that sees it differ from its cached value knows something changed elsewhere.
//! - **Local listeners**: in-process subscribers notified in order on local
//!   writes and detached on polled changes.
//! - **Scoring**: comments are shaped into a request, POSTed to a service
//!   user's endpoint, and the synchronous score goes to a sink.
//!
//! # Modules
//!
//! - [`coordinator`] - Update coordinator and listener delivery
//! - [`store`] - Counter and content storage (SQLite, in-memory)
//! - [`scoring`] - Scoring request builder and dispatcher
//! - [`domain`] - Articles, comments, service users
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod scoring;
pub mod store;

// Re-export commonly used types
pub use config::{ApiConfig, Config, ScoringConfig, StorageConfig};
pub use coordinator::{
    CoordinatorConfig, CoordinatorMetrics, Notice, UpdateCoordinator, UpdateListener, deliver_detached,
    deliver_in_order,
};
pub use domain::{Article, Comment, DomainId, ServiceUser};
pub use scoring::{ScoreData, ScoreSink, ScoringDispatcher, ScoringError, ScoringRequest, build_payload, create_shim};
pub use store::{ContentStore, CounterRecord, CounterStore, MemoryStore, SqliteStore, StoreError};
