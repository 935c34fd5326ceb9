//! Core abstractions for inference session management.
//!
//! This crate provides the fundamental building blocks:
//! - `AtomicCounter` - Concurrency-safe request numbering
//! - `RequestRecord` - Stamped interaction log entry
//! - `SessionConfig` - Static configuration loaded at startup
//! - `ModelReference` - Transport-safe snapshot reference
//! - Table storage, model channel and worker provisioning traits

pub mod config;
pub mod counter;
pub mod record;
pub mod reference;
pub mod traits;

pub use config::{ModelConfig, RunMode, SessionConfig, StorageConfig};
pub use counter::AtomicCounter;
pub use record::{Fields, RequestRecord};
pub use reference::ModelReference;
pub use traits::{ModelChannel, TableService, Worker, WorkerProvisioner};
