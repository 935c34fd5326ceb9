//! Per-user inference session lifecycle.
//!
//! Provides:
//! - `Session` - Snapshot versioning, request logging and worker lifecycle
//! - `SessionFactory` - Build sessions for a run mode
//! - `ModelHandle` - Local or remote model
//! - Storage backends (file, table, none)

pub mod error;
pub mod factory;
pub mod model;
pub mod session;
pub mod storage;

pub use error::SessionError;
pub use factory::SessionFactory;
pub use model::{LocalModel, ModelError, ModelHandle, RemoteModelProxy};
pub use session::{EntryReceipt, Session};
pub use storage::{Persistence, StorageBackend};
