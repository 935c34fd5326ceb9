//! Subprocess provisioning for remote model workers.
//!
//! Provides:
//! - `WorkerCommand` - Worker command line building
//! - `ProcessProvisioner` - Spawn workers as local process groups
//! - Executable resolution on `PATH`

pub mod command;
pub mod process;
pub mod resolve;

pub use command::{CommandBuildError, CommandParts, WorkerCommand};
pub use process::{ProcessProvisioner, ProcessWorker};
pub use resolve::resolve_executable_path;
