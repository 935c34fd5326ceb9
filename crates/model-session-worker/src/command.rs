//! Worker command building.

use std::path::PathBuf;

use model_session_core::traits::WorkerSpec;
use thiserror::Error;

use crate::resolve::resolve_executable_path;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(CommandBuildError::ExecutableNotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for worker command lines.
///
/// The base command comes from configuration; the model parameters and the
/// owning session id are appended as flags.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Base executable command.
    pub base: String,
    /// Parameters appended after the base.
    pub params: Vec<String>,
}

impl WorkerCommand {
    /// Create a new worker command.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Append the startup flags for `spec`.
    #[must_use]
    pub fn for_spec(mut self, spec: &WorkerSpec) -> Self {
        let model = &spec.model;
        self.params.extend([
            "--model".to_string(),
            model.kind.clone(),
            "--model_fn".to_string(),
            model.artifact_path.to_string_lossy().into_owned(),
            "--fine_tune_layer".to_string(),
            model.fine_tune_layer.to_string(),
            "--gpu".to_string(),
            model.device.to_string(),
            "--session-id".to_string(),
            spec.session_id.clone(),
        ]);
        self
    }

    /// Split the base and append parameters.
    ///
    /// # Errors
    /// Returns error if the base cannot be parsed or nothing is left to run.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        parts.extend(self.params.iter().cloned());

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}
