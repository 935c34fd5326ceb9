//! Local subprocess workers.

use std::process::Stdio;

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use model_session_core::{
    config::WorkerConfig,
    traits::{Worker, WorkerError, WorkerProvisioner, WorkerSpec},
};
use tokio::process::Command;

use crate::command::{CommandBuildError, WorkerCommand};

/// Provisions workers as local process groups.
#[derive(Debug, Clone)]
pub struct ProcessProvisioner {
    config: WorkerConfig,
}

impl ProcessProvisioner {
    /// Create a provisioner launching `config.command`.
    #[must_use]
    pub const fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

impl From<CommandBuildError> for WorkerError {
    fn from(err: CommandBuildError) -> Self {
        match err {
            CommandBuildError::ExecutableNotFound(program) => Self::ExecutableNotFound(program),
            other => Self::CommandBuild(other.to_string()),
        }
    }
}

#[async_trait]
impl WorkerProvisioner for ProcessProvisioner {
    async fn provision(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>, WorkerError> {
        let (executable, args) = WorkerCommand::new(self.config.command.clone())
            .for_spec(spec)
            .build()?
            .into_resolved()
            .await?;

        let mut cmd = Command::new(&executable);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd
            .group_spawn()
            .map_err(|e| WorkerError::SpawnFailed(format!("{}: {e}", executable.display())))?;

        tracing::info!(
            session_id = %spec.session_id,
            pid = ?child.id(),
            executable = %executable.display(),
            "Spawned worker process"
        );

        Ok(Box::new(ProcessWorker {
            session_id: spec.session_id.clone(),
            child,
        }))
    }
}

/// A worker running as a local process group.
pub struct ProcessWorker {
    session_id: String,
    child: AsyncGroupChild,
}

#[async_trait]
impl Worker for ProcessWorker {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self) -> Result<(), WorkerError> {
        if let Some(status) = self.child.try_wait()? {
            tracing::debug!(session_id = %self.session_id, %status, "Worker already exited");
            return Ok(());
        }

        self.child.kill().await?;
        let status = self.child.wait().await?;
        tracing::info!(session_id = %self.session_id, %status, "Killed worker process");
        Ok(())
    }
}
