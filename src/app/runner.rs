use crate::app::env::ChildEnv;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to wait for the command: {source}")]
    Wait { source: std::io::Error },

    #[error("Command exited unsuccessfully: {status}")]
    Failed { status: ExitStatus },

    #[error("Command was cancelled")]
    Cancelled,
}

/// Runs `program` with `args` in `env` only, wired to this process's stdio.
///
/// The child is not started if `cancel` has already fired, and is killed if it
/// fires while the child is running.
pub async fn run_command(
    program: &str,
    args: &[String],
    env: &ChildEnv,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }

    debug!("Running {} with {} argument(s)", program, args.len());

    let mut child = Command::new(program)
        .args(args)
        .env_clear()
        .envs(env.vars())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let status = tokio::select! {
        status = child.wait() => status.map_err(|source| RunError::Wait { source })?,
        _ = cancel.cancelled() => {
            warn!("Cancelled, killing {}", program);
            child
                .kill()
                .await
                .map_err(|source| RunError::Wait { source })?;
            return Err(RunError::Cancelled);
        }
    };

    debug!("{} exited with {}", program, status);
    if status.success() {
        Ok(())
    } else {
        Err(RunError::Failed { status })
    }
}
