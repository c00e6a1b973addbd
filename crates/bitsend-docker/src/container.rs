//! Docker container access.

use bitsend_core::{Error, Result};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures_util::StreamExt;

/// Output of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` if Docker did not report one.
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code.unwrap_or(0) == 0
    }

    /// Stderr if there is any, otherwise stdout. CLI tools print their
    /// errors on either.
    pub fn message(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs commands in the node containers.
pub struct ContainerManager {
    docker: Docker,
}

impl ContainerManager {
    /// Connect with the local defaults.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Docker(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Connect with a custom socket path.
    pub fn with_socket(socket_path: &str) -> Result<Self> {
        let docker = Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| Error::Docker(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Connect through `socket` when configured, local defaults otherwise.
    pub fn connect(socket: Option<&str>) -> Result<Self> {
        socket.map_or_else(Self::new, Self::with_socket)
    }

    /// Check if Docker is available.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| Error::Docker(e.to_string()))?;
        Ok(())
    }

    /// Whether `container` exists and is running.
    pub async fn is_running(&self, container: &str) -> Result<bool> {
        match self.docker.inspect_container(container, None).await {
            Ok(details) => Ok(details
                .state
                .and_then(|state| state.running)
                .unwrap_or(false)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(Error::Docker(format!("Failed to inspect {container}: {e}"))),
        }
    }

    /// Execute a command in a running container.
    pub async fn exec(&self, container: &str, cmd: Vec<String>) -> Result<ExecOutput> {
        tracing::trace!(container, ?cmd, "docker exec");

        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(cmd),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Docker(format!("Failed to create exec: {e}")))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::Docker(format!("Failed to start exec: {e}")))?
        {
            while let Some(msg) = stream.next().await {
                match msg.map_err(|e| Error::Docker(format!("Exec stream failed: {e}")))? {
                    LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                    LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    _ => {}
                }
            }
        }

        let exit_code = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::Docker(format!("Failed to inspect exec: {e}")))?
            .exit_code;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    /// Execute a command and return its stdout, failing on a non-zero exit.
    pub async fn exec_checked(&self, container: &str, cmd: Vec<String>) -> Result<String> {
        let output = self.exec(container, cmd).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(Error::CommandFailed {
                code: output.exit_code.unwrap_or(-1),
                output: output.message().to_string(),
            })
        }
    }
}
