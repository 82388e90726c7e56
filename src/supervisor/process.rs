use crate::config::types::BackendConfig;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Handle to one running instance of the backend process.
///
/// The child inherits this process's stdout/stderr so its diagnostics show
/// up alongside ours.
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
    pid: Option<u32>,
}

impl BackendProcess {
    pub fn spawn(config: &BackendConfig) -> std::io::Result<Self> {
        let child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let pid = child.id();

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Resolves when the process terminates. Cancel-safe.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}
