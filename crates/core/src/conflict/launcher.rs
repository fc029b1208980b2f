//! Opening the external resolver.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::ConflictError;

/// Something that can hand a resolver URI to the application registered for
/// it.
#[async_trait]
pub trait ResolverLauncher: Send + Sync {
    async fn launch(&self, uri: &str) -> Result<(), ConflictError>;
}

/// Opener used when none is configured.
pub fn default_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Launches the resolver by running an opener command (`open`, `xdg-open`)
/// with the URI as its only argument.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self::new(default_opener())
    }
}

#[async_trait]
impl ResolverLauncher for CommandLauncher {
    async fn launch(&self, uri: &str) -> Result<(), ConflictError> {
        debug!(program = %self.program, uri, "launching resolver");
        let output = Command::new(&self.program)
            .arg(uri)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ConflictError::LaunchFailed {
                command: self.program.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "resolver launcher failed");
            return Err(ConflictError::LaunchFailed {
                command: self.program.clone(),
                detail: format!("exit code {exit_code}: {stderr}"),
            });
        }
        info!(program = %self.program, "resolver launched");
        Ok(())
    }
}
