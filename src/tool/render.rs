use tokio_util::sync::CancellationToken;

use crate::config::RendererConfig;
use crate::error::ToolError;
use crate::tool::Cmd;

/// Runs the static-site generator turning templates and Markdown into HTML.
///
/// The generator is an external program (eleventy by default) which reads
/// its own configuration; we only decide when it runs.
#[derive(Debug, Clone)]
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    fn cmd(&self) -> Result<Cmd, ToolError> {
        Ok(Cmd::from_slice(self.config.command.as_slice())
            .map_err(|_| ToolError::Empty("the renderer".into()))?
            .label(&self.config.label))
    }

    /// One full render. Fails if the generator exits with a nonzero status.
    pub async fn render(&self) -> Result<(), ToolError> {
        self.cmd()?.run().await?;
        Ok(())
    }

    /// Runs the generator in its own watch mode until it exits or `cancel`
    /// fires, in which case the process is killed.
    pub async fn watch(&self, cancel: CancellationToken) -> Result<(), ToolError> {
        let cmd = self.cmd()?.args(&self.config.watch_args);
        let mut child = cmd.spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    tracing::info!("{} watcher exited", self.config.label);
                    Ok(())
                } else {
                    Err(ToolError::Failed { program: cmd.describe(), code: status.code() })
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("stopping {} watcher", self.config.label);
                child.kill().await?;
                Ok(())
            }
        }
    }
}
