use crate::error::{PipelineError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

/// Environment variable through which the formatting container receives the storage path.
pub const ARGS_ENV: &str = "SPARK_APPLICATION_ARGS";

/// Container invocation of the external price-formatting job.
///
/// The job is opaque: it gets the storage path of the raw record and is
/// expected to write a CSV under `<symbol>/formatted_prices/`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatJob {
    pub image: String,
    pub container_name: String,
    pub docker_host: Option<String>,
    pub network: Option<String>,
    pub timeout: Duration,
}

impl FormatJob {
    /// Arguments for the `docker` CLI that run the job once for `storage_path`.
    pub fn docker_args(&self, storage_path: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(host) = &self.docker_host {
            args.extend(["-H".to_string(), host.clone()]);
        }
        args.extend([
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name.clone(),
        ]);
        if let Some(network) = &self.network {
            args.extend(["--network".to_string(), network.clone()]);
        }
        args.extend([
            "-e".to_string(),
            format!("{ARGS_ENV}={storage_path}"),
            self.image.clone(),
        ]);
        args
    }

    /// Runs the container to completion.
    ///
    /// The child is killed if the timeout elapses or the caller drops the future.
    ///
    /// # Errors
    /// Returns an error if `docker` cannot be spawned, the job exits non-zero,
    /// or the timeout elapses
    pub async fn run(&self, storage_path: &str) -> Result<()> {
        info!(image = %self.image, path = storage_path, "starting format job");

        let mut child = Command::new("docker")
            .args(self.docker_args(storage_path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::FormatJob(format!("cannot spawn docker: {e}")))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| PipelineError::Timeout {
                op: "format job",
                after: self.timeout,
            })?
            .map_err(|e| PipelineError::FormatJob(e.to_string()))?;

        if !status.success() {
            return Err(PipelineError::FormatJob(format!(
                "{} exited with {status}",
                self.container_name
            )));
        }

        info!(container = %self.container_name, "format job finished");
        Ok(())
    }
}
