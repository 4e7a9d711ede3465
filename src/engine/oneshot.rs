//! One-shot text call: spawn, wait, return trimmed stdout.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, warn};

use crate::engine::command::{build_command, InvocationMode};
use crate::engine::stream::STDERR_TAIL_BYTES;
use crate::engine::Engine;
use crate::{AppError, Result};

impl Engine {
    /// Run a non-interactive text call and return trimmed stdout.
    ///
    /// The subprocess gets one wall-clock deadline
    /// ([`crate::config::EngineConfig::one_shot_timeout`]); when it elapses
    /// the child is killed and the call fails.
    ///
    /// # Errors
    ///
    /// - [`AppError::Spawn`] — binary missing or unexecutable.
    /// - [`AppError::Timeout`] — deadline elapsed, subprocess killed.
    /// - [`AppError::NonZeroExit`] — subprocess failure with stderr tail.
    /// - [`AppError::EmptyOutput`] — clean exit with empty stdout.
    pub async fn one_shot(
        &self,
        prompt: &str,
        model: Option<&str>,
        working_dir: &Path,
    ) -> Result<String> {
        let model = model.or(self.config.model.as_deref());
        let mut cmd = build_command(
            &self.config.binary,
            InvocationMode::OneShotText { prompt },
            model,
            working_dir,
        );

        let started = Instant::now();
        let child = cmd.spawn().map_err(|err| AppError::Spawn(err.to_string()))?;
        debug!(binary = %self.config.binary, "one-shot subprocess spawned");

        // Dropping the wait future on timeout drops the child handle, and
        // kill_on_drop reaps the process.
        let output = match tokio::time::timeout(
            self.config.one_shot_timeout(),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(
                    timeout_secs = self.config.one_shot_timeout_seconds,
                    "one-shot deadline elapsed, subprocess killed"
                );
                return Err(AppError::Timeout {
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }
        };

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let tail_start = output.stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let stderr_tail = String::from_utf8_lossy(&output.stderr[tail_start..]).into_owned();
            return Err(AppError::NonZeroExit { code, stderr_tail });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if text.is_empty() {
            return Err(AppError::EmptyOutput);
        }
        Ok(text)
    }
}
