//! Blocking invocation of the external test harness.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::{BenchError, Result};

/// Interpreter, script and working directory of the harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessCommand {
    pub program: String,
    pub script: PathBuf,
    pub working_dir: PathBuf,
}

impl Default for HarnessCommand {
    fn default() -> Self {
        Self {
            program: "bash".to_string(),
            script: PathBuf::from("run_tests.sh"),
            working_dir: PathBuf::from("."),
        }
    }
}

impl HarnessCommand {
    /// Script path as seen from the current process.
    pub fn script_path(&self) -> PathBuf {
        if self.script.is_absolute() {
            self.script.clone()
        } else {
            self.working_dir.join(&self.script)
        }
    }

    /// Run the harness to completion and return stdout followed by stderr.
    ///
    /// There is no timeout: a hung harness blocks the caller.
    pub fn run(&self) -> Result<String> {
        let script = self.script_path();
        if !script.is_file() {
            return Err(BenchError::InputMissing(script));
        }

        tracing::info!(
            program = %self.program,
            script = ?self.script,
            cwd = ?self.working_dir,
            "running test harness"
        );
        let output = Command::new(&self.program)
            .arg(&self.script)
            .current_dir(&self.working_dir)
            .output()
            .map_err(BenchError::SubprocessSpawn)?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(BenchError::Subprocess {
                status: output.status,
                output: combined,
            });
        }
        tracing::info!(bytes = combined.len(), "test harness finished");
        Ok(combined)
    }

    pub fn with_working_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.working_dir = dir.as_ref().to_path_buf();
        self
    }
}
