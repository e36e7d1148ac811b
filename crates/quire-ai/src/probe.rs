//! Cached availability check for the assistant CLI

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{Error, Result};

/// How long `<cli> --version` may take before the CLI counts as unavailable
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of probing the assistant CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliStatus {
    /// Whether the CLI answered `--version` successfully
    pub available: bool,
    /// Reported version string
    pub version: Option<String>,
    /// Human-readable reason when unavailable
    pub diagnostic: Option<String>,
}

impl CliStatus {
    fn available(version: String) -> Self {
        Self {
            available: true,
            version: Some(version),
            diagnostic: None,
        }
    }

    fn unavailable(diagnostic: impl Into<String>) -> Self {
        Self {
            available: false,
            version: None,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Turn an unavailable status into an error
    pub fn require(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::CliUnavailable(
                self.diagnostic
                    .clone()
                    .unwrap_or_else(|| "unknown reason".to_string()),
            ))
        }
    }
}

static CACHE: LazyLock<Mutex<HashMap<String, CliStatus>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Probe `program --version`, caching the answer per program path.
pub async fn probe(program: &str) -> CliStatus {
    if let Some(status) = CACHE.lock().get(program) {
        return status.clone();
    }

    let status = run_probe(program).await;
    if status.available {
        tracing::debug!("Assistant CLI {} available: {:?}", program, status.version);
    } else {
        tracing::warn!("Assistant CLI {} unavailable: {:?}", program, status.diagnostic);
    }
    CACHE.lock().insert(program.to_string(), status.clone());
    status
}

async fn run_probe(program: &str) -> CliStatus {
    let output = tokio::process::Command::new(program)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Err(_) => CliStatus::unavailable(format!(
            "`{} --version` did not answer within {:?}",
            program, PROBE_TIMEOUT
        )),
        Ok(Err(e)) => CliStatus::unavailable(format!("could not run `{}`: {}", program, e)),
        Ok(Ok(output)) if !output.status.success() => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            CliStatus::unavailable(format!(
                "`{} --version` exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            ))
        }
        Ok(Ok(output)) => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            CliStatus::available(version)
        }
    }
}
