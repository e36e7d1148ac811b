//! Transport abstraction for streaming assistant responses

use async_trait::async_trait;
use quire_ai::{
    ChatRequest, ChunkStream, Result,
    probe,
    providers::{CliOptions, CliProvider},
};
use tokio_util::sync::CancellationToken;

/// Source of streamed assistant responses
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start one response. The stream ends after exactly one terminal chunk,
    /// or early when `cancel` fires.
    async fn stream(&self, request: ChatRequest, cancel: CancellationToken)
    -> Result<ChunkStream>;
}

/// Transport that runs the local assistant CLI
pub struct CliTransport {
    provider: CliProvider,
    check_available: bool,
}

impl CliTransport {
    /// Create a transport that probes the CLI before the first request
    pub fn new(options: CliOptions) -> Self {
        Self {
            provider: CliProvider::new(options),
            check_available: true,
        }
    }

    /// Skip the availability probe
    pub fn without_probe(mut self) -> Self {
        self.check_available = false;
        self
    }

    /// The CLI program this transport runs
    pub fn program(&self) -> &str {
        &self.provider.options().program
    }
}

#[async_trait]
impl Transport for CliTransport {
    async fn stream(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        if self.check_available {
            probe::probe(self.program()).await.require()?;
        }
        tracing::debug!(
            "Starting {} (resume: {:?})",
            self.program(),
            request.session_id
        );
        self.provider.stream(&request, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_cli_is_unavailable() {
        let transport = CliTransport::new(CliOptions {
            program: "quire-transport-test-missing-cli".into(),
            ..Default::default()
        });
        let err = match transport
            .stream(ChatRequest::new("hi"), CancellationToken::new())
            .await
        {
            Ok(_) => panic!("a missing CLI cannot stream"),
            Err(e) => e,
        };
        assert!(matches!(err, quire_ai::Error::CliUnavailable(_)));
    }

    #[tokio::test]
    async fn test_without_probe_reports_spawn_failure() {
        let transport = CliTransport::new(CliOptions {
            program: "quire-transport-test-missing-cli".into(),
            ..Default::default()
        })
        .without_probe();
        let err = match transport
            .stream(ChatRequest::new("hi"), CancellationToken::new())
            .await
        {
            Ok(_) => panic!("a missing CLI cannot stream"),
            Err(e) => e,
        };
        assert!(matches!(err, quire_ai::Error::Spawn { .. }));
        assert!(err.is_unavailable());
    }
}
