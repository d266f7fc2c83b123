//! Program delivery to the controller
//!
//! The controller's script port accepts a program as plain text on a fresh
//! TCP connection and starts running it once the connection closes. One
//! connection is opened per delivery; nothing is retried here, so the caller
//! decides whether a failed delivery is fatal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use urtuft_core::ConnectionError;

/// Default controller port for script delivery.
pub const DEFAULT_SCRIPT_PORT: u16 = 30002;

/// Default bound on connecting and on writing.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Something that can hand a rendered program to a controller.
#[async_trait]
pub trait ProgramDelivery: Send + Sync {
    /// Deliver `program`, resolving once the connection is closed cleanly.
    async fn deliver(&self, program: &str) -> Result<(), ConnectionError>;

    /// Human readable destination, used in log lines.
    fn destination(&self) -> String;
}

/// TCP client for the controller's script port.
#[derive(Debug, Clone)]
pub struct ScriptClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ScriptClient {
    /// Client for `host:port` with the default timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }

    /// Bound both connecting and writing by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Controller host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Controller port.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn timed_out(&self) -> ConnectionError {
        ConnectionError::ConnectionTimeout {
            address: self.address(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    async fn write_program(&self, stream: &mut TcpStream, program: &str) -> std::io::Result<()> {
        stream.write_all(program.as_bytes()).await?;
        if !program.ends_with('\n') {
            stream.write_all(b"\n").await?;
        }
        stream.flush().await?;
        stream.shutdown().await
    }
}

#[async_trait]
impl ProgramDelivery for ScriptClient {
    async fn deliver(&self, program: &str) -> Result<(), ConnectionError> {
        let address = self.address();
        if self.host.trim().is_empty() {
            return Err(ConnectionError::InvalidAddress { address });
        }

        let mut stream = timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| ConnectionError::ConnectFailed {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        timeout(self.timeout, self.write_program(&mut stream, program))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| ConnectionError::WriteFailed {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(%address, bytes = program.len(), "Program delivered");
        Ok(())
    }

    fn destination(&self) -> String {
        self.address()
    }
}

/// Result of an optional delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryOutcome {
    /// No controller configured.
    Skipped,
    Delivered,
    /// The program is still valid and can be resumed later.
    Failed { error: String },
}

impl DeliveryOutcome {
    /// Whether the program reached the controller.
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    /// Error text of a failed delivery.
    pub fn error(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Deliver through `client` when one is configured.
///
/// Failures are logged and reported as [`DeliveryOutcome::Failed`] rather
/// than propagated.
pub async fn deliver_or_skip(
    client: Option<&dyn ProgramDelivery>,
    program: &str,
) -> DeliveryOutcome {
    let Some(client) = client else {
        tracing::debug!("No controller configured; delivery skipped");
        return DeliveryOutcome::Skipped;
    };

    match client.deliver(program).await {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(e) => {
            tracing::warn!(destination = %client.destination(), "Program delivery failed: {}", e);
            DeliveryOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}
