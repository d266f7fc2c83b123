//! Error handling for UR Tuft
//!
//! Provides error types for every layer of the system:
//! - Compile errors (toolpath validation and image decoding)
//! - Connection errors (program delivery to the controller)
//! - Telemetry errors (progress records sent back by the running program)
//! - Job lookups (unknown job, chunk out of range)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Compile error type
///
/// Raised synchronously while turning a pixel grid into a motion plan.
/// A compile error is fatal to that single compilation: nothing is registered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Surface height does not sit below the safe height
    #[error("Surface height {surface_mm}mm must be below safe height {safe_mm}mm")]
    InvalidHeights {
        /// Configured safe (clearance) height in millimetres.
        safe_mm: f64,
        /// Configured surface (contact) height in millimetres.
        surface_mm: f64,
    },

    /// A compile option is outside its valid range
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// The option name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The decoded image has no pixels
    #[error("Image has zero size ({width}x{height})")]
    EmptyImage {
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
    },

    /// The decoded image is not single-channel
    #[error("Expected a single-channel image, got {channels} channels")]
    UnsupportedChannels {
        /// Channel count of the supplied buffer.
        channels: u8,
    },

    /// Pixel buffer length does not match the declared dimensions
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    DimensionMismatch {
        /// Bytes implied by width x height.
        expected: usize,
        /// Bytes actually supplied.
        actual: usize,
    },

    /// Encoded image could not be decoded
    #[error("Failed to decode image: {reason}")]
    Decode {
        /// Decoder message.
        reason: String,
    },
}

/// Connection error type
///
/// Represents failures talking to the controller's script port or
/// running the inbound progress listener.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Connection or write did not complete in time
    #[error("Connection to {address} timed out after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Remote address.
        address: String,
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Failed to open the TCP connection
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed {
        /// Remote address.
        address: String,
        /// The reason the connection failed.
        reason: String,
    },

    /// Writing the program failed part way
    #[error("Failed to write program to {address}: {reason}")]
    WriteFailed {
        /// Remote address.
        address: String,
        /// The reason the write failed.
        reason: String,
    },

    /// Failed to bind a listening socket
    #[error("Failed to bind {address}: {reason}")]
    BindFailed {
        /// Local address.
        address: String,
        /// The reason the bind failed.
        reason: String,
    },

    /// Invalid hostname or port
    #[error("Invalid address: {address}")]
    InvalidAddress {
        /// The offending address.
        address: String,
    },
}

/// Telemetry error type
///
/// A telemetry error only ever affects a single line; the listener logs it
/// and keeps reading.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// The line carried nothing after normalization
    #[error("Empty telemetry line")]
    Empty,

    /// The line could not be decoded into a progress record
    #[error("Malformed telemetry line '{line}': {reason}")]
    Malformed {
        /// The original line.
        line: String,
        /// The decoder message.
        reason: String,
    },
}

/// Main error type for UR Tuft
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Compile error
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// No job is registered under the identifier
    #[error("Job not found: {job_id}")]
    JobNotFound {
        /// The unknown identifier.
        job_id: String,
    },

    /// The job exists but has no chunk at the requested index
    #[error("Job {job_id} has {chunks} chunks, no chunk {index}")]
    ChunkOutOfRange {
        /// The job identifier.
        job_id: String,
        /// Requested chunk index.
        index: usize,
        /// Chunks the job actually has.
        chunks: usize,
    },

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::ConnectionTimeout { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a compile error
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Error::Compile(_))
    }

    /// Check if this is an unknown-job error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::JobNotFound { .. })
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let err = CompileError::InvalidHeights {
            safe_mm: 150.0,
            surface_mm: 160.0,
        };
        assert_eq!(
            err.to_string(),
            "Surface height 160mm must be below safe height 150mm"
        );

        let err = CompileError::UnsupportedChannels { channels: 3 };
        assert_eq!(
            err.to_string(),
            "Expected a single-channel image, got 3 channels"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err: Error = ConnectionError::ConnectionTimeout {
            address: "10.0.0.2:30002".to_string(),
            timeout_ms: 5000,
        }
        .into();
        assert!(err.is_timeout());
        assert!(err.is_connection_error());
        assert!(!err.is_compile_error());

        let err: Error = CompileError::EmptyImage {
            width: 0,
            height: 4,
        }
        .into();
        assert!(err.is_compile_error());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_not_found_is_distinct_from_bad_chunk() {
        let missing = Error::JobNotFound {
            job_id: "abc".to_string(),
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "Job not found: abc");

        let out_of_range = Error::ChunkOutOfRange {
            job_id: "abc".to_string(),
            index: 9,
            chunks: 1,
        };
        assert!(!out_of_range.is_not_found());
        assert_eq!(out_of_range.to_string(), "Job abc has 1 chunks, no chunk 9");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
