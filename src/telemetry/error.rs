//! Error types for the telemetry subsystem

use thiserror::Error;

/// A payload that could not be parsed as a telemetry message.
///
/// Carries the underlying JSON error. The message is dropped and the
/// state store stays untouched; the next message simply supersedes it.
#[derive(Debug, Error)]
#[error("malformed payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Errors surfaced by the telemetry link and its handles.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Broker connection or publish failure.
    ///
    /// Recovered by rumqttc's automatic reconnect; reported here only when
    /// a caller explicitly awaits an operation that failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed inbound payload.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A channel to or from the link task is closed or full.
    #[error("channel error: {0}")]
    Channel(String),

    /// The link task panicked or could not be joined.
    #[error("task error: {0}")]
    Task(String),
}
