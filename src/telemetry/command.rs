//! Outbound command path from the UI into the telemetry link.
//!
//! Commands are fire-and-forget: the broker offers no acknowledgement,
//! so a lost command is indistinguishable from a delivered one. The link
//! task applies the optimistic local clear regardless of transport
//! outcome; there is deliberately no rollback.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use super::error::TelemetryError;

/// A command queued for the link task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// Ask the bridge to clear stored trouble codes; `at` is the local
    /// timestamp stamped when the user confirmed.
    ClearDtcs { at: DateTime<Utc> },
}

/// Cloneable handle the presentation layer uses to dispatch commands.
///
/// The caller is expected to gate destructive commands behind its own
/// confirmation step; this handle dispatches immediately.
#[derive(Debug, Clone)]
pub struct CommandPublisher {
    commands: mpsc::Sender<OutboundCommand>,
}

impl CommandPublisher {
    pub(crate) fn new(commands: mpsc::Sender<OutboundCommand>) -> Self {
        Self { commands }
    }

    /// Queues a `clear_dtcs` command stamped with the current time.
    ///
    /// The link task then encodes the envelope, publishes it, and applies
    /// the optimistic clear, in that order. Non-blocking so it can be
    /// called from the UI thread.
    pub fn clear_diagnostic_codes(&self) -> Result<(), TelemetryError> {
        let at = Utc::now();
        debug!(%at, "queueing clear_dtcs");
        self.commands
            .try_send(OutboundCommand::ClearDtcs { at })
            .map_err(|e| TelemetryError::Channel(format!("command queue: {e}")))
    }
}
