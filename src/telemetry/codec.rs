//! Wire codec for the telemetry and command topics.
//!
//! Inbound payloads are JSON objects whose keys mirror
//! [`crate::state::SensorFrame`] plus the diagnostic fields. The bridge publishes an explicit `null`
//! for a sensor it could not read, which is distinct from omitting the
//! key: `null` resets the field to unknown, an absent key leaves the
//! previous value in place. [`TelemetryDelta`] keeps that distinction
//! with a nested `Option`.
//!
//! Outbound commands use a fixed envelope: `{"command": "<name>"}`.

use serde::{Deserialize, Deserializer, Serialize};

use super::error::DecodeError;
use crate::state::FreezeFrame;

/// Maps a present key to `Some(value-or-null)` so that `#[serde(default)]`
/// can map an absent key to `None`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// One decoded inbound message: the set of fields the bridge reported.
///
/// Outer `None` = key absent (no new value), `Some(None)` = explicit
/// `null` (sensor unreadable), `Some(Some(v))` = observed value.
/// Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TelemetryDelta {
    #[serde(default, deserialize_with = "nullable")]
    pub rpm: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub speed: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub accelerator_pos: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub fuel_level: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub engine_load: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub coolant_temp: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ambient_temp: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub intake_temp: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub intake_pressure: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub maf: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub throttle_pos: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub commanded_throttle: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub timing_advance: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub fuel_pressure: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub short_fuel_trim_1: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub long_fuel_trim_1: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub short_fuel_trim_2: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub long_fuel_trim_2: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub vin: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub fuel_status: Option<Option<String>>,

    /// Full replacement for the stored trouble-code list.
    #[serde(default)]
    pub dtcs: Option<Vec<String>>,

    /// Freeze-frame snapshot captured when a DTC was set; `null` drops
    /// the stored one.
    #[serde(default, deserialize_with = "nullable")]
    pub freeze_frame: Option<Option<FreezeFrame>>,

    /// Authoritative clear timestamp from the bridge, epoch seconds.
    #[serde(default)]
    pub dtcs_cleared_at: Option<i64>,
}

/// Parses a raw payload into a [`TelemetryDelta`].
pub fn decode(payload: &[u8]) -> Result<TelemetryDelta, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Named outbound commands understood by the vehicle bridge.
///
/// New commands only need a variant and a name; the envelope shape
/// stays `{"command": "<name>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ClearDtcs,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ClearDtcs => "clear_dtcs",
        }
    }
}

#[derive(Serialize)]
struct CommandEnvelope<'a> {
    command: &'a str,
}

/// Builds the wire payload for an outbound command.
pub fn encode_command(command: Command) -> Vec<u8> {
    serde_json::to_vec(&CommandEnvelope {
        command: command.name(),
    })
    .expect("command envelope serializes")
}
