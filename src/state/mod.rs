//! Vehicle state: the reconciled snapshot and its single mutation path.
//!
//! [`StateStore`] owns the one mutable [`VehicleState`] for the process.
//! The telemetry link task is its only mutator; inbound deltas land via
//! [`StateStore::reconcile`] and the local clear command via
//! [`StateStore::apply_optimistic_clear`]. Consumers never touch the
//! store directly; every mutation broadcasts a fresh snapshot over a
//! `watch` channel that the UI reads each frame.
//!
//! ```text
//! TelemetryDelta ──► reconcile ──► VehicleState ──► watch ──► UI
//! ClearDtcs ───► apply_optimistic_clear ──┘
//! ```

pub mod history;

pub use history::{LoadHistory, LoadSample};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;

use crate::telemetry::codec::TelemetryDelta;

/// Scalar sensor readings. `None` means the value was never observed or
/// the bridge last reported the sensor unreadable; an observed zero stays
/// `Some(0.0)`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorFrame {
    #[serde(default)]
    pub rpm: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub accelerator_pos: Option<f64>,
    #[serde(default)]
    pub fuel_level: Option<f64>,
    #[serde(default)]
    pub engine_load: Option<f64>,
    #[serde(default)]
    pub coolant_temp: Option<f64>,
    #[serde(default)]
    pub ambient_temp: Option<f64>,
    #[serde(default)]
    pub intake_temp: Option<f64>,
    #[serde(default)]
    pub intake_pressure: Option<f64>,
    #[serde(default)]
    pub maf: Option<f64>,
    #[serde(default)]
    pub throttle_pos: Option<f64>,
    #[serde(default)]
    pub commanded_throttle: Option<f64>,
    #[serde(default)]
    pub timing_advance: Option<f64>,
    #[serde(default)]
    pub fuel_pressure: Option<f64>,
    #[serde(default)]
    pub short_fuel_trim_1: Option<f64>,
    #[serde(default)]
    pub long_fuel_trim_1: Option<f64>,
    #[serde(default)]
    pub short_fuel_trim_2: Option<f64>,
    #[serde(default)]
    pub long_fuel_trim_2: Option<f64>,
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub fuel_status: Option<String>,
}

/// Sensor snapshot frozen at the moment a trouble code was recorded.
///
/// Live samples never update it; only a delta carrying a new frame (or an
/// explicit `null`) replaces it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FreezeFrame {
    /// The DTC that triggered the snapshot.
    pub code: String,
    #[serde(flatten)]
    pub sensors: SensorFrame,
}

/// The reconciled vehicle snapshot handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleState {
    pub sensors: SensorFrame,
    /// Stored trouble codes, in the order the bridge reported them.
    pub dtcs: Vec<String>,
    pub freeze_frame: Option<FreezeFrame>,
    /// Set by a local clear or an authoritative bridge update, never inferred.
    pub dtcs_cleared_at: Option<DateTime<Utc>>,
    pub load_history: LoadHistory,
}

impl VehicleState {
    /// Human-readable age of the last DTC clear, computed on read.
    pub fn time_since_cleared(&self, now: DateTime<Utc>) -> String {
        let Some(cleared) = self.dtcs_cleared_at else {
            return "Never cleared".to_string();
        };
        let secs = (now - cleared).num_seconds().max(0);
        let (count, unit) = if secs < 60 {
            (secs, "second")
        } else if secs < 3_600 {
            (secs / 60, "minute")
        } else if secs < 86_400 {
            (secs / 3_600, "hour")
        } else {
            (secs / 86_400, "day")
        };
        let suffix = if count == 1 { "" } else { "s" };
        format!("{count} {unit}{suffix} ago")
    }
}

macro_rules! apply_scalars {
    ($current:expr, $delta:expr, [ $($field:ident),* $(,)? ]) => {
        $(
            if let Some(value) = $delta.$field {
                $current.sensors.$field = value;
            }
        )*
    };
}

/// Exclusive owner of the process-wide [`VehicleState`].
pub struct StateStore {
    current: VehicleState,
    notify: watch::Sender<VehicleState>,
}

impl StateStore {
    /// Creates an all-unknown store and the snapshot channel the
    /// presentation layer subscribes to.
    pub fn new(history_window: Duration) -> (Self, watch::Receiver<VehicleState>) {
        let current = VehicleState {
            load_history: LoadHistory::new(history_window),
            ..VehicleState::default()
        };
        let (notify, snapshots) = watch::channel(current.clone());
        (Self { current, notify }, snapshots)
    }

    /// Applies one decoded delta: last-writer-wins per present field,
    /// absent fields untouched. Safe for stale or duplicate deltas.
    ///
    /// A delta carrying an observed engine load also lands one sample in
    /// the rolling history, stamped with `now`.
    pub fn reconcile(&mut self, delta: TelemetryDelta, now: DateTime<Utc>) {
        if let Some(Some(load)) = delta.engine_load {
            self.current.load_history.push(now, load);
        }

        apply_scalars!(self.current, delta, [
            rpm,
            speed,
            accelerator_pos,
            fuel_level,
            engine_load,
            coolant_temp,
            ambient_temp,
            intake_temp,
            intake_pressure,
            maf,
            throttle_pos,
            commanded_throttle,
            timing_advance,
            fuel_pressure,
            short_fuel_trim_1,
            long_fuel_trim_1,
            short_fuel_trim_2,
            long_fuel_trim_2,
            vin,
            fuel_status,
        ]);

        if let Some(codes) = delta.dtcs {
            self.current.dtcs = codes;
        }
        if let Some(frame) = delta.freeze_frame {
            self.current.freeze_frame = frame;
        }
        if let Some(epoch) = delta.dtcs_cleared_at {
            if let Some(at) = DateTime::from_timestamp(epoch, 0) {
                self.current.dtcs_cleared_at = Some(at);
            } else {
                debug!(epoch, "ignoring out-of-range clear timestamp");
            }
        }

        self.publish();
    }

    /// Clears the stored trouble codes locally, before any bridge
    /// acknowledgement. A later authoritative delta may repopulate them.
    pub fn apply_optimistic_clear(&mut self, at: DateTime<Utc>) {
        self.current.dtcs.clear();
        self.current.dtcs_cleared_at = Some(at);
        self.publish();
    }

    pub fn snapshot(&self) -> VehicleState {
        self.current.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VehicleState> {
        self.notify.subscribe()
    }

    fn publish(&self) {
        self.notify.send_replace(self.current.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::codec::decode;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn store() -> StateStore {
        StateStore::new(Duration::seconds(60)).0
    }

    #[test]
    fn reconcile_replaces_only_present_fields() {
        let mut store = store();
        store.reconcile(decode(br#"{"rpm": 3200, "fuel_level": 54}"#).unwrap(), now());
        store.reconcile(decode(br#"{"rpm": 2800}"#).unwrap(), now());

        let snap = store.snapshot();
        assert_eq!(snap.sensors.rpm, Some(2800.0));
        assert_eq!(snap.sensors.fuel_level, Some(54.0));
        assert_eq!(snap.sensors.speed, None);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut store = store();
        let delta = decode(br#"{"speed": 88.0, "dtcs": ["P0420"]}"#).unwrap();
        store.reconcile(delta.clone(), now());
        let once = store.snapshot();
        store.reconcile(delta, now());
        assert_eq!(store.snapshot(), once);
    }

    #[test]
    fn explicit_null_resets_to_unknown() {
        let mut store = store();
        store.reconcile(decode(br#"{"coolant_temp": 92.5}"#).unwrap(), now());
        store.reconcile(decode(br#"{"coolant_temp": null}"#).unwrap(), now());
        assert_eq!(store.snapshot().sensors.coolant_temp, None);
    }

    #[test]
    fn failed_decode_leaves_snapshot_untouched() {
        let mut store = store();
        store.reconcile(decode(br#"{"rpm": 1500}"#).unwrap(), now());
        let before = store.snapshot();
        assert!(decode(b"not json").is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn dtcs_are_replaced_wholesale_in_order() {
        let mut store = store();
        store.reconcile(decode(br#"{"dtcs": ["P0301", "P0420"]}"#).unwrap(), now());
        store.reconcile(decode(br#"{"dtcs": ["P0171"]}"#).unwrap(), now());
        assert_eq!(store.snapshot().dtcs, vec!["P0171".to_string()]);
    }

    #[test]
    fn observed_engine_load_lands_in_history() {
        let mut store = store();
        store.reconcile(decode(br#"{"engine_load": 45.0}"#).unwrap(), now());
        store.reconcile(decode(br#"{"engine_load": null}"#).unwrap(), now());
        store.reconcile(decode(br#"{"rpm": 900}"#).unwrap(), now());

        let snap = store.snapshot();
        assert_eq!(snap.load_history.len(), 1);
        assert_eq!(snap.sensors.engine_load, None);
    }

    #[test]
    fn history_window_drops_stale_samples() {
        let mut store = store();
        store.reconcile(decode(br#"{"engine_load": 30.0}"#).unwrap(), now());
        store.reconcile(
            decode(br#"{"engine_load": 60.0}"#).unwrap(),
            now() + Duration::seconds(70),
        );

        let history = store.snapshot().load_history;
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().load, 60.0);
    }

    #[test]
    fn optimistic_clear_empties_codes_and_stamps_time() {
        let mut store = store();
        store.reconcile(decode(br#"{"dtcs": ["P0301"]}"#).unwrap(), now());
        store.apply_optimistic_clear(now());

        let snap = store.snapshot();
        assert!(snap.dtcs.is_empty());
        assert_eq!(snap.dtcs_cleared_at, Some(now()));
    }

    #[test]
    fn authoritative_delta_may_repopulate_after_clear() {
        let mut store = store();
        store.apply_optimistic_clear(now());
        store.reconcile(decode(br#"{"dtcs": ["P0500"]}"#).unwrap(), now());
        assert_eq!(store.snapshot().dtcs, vec!["P0500".to_string()]);
    }

    #[test]
    fn bridge_clear_timestamp_is_authoritative() {
        let mut store = store();
        store.reconcile(decode(br#"{"dtcs_cleared_at": 1700000000}"#).unwrap(), now());
        assert_eq!(store.snapshot().dtcs_cleared_at, Some(now()));
    }

    #[test]
    fn freeze_frame_survives_live_samples() {
        let mut store = store();
        store.reconcile(
            decode(br#"{"freeze_frame": {"code": "P0301", "rpm": 2450.0}}"#).unwrap(),
            now(),
        );
        store.reconcile(decode(br#"{"rpm": 700}"#).unwrap(), now());

        let snap = store.snapshot();
        assert_eq!(snap.sensors.rpm, Some(700.0));
        let frame = snap.freeze_frame.unwrap();
        assert_eq!(frame.code, "P0301");
        assert_eq!(frame.sensors.rpm, Some(2450.0));
    }

    #[test]
    fn snapshot_broadcasts_on_every_mutation() {
        let (mut store, mut rx) = StateStore::new(Duration::seconds(60));
        store.reconcile(decode(br#"{"rpm": 1200}"#).unwrap(), now());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().sensors.rpm, Some(1200.0));

        store.apply_optimistic_clear(now());
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn time_since_cleared_formats_buckets() {
        let mut state = VehicleState::default();
        assert_eq!(state.time_since_cleared(now()), "Never cleared");

        state.dtcs_cleared_at = Some(now() - Duration::seconds(45));
        assert_eq!(state.time_since_cleared(now()), "45 seconds ago");

        state.dtcs_cleared_at = Some(now() - Duration::seconds(90));
        assert_eq!(state.time_since_cleared(now()), "1 minute ago");

        state.dtcs_cleared_at = Some(now() - Duration::seconds(7_200));
        assert_eq!(state.time_since_cleared(now()), "2 hours ago");

        state.dtcs_cleared_at = Some(now() - Duration::seconds(86_400 * 3));
        assert_eq!(state.time_since_cleared(now()), "3 days ago");

        state.dtcs_cleared_at = Some(now() - Duration::seconds(1));
        assert_eq!(state.time_since_cleared(now()), "1 second ago");
    }
}
