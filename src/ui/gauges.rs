//! Gauge tab: live readouts, bar indicators, and the load trace.
//!
//! Everything here renders from the snapshot alone. Fields the bridge
//! has never reported show a `--` placeholder so an unknown value can
//! never be mistaken for a zero reading.

use eframe::egui::{self, Color32, ProgressBar, Sense, Stroke, Ui, Vec2};

use crate::state::{LoadHistory, VehicleState};

const TRACE_HEIGHT: f32 = 80.0;
const TRACE_COLOR: Color32 = Color32::from_rgb(0x4c, 0xaf, 0x50);

/// Formats an optional reading, `--` when never observed.
fn fmt_value(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) => format!("{v:.digits$}"),
        None => "--".to_string(),
    }
}

fn readout(ui: &mut Ui, label: &str, value: Option<f64>, unit: &str, digits: usize) {
    ui.label(label);
    ui.label(format!("{} {}", fmt_value(value, digits), unit));
    ui.end_row();
}

/// Percentage bar with the raw value as text; renders empty and greyed
/// while the value is unknown.
fn percent_bar(ui: &mut Ui, label: &str, value: Option<f64>) {
    ui.label(label);
    let bar = match value {
        Some(v) => ProgressBar::new((v / 100.0).clamp(0.0, 1.0) as f32)
            .text(format!("{v:.0}%")),
        None => ProgressBar::new(0.0).text("--"),
    };
    ui.add(bar);
    ui.end_row();
}

/// Polyline of the rolling engine-load window, scaled 0-100%.
fn load_trace(ui: &mut Ui, history: &LoadHistory) {
    let width = ui.available_width();
    let (response, painter) =
        ui.allocate_painter(Vec2::new(width, TRACE_HEIGHT), Sense::hover());
    let rect = response.rect;
    painter.rect_filled(rect, 2.0, ui.visuals().extreme_bg_color);

    if history.len() < 2 {
        return;
    }

    let first = history.iter().next().map(|s| s.at);
    let last = history.latest().map(|s| s.at);
    let (Some(first), Some(last)) = (first, last) else {
        return;
    };
    let span = (last - first).num_milliseconds().max(1) as f32;

    let points: Vec<egui::Pos2> = history
        .iter()
        .map(|sample| {
            let x = (sample.at - first).num_milliseconds() as f32 / span;
            let y = 1.0 - (sample.load / 100.0).clamp(0.0, 1.0) as f32;
            egui::pos2(
                rect.left() + x * rect.width(),
                rect.top() + y * rect.height(),
            )
        })
        .collect();

    painter.add(egui::Shape::line(points, Stroke::new(1.5, TRACE_COLOR)));
}

pub fn render(ui: &mut Ui, snapshot: &VehicleState) {
    let sensors = &snapshot.sensors;

    ui.horizontal(|ui| {
        ui.heading(format!("RPM {}", fmt_value(sensors.rpm, 0)));
        ui.separator();
        ui.heading(format!("Speed {} km/h", fmt_value(sensors.speed, 0)));
    });
    ui.separator();

    egui::Grid::new("bars")
        .num_columns(2)
        .min_col_width(120.0)
        .show(ui, |ui| {
            percent_bar(ui, "Accelerator", sensors.accelerator_pos);
            percent_bar(ui, "Throttle", sensors.throttle_pos);
            percent_bar(ui, "Fuel level", sensors.fuel_level);
            percent_bar(ui, "Engine load", sensors.engine_load);
        });
    ui.separator();

    egui::Grid::new("readouts")
        .num_columns(2)
        .min_col_width(120.0)
        .show(ui, |ui| {
            readout(ui, "Coolant temp", sensors.coolant_temp, "°C", 1);
            readout(ui, "Ambient temp", sensors.ambient_temp, "°C", 1);
            readout(ui, "Intake temp", sensors.intake_temp, "°C", 1);
            readout(ui, "Intake pressure", sensors.intake_pressure, "kPa", 1);
            readout(ui, "MAF", sensors.maf, "g/s", 2);
            readout(ui, "Commanded throttle", sensors.commanded_throttle, "%", 1);
            readout(ui, "Timing advance", sensors.timing_advance, "°", 1);
            readout(ui, "Fuel pressure", sensors.fuel_pressure, "kPa", 1);
            readout(ui, "Fuel trim short B1", sensors.short_fuel_trim_1, "%", 1);
            readout(ui, "Fuel trim long B1", sensors.long_fuel_trim_1, "%", 1);
            readout(ui, "Fuel trim short B2", sensors.short_fuel_trim_2, "%", 1);
            readout(ui, "Fuel trim long B2", sensors.long_fuel_trim_2, "%", 1);
        });
    ui.separator();

    ui.label("Engine load, last minute");
    load_trace(ui, &snapshot.load_history);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_zero_render_differently() {
        assert_eq!(fmt_value(None, 0), "--");
        assert_eq!(fmt_value(Some(0.0), 0), "0");
        assert_eq!(fmt_value(Some(54.321), 1), "54.3");
    }
}
