//! Diagnostics tab: trouble codes, freeze frame, and the clear action.

use chrono::Utc;
use eframe::egui::{self, Color32, Id, Modal, RichText, ScrollArea, Ui};
use tracing::warn;

use crate::state::{FreezeFrame, VehicleState};
use crate::telemetry::CommandPublisher;

pub struct DiagnosticsTab {
    publisher: CommandPublisher,
    confirming_clear: bool,
}

impl DiagnosticsTab {
    pub fn new(publisher: CommandPublisher) -> Self {
        Self {
            publisher,
            confirming_clear: false,
        }
    }

    pub fn render(&mut self, ui: &mut Ui, snapshot: &VehicleState) {
        ui.heading("Diagnostics");

        egui::Grid::new("vehicle_info")
            .num_columns(2)
            .min_col_width(120.0)
            .show(ui, |ui| {
                ui.label("VIN");
                ui.label(snapshot.sensors.vin.as_deref().unwrap_or("--"));
                ui.end_row();
                ui.label("Fuel system");
                ui.label(snapshot.sensors.fuel_status.as_deref().unwrap_or("--"));
                ui.end_row();
                ui.label("Codes cleared");
                ui.label(snapshot.time_since_cleared(Utc::now()));
                ui.end_row();
            });
        ui.separator();

        ui.label("Stored trouble codes");
        if snapshot.dtcs.is_empty() {
            ui.label("No stored codes");
        } else {
            ScrollArea::vertical().max_height(120.0).show(ui, |ui| {
                for code in &snapshot.dtcs {
                    ui.label(RichText::new(code).color(Color32::LIGHT_RED).monospace());
                }
            });
        }

        if ui.button("Clear trouble codes").clicked() {
            self.confirming_clear = true;
        }
        if self.confirming_clear {
            self.confirm_clear(ui);
        }
        ui.separator();

        match &snapshot.freeze_frame {
            Some(frame) => freeze_frame(ui, frame),
            None => {
                ui.label("No freeze frame recorded");
            }
        }
    }

    /// Confirmation gate for the one destructive command. Dispatch only
    /// happens here; the telemetry core does not re-check.
    fn confirm_clear(&mut self, ui: &mut Ui) {
        let modal = Modal::new(Id::new("confirm_clear"));
        modal.show(ui.ctx(), |ui| {
            ui.set_width(260.0);
            ui.heading("Clear trouble codes?");
            ui.label("The bridge is told to erase all stored DTCs. This cannot be undone.");
            ui.separator();

            let mut clear_clicked = false;
            let mut cancel_clicked = false;
            egui::Sides::new().show(
                ui,
                |left| {
                    if left.button("Clear").clicked() {
                        clear_clicked = true;
                    }
                },
                |right| {
                    if right.button("Cancel").clicked() {
                        cancel_clicked = true;
                    }
                },
            );
            if clear_clicked {
                if let Err(e) = self.publisher.clear_diagnostic_codes() {
                    warn!("clear command not queued: {}", e);
                }
                self.confirming_clear = false;
            }
            if cancel_clicked {
                self.confirming_clear = false;
            }
        });
    }
}

fn freeze_frame(ui: &mut Ui, frame: &FreezeFrame) {
    ui.label(format!("Freeze frame for {}", frame.code));
    egui::Grid::new("freeze_frame")
        .num_columns(2)
        .min_col_width(120.0)
        .show(ui, |ui| {
            let rows = [
                ("RPM", frame.sensors.rpm, "", 0),
                ("Speed", frame.sensors.speed, "km/h", 0),
                ("Engine load", frame.sensors.engine_load, "%", 1),
                ("Coolant temp", frame.sensors.coolant_temp, "°C", 1),
                ("Intake pressure", frame.sensors.intake_pressure, "kPa", 1),
                ("Throttle", frame.sensors.throttle_pos, "%", 1),
            ];
            for (label, value, unit, digits) in rows {
                ui.label(label);
                let text = match value {
                    Some(v) => format!("{v:.digits$} {unit}"),
                    None => "--".to_string(),
                };
                ui.label(text);
                ui.end_row();
            }
        });
}
