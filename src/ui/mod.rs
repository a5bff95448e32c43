//! # Car HUD User Interface
//!
//! Thin, stateless presentation layer over the telemetry core. Every
//! frame reads the latest [`VehicleState`] snapshot from the watch
//! channel and redraws; the only mutation it can cause is dispatching
//! the clear-codes command through [`CommandPublisher`], and that is
//! gated behind a confirmation dialog in the diagnostics tab.
//!
//! Layout follows the three-panel pattern: tab buttons on top, the
//! active tab in the center, link status at the bottom.

mod diagnostics;
mod gauges;

use std::time::Duration;

use eframe::egui::{self, Button, Vec2};
use tokio::sync::watch;

use crate::state::VehicleState;
use crate::telemetry::link::LinkStatus;
use crate::telemetry::{CommandPublisher, ConnectionState};
use diagnostics::DiagnosticsTab;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuState {
    Dashboard,
    Diagnostics,
}

pub struct CarHudUI {
    snapshots: watch::Receiver<VehicleState>,
    status: watch::Receiver<LinkStatus>,
    menu_state: MenuState,
    diagnostics: DiagnosticsTab,
}

impl CarHudUI {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        snapshots: watch::Receiver<VehicleState>,
        status: watch::Receiver<LinkStatus>,
        publisher: CommandPublisher,
    ) -> Self {
        Self {
            snapshots,
            status,
            menu_state: MenuState::Dashboard,
            diagnostics: DiagnosticsTab::new(publisher),
        }
    }

    fn status_line(&self, ui: &mut egui::Ui) {
        let status = self.status.borrow().clone();
        let indicator = match status.connection_state {
            ConnectionState::Subscribed => "🟢",
            ConnectionState::Connected | ConnectionState::Connecting => "🟡",
            ConnectionState::Disconnected => "🔴",
        };
        ui.horizontal_centered(|ui| {
            ui.label(format!("{} {}", indicator, status.connection_state));
            ui.label(format!("rx: {}", status.messages_received));
            ui.label(format!("tx: {}", status.messages_sent));
            if let Some(at) = status.last_activity {
                ui.label(format!("last message: {}", at.format("%H:%M:%S")));
            }
            if let Some(error) = &status.last_error {
                ui.label(format!("last error: {error}"));
            }
        });
    }
}

impl eframe::App for CarHudUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            // Telemetry arrives at ~10 Hz; repaint a bit faster so the
            // gauges never look stale.
            ui.ctx().request_repaint_after(Duration::from_millis(50));
            let width = ui.available_width() - 60.0;

            egui::TopBottomPanel::top("top_panel")
                .show_separator_line(false)
                .show_inside(ui, |ui| {
                    ui.horizontal_centered(|ui| {
                        let dashboard_button = Button::new("Dashboard").min_size(Vec2 {
                            x: width / 2.0,
                            y: 20.0,
                        });
                        let diagnostics_button = Button::new("Diagnostics").min_size(Vec2 {
                            x: width / 2.0,
                            y: 20.0,
                        });

                        if ui.add(dashboard_button).clicked() {
                            self.menu_state = MenuState::Dashboard;
                        };
                        if ui.add(diagnostics_button).clicked() {
                            self.menu_state = MenuState::Diagnostics;
                        };
                    });
                });

            let snapshot = self.snapshots.borrow().clone();

            egui::CentralPanel::default().show_inside(ui, |ui| match self.menu_state {
                MenuState::Dashboard => gauges::render(ui, &snapshot),
                MenuState::Diagnostics => self.diagnostics.render(ui, &snapshot),
            });

            egui::TopBottomPanel::bottom("bottom_panel")
                .show_separator_line(false)
                .show_inside(ui, |ui| self.status_line(ui));
        });
    }
}
