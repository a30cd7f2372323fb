//! Diagnostics screen. One button runs the backend self-checks and the
//! screen renders the step log from the report.

use eframe::egui;
use lib::api::{BackendClient, DiagnoseReport};
use std::sync::mpsc;

use crate::app::{spawn_worker, AuraApp};

pub struct DiagnosticsScreen {
    report: Option<DiagnoseReport>,
    error: Option<String>,
    receiver: Option<mpsc::Receiver<Result<DiagnoseReport, String>>>,
}

impl DiagnosticsScreen {
    pub fn new() -> Self {
        Self {
            report: None,
            error: None,
            receiver: None,
        }
    }

    pub fn poll(&mut self) {
        if let Some(rx) = &self.receiver {
            if let Ok(result) = rx.try_recv() {
                self.receiver = None;
                match result {
                    Ok(report) => {
                        self.error = None;
                        self.report = Some(report);
                    }
                    Err(e) => self.error = Some(e),
                }
            }
        }
    }

    fn start_run(&mut self, client: &BackendClient) {
        if self.receiver.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        let client = client.clone();
        spawn_worker(tx, async move {
            client.diagnose().await.map_err(|e| e.to_string())
        });
        self.receiver = Some(rx);
    }

    pub fn ui(&mut self, ui: &mut egui::Ui, client: &BackendClient) {
        ui.add_space(24.0);
        ui.heading("Diagnostics");
        ui.add_space(AuraApp::SCREEN_TITLE_BOTTOM_SPACING);

        let running = self.receiver.is_some();
        if ui
            .add_enabled(!running, egui::Button::new("Run diagnostics"))
            .clicked()
        {
            self.start_run(client);
        }
        if running {
            ui.label("(running)");
        }
        ui.add_space(12.0);

        if let Some(err) = &self.error {
            ui.colored_label(egui::Color32::RED, format!("Diagnostics failed: {}", err));
        }

        if let Some(report) = &self.report {
            let (banner, color) = if report.success {
                ("All checks passed.", egui::Color32::GREEN)
            } else {
                ("Some checks failed.", egui::Color32::RED)
            };
            ui.colored_label(color, banner);
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                ui.label("Environment API key:");
                ui.label(if report.env_api_key_present {
                    "present"
                } else {
                    "missing"
                });
            });
            if !report.active_model_id.is_empty() {
                ui.horizontal(|ui| {
                    ui.label("Active model:");
                    ui.monospace(&report.active_model_id);
                });
            }
            ui.add_space(8.0);

            egui::ScrollArea::vertical()
                .id_source("diagnostics_log")
                .max_height((ui.available_height() - AuraApp::SCREEN_FOOTER_SPACING).max(0.0))
                .show(ui, |ui| {
                    for step in &report.logs {
                        let ok = step.status.eq_ignore_ascii_case("ok")
                            || step.status.eq_ignore_ascii_case("success");
                        let mark = if ok { "✔" } else { "✘" };
                        ui.horizontal(|ui| {
                            ui.label(mark);
                            ui.monospace(format!("{}: {}", step.step, step.status));
                        });
                        if !step.details.is_empty() {
                            ui.label(egui::RichText::new(&step.details).weak());
                        }
                    }
                });
        }
        ui.add_space(AuraApp::SCREEN_FOOTER_SPACING);
    }
}
