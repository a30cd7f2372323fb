//! Aura Desktop application entry.

use eframe::egui;

mod app;
mod calendar;
mod diagnostics;
mod settings;

fn main() -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Aura",
        options,
        Box::new(|cc| Box::new(app::AuraApp::new(cc))),
    )
}
