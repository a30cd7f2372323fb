//! Settings screen. The backend stores one settings document; this screen
//! loads it once, edits it in place, and writes the whole document back on
//! every committed change.

use eframe::egui;
use lib::api::{ApiKey, AppSettings, BackendClient, ModelConfig};
use std::sync::mpsc;

use crate::app::{spawn_worker, AuraApp};

#[derive(Clone, Copy, PartialEq, Eq)]
enum SettingsTab {
    Models,
    ApiKeys,
    System,
}

#[derive(Default)]
struct ModelForm {
    name: String,
    provider: String,
    model_id: String,
    context_window: String,
    description: String,
}

pub struct SettingsScreen {
    tab: SettingsTab,
    settings: Option<AppSettings>,
    load_receiver: Option<mpsc::Receiver<Result<AppSettings, String>>>,
    load_started: bool,
    load_error: Option<String>,

    save_receiver: Option<mpsc::Receiver<Result<(), String>>>,
    save_error: Option<String>,
    /// Set when a change landed outside the tab body (the model form window).
    pending_save: bool,

    model_form_open: bool,
    /// Model id under edit; None when adding a new model.
    editing_model_id: Option<String>,
    model_form: ModelForm,

    key_name: String,
    key_value: String,
}

impl SettingsScreen {
    pub fn new() -> Self {
        Self {
            tab: SettingsTab::Models,
            settings: None,
            load_receiver: None,
            load_started: false,
            load_error: None,
            save_receiver: None,
            save_error: None,
            pending_save: false,
            model_form_open: false,
            editing_model_id: None,
            model_form: ModelForm::default(),
            key_name: String::new(),
            key_value: String::new(),
        }
    }

    pub fn poll(&mut self, client: &BackendClient) {
        if !self.load_started {
            self.load_started = true;
            let (tx, rx) = mpsc::channel();
            let client = client.clone();
            spawn_worker(tx, async move {
                client.get_settings().await.map_err(|e| e.to_string())
            });
            self.load_receiver = Some(rx);
        }
        if let Some(rx) = &self.load_receiver {
            if let Ok(result) = rx.try_recv() {
                self.load_receiver = None;
                match result {
                    Ok(settings) => {
                        self.load_error = None;
                        self.settings = Some(settings);
                    }
                    Err(e) => self.load_error = Some(e),
                }
            }
        }
        if let Some(rx) = &self.save_receiver {
            if let Ok(result) = rx.try_recv() {
                self.save_receiver = None;
                match result {
                    Ok(()) => self.save_error = None,
                    Err(e) => {
                        log::error!("failed to save settings: {}", e);
                        self.save_error = Some(e);
                    }
                }
            }
        }
        if self.pending_save {
            self.pending_save = false;
            self.save(client);
        }
    }

    /// Write the current document back. Last write wins; the backend has no
    /// notion of partial updates.
    fn save(&mut self, client: &BackendClient) {
        let Some(settings) = self.settings.clone() else { return };
        let (tx, rx) = mpsc::channel();
        let client = client.clone();
        spawn_worker(tx, async move {
            client
                .update_settings(&settings)
                .await
                .map_err(|e| e.to_string())
        });
        self.save_receiver = Some(rx);
    }

    fn open_model_form(&mut self, model: Option<&ModelConfig>) {
        match model {
            Some(m) => {
                self.editing_model_id = Some(m.id.clone());
                self.model_form = ModelForm {
                    name: m.name.clone(),
                    provider: m.provider.clone(),
                    model_id: m.model_id.clone(),
                    context_window: m.context_window.to_string(),
                    description: m.description.clone(),
                };
            }
            None => {
                self.editing_model_id = None;
                self.model_form = ModelForm {
                    provider: "google".to_string(),
                    context_window: "128000".to_string(),
                    ..ModelForm::default()
                };
            }
        }
        self.model_form_open = true;
    }

    /// Apply the model form to the document. Returns false when the form is
    /// not valid yet.
    fn commit_model_form(&mut self) -> bool {
        let name = self.model_form.name.trim().to_string();
        let model_id = self.model_form.model_id.trim().to_string();
        if name.is_empty() || model_id.is_empty() {
            return false;
        }
        let context_window = self
            .model_form
            .context_window
            .trim()
            .parse::<u64>()
            .unwrap_or(128_000);
        let Some(settings) = self.settings.as_mut() else { return false };
        match &self.editing_model_id {
            Some(id) => {
                if let Some(m) = settings.models.iter_mut().find(|m| &m.id == id) {
                    m.name = name;
                    m.provider = self.model_form.provider.trim().to_string();
                    m.model_id = model_id;
                    m.context_window = context_window;
                    m.description = self.model_form.description.trim().to_string();
                }
            }
            None => {
                let model = ModelConfig {
                    id: uuid::Uuid::new_v4().to_string(),
                    name,
                    provider: self.model_form.provider.trim().to_string(),
                    model_id,
                    context_window,
                    description: self.model_form.description.trim().to_string(),
                };
                if settings.active_model_id.is_empty() {
                    settings.active_model_id = model.id.clone();
                }
                settings.models.push(model);
            }
        }
        true
    }

    pub fn ui(&mut self, ui: &mut egui::Ui, client: &BackendClient) {
        ui.add_space(24.0);
        ui.heading("Settings");
        ui.add_space(AuraApp::SCREEN_TITLE_BOTTOM_SPACING);

        if let Some(err) = &self.load_error {
            ui.colored_label(egui::Color32::RED, format!("Failed to load settings: {}", err));
            if ui.button("Retry").clicked() {
                self.load_started = false;
                self.load_error = None;
            }
            return;
        }
        if self.settings.is_none() {
            ui.label("(loading settings)");
            return;
        }
        if let Some(err) = &self.save_error {
            ui.colored_label(egui::Color32::RED, format!("Failed to save: {}", err));
            ui.add_space(8.0);
        }

        ui.horizontal(|ui| {
            for (tab, label) in [
                (SettingsTab::Models, "Models"),
                (SettingsTab::ApiKeys, "API keys"),
                (SettingsTab::System, "System"),
            ] {
                if ui.selectable_label(self.tab == tab, label).clicked() {
                    self.tab = tab;
                }
            }
        });
        ui.separator();
        ui.add_space(8.0);

        let dirty = match self.tab {
            SettingsTab::Models => self.ui_models(ui),
            SettingsTab::ApiKeys => self.ui_api_keys(ui),
            SettingsTab::System => self.ui_system(ui),
        };
        if dirty {
            self.save(client);
        }

        self.ui_model_form(ui);
        ui.add_space(AuraApp::SCREEN_FOOTER_SPACING);
    }

    fn ui_models(&mut self, ui: &mut egui::Ui) -> bool {
        let mut dirty = false;
        let mut edit: Option<ModelConfig> = None;
        {
            let settings = self.settings.as_mut().expect("settings loaded");
            let mut activate: Option<String> = None;
            let mut remove: Option<usize> = None;
            for (i, model) in settings.models.iter().enumerate() {
                ui.horizontal(|ui| {
                    let active = settings.active_model_id == model.id;
                    ui.label(if active {
                        egui::RichText::new(&model.name).strong()
                    } else {
                        egui::RichText::new(&model.name)
                    });
                    ui.label(
                        egui::RichText::new(format!("{} / {}", model.provider, model.model_id))
                            .weak(),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("🗑").clicked() {
                            remove = Some(i);
                        }
                        if ui.small_button("Edit").clicked() {
                            edit = Some(model.clone());
                        }
                        if !active && ui.small_button("Use").clicked() {
                            activate = Some(model.id.clone());
                        }
                    });
                });
            }
            if let Some(id) = activate {
                settings.active_model_id = id;
                dirty = true;
            }
            if let Some(i) = remove {
                let removed = settings.models.remove(i);
                if settings.active_model_id == removed.id {
                    settings.active_model_id = settings
                        .models
                        .first()
                        .map(|m| m.id.clone())
                        .unwrap_or_default();
                }
                dirty = true;
            }
        }
        if let Some(model) = edit {
            self.open_model_form(Some(&model));
        }
        ui.add_space(8.0);
        if ui.button("Add model").clicked() {
            self.open_model_form(None);
        }
        dirty
    }

    fn ui_api_keys(&mut self, ui: &mut egui::Ui) -> bool {
        let settings = self.settings.as_mut().expect("settings loaded");
        let mut dirty = false;
        let mut activate: Option<String> = None;
        let mut remove: Option<usize> = None;
        for (i, key) in settings.api_keys.iter().enumerate() {
            ui.horizontal(|ui| {
                let active = settings.active_api_key_id.as_deref() == Some(key.id.as_str());
                ui.label(if active {
                    egui::RichText::new(&key.name).strong()
                } else {
                    egui::RichText::new(&key.name)
                });
                ui.label(egui::RichText::new(masked_key(&key.key)).weak().monospace());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("🗑").clicked() {
                        remove = Some(i);
                    }
                    if !active && ui.small_button("Use").clicked() {
                        activate = Some(key.id.clone());
                    }
                });
            });
        }
        if let Some(id) = activate {
            settings.active_api_key_id = Some(id);
            dirty = true;
        }
        if let Some(i) = remove {
            let removed = settings.api_keys.remove(i);
            if settings.active_api_key_id.as_deref() == Some(removed.id.as_str()) {
                settings.active_api_key_id = settings.api_keys.first().map(|k| k.id.clone());
            }
            dirty = true;
        }
        ui.add_space(12.0);
        ui.label("Add key");
        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.key_name)
                    .hint_text("Name")
                    .desired_width(160.0),
            );
            ui.add(
                egui::TextEdit::singleline(&mut self.key_value)
                    .hint_text("Key")
                    .password(true)
                    .desired_width(280.0),
            );
            let ready = !self.key_name.trim().is_empty() && !self.key_value.trim().is_empty();
            if ui.add_enabled(ready, egui::Button::new("Add")).clicked() {
                let key = ApiKey::generate(self.key_name.trim(), self.key_value.trim());
                if settings.active_api_key_id.is_none() {
                    settings.active_api_key_id = Some(key.id.clone());
                }
                settings.api_keys.push(key);
                self.key_name.clear();
                self.key_value.clear();
                dirty = true;
            }
        });
        dirty
    }

    fn ui_system(&mut self, ui: &mut egui::Ui) -> bool {
        let settings = self.settings.as_mut().expect("settings loaded");
        let mut dirty = false;

        ui.label("System prompt");
        let prompt = ui.add(
            egui::TextEdit::multiline(&mut settings.system_prompt)
                .desired_rows(6)
                .desired_width(f32::INFINITY),
        );
        if prompt.lost_focus() {
            dirty = true;
        }
        ui.add_space(12.0);

        ui.label("Temperature");
        let slider = ui.add(egui::Slider::new(&mut settings.temperature, 0.0..=2.0).step_by(0.1));
        if slider.drag_released() || (slider.changed() && !slider.dragged()) {
            dirty = true;
        }
        ui.add_space(12.0);

        ui.label("Theme");
        ui.horizontal(|ui| {
            for theme in ["dark", "light"] {
                if ui
                    .selectable_label(settings.theme == theme, theme)
                    .clicked()
                    && settings.theme != theme
                {
                    settings.theme = theme.to_string();
                    dirty = true;
                }
            }
        });
        dirty
    }

    fn ui_model_form(&mut self, ui: &mut egui::Ui) {
        if !self.model_form_open {
            return;
        }
        let title = if self.editing_model_id.is_some() {
            "Edit model"
        } else {
            "Add model"
        };
        let mut save = false;
        let mut cancel = false;
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .show(ui.ctx(), |ui| {
                ui.label("Name");
                ui.text_edit_singleline(&mut self.model_form.name);
                ui.label("Provider");
                ui.text_edit_singleline(&mut self.model_form.provider);
                ui.label("Model id");
                ui.text_edit_singleline(&mut self.model_form.model_id);
                ui.label("Context window");
                ui.text_edit_singleline(&mut self.model_form.context_window);
                ui.label("Description");
                ui.text_edit_singleline(&mut self.model_form.description);
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    save = ui.button("Save").clicked();
                    cancel = ui.button("Cancel").clicked();
                });
            });
        if save && self.commit_model_form() {
            self.model_form_open = false;
            // The form window renders after the tab's dirty check, so the
            // save runs from the next poll.
            self.pending_save = true;
        }
        if cancel {
            self.model_form_open = false;
        }
    }
}

fn masked_key(key: &str) -> String {
    let chars = key.chars().count();
    if chars <= 4 {
        "••••".to_string()
    } else {
        // Count chars, not bytes; keys are free-text and may be multibyte.
        let tail: String = key.chars().skip(chars - 4).collect();
        format!("••••{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_key_keeps_last_four() {
        assert_eq!(masked_key("sk-abcdef123456"), "••••3456");
        assert_eq!(masked_key("abc"), "••••");
    }

    #[test]
    fn masked_key_handles_multibyte_tails() {
        assert_eq!(masked_key("aaa€€"), "••••aa€€");
        assert_eq!(masked_key("€€€"), "••••");
        assert_eq!(masked_key("ключ-секрет"), "••••крет");
    }
}
