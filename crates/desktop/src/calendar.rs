//! Calendar screen: month grid, event fetch for the visible month, and a
//! create/edit modal. Plain request/response CRUD; the only state shared
//! with the rest of the app is the backend client and the account email.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use eframe::egui;
use lib::api::{BackendClient, CalendarEvent, EventDraft};
use std::sync::mpsc;

use crate::app::{spawn_worker, AuraApp};

/// Frames between event refreshes (~10 s at 60 fps).
const EVENTS_REFRESH_FRAMES: u32 = 600;

/// Frames a toast stays visible (~3 s at 60 fps).
const TOAST_FRAMES: u32 = 180;

const FORM_TIME_FMT: &str = "%Y-%m-%dT%H:%M";

pub struct CalendarScreen {
    /// First day of the displayed month.
    current_month: NaiveDate,
    events: Vec<CalendarEvent>,
    events_receiver: Option<mpsc::Receiver<Result<Vec<CalendarEvent>, String>>>,
    frames_since_refresh: u32,
    /// Forces a fetch on the next poll (month change, completed mutation).
    needs_refresh: bool,
    loading: bool,

    modal_open: bool,
    /// Event id under edit; None when the modal creates a new event.
    editing_id: Option<String>,
    form_title: String,
    form_start: String,
    form_end: String,
    form_desc: String,
    form_location: String,
    submitting: bool,
    mutate_receiver: Option<mpsc::Receiver<Result<(), String>>>,

    /// Transient message: (text, is_error, frames left).
    toast: Option<(String, bool, u32)>,
}

impl CalendarScreen {
    pub fn new() -> Self {
        let today = chrono::Local::now().date_naive();
        let current_month = today.with_day(1).unwrap_or(today);
        Self {
            current_month,
            events: Vec::new(),
            events_receiver: None,
            frames_since_refresh: EVENTS_REFRESH_FRAMES,
            needs_refresh: true,
            loading: false,
            modal_open: false,
            editing_id: None,
            form_title: String::new(),
            form_start: String::new(),
            form_end: String::new(),
            form_desc: String::new(),
            form_location: String::new(),
            submitting: false,
            mutate_receiver: None,
            toast: None,
        }
    }

    fn show_toast(&mut self, msg: impl Into<String>, is_error: bool) {
        self.toast = Some((msg.into(), is_error, TOAST_FRAMES));
    }

    fn month_window(&self) -> (String, String) {
        let start = self.current_month;
        let end = next_month(start);
        (
            format!("{}T00:00:00Z", start),
            format!("{}T00:00:00Z", end),
        )
    }

    /// Poll receivers and start a refresh on the frame cadence. Call each
    /// frame, even when another screen is visible, so edits land promptly.
    pub fn poll(&mut self, client: &BackendClient, user_email: Option<&str>) {
        if let Some((_, _, frames)) = &mut self.toast {
            *frames = frames.saturating_sub(1);
            if *frames == 0 {
                self.toast = None;
            }
        }

        if let Some(rx) = &self.events_receiver {
            if let Ok(result) = rx.try_recv() {
                self.events_receiver = None;
                self.loading = false;
                match result {
                    Ok(events) => self.events = events,
                    Err(e) => log::warn!("failed to fetch calendar events: {}", e),
                }
            }
        }

        if let Some(rx) = &self.mutate_receiver {
            if let Ok(result) = rx.try_recv() {
                self.mutate_receiver = None;
                self.submitting = false;
                match result {
                    Ok(()) => {
                        self.modal_open = false;
                        self.needs_refresh = true;
                        self.show_toast("Saved.", false);
                    }
                    Err(e) => self.show_toast(e, true),
                }
            }
        }

        let Some(email) = user_email else { return };
        self.frames_since_refresh = self.frames_since_refresh.saturating_add(1);
        let due = self.needs_refresh || self.frames_since_refresh >= EVENTS_REFRESH_FRAMES;
        if due && self.events_receiver.is_none() {
            self.needs_refresh = false;
            self.frames_since_refresh = 0;
            self.loading = true;
            let (time_min, time_max) = self.month_window();
            let (tx, rx) = mpsc::channel();
            let client = client.clone();
            let email = email.to_string();
            spawn_worker(tx, async move {
                client
                    .list_events(&email, &time_min, &time_max)
                    .await
                    .map_err(|e| e.to_string())
            });
            self.events_receiver = Some(rx);
        }
    }

    fn open_create_modal(&mut self) {
        self.editing_id = None;
        let now = chrono::Local::now().naive_local();
        let default = now.format(FORM_TIME_FMT).to_string();
        self.form_title.clear();
        self.form_start = default.clone();
        self.form_end = default;
        self.form_desc.clear();
        self.form_location.clear();
        self.modal_open = true;
    }

    fn open_edit_modal(&mut self, event: &CalendarEvent) {
        self.editing_id = Some(event.id.clone());
        self.form_title = event.summary.clone().unwrap_or_default();
        self.form_start = event
            .start
            .parsed()
            .map(|t| t.naive_local().format(FORM_TIME_FMT).to_string())
            .unwrap_or_default();
        self.form_end = event
            .end
            .parsed()
            .map(|t| t.naive_local().format(FORM_TIME_FMT).to_string())
            .unwrap_or_default();
        self.form_desc = event.description.clone().unwrap_or_default();
        self.form_location = event.location.clone().unwrap_or_default();
        self.modal_open = true;
    }

    fn submit_form(&mut self, client: &BackendClient, email: &str) {
        if self.submitting {
            return;
        }
        if self.form_title.trim().is_empty() {
            self.show_toast("Please enter an event title", true);
            return;
        }
        let Ok(start) = NaiveDateTime::parse_from_str(&self.form_start, FORM_TIME_FMT) else {
            self.show_toast("Invalid start time", true);
            return;
        };
        let Ok(end) = NaiveDateTime::parse_from_str(&self.form_end, FORM_TIME_FMT) else {
            self.show_toast("Invalid end time", true);
            return;
        };
        let draft = EventDraft {
            summary: self.form_title.trim().to_string(),
            description: self.form_desc.clone(),
            location: self.form_location.clone(),
            start_time: start.and_utc().to_rfc3339(),
            end_time: end.and_utc().to_rfc3339(),
        };
        self.submitting = true;
        let (tx, rx) = mpsc::channel();
        let client = client.clone();
        let email = email.to_string();
        let editing_id = self.editing_id.clone();
        spawn_worker(tx, async move {
            let result = match editing_id {
                Some(id) => client.update_event(&email, &id, &draft).await,
                None => client.create_event(&email, &draft).await,
            };
            result.map_err(|e| e.to_string())
        });
        self.mutate_receiver = Some(rx);
    }

    fn delete_editing_event(&mut self, client: &BackendClient, email: &str) {
        let Some(id) = self.editing_id.clone() else { return };
        if self.submitting {
            return;
        }
        self.submitting = true;
        let (tx, rx) = mpsc::channel();
        let client = client.clone();
        let email = email.to_string();
        spawn_worker(tx, async move {
            client.delete_event(&email, &id).await.map_err(|e| e.to_string())
        });
        self.mutate_receiver = Some(rx);
    }

    pub fn ui(&mut self, ui: &mut egui::Ui, client: &BackendClient, user_email: Option<&str>) {
        ui.add_space(24.0);
        ui.horizontal(|ui| {
            ui.heading("Calendar");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("New event").clicked() {
                    self.open_create_modal();
                }
                if ui.button("▶").clicked() {
                    self.current_month = next_month(self.current_month);
                    self.needs_refresh = true;
                }
                ui.label(self.current_month.format("%B %Y").to_string());
                if ui.button("◀").clicked() {
                    self.current_month = prev_month(self.current_month);
                    self.needs_refresh = true;
                }
            });
        });
        ui.add_space(AuraApp::SCREEN_TITLE_BOTTOM_SPACING);

        let Some(email) = user_email.map(String::from) else {
            ui.label("Please connect a calendar account (set calendar.userEmail in the config).");
            return;
        };

        if let Some((msg, is_error, _)) = &self.toast {
            let color = if *is_error {
                egui::Color32::RED
            } else {
                egui::Color32::GREEN
            };
            ui.colored_label(color, msg);
            ui.add_space(8.0);
        }
        if self.loading && self.events.is_empty() {
            ui.label("(loading events)");
            ui.add_space(8.0);
        }

        let mut edit_event: Option<CalendarEvent> = None;
        let cell_width =
            ((ui.available_width() - 6.0 * ui.spacing().item_spacing.x) / 7.0).max(60.0);
        egui::Grid::new("calendar_grid")
            .num_columns(7)
            .min_col_width(cell_width)
            .max_col_width(cell_width)
            .show(ui, |ui| {
                for day in ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"] {
                    ui.label(egui::RichText::new(day).strong());
                }
                ui.end_row();

                let grid_start = self.current_month
                    - Duration::days(
                        self.current_month.weekday().num_days_from_sunday() as i64
                    );
                for week in 0..6 {
                    for dow in 0..7 {
                        let date = grid_start + Duration::days(week * 7 + dow);
                        let in_month = date.month() == self.current_month.month();
                        ui.vertical(|ui| {
                            let day_label = egui::RichText::new(date.day().to_string());
                            ui.label(if in_month { day_label } else { day_label.weak() });
                            for event in events_on(&self.events, date) {
                                let title =
                                    event.summary.clone().unwrap_or_else(|| "No Title".into());
                                if ui.small_button(title).clicked() {
                                    edit_event = Some(event.clone());
                                }
                            }
                        });
                    }
                    ui.end_row();
                }
            });
        if let Some(event) = edit_event {
            self.open_edit_modal(&event);
        }

        if self.modal_open {
            let title = if self.editing_id.is_some() {
                "Edit event"
            } else {
                "New event"
            };
            let mut save = false;
            let mut delete = false;
            let mut cancel = false;
            egui::Window::new(title)
                .collapsible(false)
                .resizable(false)
                .show(ui.ctx(), |ui| {
                    ui.label("Title");
                    ui.text_edit_singleline(&mut self.form_title);
                    ui.label("Start (YYYY-MM-DDTHH:MM)");
                    ui.text_edit_singleline(&mut self.form_start);
                    ui.label("End (YYYY-MM-DDTHH:MM)");
                    ui.text_edit_singleline(&mut self.form_end);
                    ui.label("Description");
                    ui.text_edit_multiline(&mut self.form_desc);
                    ui.label("Location");
                    ui.text_edit_singleline(&mut self.form_location);
                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        save = ui
                            .add_enabled(!self.submitting, egui::Button::new("Save"))
                            .clicked();
                        if self.editing_id.is_some() {
                            delete = ui
                                .add_enabled(!self.submitting, egui::Button::new("Delete"))
                                .clicked();
                        }
                        cancel = ui.button("Cancel").clicked();
                    });
                });
            if save {
                self.submit_form(client, &email);
            }
            if delete {
                self.delete_editing_event(client, &email);
            }
            if cancel {
                self.modal_open = false;
            }
        }
        ui.add_space(AuraApp::SCREEN_FOOTER_SPACING);
    }
}

fn events_on(events: &[CalendarEvent], date: NaiveDate) -> Vec<&CalendarEvent> {
    events
        .iter()
        .filter(|e| start_day(e) == Some(date))
        .collect()
}

/// Day an event belongs to on the grid: the date part of a timed start, or
/// the `date` field of an all-day event.
fn start_day(event: &CalendarEvent) -> Option<NaiveDate> {
    event
        .start
        .parsed()
        .map(|t| t.date_naive())
        .or_else(|| event.start.date.as_deref().and_then(|d| d.parse().ok()))
}

fn next_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first)
}

fn prev_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 1 {
        (first.year() - 1, 12)
    } else {
        (first.year(), first.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_stepping_wraps_year_boundaries() {
        let dec = NaiveDate::from_ymd_opt(2025, 12, 1).expect("date");
        assert_eq!(next_month(dec), NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"));
        let jan = NaiveDate::from_ymd_opt(2026, 1, 1).expect("date");
        assert_eq!(prev_month(jan), NaiveDate::from_ymd_opt(2025, 12, 1).expect("date"));
    }

    #[test]
    fn events_filtered_by_start_date() {
        let event = |id: &str, start: &str| CalendarEvent {
            id: id.to_string(),
            summary: Some("standup".to_string()),
            description: None,
            location: None,
            start: lib::api::EventTime {
                date_time: Some(start.to_string()),
                date: None,
            },
            end: lib::api::EventTime::default(),
        };
        let events = vec![
            event("a", "2026-03-14T09:30:00+00:00"),
            event("b", "2026-03-15T09:30:00+00:00"),
        ];
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).expect("date");
        let on_day = events_on(&events, day);
        assert_eq!(on_day.len(), 1);
        assert_eq!(on_day[0].id, "a");
    }

    #[test]
    fn all_day_events_land_on_their_stated_day() {
        let all_day = CalendarEvent {
            id: "c".to_string(),
            summary: Some("offsite".to_string()),
            description: None,
            location: None,
            start: lib::api::EventTime {
                date_time: None,
                date: Some("2026-03-14".to_string()),
            },
            end: lib::api::EventTime::default(),
        };
        let events = vec![all_day];
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).expect("date");
        assert_eq!(events_on(&events, day).len(), 1);
        let other = NaiveDate::from_ymd_opt(2026, 3, 15).expect("date");
        assert!(events_on(&events, other).is_empty());
    }
}
