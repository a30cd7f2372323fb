//! Aura Desktop egui app state and UI.
//!
//! All backend requests run on worker threads and report back over mpsc
//! channels polled once per frame; the chat screen drives the session
//! synchronization engine in `lib::session`.

use eframe::egui;
use lib::api::{AppSettings, BackendClient, ChatReply, ModelConfig, ThreadMessage, ThreadSummary};
use lib::session::{ChatSession, Role};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};

use crate::calendar::CalendarScreen;
use crate::diagnostics::DiagnosticsScreen;
use crate::settings::SettingsScreen;

const CHAT_INPUT_HEIGHT: f32 = 130.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;

/// Frames between thread-list refreshes (~5 s at 60 fps).
const THREADS_REFRESH_FRAMES: u32 = 300;

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

static LOGGER: DesktopLogger = DesktopLogger;

/// Run a backend request on a worker thread with its own runtime and send
/// the output over the channel. The receiver side is polled per frame.
pub(crate) fn spawn_worker<T, F>(tx: mpsc::Sender<T>, fut: F)
where
    T: Send + 'static,
    F: std::future::Future<Output = T> + Send + 'static,
{
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("failed to create worker runtime: {}", e);
                return;
            }
        };
        let _ = tx.send(rt.block_on(fut));
    });
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Chat,
    Calendar,
    Settings,
    Diagnostics,
    Logs,
}

pub struct AuraApp {
    client: BackendClient,
    user_email: Option<String>,

    /// The conversation state machine; owns the thread identity, the
    /// transcript, and the busy flag.
    session: ChatSession,
    /// Current input text for the chat box.
    chat_input: String,
    /// Long-lived channel for history completions, each tagged with the
    /// thread id the fetch was issued for. Stale results are discarded by
    /// the session engine, not by dropping receivers.
    history_tx: mpsc::Sender<(String, Result<Vec<ThreadMessage>, String>)>,
    history_rx: mpsc::Receiver<(String, Result<Vec<ThreadMessage>, String>)>,
    /// When Some, a send is in flight; we read the reply or error text here.
    send_receiver: Option<mpsc::Receiver<Result<ChatReply, String>>>,

    /// Thread list for the right panel.
    threads: Vec<ThreadSummary>,
    threads_receiver: Option<mpsc::Receiver<Result<Vec<ThreadSummary>, String>>>,
    frames_since_threads: u32,
    /// Thread id with a pending delete confirmation, if any.
    confirm_delete_id: Option<String>,
    /// When Some, a delete is in flight; carries the deleted id on success.
    delete_receiver: Option<mpsc::Receiver<Result<String, String>>>,

    /// Models for the picker pill, from the settings fetch at mount.
    models: Vec<ModelConfig>,
    active_model_id: String,
    chat_settings_receiver: Option<mpsc::Receiver<Result<AppSettings, String>>>,

    current_screen: Screen,
    calendar: CalendarScreen,
    settings: SettingsScreen,
    diagnostics: DiagnosticsScreen,
}

impl AuraApp {
    /// Space between the screen title and the content below.
    pub(crate) const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    pub(crate) const SCREEN_FOOTER_SPACING: f32 = 48.0;

    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");

        let (config, _) = lib::config::load_config(None).unwrap_or_else(|e| {
            log::warn!("failed to load config, using defaults: {}", e);
            (lib::config::Config::default(), std::path::PathBuf::new())
        });
        let client = BackendClient::from_config(&config).unwrap_or_else(|e| {
            log::warn!("failed to build backend client, using defaults: {}", e);
            BackendClient::new(None)
        });
        let user_email = lib::config::resolve_user_email(&config);

        let (history_tx, history_rx) = mpsc::channel();
        let mut app = Self {
            client,
            user_email,
            session: ChatSession::new(),
            chat_input: String::new(),
            history_tx,
            history_rx,
            send_receiver: None,
            threads: Vec::new(),
            threads_receiver: None,
            frames_since_threads: THREADS_REFRESH_FRAMES,
            confirm_delete_id: None,
            delete_receiver: None,
            models: Vec::new(),
            active_model_id: String::new(),
            chat_settings_receiver: None,
            current_screen: Screen::default(),
            calendar: CalendarScreen::new(),
            settings: SettingsScreen::new(),
            diagnostics: DiagnosticsScreen::new(),
        };
        app.start_settings_fetch();
        app
    }

    /// One-time settings fetch at mount: model names for the picker pill.
    fn start_settings_fetch(&mut self) {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        spawn_worker(tx, async move {
            client.get_settings().await.map_err(|e| e.to_string())
        });
        self.chat_settings_receiver = Some(rx);
    }

    fn poll_settings_fetch(&mut self) {
        if let Some(rx) = &self.chat_settings_receiver {
            if let Ok(result) = rx.try_recv() {
                self.chat_settings_receiver = None;
                match result {
                    Ok(settings) => {
                        self.models = settings.models;
                        self.active_model_id = settings.active_model_id;
                    }
                    Err(e) => log::warn!("failed to fetch settings: {}", e),
                }
            }
        }
    }

    /// Persist a model pick: read the settings document, swap the active
    /// model, write it back. Errors are logged; the pill keeps the pick.
    fn change_active_model(&mut self, model_id: String) {
        self.active_model_id = model_id.clone();
        let client = self.client.clone();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("failed to create worker runtime: {}", e);
                    return;
                }
            };
            let result = rt.block_on(async {
                let mut settings = client.get_settings().await?;
                settings.active_model_id = model_id;
                client.update_settings(&settings).await
            });
            if let Err(e) = result {
                log::warn!("failed to update active model: {}", e);
            }
        });
    }

    /// Poll for the thread list and refresh it on a frame cadence.
    fn poll_threads_refresh(&mut self) {
        if let Some(rx) = &self.threads_receiver {
            if let Ok(result) = rx.try_recv() {
                self.threads_receiver = None;
                match result {
                    Ok(threads) => self.threads = threads,
                    Err(e) => log::warn!("failed to fetch threads: {}", e),
                }
            }
        }
        self.frames_since_threads = self.frames_since_threads.saturating_add(1);
        if self.threads_receiver.is_none() && self.frames_since_threads >= THREADS_REFRESH_FRAMES {
            self.frames_since_threads = 0;
            let (tx, rx) = mpsc::channel();
            let client = self.client.clone();
            spawn_worker(tx, async move {
                client.list_threads().await.map_err(|e| e.to_string())
            });
            self.threads_receiver = Some(rx);
        }
    }

    /// Switch the displayed conversation and start its history fetch.
    /// The engine blanks the transcript immediately; the fetch result is
    /// checked against the current identity when it arrives.
    fn select_thread(&mut self, target: Option<String>) {
        self.confirm_delete_id = None;
        if let Some(id) = self.session.navigate(target) {
            let tx = self.history_tx.clone();
            let client = self.client.clone();
            spawn_worker(tx, async move {
                let result = client
                    .thread_history(&id)
                    .await
                    .map_err(|e| e.to_string());
                (id, result)
            });
        }
    }

    /// Drain history completions into the engine. Call each frame.
    fn poll_history(&mut self) {
        while let Ok((for_thread, result)) = self.history_rx.try_recv() {
            self.session.apply_history(&for_thread, result);
        }
    }

    /// Start a send if the engine accepts it (non-empty, not busy).
    fn start_chat_send(&mut self) {
        let Some(pending) = self.session.begin_send(&self.chat_input) else {
            return;
        };
        self.chat_input.clear();
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        spawn_worker(tx, async move {
            client
                .send_chat(&pending.text, pending.bound.as_deref())
                .await
                .map_err(|e| e.chat_display())
        });
        self.send_receiver = Some(rx);
    }

    /// Poll for the send result and reconcile it. A draft promotion comes
    /// back as the new thread id: the selection is already advanced inside
    /// the engine (a rename, not a reload); we only refresh the sidebar.
    fn poll_chat_send(&mut self) {
        if let Some(rx) = &self.send_receiver {
            if let Ok(result) = rx.try_recv() {
                self.send_receiver = None;
                if let Some(id) = self.session.apply_send(result) {
                    log::info!("draft promoted to thread {}", id);
                    self.frames_since_threads = THREADS_REFRESH_FRAMES;
                }
            }
        }
    }

    fn start_thread_delete(&mut self, id: String) {
        if self.delete_receiver.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        spawn_worker(tx, async move {
            client
                .delete_thread(&id)
                .await
                .map(|_| id)
                .map_err(|e| e.to_string())
        });
        self.delete_receiver = Some(rx);
    }

    fn poll_thread_delete(&mut self) {
        if let Some(rx) = &self.delete_receiver {
            if let Ok(result) = rx.try_recv() {
                self.delete_receiver = None;
                match result {
                    Ok(id) => {
                        self.threads.retain(|t| t.id != id);
                        self.confirm_delete_id = None;
                        // Deleting the displayed thread drops back to a draft.
                        if self.session.current_thread() == Some(id.as_str()) {
                            self.select_thread(None);
                        }
                    }
                    Err(e) => log::warn!("failed to delete thread: {}", e),
                }
            }
        }
    }

    /// Renders a single chat message (frame, role-based fill, content).
    fn render_chat_message(ui: &mut egui::Ui, m: &lib::session::ChatMessage) {
        let is_user = m.role == Role::User;
        let frame = egui::Frame::none()
            .fill(if is_user {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(
                1.0,
                ui.style().visuals.widgets.noninteractive.bg_stroke.color,
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        frame.show(ui, |ui| {
            if is_user {
                ui.label(egui::RichText::new(&m.content).strong());
            } else {
                ui.label(&m.content);
            }
        });
    }

    /// Render the chat UI: messages fill the space with stick-to-bottom,
    /// input and controls are fixed at the bottom.
    fn ui_chat(&mut self, ui: &mut egui::Ui) {
        let row_height = ui.spacing().interact_size.y + 8.0;
        let bottom_section_height =
            CHAT_INPUT_HEIGHT + 8.0 + row_height + Self::SCREEN_FOOTER_SPACING;
        let available = ui.available_height();
        let messages_height = (available - bottom_section_height).max(CHAT_MESSAGES_MIN_HEIGHT);

        let messages_width = ui.available_width();
        let messages_rect = ui
            .allocate_exact_size(
                egui::vec2(messages_width, messages_height),
                egui::Sense::hover(),
            )
            .0;
        let mut messages_ui =
            ui.child_ui(messages_rect, egui::Layout::top_down(egui::Align::Min));
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .show(&mut messages_ui, |ui| {
                // Force scroll content to be at least viewport width so the
                // scrollbar stays on the right
                let content_width = ui.available_width();
                ui.allocate_exact_size(egui::vec2(content_width, 0.0), egui::Sense::hover());
                if self.session.transcript().is_empty() && !self.session.is_loading() {
                    ui.add_space(48.0);
                    ui.vertical_centered(|ui| {
                        ui.label(egui::RichText::new("Aura Online").strong());
                        ui.label("Ready to assist.");
                    });
                }
                for m in self.session.transcript().messages() {
                    Self::render_chat_message(ui, m);
                    ui.add_space(8.0);
                }
                if self.session.is_loading() {
                    ui.label(egui::RichText::new("…").weak());
                }
            });

        ui.add_space(8.0);

        let hint = format!("Message {}...", self.active_model_name());
        let text_response = ui.add_sized(
            [ui.available_width(), CHAT_INPUT_HEIGHT],
            egui::TextEdit::multiline(&mut self.chat_input).hint_text(hint),
        );
        ui.add_space(8.0);

        let row_width = ui.available_width();
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(row_width, row_height), egui::Sense::hover());
        let mut row_ui = ui.child_ui(rect, egui::Layout::right_to_left(egui::Align::Center));
        egui::Frame::none()
            .inner_margin(egui::Margin {
                left: 0.0,
                right: 8.0,
                top: 4.0,
                bottom: 4.0,
            })
            .show(&mut row_ui, |ui| {
                let mut send_now = false;

                let can_send =
                    !self.session.is_loading() && !self.chat_input.trim().is_empty();
                let send_button = ui.add_enabled(can_send, egui::Button::new("Send"));
                if send_button.clicked() {
                    send_now = true;
                }

                // Model picker pill, fed by the settings fetch at mount.
                if !self.models.is_empty() {
                    ui.add_space(8.0);
                    let current_label = self.active_model_name();
                    let mut picked: Option<String> = None;
                    egui::ComboBox::from_id_source("model_select")
                        .selected_text(current_label)
                        .show_ui(ui, |ui| {
                            for m in &self.models {
                                let selected = self.active_model_id == m.id;
                                if ui.selectable_label(selected, &m.name).clicked() {
                                    picked = Some(m.id.clone());
                                }
                            }
                        });
                    if let Some(id) = picked {
                        self.change_active_model(id);
                    }
                }

                if text_response.has_focus() {
                    let modifiers = ui.input(|i| i.modifiers);
                    if (modifiers.command || modifiers.ctrl)
                        && ui.input(|i| i.key_pressed(egui::Key::Enter))
                    {
                        send_now = true;
                    }
                }
                if send_now {
                    self.start_chat_send();
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn active_model_name(&self) -> String {
        self.models
            .iter()
            .find(|m| m.id == self.active_model_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "Select Model".to_string())
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let available = ui.available_height();
        let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(
                        egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace),
                    );
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_threads_panel(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Threads");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        if ui.button("New chat").clicked() {
            self.select_thread(None);
        }
        ui.add_space(8.0);

        let mut select: Option<String> = None;
        let mut ask_delete: Option<String> = None;
        let mut do_delete: Option<String> = None;
        for thread in &self.threads {
            let is_active = self.session.current_thread() == Some(thread.id.as_str());
            ui.horizontal(|ui| {
                if ui.selectable_label(is_active, &thread.title).clicked() && !is_active {
                    select = Some(thread.id.clone());
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.confirm_delete_id.as_deref() == Some(thread.id.as_str()) {
                        if ui.small_button("Confirm").clicked() {
                            do_delete = Some(thread.id.clone());
                        }
                    } else if ui.small_button("🗑").clicked() {
                        ask_delete = Some(thread.id.clone());
                    }
                });
            });
        }
        if self.threads.is_empty() {
            ui.label("No threads yet. Send a message to start one.");
        }
        if let Some(id) = select {
            self.select_thread(Some(id));
        }
        if let Some(id) = ask_delete {
            self.confirm_delete_id = Some(id);
        }
        if let Some(id) = do_delete {
            self.start_thread_delete(id);
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }
}

impl eframe::App for AuraApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_settings_fetch();
        self.poll_threads_refresh();
        self.poll_history();
        self.poll_chat_send();
        self.poll_thread_delete();
        self.calendar.poll(&self.client, self.user_email.as_deref());
        self.settings.poll(&self.client);
        self.diagnostics.poll();

        // Header with title only
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(16.0);
                    ui.heading("Aura");
                    ui.add_space(16.0);
                });
        });

        let current_screen = &mut self.current_screen;
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(140.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        ui.add_space(24.0);
                        if ui
                            .selectable_label(*current_screen == Screen::Chat, "Chat")
                            .clicked()
                        {
                            *current_screen = Screen::Chat;
                        }
                        ui.add_space(12.0);
                        if ui
                            .selectable_label(*current_screen == Screen::Calendar, "Calendar")
                            .clicked()
                        {
                            *current_screen = Screen::Calendar;
                        }
                        ui.add_space(12.0);
                        if ui
                            .selectable_label(*current_screen == Screen::Settings, "Settings")
                            .clicked()
                        {
                            *current_screen = Screen::Settings;
                        }
                        ui.add_space(12.0);
                        if ui
                            .selectable_label(
                                *current_screen == Screen::Diagnostics,
                                "Diagnostics",
                            )
                            .clicked()
                        {
                            *current_screen = Screen::Diagnostics;
                        }
                        ui.add_space(12.0);
                        if ui
                            .selectable_label(*current_screen == Screen::Logs, "Logs")
                            .clicked()
                        {
                            *current_screen = Screen::Logs;
                        }
                    });
            });

        // Right panel: thread list when on Chat. Selecting an entry here is
        // the only way to change the displayed conversation.
        if self.current_screen == Screen::Chat {
            egui::SidePanel::right("threads_panel")
                .resizable(false)
                .exact_width(220.0)
                .show(ctx, |ui| {
                    egui::Frame::none()
                        .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                        .show(ui, |ui| {
                            self.ui_threads_panel(ui);
                        });
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Chat => {
                        ui.add_space(24.0);
                        ui.heading("Chat");
                        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
                        self.ui_chat(ui);
                    }
                    Screen::Calendar => {
                        self.calendar.ui(ui, &self.client, self.user_email.as_deref());
                    }
                    Screen::Settings => {
                        self.settings.ui(ui, &self.client);
                    }
                    Screen::Diagnostics => {
                        self.diagnostics.ui(ui, &self.client);
                    }
                    Screen::Logs => {
                        self.ui_logs_screen(ui);
                    }
                });
        });
    }
}
