use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

use eframe::egui;
use pathdiff::diff_paths;
use walkdir::WalkDir;

use crate::game::GameInstall;
use crate::paths::AppDirs;
use crate::utils::open_in_explorer;

const BUTTON_RADIUS: f32 = 3.0;
const PLUGIN_EXTENSIONS: &[&str] = &["esm", "esp", "esl"];

fn setup_theme(ctx: &egui::Context) {
    ctx.set_theme(egui::Theme::Dark);
    ctx.style_mut(|style| {
        style.visuals.widgets.hovered.bg_stroke = egui::Stroke::NONE;
        style.visuals.widgets.active.bg_stroke = egui::Stroke::NONE;
        style.visuals.widgets.hovered.expansion = 0.0;
    });
}

/// What the main window was launched for.
#[derive(Debug, Clone)]
pub struct Session {
    pub install: GameInstall,
    pub dirs: AppDirs,
    pub language: Option<String>,
    pub elevated_access_missing: bool,
}

/// How the main window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainWindowExit {
    Closed,
    RestartRequested,
}

pub struct App {
    session: Session,
    plugins: Vec<PathBuf>,
    status: String,

    scan_thread: Option<thread::JoinHandle<()>>,
    receiver: Option<mpsc::Receiver<std::io::Result<Vec<PathBuf>>>>,
    exit: Rc<Cell<MainWindowExit>>,
}

impl App {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        session: Session,
        exit: Rc<Cell<MainWindowExit>>,
    ) -> Self {
        setup_theme(&cc.egui_ctx);

        let mut app = Self {
            session,
            plugins: Vec::new(),
            status: "".to_string(),
            scan_thread: None,
            receiver: None,
            exit,
        };
        app.start_scan();
        app
    }

    fn start_scan(&mut self) {
        let (tx, rx) = mpsc::channel();
        self.receiver = Some(rx);

        let data_dir = self.session.install.data_dir();
        self.scan_thread = Some(thread::spawn(move || {
            let result = list_plugins(&data_dir);
            tx.send(result).unwrap_or_else(|e| {
                log::error!("Failed to send plugin list: {}", e);
            });
        }));

        self.status = "Scanning...".to_string();
        self.plugins.clear();
    }

    fn process_scan_results(&mut self) {
        if let Some(receiver) = &self.receiver {
            if let Ok(result) = receiver.try_recv() {
                match result {
                    Ok(plugins) => {
                        self.status = format!("Found {} plugins", plugins.len());
                        self.plugins = plugins;
                    }
                    Err(e) => {
                        self.status = format!("Scan failed: {}", e);
                    }
                }

                // Reset scan state
                self.receiver.take();
                self.scan_thread.take();
            }
        }
    }

    fn request_restart(&self, ctx: &egui::Context) {
        log::info!("Restart requested from the main window");
        self.exit.set(MainWindowExit::RestartRequested);
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }
}

impl App {
    fn header_ui(&self, ui: &mut egui::Ui) {
        let session = &self.session;
        ui.heading(session.install.game.display_name);
        ui.add_space(4.0);

        egui::Grid::new("paths").num_columns(2).show(ui, |ui| {
            ui.label("Install");
            ui.label(session.install.path.display().to_string());
            ui.end_row();

            ui.label("Data");
            ui.label(session.install.data_dir().display().to_string());
            ui.end_row();

            ui.label("Settings");
            ui.label(session.dirs.settings.display().to_string());
            ui.end_row();

            if let Some(language) = &session.language {
                ui.label("Language");
                ui.label(language);
                ui.end_row();
            }
        });

        if session.elevated_access_missing {
            ui.add_space(4.0);
            ui.label(
                egui::RichText::new(
                    "The game folder needs administrator rights; changes to it may fail.",
                )
                .color(egui::Color32::YELLOW),
            );
        }
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.spacing_mut().button_padding = egui::vec2(12.0, 6.0);

            if ui
                .add_enabled(
                    self.scan_thread.is_none(),
                    egui::Button::new("Rescan").corner_radius(BUTTON_RADIUS),
                )
                .clicked()
            {
                self.start_scan();
            }

            if ui
                .add(egui::Button::new("Open Data folder").corner_radius(BUTTON_RADIUS))
                .clicked()
            {
                if let Err(e) = open_in_explorer(&self.session.install.data_dir()) {
                    self.status = format!("Could not open folder: {}", e);
                }
            }

            if ui
                .add(egui::Button::new("Restart").corner_radius(BUTTON_RADIUS))
                .clicked()
            {
                self.request_restart(ui.ctx());
            }

            ui.add_space(4.0);
            ui.label(
                egui::RichText::new(&self.status)
                    .size(14.0)
                    .color(egui::Color32::LIGHT_GRAY),
            );
        });
    }

    fn plugins_ui(&self, ui: &mut egui::Ui) {
        if self.plugins.is_empty() {
            ui.centered_and_justified(|ui| {
                ui.add(
                    egui::Label::new(egui::RichText::new("No plugins found").size(20.0))
                        .selectable(false),
                );
            });
            return;
        }

        let data_dir = self.session.install.data_dir();
        egui::ScrollArea::both()
            .id_salt("plugins")
            .auto_shrink(false)
            .show(ui, |ui| {
                for path in &self.plugins {
                    let display_path = diff_paths(path, &data_dir)
                        .unwrap_or_else(|| path.to_path_buf())
                        .display()
                        .to_string();
                    ui.add(egui::Label::new(egui::RichText::new(display_path).size(13.0)).selectable(false));
                }
            });
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_scan_results();

        egui::TopBottomPanel::top("header")
            .frame(egui::Frame::side_top_panel(&ctx.style()).inner_margin(12.0))
            .show(ctx, |ui| {
                self.header_ui(ui);
                ui.add_space(8.0);
                self.controls_ui(ui);
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::central_panel(&ctx.style()).inner_margin(12.0))
            .show(ctx, |ui| {
                self.plugins_ui(ui);
            });
    }
}

/// Plugin files directly inside `data_dir`, sorted by name.
pub fn list_plugins(data_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut plugins = Vec::new();
    for entry in WalkDir::new(data_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_plugin = entry.path().extension().is_some_and(|ext| {
            PLUGIN_EXTENSIONS
                .iter()
                .any(|p| ext.eq_ignore_ascii_case(p))
        });
        if entry.file_type().is_file() && is_plugin {
            plugins.push(entry.into_path());
        }
    }
    plugins.sort();
    Ok(plugins)
}
