//! Toolkit seam: native dialogs and windows, plus the bare fallback used when
//! no window can be opened.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result as AnyhowResult, anyhow};
use eframe::egui;
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

use crate::app::{App, MainWindowExit, Session};
use crate::error::ToolkitUnavailable;

const WINDOW_TITLE: &str = "Modkeeper";

/// Everything the launch sequence needs from a user interface.
pub trait Toolkit {
    fn name(&self) -> &'static str;

    fn show_error(&self, title: &str, message: &str);

    fn show_warning(&self, title: &str, message: &str);

    fn show_notice(&self, title: &str, message: &str);

    fn ask_yes_no(&self, title: &str, message: &str) -> bool;

    /// Lets the user pick one of `choices`. `None` means they quit instead.
    fn select_game(&self, message: &str, choices: &[String]) -> Option<usize>;

    fn choose_folder(&self, title: &str, start: &Path) -> Option<PathBuf>;

    fn run_main_window(&self, session: Session) -> AnyhowResult<MainWindowExit>;
}

/// eframe windows with rfd for the modal dialogs.
pub struct NativeToolkit;

/// Finds out whether windows can be shown at all.
pub fn resolve_toolkit() -> Result<NativeToolkit, ToolkitUnavailable> {
    if cfg!(all(unix, not(target_os = "macos")))
        && std::env::var_os("DISPLAY").is_none()
        && std::env::var_os("WAYLAND_DISPLAY").is_none()
    {
        return Err(ToolkitUnavailable {
            reason: "neither DISPLAY nor WAYLAND_DISPLAY is set".to_string(),
        });
    }
    Ok(NativeToolkit)
}

fn message(level: MessageLevel, title: &str, description: &str) -> MessageDialog {
    MessageDialog::new()
        .set_level(level)
        .set_title(title)
        .set_description(description)
}

impl Toolkit for NativeToolkit {
    fn name(&self) -> &'static str {
        "egui"
    }

    fn show_error(&self, title: &str, message_text: &str) {
        message(MessageLevel::Error, title, message_text)
            .set_buttons(MessageButtons::OkCustom("Quit".to_string()))
            .show();
    }

    fn show_warning(&self, title: &str, message_text: &str) {
        message(MessageLevel::Warning, title, message_text)
            .set_buttons(MessageButtons::Ok)
            .show();
    }

    fn show_notice(&self, title: &str, message_text: &str) {
        message(MessageLevel::Info, title, message_text)
            .set_buttons(MessageButtons::Ok)
            .show();
    }

    fn ask_yes_no(&self, title: &str, message_text: &str) -> bool {
        message(MessageLevel::Warning, title, message_text)
            .set_buttons(MessageButtons::YesNo)
            .show()
            == MessageDialogResult::Yes
    }

    fn select_game(&self, message_text: &str, choices: &[String]) -> Option<usize> {
        let choice = Rc::new(Cell::new(None));
        let window = GameSelect {
            message: message_text.to_string(),
            choices: choices.to_vec(),
            choice: Rc::clone(&choice),
        };

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default().with_inner_size([420.0, 320.0]),
            ..Default::default()
        };
        if let Err(e) = eframe::run_native(
            WINDOW_TITLE,
            options,
            Box::new(|_cc| Ok(Box::new(window))),
        ) {
            log::error!("Game selection window failed: {}", e);
            return None;
        }
        choice.get()
    }

    fn choose_folder(&self, title: &str, start: &Path) -> Option<PathBuf> {
        FileDialog::new()
            .set_title(title)
            .set_directory(start)
            .pick_folder()
    }

    fn run_main_window(&self, session: Session) -> AnyhowResult<MainWindowExit> {
        let exit = Rc::new(Cell::new(MainWindowExit::Closed));
        let app_exit = Rc::clone(&exit);

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 600.0]),
            ..Default::default()
        };
        eframe::run_native(
            WINDOW_TITLE,
            options,
            Box::new(|cc| Ok(Box::new(App::new(cc, session, app_exit)))),
        )
        .map_err(|e| anyhow!("Main window failed: {e}"))?;

        Ok(exit.get())
    }
}

struct GameSelect {
    message: String,
    choices: Vec<String>,
    choice: Rc<Cell<Option<usize>>>,
}

impl eframe::App for GameSelect {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add(egui::Label::new(&self.message).wrap());
            ui.add_space(8.0);

            for (index, name) in self.choices.iter().enumerate() {
                let button = egui::Button::new(name).min_size(egui::vec2(ui.available_width(), 28.0));
                if ui.add(button).clicked() {
                    self.choice.set(Some(index));
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            }

            ui.add_space(8.0);
            let quit = egui::Button::new("Quit").min_size(egui::vec2(ui.available_width(), 28.0));
            if ui.add(quit).clicked() {
                self.choice.set(None);
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });
    }
}

/// Last-ditch report for when the toolkit could not be brought up.
///
/// Tries a bare native message box with a single QUIT button; the text always
/// goes to stderr as well in case that cannot be shown either.
pub fn fatal_error_without_toolkit(text: &str) {
    eprintln!("{text}");
    log::error!("{}", text);

    let shown = std::panic::catch_unwind(|| {
        MessageDialog::new()
            .set_level(MessageLevel::Error)
            .set_title(WINDOW_TITLE)
            .set_description(text)
            .set_buttons(MessageButtons::OkCustom("QUIT".to_string()))
            .show();
    });
    if shown.is_err() {
        eprintln!("The error above could not be displayed in a dialog.");
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    /// Answers prompts from a script and records what was shown.
    #[derive(Default)]
    pub struct ScriptedToolkit {
        answers: RefCell<VecDeque<bool>>,
        selection: Option<usize>,
        main_window_exit: Option<MainWindowExit>,
        prompts: RefCell<Vec<String>>,
        sessions: RefCell<Vec<Session>>,
    }

    impl ScriptedToolkit {
        pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
            Self {
                answers: RefCell::new(answers.into_iter().collect()),
                ..Default::default()
            }
        }

        pub fn selecting(mut self, index: usize) -> Self {
            self.selection = Some(index);
            self
        }

        pub fn exiting_with(mut self, exit: MainWindowExit) -> Self {
            self.main_window_exit = Some(exit);
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.borrow().clone()
        }

        pub fn sessions(&self) -> std::cell::Ref<'_, Vec<Session>> {
            self.sessions.borrow()
        }

        fn record(&self, kind: &str, title: &str) {
            self.prompts.borrow_mut().push(format!("{kind}: {title}"));
        }
    }

    impl Toolkit for ScriptedToolkit {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn show_error(&self, title: &str, _message: &str) {
            self.record("error", title);
        }

        fn show_warning(&self, title: &str, _message: &str) {
            self.record("warning", title);
        }

        fn show_notice(&self, title: &str, _message: &str) {
            self.record("notice", title);
        }

        fn ask_yes_no(&self, title: &str, _message: &str) -> bool {
            self.record("ask", title);
            self.answers
                .borrow_mut()
                .pop_front()
                .expect("unexpected question")
        }

        fn select_game(&self, _message: &str, _choices: &[String]) -> Option<usize> {
            self.record("select", "game");
            self.selection
        }

        fn choose_folder(&self, _title: &str, _start: &Path) -> Option<PathBuf> {
            None
        }

        fn run_main_window(&self, session: Session) -> AnyhowResult<MainWindowExit> {
            self.sessions.borrow_mut().push(session);
            Ok(self.main_window_exit.unwrap_or(MainWindowExit::Closed))
        }
    }
}
