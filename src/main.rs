#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod args;
mod backup;
mod config;
mod elevation;
mod environment;
mod error;
mod game;
mod instance;
mod launch;
mod logger;
mod options;
mod paths;
mod report;
mod ui;
mod utils;

use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser;

use crate::elevation::{NativePlatform, Platform};
use crate::launch::{LaunchContext, LaunchStatus};
use crate::options::LaunchOptions;

fn main() -> ExitCode {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let options = LaunchOptions::parse_from(&argv);

    logger::init_logger(options.debug);
    if let Some(language) = &options.language {
        log::info!("Language override: {}", language);
    }

    let toolkit = match ui::resolve_toolkit() {
        Ok(toolkit) => toolkit,
        Err(e) => {
            ui::fatal_error_without_toolkit(&format!(
                "Unable to locate a usable GUI toolkit ({}). Exiting.\n\n{}",
                e.reason,
                environment::dump_environment(None)
            ));
            return ExitCode::from(1);
        }
    };
    if options.debug {
        log::debug!("{}", environment::dump_environment(Some(ui::Toolkit::name(&toolkit))));
    }

    launch::set_working_dir_to_exe();

    let platform = NativePlatform;
    let ctx = LaunchContext::new(
        &options,
        argv.iter().skip(1).cloned().collect(),
        &toolkit,
        &platform,
    );
    let status = launch::execute(ctx);

    let removed = utils::cleanup_temp_files(&std::env::temp_dir(), paths::TEMP_PREFIX);
    if removed > 0 {
        log::debug!("Removed {} temporary files", removed);
    }

    match status {
        LaunchStatus::Exit(code) => ExitCode::from(code),
        LaunchStatus::Restart(request) => match platform.relaunch(&request) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Error attempting to restart: {}", e);
                eprintln!("Error Attempting to Restart Modkeeper!");
                eprintln!("cmd line: {:?}", request.args);
                ExitCode::from(1)
            }
        },
    }
}
