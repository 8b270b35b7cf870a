use std::{backtrace::Backtrace, fs::File, path::PathBuf};

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

pub const DEBUG_LOG_FILE: &str = "modkeeper-debug.log";

fn debug_log_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEBUG_LOG_FILE)))
        .unwrap_or_else(|| PathBuf::from(DEBUG_LOG_FILE))
}

/// Sets up the global logger. Debug mode also writes everything to a file next to the executable.
pub fn init_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut config_builder = ConfigBuilder::new();
    config_builder.set_time_offset_to_local().ok();
    let config = config_builder.build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    let mut log_file = None;
    if debug {
        let path = debug_log_path();
        match File::create(&path) {
            Ok(file) => {
                loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
                log_file = Some(path);
            }
            Err(e) => eprintln!("Could not create {}: {}", path.display(), e),
        }
    }

    let _ = CombinedLogger::init(loggers);

    if let Some(path) = log_file {
        log::info!("Debug log: {}", path.display());
    }

    std::panic::set_hook(Box::new(|info| {
        log::error!("{}\n{}", info, Backtrace::force_capture());
    }));
}
