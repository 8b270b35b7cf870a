use std::path::PathBuf;

use clap::Parser;

/// Marker appended to the command line of a relaunched process.
pub const RESTARTING_FLAG: &str = "--restarting";
/// Marker that suppresses the elevation prompt after a relaunch.
pub const NO_UAC_FLAG: &str = "--no-uac";
/// Asks for an elevated restart whenever one is needed.
pub const UAC_FLAG: &str = "--uac";
/// Spellings of the flag carrying the game install path.
pub const GAME_PATH_FLAGS: [&str; 2] = ["-o", "--game-path"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UacPreference {
    Ask,
    Force,
    Skip,
}

#[derive(Debug, Parser, Clone, Default)]
#[command(name = "modkeeper", version, about = "Mod manager for Bethesda games")]
pub struct LaunchOptions {
    /// Path of the game installation to manage
    #[arg(short = 'o', long)]
    pub game_path: Option<PathBuf>,

    /// Directory to use as the user's home
    #[arg(short = 'u', long)]
    pub user_path: Option<PathBuf>,

    /// Root directory for settings, images and backups
    #[arg(short = 'p', long)]
    pub personal_path: Option<PathBuf>,

    /// Root directory for local application data
    #[arg(short = 'l', long)]
    pub local_app_data_path: Option<PathBuf>,

    /// Enable debug logging and write a debug log file
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Back up the settings at startup
    #[arg(short = 'b', long, conflicts_with = "restore")]
    pub backup: bool,

    /// Restore the settings at startup
    #[arg(short = 'r', long)]
    pub restore: bool,

    /// Backup or restore location
    #[arg(short = 'f', long)]
    pub filename: Option<PathBuf>,

    /// Quit once the backup or restore is done
    #[arg(short = 'q', long)]
    pub quiet_quit: bool,

    /// Include the images directory in backups and restores
    #[arg(short = 'i', long)]
    pub include_images: bool,

    /// Always restart with administrator privileges when they are needed
    #[arg(long, conflicts_with = "no_uac")]
    pub uac: bool,

    /// Never ask for administrator privileges
    #[arg(long)]
    pub no_uac: bool,

    /// Language to use instead of the system one
    #[arg(short = 'L', long)]
    pub language: Option<String>,

    /// Convert a text document to HTML and exit
    #[arg(long, value_name = "FILE")]
    pub gen_html: Option<PathBuf>,

    #[arg(long, hide = true)]
    pub restarting: bool,
}

impl LaunchOptions {
    pub fn uac_preference(&self) -> UacPreference {
        if self.uac {
            UacPreference::Force
        } else if self.no_uac {
            UacPreference::Skip
        } else {
            UacPreference::Ask
        }
    }

    /// Target of an explicit backup request.
    pub fn backup_target(&self) -> Option<PathBuf> {
        self.filename.clone().filter(|_| self.backup)
    }

    /// Target of an explicit restore request.
    pub fn restore_target(&self) -> Option<PathBuf> {
        self.filename.clone().filter(|_| self.restore)
    }
}
