//! Settings backup and restore, plus the startup gate that decides when to run them.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use thiserror::Error as ThisError;
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::error::LaunchError;
use crate::options::LaunchOptions;
use crate::paths::AppDirs;
use crate::ui::Toolkit;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const IMAGES_DIR: &str = "images";

#[derive(Debug, ThisError)]
pub enum ArchiveError {
    /// The settings are in a state the operation cannot work with.
    #[error("{0}")]
    State(String),

    #[error("Cancelled by the user")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// Explicit location. When `None` the archiver picks or asks for one.
    pub path: Option<PathBuf>,
    /// No interaction is wanted because the application quits right after.
    pub quiet: bool,
    pub include_images: bool,
}

pub trait SettingsArchiver {
    /// Returns where the backup was written.
    fn backup(&self, request: &ArchiveRequest, toolkit: &dyn Toolkit) -> Result<PathBuf, ArchiveError>;

    fn restore(&self, request: &ArchiveRequest, toolkit: &dyn Toolkit) -> Result<(), ArchiveError>;
}

/// Backs settings up by copying the settings tree into a folder.
pub struct DirArchiver {
    settings: PathBuf,
    backups: PathBuf,
}

impl DirArchiver {
    pub fn new(dirs: &AppDirs) -> Self {
        Self {
            settings: dirs.settings.clone(),
            backups: dirs.backups.clone(),
        }
    }

    fn default_backup_dir(&self) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.backups.join(format!("settings-{APP_VERSION}-{stamp}"))
    }
}

impl SettingsArchiver for DirArchiver {
    fn backup(&self, request: &ArchiveRequest, toolkit: &dyn Toolkit) -> Result<PathBuf, ArchiveError> {
        if !self.settings.is_dir() {
            return Err(ArchiveError::State(format!(
                "There are no settings to back up in {}",
                self.settings.display()
            )));
        }

        let target = match &request.path {
            Some(path) => path.clone(),
            None if request.quiet => self.default_backup_dir(),
            None => toolkit
                .choose_folder("Choose where to back up the settings", &self.backups)
                .ok_or(ArchiveError::Cancelled)?,
        };

        if target.starts_with(&self.settings) {
            return Err(ArchiveError::State(format!(
                "{} is inside the settings being backed up",
                target.display()
            )));
        }
        if dir_has_entries(&target) {
            return Err(ArchiveError::State(format!(
                "{} already contains files",
                target.display()
            )));
        }

        let copied = copy_tree(&self.settings, &target, request.include_images)
            .with_context(|| format!("Failed to back up settings to {}", target.display()))?;
        log::info!("Backed up {} files to {}", copied, target.display());
        Ok(target)
    }

    fn restore(&self, request: &ArchiveRequest, toolkit: &dyn Toolkit) -> Result<(), ArchiveError> {
        let source = match &request.path {
            Some(path) => path.clone(),
            None => toolkit
                .choose_folder("Choose the settings backup to restore", &self.backups)
                .ok_or(ArchiveError::Cancelled)?,
        };

        if !source.is_dir() {
            return Err(ArchiveError::State(format!(
                "{} is not a settings backup",
                source.display()
            )));
        }

        let copied = copy_tree(&source, &self.settings, request.include_images)
            .with_context(|| format!("Failed to restore settings from {}", source.display()))?;
        log::info!("Restored {} files from {}", copied, source.display());
        Ok(())
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}

/// Copies `from` into `to`, leaving out the images subtree unless asked.
fn copy_tree(from: &Path, to: &Path, include_images: bool) -> io::Result<usize> {
    let images = from.join(IMAGES_DIR);
    let mut copied = 0;

    for entry in WalkDir::new(from)
        .into_iter()
        .filter_entry(|e| include_images || e.path() != images)
    {
        let entry = entry.map_err(io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// What the backup/restore gate asks the sequencer to do next.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub quit: bool,
    pub restart: bool,
}

/// Runs the backup step and then the restore step.
///
/// Both always run; only afterwards are their quit requests combined.
pub fn run_gate(
    options: &LaunchOptions,
    config: &AppConfig,
    archiver: &dyn SettingsArchiver,
    toolkit: &dyn Toolkit,
) -> Result<GateOutcome, LaunchError> {
    let backup_quit = run_backup(options, config, archiver, toolkit)?;
    let (restore_quit, restored) = run_restore(options, archiver, toolkit)?;

    let quit = backup_quit || restore_quit;
    Ok(GateOutcome {
        quit,
        restart: restored && !quit,
    })
}

fn new_version_prompt(config: &AppConfig, toolkit: &dyn Toolkit) -> bool {
    let Some(previous) = config.last_version.as_deref() else {
        return false;
    };
    if previous == APP_VERSION {
        return false;
    }
    toolkit.ask_yes_no(
        "New version",
        &format!(
            "A different version of Modkeeper was previously installed.\n\
             Previous Version: {previous}\n\
             Current Version: {APP_VERSION}\n\
             Do you want to create a backup of your settings before they are overwritten?"
        ),
    )
}

/// Returns whether the application should quit after the backup step.
pub fn run_backup(
    options: &LaunchOptions,
    config: &AppConfig,
    archiver: &dyn SettingsArchiver,
    toolkit: &dyn Toolkit,
) -> Result<bool, LaunchError> {
    let should_quit = options.backup && options.quiet_quit;
    // the version prompt is shown even when a backup was already requested
    let prompted = new_version_prompt(config, toolkit);
    if !prompted && !options.backup {
        return Ok(should_quit);
    }

    let same_version = config.same_version(APP_VERSION);
    let request = ArchiveRequest {
        path: options.backup_target(),
        quiet: should_quit,
        include_images: options.include_images,
    };

    match archiver.backup(&request, toolkit) {
        Ok(_) => Ok(should_quit),
        Err(ArchiveError::State(reason)) => {
            log::warn!("Backup failed: {}", reason);
            if same_version {
                toolkit.show_warning(
                    "Backup failed",
                    &format!("There was an error while trying to back up the settings.\n{reason}"),
                );
                Ok(should_quit)
            } else {
                let quit = toolkit.ask_yes_no(
                    "Unable to create backup!",
                    "There was an error while trying to back up the settings!\n\
                     If you continue, your current settings may be overwritten.\n\
                     Do you want to quit now?",
                );
                Ok(quit || should_quit)
            }
        }
        Err(ArchiveError::Cancelled) => {
            log::info!("Backup cancelled");
            let quit = !same_version
                && toolkit.ask_yes_no(
                    "No backup created!",
                    "You did not create a backup of the settings.\n\
                     If you continue, your current settings may be overwritten.\n\
                     Do you want to quit now?",
                );
            Ok(quit || should_quit)
        }
        Err(ArchiveError::Io(e)) => Err(LaunchError::Unexpected(e)),
    }
}

/// Returns `(quit, restored)`.
pub fn run_restore(
    options: &LaunchOptions,
    archiver: &dyn SettingsArchiver,
    toolkit: &dyn Toolkit,
) -> Result<(bool, bool), LaunchError> {
    let should_quit = options.restore && options.quiet_quit;
    if !options.restore {
        return Ok((should_quit, false));
    }

    let request = ArchiveRequest {
        path: options.restore_target(),
        quiet: should_quit,
        include_images: options.include_images,
    };

    match archiver.restore(&request, toolkit) {
        Ok(()) => Ok((should_quit, true)),
        Err(ArchiveError::Cancelled) => {
            log::info!("Restore cancelled");
            Ok((should_quit, false))
        }
        Err(ArchiveError::State(reason)) => {
            log::warn!("Restore failed: {}", reason);
            toolkit.show_error("Unable to restore settings", &reason);
            Ok((should_quit, false))
        }
        Err(ArchiveError::Io(e)) => Err(LaunchError::Unexpected(e)),
    }
}
