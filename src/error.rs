use std::{io, path::PathBuf};

use thiserror::Error as ThisError;

/// Failures that end a launch before the main window runs.
#[derive(Debug, ThisError)]
pub enum LaunchError {
    #[error("Another instance is already running")]
    DuplicateInstance,

    #[error("Permission denied for {}: {source}", path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Setup(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl LaunchError {
    /// Errors the user is told about in a dialog, after which the run ends cleanly.
    pub fn is_shown_in_ui(&self) -> bool {
        matches!(self, Self::Permission { .. } | Self::Setup(_))
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_shown_in_ui() { 0 } else { 1 }
    }
}

#[derive(Debug, ThisError)]
#[error("No usable GUI toolkit: {reason}")]
pub struct ToolkitUnavailable {
    pub reason: String,
}
