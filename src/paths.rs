use std::{
    ffi::OsString,
    fs, io,
    path::{Component, Path, PathBuf},
};

use directories::ProjectDirs;

use crate::config::{APPLICATION, ORGANIZATION, QUALIFIER};
use crate::error::LaunchError;

/// Prefix shared by every temporary file the application creates.
pub const TEMP_PREFIX: &str = "modkeeper_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    pub settings: PathBuf,
    pub images: PathBuf,
    pub backups: PathBuf,
    pub local: PathBuf,
}

impl AppDirs {
    /// Resolves and creates the working directories, honouring the personal and
    /// local-data overrides.
    pub fn init(personal: Option<&Path>, local: Option<&Path>) -> Result<Self, LaunchError> {
        let project = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION);

        let personal_root = match (personal, &project) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(project)) => project.data_dir().to_path_buf(),
            (None, None) => {
                return Err(LaunchError::Setup(
                    "Could not determine the user's data directory. Use -p to set it.".into(),
                ));
            }
        };
        let local_root = match (local, &project) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(project)) => project.data_local_dir().to_path_buf(),
            (None, None) => {
                return Err(LaunchError::Setup(
                    "Could not determine the local data directory. Use -l to set it.".into(),
                ));
            }
        };

        let settings = personal_root.join("settings");
        let dirs = Self {
            images: settings.join("images"),
            backups: personal_root.join("backups"),
            settings,
            local: local_root,
        };

        for dir in [&dirs.settings, &dirs.images, &dirs.backups, &dirs.local] {
            create_dir(dir)?;
        }
        log::debug!("Application directories: {:?}", dirs);
        Ok(dirs)
    }
}

fn create_dir(dir: &Path) -> Result<(), LaunchError> {
    fs::create_dir_all(dir).map_err(|source| {
        if source.kind() == io::ErrorKind::PermissionDenied {
            LaunchError::Permission {
                path: dir.to_path_buf(),
                source,
            }
        } else {
            LaunchError::Setup(format!("Could not create {}: {}", dir.display(), source))
        }
    })
}

/// Environment variables that make `home` the user's home directory.
pub fn home_vars(home: &Path) -> Vec<(&'static str, OsString)> {
    if cfg!(windows) {
        let mut components = home.components();
        let drive = match components.clone().next() {
            Some(Component::Prefix(prefix)) => {
                components.next();
                prefix.as_os_str().to_os_string()
            }
            _ => OsString::new(),
        };
        vec![
            ("HOMEDRIVE", drive),
            ("HOMEPATH", components.as_path().as_os_str().to_os_string()),
        ]
    } else {
        vec![("HOME", home.as_os_str().to_os_string())]
    }
}

/// Points the home variables at `home`.
///
/// Must run while the process is still single threaded.
pub fn set_home_path(home: &Path) {
    for (key, value) in home_vars(home) {
        log::info!("Setting {} to {}", key, value.to_string_lossy());
        // SAFETY: called during startup before any other thread exists.
        unsafe { std::env::set_var(key, value) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_overridden_dirs() {
        let personal = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();

        let dirs = AppDirs::init(Some(personal.path()), Some(local.path())).unwrap();

        assert_eq!(dirs.settings, personal.path().join("settings"));
        assert_eq!(dirs.images, personal.path().join("settings").join("images"));
        assert_eq!(dirs.backups, personal.path().join("backups"));
        assert_eq!(dirs.local, local.path());
        assert!(dirs.images.is_dir());
        assert!(dirs.backups.is_dir());
    }

    #[test]
    fn test_unwritable_root_is_a_setup_or_permission_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        fs::write(&file, b"").unwrap();

        let err = AppDirs::init(Some(&file), Some(dir.path())).unwrap_err();
        assert!(err.is_shown_in_ui());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_home_vars_unix() {
        assert_eq!(
            home_vars(Path::new("/srv/home")),
            vec![("HOME", OsString::from("/srv/home"))]
        );
    }

    #[cfg(windows)]
    #[test]
    fn test_home_vars_windows() {
        assert_eq!(
            home_vars(Path::new(r"D:\Users\modder")),
            vec![
                ("HOMEDRIVE", OsString::from("D:")),
                ("HOMEPATH", OsString::from(r"\Users\modder")),
            ]
        );
    }
}
