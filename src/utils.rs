use std::fs;
use std::io::Result as IoResult;
use std::path::Path;
use std::process::Command;

pub fn open_in_explorer(path: &Path) -> IoResult<()> {
    let absolute_path = path.canonicalize()?;

    let opener = if cfg!(windows) {
        "explorer.exe"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    let mut command = Command::new(opener);
    if cfg!(windows) {
        command.arg(
            absolute_path
                .display()
                .to_string()
                .replace(r"\\?\", ""), // Remove extended path prefix
        );
    } else {
        command.arg(&absolute_path);
    }
    command.spawn()?;

    Ok(())
}

/// Removes the entries of `dir` whose names start with `prefix`.
///
/// Best effort: entries that cannot be removed are skipped. Returns how many were removed.
pub fn cleanup_temp_files(dir: &Path, prefix: &str) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let path = entry.path();
        let result = match entry.file_type() {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => log::debug!("Could not remove {}: {}", path.display(), e),
        }
    }
    removed
}
