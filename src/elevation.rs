//! Privilege checks and relaunching.

use std::{
    ffi::OsString,
    io,
    path::Path,
    process::Command,
};

use crate::args::RestartRequest;
use crate::options::UacPreference;
use crate::paths::TEMP_PREFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationDecision {
    Continue,
    RestartElevated,
}

/// Settles whether to restart elevated. `ask` is only consulted when the user
/// expressed no preference and elevation is actually needed.
pub fn decide(
    needs_elevation: bool,
    preference: UacPreference,
    ask: impl FnOnce() -> bool,
) -> ElevationDecision {
    if !needs_elevation {
        return ElevationDecision::Continue;
    }
    let restart = match preference {
        UacPreference::Skip => false,
        UacPreference::Force => true,
        UacPreference::Ask => ask(),
    };
    if restart {
        ElevationDecision::RestartElevated
    } else {
        ElevationDecision::Continue
    }
}

/// Whether writing into `dir` is refused for lack of privileges.
pub fn probe_needs_elevation(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    match tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir) {
        Ok(_) => false,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            log::info!("{} needs elevated privileges", dir.display());
            true
        }
        Err(e) => {
            log::warn!("Privilege probe in {} failed: {}", dir.display(), e);
            false
        }
    }
}

/// Operating system services the launcher needs.
pub trait Platform {
    fn needs_elevation(&self, dir: &Path) -> bool;

    /// Starts a new copy of this program and returns without waiting for it.
    fn relaunch(&self, request: &RestartRequest) -> io::Result<()>;
}

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn needs_elevation(&self, dir: &Path) -> bool {
        probe_needs_elevation(dir)
    }

    fn relaunch(&self, request: &RestartRequest) -> io::Result<()> {
        let exe = std::env::current_exe()?;
        log::info!(
            "Relaunching {} {:?}{}",
            exe.display(),
            request.args,
            if request.elevate { " (elevated)" } else { "" }
        );

        if request.elevate {
            spawn_elevated(&exe, &request.args)
        } else {
            Command::new(&exe).args(&request.args).spawn().map(drop)
        }
    }
}

/// Joins arguments into one command line, quoting those with spaces.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn quote_args(args: &[OsString]) -> OsString {
    let mut line = OsString::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(" ");
        }
        if arg.as_encoded_bytes().contains(&b' ') {
            line.push("\"");
            line.push(arg);
            line.push("\"");
        } else {
            line.push(arg);
        }
    }
    line
}

/// Variables the elevated copy needs to reach the user's display.
const DISPLAY_VARS: [&str; 4] = ["DISPLAY", "WAYLAND_DISPLAY", "XAUTHORITY", "XDG_RUNTIME_DIR"];

/// Arguments for `pkexec`. It starts the program with a cleared environment,
/// so the display variables are passed back in through `env`.
#[cfg_attr(windows, allow(dead_code))]
fn pkexec_args(
    exe: &Path,
    args: &[OsString],
    lookup: impl Fn(&str) -> Option<OsString>,
) -> Vec<OsString> {
    let mut line = vec![OsString::from("env")];
    for name in DISPLAY_VARS {
        if let Some(value) = lookup(name) {
            let mut pair = OsString::from(name);
            pair.push("=");
            pair.push(value);
            line.push(pair);
        }
    }
    line.push(exe.as_os_str().to_os_string());
    line.extend(args.iter().cloned());
    line
}

#[cfg(windows)]
fn spawn_elevated(exe: &Path, args: &[OsString]) -> io::Result<()> {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Shell::ShellExecuteW;
    use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
    use windows::core::{HSTRING, PCWSTR, w};

    let file = HSTRING::from(exe.as_os_str());
    let params = HSTRING::from(quote_args(args).as_os_str());

    let instance = unsafe {
        ShellExecuteW(
            HWND(std::ptr::null_mut()),
            w!("runas"),
            &file,
            &params,
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };
    // values up to 32 are error codes
    if instance.0 as isize > 32 {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "ShellExecuteW failed with code {}",
            instance.0 as isize
        )))
    }
}

#[cfg(not(windows))]
fn spawn_elevated(exe: &Path, args: &[OsString]) -> io::Result<()> {
    Command::new("pkexec")
        .args(pkexec_args(exe, args, |name| std::env::var_os(name)))
        .spawn()
        .map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never_asked() -> bool {
        panic!("the user should not be asked");
    }

    #[test]
    fn test_no_privilege_needed_continues() {
        for preference in [UacPreference::Ask, UacPreference::Force, UacPreference::Skip] {
            assert_eq!(decide(false, preference, never_asked), ElevationDecision::Continue);
        }
    }

    #[test]
    fn test_skip_accepts_the_risk() {
        assert_eq!(
            decide(true, UacPreference::Skip, never_asked),
            ElevationDecision::Continue
        );
    }

    #[test]
    fn test_force_restarts_elevated() {
        assert_eq!(
            decide(true, UacPreference::Force, never_asked),
            ElevationDecision::RestartElevated
        );
    }

    #[test]
    fn test_ask_follows_the_answer() {
        assert_eq!(
            decide(true, UacPreference::Ask, || true),
            ElevationDecision::RestartElevated
        );
        assert_eq!(
            decide(true, UacPreference::Ask, || false),
            ElevationDecision::Continue
        );
    }

    #[test]
    fn test_probe_on_writable_and_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!probe_needs_elevation(dir.path()));
        assert!(!probe_needs_elevation(&dir.path().join("missing")));
        // the probe file is gone again
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_quote_args() {
        let args = vec![OsString::from("-o"), OsString::from("C:\\Games\\Fallout 4")];
        assert_eq!(quote_args(&args), OsString::from("-o \"C:\\Games\\Fallout 4\""));
    }

    #[test]
    fn test_pkexec_keeps_the_display() {
        let exe = Path::new("/opt/modkeeper/modkeeper");
        let args = vec![OsString::from("--restarting")];
        let lookup = |name: &str| match name {
            "DISPLAY" => Some(OsString::from(":0")),
            "XAUTHORITY" => Some(OsString::from("/run/user/1000/xauth")),
            _ => None,
        };

        let line: Vec<OsString> = pkexec_args(exe, &args, lookup);

        let expected: Vec<OsString> = [
            "env",
            "DISPLAY=:0",
            "XAUTHORITY=/run/user/1000/xauth",
            "/opt/modkeeper/modkeeper",
            "--restarting",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        assert_eq!(line, expected);
    }
}
