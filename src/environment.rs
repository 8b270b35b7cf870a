use std::fmt::Write as _;

use crate::backup::APP_VERSION;

/// Summary of the running environment, attached to startup failure reports.
pub fn dump_environment(toolkit: Option<&str>) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "Modkeeper starting");
    let _ = writeln!(msg, "Using Modkeeper Version {APP_VERSION}");
    let _ = writeln!(
        msg,
        "OS info: {} {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY
    );
    let _ = writeln!(
        msg,
        "GUI toolkit: {}",
        toolkit.unwrap_or("not available")
    );
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| format!("unknown ({e})"));
    let _ = write!(msg, "Executable: {exe}");
    msg
}
