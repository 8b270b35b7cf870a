//! The startup sequence: instance guard, game selection, directories,
//! backup/restore, elevation and finally the main window.

use std::any::Any;
use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::app::{MainWindowExit, Session};
use crate::args::{ArgTree, RestartRequest};
use crate::backup::{self, APP_VERSION, DirArchiver, SettingsArchiver};
use crate::config::{AppConfig, get_config_path};
use crate::elevation::{self, ElevationDecision, Platform};
use crate::error::LaunchError;
use crate::game::{DetectedGame, GameInstall, SearchRoots, detect_game};
use crate::instance::InstanceLock;
use crate::options::{GAME_PATH_FLAGS, LaunchOptions};
use crate::paths::{self, AppDirs};
use crate::report;
use crate::ui::Toolkit;

pub const INSTANCE_NAME: &str = "modkeeper";

#[derive(Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The main window ran and was closed.
    Ran,
    /// Nothing to manage, or the user backed out.
    Aborted,
    /// Backup or restore asked to quit afterwards.
    QuietQuit,
    ReportGenerated,
    Restart(RestartRequest),
}

/// What `main` should do once the sequence is over.
#[derive(Debug, PartialEq, Eq)]
pub enum LaunchStatus {
    Exit(u8),
    Restart(RestartRequest),
}

pub type ArchiverFactory = fn(&AppDirs) -> Box<dyn SettingsArchiver>;

fn dir_archiver(dirs: &AppDirs) -> Box<dyn SettingsArchiver> {
    Box::new(DirArchiver::new(dirs))
}

/// State shared by every stage of one launch.
pub struct LaunchContext<'a> {
    pub options: &'a LaunchOptions,
    /// Command line as given, without the program name.
    pub argv: Vec<OsString>,
    pub toolkit: &'a dyn Toolkit,
    pub platform: &'a dyn Platform,
    pub make_archiver: ArchiverFactory,
    pub config: AppConfig,
    pub config_path: Option<PathBuf>,
    pub search_roots: SearchRoots,
    pub lock_dir: PathBuf,
    pub instance_name: String,
    /// Arguments found along the way that a relaunch has to repeat.
    pub discovered: ArgTree,
}

impl<'a> LaunchContext<'a> {
    pub fn new(
        options: &'a LaunchOptions,
        argv: Vec<OsString>,
        toolkit: &'a dyn Toolkit,
        platform: &'a dyn Platform,
    ) -> Self {
        let config_path = get_config_path();
        let config = config_path
            .as_deref()
            .map(AppConfig::load_from)
            .unwrap_or_default();

        Self {
            options,
            argv,
            toolkit,
            platform,
            make_archiver: dir_archiver,
            config,
            config_path,
            search_roots: SearchRoots::discover(),
            lock_dir: std::env::temp_dir(),
            instance_name: INSTANCE_NAME.to_string(),
            discovered: ArgTree::default(),
        }
    }

    fn restart_request(&self, elevate: bool) -> RestartRequest {
        RestartRequest::new(&self.argv, &self.discovered, elevate)
    }
}

fn guard_single_instance(ctx: &LaunchContext<'_>) -> Result<Option<InstanceLock>, LaunchError> {
    match InstanceLock::try_acquire(&ctx.lock_dir, &ctx.instance_name) {
        Ok(Some(lock)) => Ok(Some(lock)),
        Ok(None) => {
            log::warn!("Only one instance of Modkeeper can run. Exiting.");
            ctx.toolkit
                .show_notice("Modkeeper", "Only one instance of Modkeeper can run.");
            Err(LaunchError::DuplicateInstance)
        }
        Err(e) => {
            log::warn!("Could not check for other running instances: {}", e);
            Ok(None)
        }
    }
}

fn select_game(ctx: &mut LaunchContext<'_>) -> Option<GameInstall> {
    log::info!("Searching for game to manage");
    let explicit = ctx.options.game_path.as_deref();

    let candidates = match detect_game(explicit, &ctx.config, &ctx.search_roots, None) {
        DetectedGame::Found(install) => return Some(install),
        DetectedGame::NotFound => {
            log::warn!("No games were found. Aborting.");
            ctx.toolkit.show_notice(
                "No game found",
                "Modkeeper could not find a game to manage. \
                 Please use the -o command line argument to specify the game path.",
            );
            return None;
        }
        DetectedGame::Ambiguous(candidates) => candidates,
    };

    let names: Vec<String> = candidates
        .iter()
        .map(|c| c.game.display_name.to_string())
        .collect();
    let message = "Modkeeper could not determine which game to manage. \
                   The following games have been detected, please select one to manage.\n\n\
                   To prevent this message in the future, use the -o command line argument \
                   or the launcher config to specify the game path.";

    let Some(chosen) = ctx
        .toolkit
        .select_game(message, &names)
        .and_then(|index| candidates.get(index))
    else {
        log::info!("No game was selected. Aborting.");
        return None;
    };

    match detect_game(explicit, &ctx.config, &ctx.search_roots, Some(chosen.game.key)) {
        DetectedGame::Found(install) => {
            ctx.discovered.push(ArgTree::group(
                &GAME_PATH_FLAGS,
                [install.path.clone().into_os_string()],
            ));
            Some(install)
        }
        other => {
            log::error!("{} vanished after selection: {:?}", chosen.game.display_name, other);
            None
        }
    }
}

fn apply_user_path(ctx: &LaunchContext<'_>) {
    let user_path = ctx
        .options
        .user_path
        .as_deref()
        .or_else(|| ctx.config.general.user_path());
    if let Some(path) = user_path {
        paths::set_home_path(path);
    }
}

fn record_version(ctx: &mut LaunchContext<'_>) {
    if ctx.config.last_version.as_deref() == Some(APP_VERSION) {
        return;
    }
    ctx.config.last_version = Some(APP_VERSION.to_string());
    if let Some(path) = &ctx.config_path {
        if let Err(e) = ctx.config.save_to(path) {
            log::warn!("Config error: {:#}", e);
        }
    }
}

/// Runs the whole sequence. The instance lock is released when this returns.
pub fn run(ctx: &mut LaunchContext<'_>) -> Result<LaunchOutcome, LaunchError> {
    let _instance = guard_single_instance(ctx)?;

    let Some(install) = select_game(ctx) else {
        return Ok(LaunchOutcome::Aborted);
    };
    log::info!(
        "Managing {} at {}",
        install.game.display_name,
        install.path.display()
    );

    apply_user_path(ctx);
    let dirs = AppDirs::init(
        ctx.options.personal_path.as_deref(),
        ctx.options.local_app_data_path.as_deref(),
    )?;
    let needs_elevation = ctx.platform.needs_elevation(&install.data_dir());

    if let Some(source) = &ctx.options.gen_html {
        log::info!("Generating HTML file from: {}", source.display());
        let target = report::generate(source)?;
        log::info!("Done: {}", target.display());
        return Ok(LaunchOutcome::ReportGenerated);
    }

    let archiver = (ctx.make_archiver)(&dirs);
    let gate = backup::run_gate(ctx.options, &ctx.config, archiver.as_ref(), ctx.toolkit)?;
    if gate.quit {
        return Ok(LaunchOutcome::QuietQuit);
    }
    if gate.restart {
        return Ok(LaunchOutcome::Restart(ctx.restart_request(false)));
    }

    let decision = elevation::decide(needs_elevation, ctx.options.uac_preference(), || {
        ctx.toolkit.ask_yes_no(
            "UAC Protection",
            &format!(
                "Modkeeper needs Administrator Privileges to make changes to the {} directory. \
                 If you do not start Modkeeper with elevated privileges, you will be prompted \
                 at each operation that requires elevated privileges.\n\n\
                 Restart Modkeeper with Administrator Privileges?",
                install.game.display_name
            ),
        )
    });
    if decision == ElevationDecision::RestartElevated {
        return Ok(LaunchOutcome::Restart(ctx.restart_request(true)));
    }

    record_version(ctx);

    let session = Session {
        install,
        dirs,
        language: ctx.options.language.clone(),
        elevated_access_missing: needs_elevation,
    };
    match ctx.toolkit.run_main_window(session)? {
        MainWindowExit::Closed => Ok(LaunchOutcome::Ran),
        MainWindowExit::RestartRequested => Ok(LaunchOutcome::Restart(ctx.restart_request(false))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Shows `text` in the toolkit if at all possible, and always on stderr.
fn show_error_in_any_gui(toolkit: &dyn Toolkit, title: &str, text: &str) {
    eprintln!("{title}\n\n{text}");
    let shown = panic::catch_unwind(AssertUnwindSafe(|| toolkit.show_error(title, text)));
    if shown.is_err() {
        eprintln!("An error has occurred with Modkeeper, and could not be displayed.");
    }
}

fn bug_report(details: &str) -> String {
    format!(
        "Modkeeper encountered an error.\n\
         Please post the information below to the developers.\n\n{details}"
    )
}

/// Runs the sequence and turns its result into an exit decision, reporting
/// failures to the user on the way.
pub fn execute(mut ctx: LaunchContext<'_>) -> LaunchStatus {
    let toolkit = ctx.toolkit;
    let result = panic::catch_unwind(AssertUnwindSafe(|| run(&mut ctx)));

    match result {
        Ok(Ok(LaunchOutcome::Restart(request))) => LaunchStatus::Restart(request),
        Ok(Ok(outcome)) => {
            log::info!("Launch finished: {:?}", outcome);
            LaunchStatus::Exit(0)
        }
        Ok(Err(LaunchError::DuplicateInstance)) => LaunchStatus::Exit(1),
        Ok(Err(e)) if e.is_shown_in_ui() => {
            log::error!("Unable to start: {}", e);
            show_error_in_any_gui(
                toolkit,
                "Error! Unable to start Modkeeper.",
                &format!("Please ensure Modkeeper is correctly installed.\n\n\n{e}"),
            );
            LaunchStatus::Exit(e.exit_code())
        }
        Ok(Err(e)) => {
            log::error!("Unexpected error: {:?}", e);
            show_error_in_any_gui(toolkit, "Modkeeper Error", &bug_report(&format!("{e:?}")));
            LaunchStatus::Exit(e.exit_code())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            show_error_in_any_gui(toolkit, "Modkeeper Error", &bug_report(&message));
            LaunchStatus::Exit(1)
        }
    }
}

/// Makes relative paths resolve against the executable's directory.
pub fn set_working_dir_to_exe() {
    let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
    else {
        return;
    };
    if let Err(e) = std::env::set_current_dir(&dir) {
        log::warn!("Could not change directory to {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::path::Path;

    use clap::Parser;

    use super::*;
    use crate::options::{NO_UAC_FLAG, RESTARTING_FLAG, UAC_FLAG, UacPreference};
    use crate::ui::testing::ScriptedToolkit;

    struct FakePlatform {
        needs_elevation: bool,
        explode: bool,
    }

    impl FakePlatform {
        fn new(needs_elevation: bool) -> Self {
            Self {
                needs_elevation,
                explode: false,
            }
        }
    }

    impl Platform for FakePlatform {
        fn needs_elevation(&self, _dir: &Path) -> bool {
            if self.explode {
                panic!("privilege probe exploded");
            }
            self.needs_elevation
        }

        fn relaunch(&self, _request: &RestartRequest) -> io::Result<()> {
            unreachable!("the sequence never relaunches by itself")
        }
    }

    struct Fixture {
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn library(&self) -> PathBuf {
            self.root.path().join("library")
        }

        fn install(&self, dir: &str, master: &str) -> PathBuf {
            let path = self.library().join("steamapps").join("common").join(dir);
            fs::create_dir_all(path.join("Data")).unwrap();
            fs::write(path.join("Data").join(master), b"").unwrap();
            path
        }

        fn options(&self) -> LaunchOptions {
            LaunchOptions {
                personal_path: Some(self.root.path().join("personal")),
                local_app_data_path: Some(self.root.path().join("local")),
                ..Default::default()
            }
        }

        fn config_path(&self) -> PathBuf {
            self.root.path().join("launcher.toml")
        }

        fn context<'a>(
            &self,
            options: &'a LaunchOptions,
            toolkit: &'a ScriptedToolkit,
            platform: &'a FakePlatform,
        ) -> LaunchContext<'a> {
            LaunchContext {
                options,
                argv: vec![OsString::from("-d")],
                toolkit,
                platform,
                make_archiver: dir_archiver,
                config: AppConfig::default(),
                config_path: Some(self.config_path()),
                search_roots: SearchRoots {
                    near_exe: None,
                    libraries: vec![self.library()],
                },
                lock_dir: self.root.path().join("locks"),
                instance_name: "modkeeper-test".to_string(),
                discovered: ArgTree::default(),
            }
        }
    }

    #[test]
    fn test_no_game_aborts_without_main_window() {
        let fx = Fixture::new();
        let options = fx.options();
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(false);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        assert_eq!(outcome, LaunchOutcome::Aborted);
        assert!(toolkit.sessions().is_empty());
        assert_eq!(toolkit.prompts(), vec!["notice: No game found"]);
    }

    #[test]
    fn test_single_game_runs_without_asking() {
        let fx = Fixture::new();
        let path = fx.install("Oblivion", "Oblivion.esm");
        let options = fx.options();
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(false);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        assert_eq!(outcome, LaunchOutcome::Ran);
        assert!(toolkit.prompts().is_empty());
        let sessions = toolkit.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].install.path, path);
        assert!(!sessions[0].elevated_access_missing);

        let saved = AppConfig::load_from(&fx.config_path());
        assert_eq!(saved.last_version.as_deref(), Some(APP_VERSION));
    }

    #[test]
    fn test_cancelled_selection_aborts() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        fx.install("Fallout 4", "Fallout4.esm");
        let options = fx.options();
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(false);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        assert_eq!(outcome, LaunchOutcome::Aborted);
        assert_eq!(toolkit.prompts(), vec!["select: game"]);
        assert!(toolkit.sessions().is_empty());
    }

    #[test]
    fn test_selected_game_is_carried_into_restart() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let fo4 = fx.install("Fallout 4", "Fallout4.esm");
        let options = fx.options();
        let toolkit = ScriptedToolkit::default()
            .selecting(0)
            .exiting_with(MainWindowExit::RestartRequested);
        let platform = FakePlatform::new(false);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        assert_eq!(
            outcome,
            LaunchOutcome::Restart(RestartRequest {
                args: vec![
                    OsString::from("-d"),
                    OsString::from(RESTARTING_FLAG),
                    OsString::from(NO_UAC_FLAG),
                    OsString::from(GAME_PATH_FLAGS[0]),
                    fo4.into_os_string(),
                ],
                elevate: false,
            })
        );
        assert_eq!(toolkit.sessions()[0].install.game.key, "fallout4");
    }

    #[test]
    fn test_forced_restart_after_selection_parses_again() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let fo4 = fx.install("Fallout 4", "Fallout4.esm");
        let bogus = fx.root.path().join("not-a-game");
        let options = LaunchOptions {
            game_path: Some(bogus.clone()),
            uac: true,
            ..fx.options()
        };
        let toolkit = ScriptedToolkit::default().selecting(0);
        let platform = FakePlatform::new(true);
        let mut ctx = fx.context(&options, &toolkit, &platform);
        ctx.argv = vec![
            OsString::from("--game-path"),
            bogus.into_os_string(),
            OsString::from(UAC_FLAG),
        ];

        let request = match run(&mut ctx).unwrap() {
            LaunchOutcome::Restart(request) => request,
            other => panic!("Expected an elevated restart, got {:?}", other),
        };

        assert!(request.elevate);
        let line = std::iter::once(OsString::from("modkeeper")).chain(request.args);
        let reparsed = LaunchOptions::try_parse_from(line).unwrap();
        assert_eq!(reparsed.game_path, Some(fo4));
        assert_eq!(reparsed.uac_preference(), UacPreference::Skip);
        assert!(reparsed.restarting);
    }

    #[test]
    fn test_skipped_elevation_continues() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let options = LaunchOptions {
            no_uac: true,
            ..fx.options()
        };
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(true);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        assert_eq!(outcome, LaunchOutcome::Ran);
        assert!(toolkit.sessions()[0].elevated_access_missing);
    }

    #[test]
    fn test_forced_elevation_restarts_before_main_window() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let options = LaunchOptions {
            uac: true,
            ..fx.options()
        };
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(true);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        match outcome {
            LaunchOutcome::Restart(request) => {
                assert!(request.elevate);
                assert!(request.args.iter().any(|a| a == NO_UAC_FLAG));
            }
            other => panic!("Expected an elevated restart, got {:?}", other),
        }
        assert!(toolkit.sessions().is_empty());
        assert!(toolkit.prompts().is_empty());
    }

    #[test]
    fn test_declined_elevation_prompt_continues() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let options = fx.options();
        let toolkit = ScriptedToolkit::answering([false]);
        let platform = FakePlatform::new(true);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        assert_eq!(outcome, LaunchOutcome::Ran);
        assert_eq!(toolkit.prompts(), vec!["ask: UAC Protection"]);
    }

    #[test]
    fn test_second_instance_is_refused() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let options = fx.options();
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(false);
        let ctx = fx.context(&options, &toolkit, &platform);

        let _held = InstanceLock::try_acquire(&ctx.lock_dir, &ctx.instance_name)
            .unwrap()
            .unwrap();

        assert_eq!(execute(ctx), LaunchStatus::Exit(1));
        assert_eq!(toolkit.prompts(), vec!["notice: Modkeeper"]);
        assert!(toolkit.sessions().is_empty());
    }

    #[test]
    fn test_quiet_backup_quits_before_main_window() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let target = fx.root.path().join("backup-out");
        let options = LaunchOptions {
            backup: true,
            quiet_quit: true,
            filename: Some(target.clone()),
            ..fx.options()
        };
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(true);

        let outcome = run(&mut fx.context(&options, &toolkit, &platform)).unwrap();

        assert_eq!(outcome, LaunchOutcome::QuietQuit);
        assert!(target.is_dir());
        assert!(toolkit.sessions().is_empty());
    }

    #[test]
    fn test_report_generation_exits_early() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let source = fx.root.path().join("Readme.txt");
        fs::write(&source, "= Readme\n").unwrap();
        let options = LaunchOptions {
            gen_html: Some(source),
            ..fx.options()
        };
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(false);

        let status = execute(fx.context(&options, &toolkit, &platform));

        assert_eq!(status, LaunchStatus::Exit(0));
        assert!(fx.root.path().join("Readme.html").is_file());
        assert!(toolkit.sessions().is_empty());
    }

    #[test]
    fn test_setup_failure_is_shown_and_exits_cleanly() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let occupied = fx.root.path().join("occupied");
        fs::write(&occupied, b"").unwrap();
        let options = LaunchOptions {
            personal_path: Some(occupied),
            ..fx.options()
        };
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform::new(false);

        let status = execute(fx.context(&options, &toolkit, &platform));

        assert_eq!(status, LaunchStatus::Exit(0));
        assert_eq!(toolkit.prompts(), vec!["error: Error! Unable to start Modkeeper."]);
    }

    #[test]
    fn test_panic_becomes_bug_report() {
        let fx = Fixture::new();
        fx.install("Oblivion", "Oblivion.esm");
        let options = fx.options();
        let toolkit = ScriptedToolkit::default();
        let platform = FakePlatform {
            needs_elevation: false,
            explode: true,
        };

        let status = execute(fx.context(&options, &toolkit, &platform));

        assert_eq!(status, LaunchStatus::Exit(1));
        assert_eq!(toolkit.prompts(), vec!["error: Modkeeper Error"]);
    }
}
