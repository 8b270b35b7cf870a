use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use indexmap::IndexMap;
use walkdir::WalkDir;

use crate::config::AppConfig;

#[derive(Debug, PartialEq, Eq)]
pub struct GameDef {
    pub key: &'static str,
    pub display_name: &'static str,
    /// Present in `Data` for every install of the game.
    pub master_file: &'static str,
    /// Folder names the game installs under in a Steam library.
    pub install_dirs: &'static [&'static str],
}

pub const GAMES: &[GameDef] = &[
    GameDef {
        key: "oblivion",
        display_name: "Oblivion",
        master_file: "Oblivion.esm",
        install_dirs: &["Oblivion"],
    },
    GameDef {
        key: "skyrim",
        display_name: "Skyrim",
        master_file: "Skyrim.esm",
        install_dirs: &["Skyrim"],
    },
    GameDef {
        key: "skyrimse",
        display_name: "Skyrim Special Edition",
        master_file: "Skyrim.esm",
        install_dirs: &["Skyrim Special Edition"],
    },
    GameDef {
        key: "fallout3",
        display_name: "Fallout 3",
        master_file: "Fallout3.esm",
        install_dirs: &["Fallout 3", "Fallout 3 goty"],
    },
    GameDef {
        key: "falloutnv",
        display_name: "Fallout New Vegas",
        master_file: "FalloutNV.esm",
        install_dirs: &["Fallout New Vegas"],
    },
    GameDef {
        key: "fallout4",
        display_name: "Fallout 4",
        master_file: "Fallout4.esm",
        install_dirs: &["Fallout 4"],
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInstall {
    pub game: &'static GameDef,
    pub path: PathBuf,
}

impl GameInstall {
    pub fn data_dir(&self) -> PathBuf {
        self.path.join("Data")
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DetectedGame {
    NotFound,
    Found(GameInstall),
    Ambiguous(Vec<GameInstall>),
}

/// Where to look for installs besides explicitly configured paths.
#[derive(Debug, Default, Clone)]
pub struct SearchRoots {
    /// Directory the launcher itself sits in, when shipped inside a game folder.
    pub near_exe: Option<PathBuf>,
    /// Steam library roots, each holding `steamapps/common`.
    pub libraries: Vec<PathBuf>,
}

impl SearchRoots {
    pub fn discover() -> Self {
        let near_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent()?.parent().map(Path::to_path_buf));

        let mut libraries: Vec<PathBuf> = Vec::new();
        for root in steam_roots() {
            if !root.join("steamapps").is_dir() {
                continue;
            }
            let vdf = root.join("steamapps").join("libraryfolders.vdf");
            let extra = fs::read_to_string(&vdf)
                .map(|contents| parse_library_folders(&contents))
                .unwrap_or_default();

            for library in std::iter::once(root).chain(extra) {
                if !libraries.contains(&library) {
                    libraries.push(library);
                }
            }
        }

        Self {
            near_exe,
            libraries,
        }
    }
}

fn steam_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if cfg!(windows) {
        roots.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
        roots.push(PathBuf::from(r"C:\Program Files\Steam"));
    }
    if let Some(base) = BaseDirs::new() {
        roots.push(base.home_dir().join(".steam/steam"));
        roots.push(base.data_dir().join("Steam"));
    }
    roots
}

/// Pulls the library paths out of Steam's `libraryfolders.vdf`.
pub fn parse_library_folders(contents: &str) -> Vec<PathBuf> {
    contents
        .lines()
        .filter_map(|line| {
            let mut quoted = line.split('"').skip(1).step_by(2);
            match (quoted.next(), quoted.next()) {
                (Some("path"), Some(value)) => Some(PathBuf::from(value.replace(r"\\", r"\"))),
                _ => None,
            }
        })
        .collect()
}

/// Which known game is installed at `path`, if any.
pub fn identify(path: &Path) -> Option<&'static GameDef> {
    let data = path.join("Data");
    if !data.is_dir() {
        return None;
    }
    let dir_name = path.file_name()?.to_string_lossy();

    let mut matching = GAMES
        .iter()
        .filter(|game| data.join(game.master_file).is_file());
    let first = matching.next()?;
    // games sharing a master file are told apart by their folder name
    std::iter::once(first)
        .chain(matching)
        .find(|game| {
            game.install_dirs
                .iter()
                .any(|d| d.eq_ignore_ascii_case(&dir_name))
        })
        .or(Some(first))
}

fn accepts(game: &GameDef, pinned: Option<&str>) -> bool {
    pinned.is_none_or(|key| key == game.key)
}

/// Resolves which installation to manage.
///
/// Explicit paths win when they point at a known game. Otherwise the search
/// roots are scanned and the result is classified by how many games turned up.
/// `pinned` restricts everything to one game key, used after the user has picked one.
pub fn detect_game(
    explicit: Option<&Path>,
    config: &AppConfig,
    roots: &SearchRoots,
    pinned: Option<&str>,
) -> DetectedGame {
    let configured = config.general.game_path.as_deref();
    for (source, candidate) in [("command line", explicit), ("config", configured)] {
        let Some(candidate) = candidate else {
            continue;
        };
        match identify(candidate) {
            Some(game) if accepts(game, pinned) => {
                log::info!("Using {} from {} path {}", game.display_name, source, candidate.display());
                return DetectedGame::Found(GameInstall {
                    game,
                    path: candidate.to_path_buf(),
                });
            }
            _ => log::warn!(
                "The {} path {} is not a supported game install",
                source,
                candidate.display()
            ),
        }
    }

    let mut found: IndexMap<&'static str, GameInstall> = IndexMap::new();
    let mut record = |path: &Path| {
        if let Some(game) = identify(path) {
            log::debug!("Found {} at {}", game.display_name, path.display());
            found.entry(game.key).or_insert_with(|| GameInstall {
                game,
                path: path.to_path_buf(),
            });
        }
    };

    if let Some(near_exe) = &roots.near_exe {
        record(near_exe);
    }
    for library in &roots.libraries {
        let common = library.join("steamapps").join("common");
        let mut dirs: Vec<PathBuf> = WalkDir::new(&common)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.into_path())
            .collect();
        dirs.sort();
        for dir in &dirs {
            record(dir);
        }
    }

    found.retain(|_, install| accepts(install.game, pinned));

    match found.len() {
        0 => DetectedGame::NotFound,
        1 => match found.pop() {
            Some((_, install)) => DetectedGame::Found(install),
            None => DetectedGame::NotFound,
        },
        _ => DetectedGame::Ambiguous(found.into_values().collect()),
    }
}
