use anyhow::{bail, Result};
use directories::BaseDirs;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const GAME_NAME: &str = "Baldur's Gate 3";
const STEAM_APP_ID: &str = "1086940";
const GAME_FOLDERS: [&str; 2] = ["Baldurs Gate 3", "Baldur's Gate 3"];

pub const GAME_EXE: &str = "bin/bg3.exe";
pub const SETTINGS_FILE: &str = "modsettings.lsx";
pub const BASELINE_FILE: &str = "modsettings_original.lsx";

pub const SCRIPT_EXTENDER_DLL: &str = "bin/DWrite.dll";
pub const SCRIPT_EXTENDER_SETTINGS: &str = "bin/ScriptExtenderSettings.json";
pub const PARTY_LIMIT_DLL: &str = "bin/bink2w64.dll";
pub const PARTY_LIMIT_BACKUP: &str = "bin/bink2w64_original.dll";
pub const PAK_EXTENSION: &str = "pak";

/// Validated game install plus the Larian per-user data folder.
#[derive(Debug, Clone)]
pub struct GamePaths {
    pub game_root: PathBuf,
    pub larian_dir: PathBuf,
}

impl GamePaths {
    pub fn new(game_root: &Path, larian_dir: &Path) -> Result<Self> {
        if !looks_like_game_root(game_root) {
            bail!(
                "invalid game root: expected {} in {}",
                GAME_EXE,
                game_root.display()
            );
        }
        if !looks_like_larian_dir(larian_dir) {
            bail!("app data folder not found: {}", larian_dir.display());
        }
        Ok(Self {
            game_root: game_root.to_path_buf(),
            larian_dir: larian_dir.to_path_buf(),
        })
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.larian_dir.join("PlayerProfiles").join("Public")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.profile_dir().join(SETTINGS_FILE)
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.profile_dir().join(BASELINE_FILE)
    }

    pub fn larian_mods_dir(&self) -> PathBuf {
        self.larian_dir.join("Mods")
    }

    pub fn data_mods_dir(&self) -> PathBuf {
        self.game_root.join("Data").join("Mods")
    }

    pub fn game_file(&self, relative: &str) -> PathBuf {
        self.game_root.join(relative)
    }
}

/// The shipped bundle: `Mods/Game` mirrors the game root and `Mods/AppData`
/// mirrors the Larian data folder.
#[derive(Debug, Clone)]
pub struct BundlePaths {
    pub root: PathBuf,
}

impl BundlePaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn game_dir(&self) -> PathBuf {
        self.root.join("Mods").join("Game")
    }

    pub fn app_data_dir(&self) -> PathBuf {
        self.root.join("Mods").join("AppData")
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.app_data_dir().join("PlayerProfiles").join("Public")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.profile_dir().join(SETTINGS_FILE)
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.profile_dir().join(BASELINE_FILE)
    }

    pub fn game_file(&self, relative: &str) -> PathBuf {
        self.game_dir().join(relative)
    }
}

pub fn looks_like_game_root(path: &Path) -> bool {
    path.join(GAME_EXE).is_file()
}

pub fn looks_like_larian_dir(path: &Path) -> bool {
    path.is_dir()
}

/// First Steam library folder that holds a game install.
pub fn find_game_root() -> Option<PathBuf> {
    game_root_candidates(&steam_libraries(&steam_roots()))
        .into_iter()
        .find(|candidate| looks_like_game_root(candidate))
}

/// Where a Steam client may be installed, Steam Deck layout first.
fn steam_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(base) = BaseDirs::new() {
        roots.push(base.home_dir().join(".steam/steam"));
        roots.push(base.home_dir().join(".local/share/Steam"));
    }
    roots.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
    roots.push(PathBuf::from(r"C:\Program Files\Steam"));
    roots
}

/// Every library the given Steam clients know about: the libraries each
/// client lists in `steamapps/libraryfolders.vdf`, then the client folder
/// itself. Duplicates keep their first position.
pub fn steam_libraries(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut libraries: Vec<PathBuf> = Vec::new();
    for root in roots {
        let listed = match fs::read_to_string(root.join("steamapps/libraryfolders.vdf")) {
            Ok(raw) => vdf_values(&raw, "path").map(PathBuf::from).collect(),
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(root = %root.display(), error = %err, "skip steam library list");
                }
                Vec::new()
            }
        };
        for library in listed.into_iter().chain([root.clone()]) {
            if !libraries.contains(&library) {
                libraries.push(library);
            }
        }
    }
    libraries
}

/// Install folders the game would occupy in each library, in library order.
pub fn game_root_candidates(libraries: &[PathBuf]) -> Vec<PathBuf> {
    libraries
        .iter()
        .flat_map(|library| {
            GAME_FOLDERS
                .iter()
                .map(move |folder| library.join("steamapps/common").join(folder))
        })
        .collect()
}

pub fn find_larian_dir() -> Option<PathBuf> {
    let base = BaseDirs::new()?;

    // %LOCALAPPDATA% on Windows, ~/.local/share for the native Linux build.
    let local = base.data_local_dir().join("Larian Studios").join(GAME_NAME);
    if local.is_dir() {
        return Some(local);
    }

    let proton = base
        .home_dir()
        .join(".local/share/Steam/steamapps/compatdata")
        .join(STEAM_APP_ID)
        .join("pfx/drive_c/users/steamuser/AppData/Local/Larian Studios")
        .join(GAME_NAME);
    if proton.is_dir() {
        return Some(proton);
    }

    None
}

/// Values stored under `key` in a Valve KeyValues text file, where each
/// entry is a `"key"  "value"` pair on its own line.
fn vdf_values<'a>(raw: &'a str, key: &'a str) -> impl Iterator<Item = String> + 'a {
    raw.lines().filter_map(move |line| {
        let mut quoted = line.split('"').skip(1).step_by(2);
        if quoted.next()? != key {
            return None;
        }
        quoted.next().map(|value| value.replace(r"\\", r"\"))
    })
}
