use crate::{
    bg3::{self, GamePaths},
    config::Context,
    detect::{self, AuxiliaryDetector},
    modlist,
};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// What the operator is shown before confirming an install or uninstall.
#[derive(Debug, Clone, Default)]
pub struct ModListing {
    pub mods: Vec<String>,
    /// Set when the settings file could not be read; the list then only
    /// holds auxiliary mods.
    pub warning: Option<String>,
}

pub fn display_list(
    settings: &Path,
    game_root: &Path,
    detectors: &[Box<dyn AuxiliaryDetector>],
) -> ModListing {
    let mut listing = ModListing::default();
    if !settings.is_file() {
        listing.warning = Some(format!(
            "Unable to find mod settings file at {}.",
            settings.display()
        ));
    } else {
        match modlist::read_mod_names(settings) {
            Ok(mods) => listing.mods = mods,
            Err(err) => {
                tracing::warn!(path = %settings.display(), error = %format!("{err:#}"), "unable to read mod list");
                listing.warning = Some(format!("Unable to read mod list: {err:#}"));
            }
        }
    }
    listing.mods.extend(detect::detect_all(detectors, game_root));
    listing
}

pub fn install_listing(ctx: &Context, detectors: &[Box<dyn AuxiliaryDetector>]) -> ModListing {
    display_list(&ctx.bundle.settings_path(), &ctx.bundle.game_dir(), detectors)
}

pub fn uninstall_listing(ctx: &Context, detectors: &[Box<dyn AuxiliaryDetector>]) -> ModListing {
    display_list(&ctx.paths.settings_path(), &ctx.paths.game_root, detectors)
}

#[derive(Debug, Default)]
pub struct InstallReport {
    pub baseline_captured: bool,
    /// The baseline could not be saved, so the live settings were not replaced.
    pub settings_left_in_place: bool,
    pub copied: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Copies the bundle over the game and data folders. The bundle's settings
/// file replaces the live one wholesale.
///
/// Before anything is copied, the live settings file is saved as the
/// uninstall baseline unless one was captured by an earlier install. If that
/// save fails the live settings file is left alone.
pub fn install(ctx: &Context) -> InstallReport {
    let mut report = InstallReport::default();
    let baseline = ctx.paths.baseline_path();
    let settings = ctx.paths.settings_path();
    let mut capture_failed = false;

    if !baseline.exists() && settings.is_file() {
        match replace_file(&settings, &baseline) {
            Ok(()) => {
                tracing::info!(from = %settings.display(), to = %baseline.display(), "captured settings baseline");
                report.baseline_captured = true;
            }
            Err(err) => {
                tracing::warn!(path = %baseline.display(), error = %err, "failed to capture settings baseline");
                report.failed.push((baseline.clone(), err.to_string()));
                capture_failed = true;
            }
        }
    }
    let keep_baseline = baseline.exists();

    copy_tree(&ctx.bundle.game_dir(), &ctx.paths.game_root, &mut report, |_| false);
    copy_tree(
        &ctx.bundle.app_data_dir(),
        &ctx.paths.larian_dir,
        &mut report,
        |dest| (keep_baseline && dest == baseline) || (capture_failed && dest == settings),
    );
    report.settings_left_in_place = capture_failed;
    report
}

fn copy_tree<F>(source_root: &Path, dest_root: &Path, report: &mut InstallReport, skip: F)
where
    F: Fn(&Path) -> bool,
{
    if !source_root.is_dir() {
        tracing::warn!(path = %source_root.display(), "bundle folder missing, nothing to copy");
        return;
    }

    for entry in WalkDir::new(source_root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                tracing::warn!(path = %path.display(), error = %err, "skip unreadable bundle entry");
                report.failed.push((path, err.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(source_root) else {
            continue;
        };
        let dest = dest_root.join(rel);
        if skip(&dest) {
            tracing::info!(path = %dest.display(), "left in place");
            continue;
        }
        match replace_file(entry.path(), &dest) {
            Ok(()) => {
                tracing::info!(path = %dest.display(), "copied");
                report.copied.push(dest);
            }
            Err(err) => {
                tracing::warn!(path = %dest.display(), error = %err, "copy failed");
                report.failed.push((dest, err.to_string()));
            }
        }
    }
}

/// Required files that were absent when an uninstall was requested.
#[derive(Debug, thiserror::Error)]
pub struct MissingPrerequisite {
    pub missing: Vec<PathBuf>,
}

impl fmt::Display for MissingPrerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unable to find settings file(s):")?;
        for path in &self.missing {
            write!(f, " {}", path.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UninstallPlan {
    pub settings: PathBuf,
    pub baseline: PathBuf,
}

/// Gate for [`uninstall`]: both the live settings file and a baseline to
/// restore it from must exist, otherwise nothing may be touched.
pub fn check_uninstall_prerequisites(ctx: &Context) -> Result<UninstallPlan, MissingPrerequisite> {
    let settings = ctx.paths.settings_path();
    let baselines = [ctx.paths.baseline_path(), ctx.bundle.baseline_path()];
    let baseline = baselines.iter().find(|path| path.is_file()).cloned();

    let mut missing = Vec::new();
    if !settings.is_file() {
        missing.push(settings.clone());
    }
    if baseline.is_none() {
        missing.push(baselines[0].clone());
    }

    match baseline {
        Some(baseline) if missing.is_empty() => Ok(UninstallPlan { settings, baseline }),
        _ => Err(MissingPrerequisite { missing }),
    }
}

#[derive(Debug, Default)]
pub struct UninstallReport {
    pub restored: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl UninstallReport {
    fn remove_file(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted");
                self.removed.push(path.to_path_buf());
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "delete failed");
                self.failed.push((path.to_path_buf(), err.to_string()));
            }
        }
    }

    fn remove_dir(&mut self, path: &Path) {
        if !path.is_dir() {
            return;
        }
        match fs::remove_dir_all(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted directory");
                self.removed.push(path.to_path_buf());
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "delete failed");
                self.failed.push((path.to_path_buf(), err.to_string()));
            }
        }
    }

    fn restore(&mut self, from: &Path, to: &Path) -> bool {
        match replace_file(from, to) {
            Ok(()) => {
                tracing::info!(from = %from.display(), to = %to.display(), "restored");
                self.restored.push(to.to_path_buf());
                true
            }
            Err(err) => {
                tracing::warn!(from = %from.display(), to = %to.display(), error = %err, "restore failed");
                self.failed.push((to.to_path_buf(), err.to_string()));
                false
            }
        }
    }
}

/// Puts the game back the way the baseline describes. Individual failures
/// are recorded and skipped.
pub fn uninstall(ctx: &Context, plan: &UninstallPlan) -> UninstallReport {
    let mut report = UninstallReport::default();
    let paths = &ctx.paths;

    // A baseline is only consumed once the settings file is back.
    if report.restore(&plan.baseline, &plan.settings) {
        report.remove_file(&paths.baseline_path());
    }

    report.remove_file(&paths.game_file(bg3::SCRIPT_EXTENDER_DLL));
    report.remove_file(&paths.game_file(bg3::SCRIPT_EXTENDER_SETTINGS));
    restore_party_limit(ctx, &mut report);

    for pak in installed_paks(paths) {
        report.remove_file(&pak);
    }
    report.remove_dir(&paths.data_mods_dir());
    report
}

fn restore_party_limit(ctx: &Context, report: &mut UninstallReport) {
    let hook = ctx.paths.game_file(bg3::PARTY_LIMIT_DLL);
    let in_game_backup = ctx.paths.game_file(bg3::PARTY_LIMIT_BACKUP);
    let backups = [in_game_backup.clone(), ctx.bundle.game_file(bg3::PARTY_LIMIT_BACKUP)];

    match backups.iter().find(|path| path.is_file()) {
        Some(backup) => {
            if report.restore(backup, &hook) {
                report.remove_file(&in_game_backup);
            }
        }
        // bink2w64.dll ships with the game; without a backup it is the original.
        None => tracing::info!(path = %hook.display(), "no party limit backup, leaving binary as is"),
    }
}

fn installed_paks(paths: &GamePaths) -> Vec<PathBuf> {
    let dir = paths.larian_mods_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %dir.display(), error = %err, "unable to list mods folder");
            }
            return Vec::new();
        }
    };
    let mut paks: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case(bg3::PAK_EXTENSION))
                .unwrap_or(false)
        })
        .collect();
    paks.sort();
    paks
}

fn copy_file(source: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, dest)?;
    Ok(())
}

// Copy beside the target, then rename over it.
fn replace_file(source: &Path, dest: &Path) -> io::Result<()> {
    let mut temp_name = dest.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".partial");
    let temp = dest.with_file_name(temp_name);
    copy_file(source, &temp)?;
    if let Err(err) = fs::rename(&temp, dest) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modlist::{settings_with_mods, BASE_MODULE};

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: Context,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("game");
        let larian = dir.path().join("larian");
        let bundle = dir.path().join("bundle");
        fs::create_dir_all(game.join("bin")).unwrap();
        fs::write(game.join(bg3::GAME_EXE), b"exe").unwrap();
        fs::write(game.join(bg3::PARTY_LIMIT_DLL), b"vanilla bink").unwrap();
        fs::create_dir_all(larian.join("PlayerProfiles/Public")).unwrap();
        fs::create_dir_all(&bundle).unwrap();
        let paths = GamePaths::new(&game, &larian).unwrap();
        Fixture {
            ctx: Context::new(paths, &bundle),
            _dir: dir,
        }
    }

    fn write(path: &Path, contents: impl AsRef<[u8]>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn listing_without_settings_warns_and_keeps_aux_mods() {
        let fx = fixture();
        write(&fx.ctx.paths.game_file(bg3::SCRIPT_EXTENDER_DLL), b"se");
        let listing = uninstall_listing(&fx.ctx, &detect::default_detectors());
        assert_eq!(listing.mods, vec!["Script Extender"]);
        assert!(listing.warning.unwrap().contains("Unable to find"));
    }

    #[test]
    fn listing_with_broken_settings_is_empty() {
        let fx = fixture();
        write(&fx.ctx.paths.settings_path(), b"<save><region id=\"Other\"/></save>");
        let listing = uninstall_listing(&fx.ctx, &detect::default_detectors());
        assert!(listing.mods.is_empty());
        assert!(listing.warning.is_some());
    }

    #[test]
    fn listing_with_malformed_settings_is_empty() {
        let fx = fixture();
        write(&fx.ctx.paths.settings_path(), b"<save><node></save>");
        let listing = uninstall_listing(&fx.ctx, &detect::default_detectors());
        assert!(listing.mods.is_empty());
        assert!(listing.warning.unwrap().starts_with("Unable to read mod list"));
    }

    #[test]
    fn install_listing_reads_bundle() {
        let fx = fixture();
        write(
            &fx.ctx.bundle.settings_path(),
            settings_with_mods(&[BASE_MODULE, "Cool Mod"]),
        );
        write(&fx.ctx.bundle.game_file(bg3::PARTY_LIMIT_BACKUP), b"vanilla");
        let listing = install_listing(&fx.ctx, &detect::default_detectors());
        assert_eq!(listing.mods, vec!["Cool Mod", "Party Limit Begone"]);
        assert!(listing.warning.is_none());
    }

    #[test]
    fn install_captures_baseline_once() {
        let fx = fixture();
        let original = settings_with_mods(&[BASE_MODULE]);
        write(&fx.ctx.paths.settings_path(), &original);
        write(
            &fx.ctx.bundle.settings_path(),
            settings_with_mods(&[BASE_MODULE, "Cool Mod"]),
        );
        write(&fx.ctx.bundle.baseline_path(), b"bundle baseline");
        write(&fx.ctx.bundle.app_data_dir().join("Mods/cool.pak"), b"pak");

        let report = install(&fx.ctx);
        assert!(report.baseline_captured);
        assert!(report.failed.is_empty());
        assert_eq!(
            fs::read_to_string(fx.ctx.paths.baseline_path()).unwrap(),
            original
        );
        assert!(fx.ctx.paths.larian_mods_dir().join("cool.pak").is_file());

        let second = install(&fx.ctx);
        assert!(!second.baseline_captured);
        assert_eq!(
            fs::read_to_string(fx.ctx.paths.baseline_path()).unwrap(),
            original
        );
    }

    #[test]
    fn install_without_live_settings_uses_bundle_baseline() {
        let fx = fixture();
        write(&fx.ctx.bundle.baseline_path(), b"bundle baseline");
        let report = install(&fx.ctx);
        assert!(!report.baseline_captured);
        assert_eq!(
            fs::read(fx.ctx.paths.baseline_path()).unwrap(),
            b"bundle baseline"
        );
    }

    #[test]
    fn failed_baseline_capture_keeps_live_settings() {
        let fx = fixture();
        let paths = &fx.ctx.paths;
        write(&paths.settings_path(), b"player settings");
        write(&fx.ctx.bundle.settings_path(), settings_with_mods(&["Cool Mod"]));
        write(&fx.ctx.bundle.app_data_dir().join("Mods/cool.pak"), b"pak");
        // A directory where the capture's temp file would go makes the copy fail.
        fs::create_dir_all(paths.profile_dir().join("modsettings_original.lsx.partial")).unwrap();

        let report = install(&fx.ctx);
        assert!(!report.baseline_captured);
        assert!(report.settings_left_in_place);
        assert!(!paths.baseline_path().exists());
        assert_eq!(fs::read(paths.settings_path()).unwrap(), b"player settings");
        assert!(report.failed.iter().any(|(path, _)| *path == paths.baseline_path()));
        assert!(!report.copied.contains(&paths.settings_path()));
        assert!(paths.larian_mods_dir().join("cool.pak").is_file());
    }

    #[test]
    fn missing_files_block_uninstall() {
        let fx = fixture();
        let err = check_uninstall_prerequisites(&fx.ctx).unwrap_err();
        assert_eq!(
            err.missing,
            vec![fx.ctx.paths.settings_path(), fx.ctx.paths.baseline_path()]
        );

        write(&fx.ctx.paths.settings_path(), b"live");
        let err = check_uninstall_prerequisites(&fx.ctx).unwrap_err();
        assert_eq!(err.missing, vec![fx.ctx.paths.baseline_path()]);
        assert!(err.to_string().starts_with("unable to find settings file(s):"));
    }

    #[test]
    fn bundle_baseline_is_a_fallback() {
        let fx = fixture();
        write(&fx.ctx.paths.settings_path(), b"live");
        write(&fx.ctx.bundle.baseline_path(), b"bundle baseline");
        let plan = check_uninstall_prerequisites(&fx.ctx).unwrap();
        assert_eq!(plan.baseline, fx.ctx.bundle.baseline_path());
    }

    #[test]
    fn uninstall_removes_mod_files_and_restores() {
        let fx = fixture();
        let paths = &fx.ctx.paths;
        write(&paths.settings_path(), b"modded");
        write(&paths.baseline_path(), b"pristine");
        write(&paths.game_file(bg3::SCRIPT_EXTENDER_DLL), b"se");
        write(&paths.game_file(bg3::SCRIPT_EXTENDER_SETTINGS), b"{}");
        write(&paths.game_file(bg3::PARTY_LIMIT_DLL), b"hooked");
        write(&paths.game_file(bg3::PARTY_LIMIT_BACKUP), b"vanilla bink");
        write(&paths.larian_mods_dir().join("a.pak"), b"a");
        write(&paths.larian_mods_dir().join("B.PAK"), b"b");
        write(&paths.larian_mods_dir().join("notes.txt"), b"keep");
        write(&paths.data_mods_dir().join("PartyLimit/meta.lsx"), b"x");

        let plan = check_uninstall_prerequisites(&fx.ctx).unwrap();
        let report = uninstall(&fx.ctx, &plan);

        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert_eq!(fs::read(paths.settings_path()).unwrap(), b"pristine");
        assert!(!paths.baseline_path().exists());
        assert!(!paths.game_file(bg3::SCRIPT_EXTENDER_DLL).exists());
        assert!(!paths.game_file(bg3::SCRIPT_EXTENDER_SETTINGS).exists());
        assert_eq!(
            fs::read(paths.game_file(bg3::PARTY_LIMIT_DLL)).unwrap(),
            b"vanilla bink"
        );
        assert!(!paths.game_file(bg3::PARTY_LIMIT_BACKUP).exists());
        assert!(!paths.larian_mods_dir().join("a.pak").exists());
        assert!(!paths.larian_mods_dir().join("B.PAK").exists());
        assert!(paths.larian_mods_dir().join("notes.txt").exists());
        assert!(!paths.data_mods_dir().exists());
        assert!(paths.game_file(bg3::GAME_EXE).exists());
    }

    #[test]
    fn uninstall_leaves_unbacked_hook_binary() {
        let fx = fixture();
        let paths = &fx.ctx.paths;
        write(&paths.settings_path(), b"modded");
        write(&paths.baseline_path(), b"pristine");

        let plan = check_uninstall_prerequisites(&fx.ctx).unwrap();
        let report = uninstall(&fx.ctx, &plan);
        assert_eq!(
            fs::read(paths.game_file(bg3::PARTY_LIMIT_DLL)).unwrap(),
            b"vanilla bink"
        );
        assert_eq!(report.restored, vec![paths.settings_path()]);
    }

    #[test]
    fn failed_restore_keeps_backups() {
        let fx = fixture();
        let paths = &fx.ctx.paths;
        write(&paths.settings_path(), b"modded");
        write(&paths.baseline_path(), b"pristine");
        write(&paths.game_file(bg3::PARTY_LIMIT_DLL), b"hooked");
        write(&paths.game_file(bg3::PARTY_LIMIT_BACKUP), b"vanilla bink");
        fs::create_dir_all(paths.profile_dir().join("modsettings.lsx.partial")).unwrap();
        fs::create_dir_all(paths.game_file("bin/bink2w64.dll.partial")).unwrap();

        let plan = check_uninstall_prerequisites(&fx.ctx).unwrap();
        let report = uninstall(&fx.ctx, &plan);

        assert!(report.restored.is_empty());
        assert_eq!(fs::read(paths.settings_path()).unwrap(), b"modded");
        assert_eq!(fs::read(paths.baseline_path()).unwrap(), b"pristine");
        assert_eq!(fs::read(paths.game_file(bg3::PARTY_LIMIT_DLL)).unwrap(), b"hooked");
        assert_eq!(
            fs::read(paths.game_file(bg3::PARTY_LIMIT_BACKUP)).unwrap(),
            b"vanilla bink"
        );
        let failed: Vec<_> = report.failed.iter().map(|(path, _)| path.clone()).collect();
        assert_eq!(
            failed,
            vec![paths.settings_path(), paths.game_file(bg3::PARTY_LIMIT_DLL)]
        );
        // A retry still finds what it needs.
        assert!(check_uninstall_prerequisites(&fx.ctx).is_ok());
    }
}
