use crate::{
    bg3,
    config::Context,
    detect::{self, AuxiliaryDetector},
    prompt::{Action, Operator},
    reconcile::{self, ModListing},
};
use anyhow::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Declined,
    Aborted,
}

pub struct App<O: Operator> {
    ctx: Context,
    operator: O,
    detectors: Vec<Box<dyn AuxiliaryDetector>>,
}

impl<O: Operator> App<O> {
    pub fn new(ctx: Context, operator: O) -> Self {
        Self {
            ctx,
            operator,
            detectors: detect::default_detectors(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn run(&mut self) -> Result<()> {
        println!("\nWelcome!");
        println!("Found Game folder: {}", self.ctx.paths.game_root.display());
        println!("Found AppData folder: {}", self.ctx.paths.larian_dir.display());

        loop {
            println!();
            println!("Press 'i' for install, 'u' for uninstall, or 'q' to quit.");
            println!("Note that uninstalling will remove *all* mods, not just those included here.");
            println!("You will have a chance to confirm before performing any actions.\n");

            match self.operator.choose_action()? {
                Action::Install => {
                    self.install()?;
                }
                Action::Uninstall => {
                    self.uninstall()?;
                }
                Action::Quit => return Ok(()),
                Action::Invalid(_) => println!("Invalid key. Try again."),
            }
            println!("\n");
        }
    }

    pub fn install(&mut self) -> Result<Outcome> {
        let listing = reconcile::install_listing(&self.ctx, &self.detectors);
        print_listing(&listing, false);

        if !self.operator.confirm("Would you like to proceed?")? {
            println!("Aborting.");
            return Ok(Outcome::Declined);
        }

        let report = reconcile::install(&self.ctx);
        if report.baseline_captured {
            println!(
                "Saved current mod settings to {}",
                self.ctx.paths.baseline_path().display()
            );
        }
        if report.settings_left_in_place {
            println!(
                "Could not save current mod settings, so {} was left unchanged.",
                self.ctx.paths.settings_path().display()
            );
        }
        println!("Copied {} file(s).", report.copied.len());
        print_failures(&report.failed);
        println!("Installation complete!");
        Ok(Outcome::Completed)
    }

    pub fn uninstall(&mut self) -> Result<Outcome> {
        let listing = reconcile::uninstall_listing(&self.ctx, &self.detectors);
        print_listing(&listing, true);

        if !self.operator.confirm("Would you like to proceed?")? {
            println!("Aborting.");
            return Ok(Outcome::Declined);
        }

        let plan = match reconcile::check_uninstall_prerequisites(&self.ctx) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(error = %err, "uninstall aborted");
                println!("Unable to find settings file(s). Aborting.");
                for path in &err.missing {
                    println!("  missing: {}", path.display());
                }
                return Ok(Outcome::Aborted);
            }
        };

        let report = reconcile::uninstall(&self.ctx, &plan);
        println!(
            "Restored {} file(s), deleted {}.",
            report.restored.len(),
            report.removed.len()
        );
        print_failures(&report.failed);
        println!("Uninstallation complete!");
        Ok(Outcome::Completed)
    }
}

fn print_listing(listing: &ModListing, for_uninstall: bool) {
    if let Some(warning) = &listing.warning {
        println!("{warning}");
    }
    if listing.mods.is_empty() {
        println!("No installed mods found. Original mod order/dlls will be restored.\n");
        return;
    }
    let prefix = if for_uninstall { "un" } else { "" };
    println!("The following mods were found and will be {prefix}installed:");
    for name in &listing.mods {
        println!("{name}");
    }
    println!();
}

fn print_failures(failed: &[(PathBuf, String)]) {
    for (path, err) in failed {
        println!("Skipped {}: {err}", path.display());
    }
}

/// Walks the known candidates, then falls back to asking. Returns `None`
/// when the operator quits.
pub fn locate_game_root<O: Operator>(
    operator: &mut O,
    candidates: &[PathBuf],
    discover: impl Fn() -> Option<PathBuf>,
) -> Result<Option<PathBuf>> {
    for candidate in candidates {
        if bg3::looks_like_game_root(candidate) {
            return Ok(Some(candidate.clone()));
        }
        println!("Game not found at {}", candidate.display());
    }

    println!("Searching for game folder...");
    if let Some(found) = discover() {
        println!("Game located!");
        return Ok(Some(found));
    }

    loop {
        let Some(path) = operator.ask_game_root()? else {
            return Ok(None);
        };
        if bg3::looks_like_game_root(&path) {
            return Ok(Some(path));
        }
        println!("Game not found at {}", display_expected(&path));
    }
}

fn display_expected(path: &Path) -> String {
    format!("{} (expected {})", path.display(), bg3::GAME_EXE)
}
