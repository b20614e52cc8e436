use crate::bg3;
use std::path::{Path, PathBuf};

/// Mods that never show up in `modsettings.lsx` and can only be spotted by
/// the files they drop into the game folder.
pub trait AuxiliaryDetector {
    fn probe(&self, game_root: &Path) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct MarkerFile {
    pub display_name: &'static str,
    pub relative_path: &'static str,
}

impl MarkerFile {
    pub const fn new(display_name: &'static str, relative_path: &'static str) -> Self {
        Self {
            display_name,
            relative_path,
        }
    }

    pub fn marker(&self, game_root: &Path) -> PathBuf {
        game_root.join(self.relative_path)
    }
}

impl AuxiliaryDetector for MarkerFile {
    fn probe(&self, game_root: &Path) -> Option<String> {
        let marker = self.marker(game_root);
        let found = marker.is_file();
        tracing::debug!(path = %marker.display(), found, "probe auxiliary mod");
        found.then(|| self.display_name.to_string())
    }
}

pub const SCRIPT_EXTENDER: MarkerFile = MarkerFile::new("Script Extender", bg3::SCRIPT_EXTENDER_DLL);
pub const PARTY_LIMIT: MarkerFile = MarkerFile::new("Party Limit Begone", bg3::PARTY_LIMIT_BACKUP);

pub fn default_detectors() -> Vec<Box<dyn AuxiliaryDetector>> {
    vec![Box::new(SCRIPT_EXTENDER), Box::new(PARTY_LIMIT)]
}

pub fn detect_all(detectors: &[Box<dyn AuxiliaryDetector>], game_root: &Path) -> Vec<String> {
    detectors
        .iter()
        .filter_map(|detector| detector.probe(game_root))
        .collect()
}
