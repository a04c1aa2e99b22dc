//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\mewsage\
//!   macOS:   ~/Library/Application Support/mewsage/
//!   Linux:   ~/.config/mewsage/
//!
//! Data dir (recordings):
//!   Windows: %LOCALAPPDATA%\mewsage\recordings\
//!   macOS:   ~/Library/Application Support/mewsage/recordings/
//!   Linux:   ~/.local/share/mewsage/recordings/
//!
//! Cache dir (history playback):
//!   Linux:   ~/.cache/mewsage/temp_audio.wav

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory receiving `recording_<epochMillis>.wav` files.
    pub recordings_dir: PathBuf,
    /// Single reusable file that history audio is downloaded into before
    /// playback.  Overwritten on every playback.
    pub temp_audio_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "mewsage";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            recordings_dir: data_dir.join("recordings"),
            temp_audio_file: cache_dir.join("temp_audio.wav"),
        }
    }

    /// All paths rooted under `root`; used by tests and `--data-dir`.
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            settings_file: root.join("config").join("settings.toml"),
            recordings_dir: root.join("recordings"),
            temp_audio_file: root.join("cache").join("temp_audio.wav"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .recordings_dir
            .file_name()
            .is_some_and(|n| n == "recordings"));
        assert!(paths
            .temp_audio_file
            .file_name()
            .is_some_and(|n| n == "temp_audio.wav"));
    }

    #[test]
    fn rooted_paths_stay_under_root() {
        let root = Path::new("/tmp/mewsage-test");
        let paths = AppPaths::rooted(root);
        assert!(paths.recordings_dir.starts_with(root));
        assert!(paths.temp_audio_file.starts_with(root));
        assert!(paths.settings_file.starts_with(&paths.config_dir));
    }
}
