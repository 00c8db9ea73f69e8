// ABOUTME: Platform config locations for tether (XDG on Linux, native dirs elsewhere).
// ABOUTME: Falls back to the current directory when no home directory can be found.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "tether";
const APPLICATION: &str = "tether";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Config directory, e.g. ~/.config/tether/ on Linux
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// e.g. ~/.config/tether/tether.toml
pub fn config_file() -> PathBuf {
    config_dir().join("tether.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_lives_in_config_dir() {
        let file = config_file();
        assert!(file.starts_with(config_dir()));
        assert_eq!(file.file_name().unwrap(), "tether.toml");
    }

    #[test]
    fn test_config_dir_matches_project_dirs() {
        if let Some(dirs) = project_dirs() {
            assert_eq!(config_dir(), dirs.config_dir());
        }
    }
}
