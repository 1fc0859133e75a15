use std::path::PathBuf;

/// Standardized application directories for Scout.
///
/// - Project-level: ./.scout
/// - User-level config and data: OS-specific dirs
pub struct AppPaths;

impl AppPaths {
    /// Return the project-level .scout directory (relative to current working dir)
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".scout")
    }

    /// Return the project-level config path: ./.scout/config.toml
    pub fn project_config() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    pub fn user_config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "scout").map(|d| d.config_dir().to_path_buf())
    }

    pub fn user_data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "scout").map(|d| d.data_dir().to_path_buf())
    }

    pub fn user_config() -> Option<PathBuf> {
        Self::user_config_dir().map(|d| d.join("config.toml"))
    }

    /// Directory for log files
    pub fn log_dir() -> Option<PathBuf> {
        Self::user_data_dir().map(|d| d.join("logs"))
    }

    /// Standard discovery order for config files.
    /// Project config first, then user config
    pub fn discover_configs() -> Vec<PathBuf> {
        let mut paths = vec![Self::project_config()];
        if let Some(user) = Self::user_config() {
            paths.push(user);
        }
        paths
    }
}
