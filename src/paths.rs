//! Local path resolution for lakebundle
//!
//! # Environment Variables
//!
//! - `LAKEBUNDLE_CONFIG_DIR` - Override config directory
//! - `LAKEBUNDLE_BUNDLES_DIR` - Override the directory bundles are read from
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `LAKEBUNDLE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/lakebundle` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\lakebundle`
//!    - macOS/Linux: `~/.config/lakebundle`
//!
//! For bundles_dir():
//! 1. `LAKEBUNDLE_BUNDLES_DIR` environment variable
//! 2. `XDG_DATA_HOME/lakebundle/bundles` (if set)
//! 3. Platform default: `~/.local/share/lakebundle/bundles`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "LAKEBUNDLE_CONFIG_DIR";

/// Environment variable for bundles directory override
pub const ENV_BUNDLES_DIR: &str = "LAKEBUNDLE_BUNDLES_DIR";

/// Name of the config file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the lakebundle config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("lakebundle");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("lakebundle");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("lakebundle");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Get the directory bundles are read from
pub fn bundles_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_BUNDLES_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using bundles dir from {}: {}",
            ENV_BUNDLES_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg_data).join("lakebundle").join("bundles"));
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home
        .join(".local")
        .join("share")
        .join("lakebundle")
        .join("bundles"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with an environment variable set.
    ///
    /// Tests touching the same variable must not run concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test uses its own variable value and restores it
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: see above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/lakebundle", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/lakebundle"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/lakebundle/config.toml")
            );
        });
    }

    #[test]
    fn test_bundles_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_BUNDLES_DIR, "~/bundles-tilde-test", || {
            assert_eq!(bundles_dir().unwrap(), home.join("bundles-tilde-test"));
        });
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$LAKEBUNDLE_NONEXISTENT_12345/file");
        assert_eq!(
            result,
            PathBuf::from("/path/$LAKEBUNDLE_NONEXISTENT_12345/file")
        );
    }
}
