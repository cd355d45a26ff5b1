//! Configuration loading and persistence.
//!
//! Shaped after the reference crate's own `config.rs`: a `serde`-backed
//! struct saved as JSON under the platform config directory, with
//! environment variable overrides applied after load and a test-mode
//! directory override so unit tests never touch a real user's config.

use std::path::PathBuf;
use std::{fs, os::unix::fs::PermissionsExt};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "termcast";

/// Daemon configuration for `termcastd`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Command line to spawn in the PTY, e.g. `"bash"` or `"bash -l"`.
    pub command: String,
    /// Address the WebSocket listener binds to.
    pub listen: String,
    /// Initial terminal size.
    pub rows: usize,
    pub cols: usize,
    /// Rows of scrollback kept beyond the visible viewport.
    pub backlog_size: usize,
    /// Motd-equivalent banner sent as the first `MSG` frame a viewer sees,
    /// ahead of the catch-up burst. Empty disables it.
    pub motd: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            command: "bash".to_string(),
            listen: "127.0.0.1:7681".to_string(),
            rows: 24,
            cols: 80,
            backlog_size: crate::grid::DEFAULT_BACKLOG_SIZE,
            motd: String::new(),
        }
    }
}

impl Config {
    /// Platform config directory, creating it if necessary.
    ///
    /// Priority: `TERMCAST_CONFIG_DIR` env var override, then the
    /// platform-standard config directory (`dirs::config_dir()`).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(custom) = std::env::var("TERMCAST_CONFIG_DIR") {
            PathBuf::from(custom)
        } else {
            dirs::config_dir()
                .context("could not determine platform config directory")?
                .join(APP_NAME)
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Load from `config.json` in the config directory, falling back to
    /// defaults if the file is missing or unreadable, then apply
    /// environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Unrecognized or unparseable environment variables are silently
    /// ignored rather than failing startup — a typo'd override should not
    /// be worse than no override.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TERMCAST_COMMAND") {
            self.command = v;
        }
        if let Ok(v) = std::env::var("TERMCAST_LISTEN") {
            self.listen = v;
        }
        if let Ok(v) = std::env::var("TERMCAST_ROWS") {
            if let Ok(n) = v.parse() {
                self.rows = n;
            }
        }
        if let Ok(v) = std::env::var("TERMCAST_COLS") {
            if let Ok(n) = v.parse() {
                self.cols = n;
            }
        }
        if let Ok(v) = std::env::var("TERMCAST_BACKLOG_SIZE") {
            if let Ok(n) = v.parse() {
                self.backlog_size = n;
            }
        }
        if let Ok(v) = std::env::var("TERMCAST_MOTD") {
            self.motd = v;
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_dir()?.join("config.json");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&path, perms)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_config_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.rows, 24);
        assert_eq!(c.cols, 80);
    }

    #[test]
    fn env_override_applies_and_ignores_bad_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TERMCAST_COMMAND", "zsh");
        std::env::set_var("TERMCAST_ROWS", "not-a-number");
        let mut c = Config::default();
        c.apply_env_overrides();
        assert_eq!(c.command, "zsh");
        assert_eq!(c.rows, 24); // unchanged: bad value ignored
        std::env::remove_var("TERMCAST_COMMAND");
        std::env::remove_var("TERMCAST_ROWS");
    }

    #[test]
    fn save_and_reload_round_trips() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("TERMCAST_CONFIG_DIR", dir.path());
        let mut c = Config::default();
        c.command = "fish -l".to_string();
        c.save().unwrap();
        let loaded = Config::load_from_file().unwrap();
        assert_eq!(loaded.command, "fish -l");
        std::env::remove_var("TERMCAST_CONFIG_DIR");
    }
}
