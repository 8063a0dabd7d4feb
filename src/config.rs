//! Daemon configuration (TOML file with CLI overrides)

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Serial control port
    pub device: String,

    /// Player activity poller settings
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PlayerConfig {
    /// Playback activity file written by the player; unset disables the
    /// poller
    pub activity_file: Option<PathBuf>,

    /// Poll period (ms)
    pub poll_interval_ms: u64,

    /// Input selected while the player is active
    pub input: String,

    /// Seconds without activity before the amplifier is powered down
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".into(),
            player: PlayerConfig::default(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            activity_file: None,
            poll_interval_ms: 1000,
            input: "CO1".into(),
            idle_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load the config file. A missing file just means defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            device = "/dev/ttyAMA0"

            [player]
            activity_file = "/run/player/active"
            poll_interval_ms = 500
            input = "OP1"
            idle_timeout_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device, "/dev/ttyAMA0");
        assert_eq!(cfg.player.input, "OP1");
        assert_eq!(cfg.player.poll_interval_ms, 500);
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let cfg: Config = toml::from_str(r#"device = "/dev/ttyUSB1""#).unwrap();
        assert!(cfg.player.activity_file.is_none());
        assert_eq!(cfg.player.idle_timeout_secs, 300);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<Config>(r#"devcie = "/dev/ttyUSB0""#).is_err());
    }
}
