//! User configuration, read from `marquee.toml` in the platform config
//! directory (or the path given with `--config`).
//!
//! ```toml
//! nvram_dir = "/home/me/.local/share/marquee/nvram"
//!
//! [boards.xybots]
//! ack_rule = "on_read"
//!
//! [boards.gauntlet]
//! speedup = false
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use marquee_core::device::sound_bridge::AckRule;
use marquee_machines::BoardProfile;

const CONFIG_FILE: &str = "marquee.toml";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nvram_dir: Option<PathBuf>,
    pub boards: BTreeMap<String, BoardOverride>,
}

/// Per-board overrides applied on top of the registered profile.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardOverride {
    /// `false` withdraws the board's audio speed-up rule.
    pub speedup: Option<bool>,
    pub ack_rule: Option<AckRule>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("marquee").join(CONFIG_FILE))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// A missing file is an empty configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn nvram_dir(&self) -> PathBuf {
        if let Some(dir) = &self.nvram_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("marquee").join("nvram"))
            .unwrap_or_else(|| PathBuf::from("nvram"))
    }

    /// Apply the overrides for `profile.name`, if any.
    pub fn apply(&self, profile: &mut BoardProfile) {
        let Some(o) = self.boards.get(&profile.name) else {
            return;
        };
        if let Some(rule) = o.ack_rule {
            log::info!("{}: sound ack rule overridden to {rule:?}", profile.name);
            profile.sound.bridge.ack_rule = rule;
        }
        if o.speedup == Some(false) && profile.sound.speedup.take().is_some() {
            log::info!("{}: audio speed-up disabled", profile.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_board_overrides() {
        let config = Config::parse(
            r#"
            nvram_dir = "/tmp/nv"

            [boards.xybots]
            ack_rule = "on_read"

            [boards.gauntlet]
            speedup = false
            "#,
        )
        .unwrap();

        assert_eq!(config.nvram_dir(), PathBuf::from("/tmp/nv"));
        assert_eq!(config.boards["xybots"].ack_rule, Some(AckRule::OnRead));
        assert_eq!(config.boards["gauntlet"].speedup, Some(false));
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn unknown_ack_rule_rejected() {
        assert!(Config::parse("[boards.xybots]\nack_rule = \"sometimes\"").is_err());
    }

    #[test]
    fn overrides_change_profile() {
        let mut config = Config::default();
        config.boards.insert(
            "gauntlet".into(),
            BoardOverride {
                speedup: Some(false),
                ack_rule: Some(AckRule::OnWrite),
            },
        );

        let mut profile = marquee_machines::gauntlet::profile();
        config.apply(&mut profile);
        assert_eq!(profile.sound.bridge.ack_rule, AckRule::OnWrite);
        assert!(profile.sound.speedup.is_none());

        let mut other = marquee_machines::xybots::profile();
        config.apply(&mut other);
        assert_eq!(other, marquee_machines::xybots::profile());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config {
            nvram_dir: Some(PathBuf::from("/var/marquee")),
            ..Config::default()
        };
        config.boards.insert(
            "xybots".into(),
            BoardOverride {
                speedup: Some(true),
                ack_rule: None,
            },
        );
        let text = toml::to_string(&config).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_loads_default() {
        let path = std::env::temp_dir().join("marquee_config_test_missing.toml");
        let _ = std::fs::remove_file(&path);
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }
}
