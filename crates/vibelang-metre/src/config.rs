//! Configuration file support for vibe-metre
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/vibe-metre/config.toml`
//! - macOS: `~/Library/Application Support/vibe-metre/config.toml`
//! - Windows: `%APPDATA%\vibe-metre\config.toml`

use crate::clock::BPM_RANGE;
use crate::error::{Error, Result};
use crate::rational::RationalDuration;
use crate::style::MicroTimingStyle;
use crate::tree::MetreSpec;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tempo: TempoSettings,
    pub metre: MetreSettings,
    pub render: RenderSettings,
}

/// Tempo used when a script is run or rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoSettings {
    /// Beats per minute
    pub bpm: f64,
    /// Performance beats per quarter length, as a fraction (`"1"`, `"1/2"`)
    pub beats_per_quarter: String,
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_quarter: "1".to_string(),
        }
    }
}

/// Metre installed before a script starts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetreSettings {
    /// Preset or bracket notation; no metre when unset
    pub default: Option<String>,
    /// Micro-timing style for the default metre
    pub style: Option<String>,
}

/// Output of the `render` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Decimal places for beats and seconds
    pub precision: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self { precision: 3 }
    }
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_or_default_from(&path),
            Err(e) => {
                log::warn!("[CONFIG] {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file is missing, unreadable or invalid. Only a missing file is silent.
    pub fn load_or_default_from(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(Error::ConfigNotFound(_)) => Self::default(),
            Err(e) => {
                log::warn!("[CONFIG] Ignoring unusable config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "vibe-metre") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::write_default_config_file(&path)?;
        Ok(path)
    }

    pub fn write_default_config_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = r#"# vibe-metre configuration file

[tempo]
# Beats per minute (1-999)
bpm = 120.0

# Performance beats per quarter length, as a fraction
beats_per_quarter = "1"

[metre]
# Metre set before each script runs: a time signature
# ("2/4", "3/4", "4/4", "6/8", "9/8", "12/8") or bracket notation
# default = "4/4"

# Micro-timing style: "viennese_waltz", "jembe" or "triplet_swing"
# style = "triplet_swing"

[render]
# Decimal places for beats and seconds
precision = 3
"#;

        fs::write(path, content)?;
        Ok(())
    }

    /// Beats per quarter length as an exact ratio
    pub fn beats_per_quarter(&self) -> Result<RationalDuration> {
        let text = &self.tempo.beats_per_quarter;
        let scale: RationalDuration = text
            .parse()
            .map_err(|e| Error::Config(format!("tempo.beats_per_quarter: {}", e)))?;
        if !scale.is_positive() {
            return Err(Error::Config(format!(
                "tempo.beats_per_quarter must be positive, got {}",
                text
            )));
        }
        Ok(scale)
    }

    /// The default metre, if one is configured
    pub fn default_metre(&self) -> Result<Option<MetreSpec>> {
        self.metre
            .default
            .as_deref()
            .map(str::parse::<MetreSpec>)
            .transpose()
    }

    fn validate(&self) -> Result<()> {
        let (min, max) = BPM_RANGE;
        if !(min..=max).contains(&self.tempo.bpm) {
            return Err(Error::Config(format!(
                "tempo.bpm must be between {} and {}, got {}",
                min, max, self.tempo.bpm
            )));
        }
        self.beats_per_quarter()?;
        self.default_metre()?;
        if let Some(style) = &self.metre.style {
            style.parse::<MicroTimingStyle>()?;
            if self.metre.default.is_none() {
                return Err(Error::Config(
                    "metre.style is set but metre.default is not".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::ql;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tempo.bpm, 120.0);
        assert_eq!(config.beats_per_quarter().unwrap(), ql(1, 1));
        assert!(config.default_metre().unwrap().is_none());
        assert_eq!(config.render.precision, 3);
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::write_default_config_file(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.tempo.bpm = 90.0;
        config.tempo.beats_per_quarter = "1/2".to_string();
        config.metre.default = Some("3/4".to_string());
        config.metre.style = Some("viennese_waltz".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.beats_per_quarter().unwrap(), ql(1, 2));
        assert_eq!(loaded.default_metre().unwrap().unwrap().canonical(), "3/4");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[metre]\ndefault = \"[[0.5,0.5],[0.5,0.5,0.5]]\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.tempo, TempoSettings::default());
        assert_eq!(
            config.default_metre().unwrap().unwrap().canonical(),
            "[[1/2,1/2],[1/2,1/2,1/2]]"
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cases = [
            "[tempo]\nbpm = 0.0\n",
            "[tempo]\nbeats_per_quarter = \"-1/2\"\n",
            "[metre]\ndefault = \"5/4\"\n",
            "[metre]\ndefault = \"4/4\"\nstyle = \"polka\"\n",
            "[metre]\nstyle = \"jembe\"\n",
        ];
        for case in cases {
            fs::write(&path, case).unwrap();
            assert!(Config::load_from(&path).is_err(), "{case}");
        }

        fs::write(&path, "[tempo\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_missing_and_invalid_files_fall_back_differently() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(matches!(
            Config::load_from(&path),
            Err(Error::ConfigNotFound(p)) if p == path
        ));
        assert_eq!(Config::load_or_default_from(&path), Config::default());

        fs::write(&path, "[tempo]\nbpm = 0.0\n\n[metre]\ndefault = \"3/4\"\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
        assert!(err.to_string().contains("tempo.bpm"));
        assert_eq!(Config::load_or_default_from(&path), Config::default());

        fs::write(&path, "[metre]\ndefault = \"3/4\"\n").unwrap();
        let config = Config::load_or_default_from(&path);
        assert_eq!(config.default_metre().unwrap().unwrap().canonical(), "3/4");
    }
}
