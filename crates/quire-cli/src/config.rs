//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use quire_chat::{Detector, PatternSet, RouterConfig};

/// Configuration for quire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Assistant CLI program name or path
    pub cli_path: String,
    /// Model passed to the CLI
    pub model: Option<String>,
    /// Plan directory, relative to the project
    pub plans_dir: String,
    /// Project directory (defaults to the current directory)
    pub project_path: Option<String>,
    /// Confidence needed to route a response to a plan
    pub commit_confidence: f64,
    /// Characters streamed before detection starts
    pub min_detection_length: usize,
    /// Additional heading patterns that mark a plan
    pub extra_marker_patterns: Vec<String>,
    /// Additional lead-in phrases that announce a plan
    pub extra_intro_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let router = RouterConfig::default();
        Self {
            cli_path: "claude".to_string(),
            model: None,
            plans_dir: "plans".to_string(),
            project_path: None,
            commit_confidence: router.commit_confidence,
            min_detection_length: router.min_detection_length,
            extra_marker_patterns: vec![],
            extra_intro_patterns: vec![],
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quire")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("QUIRE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// Router thresholds from this config
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            min_detection_length: self.min_detection_length,
            commit_confidence: self.commit_confidence.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Detector with the configured extra patterns
    pub fn detector(&self) -> Detector {
        if self.extra_marker_patterns.is_empty() && self.extra_intro_patterns.is_empty() {
            return Detector::default();
        }
        Detector::new(Arc::new(PatternSet::with_extra(
            &self.extra_marker_patterns,
            &self.extra_intro_patterns,
        )))
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# quire configuration file
# Place at ~/.config/quire/config.toml (Linux), ~/Library/Application Support/quire/config.toml (Mac)
# or %APPDATA%\quire\config.toml (Windows). QUIRE_CONFIG_PATH overrides the location.

# Assistant CLI to run
cli_path = "claude"

# Model passed to the CLI (optional)
# model = "sonnet"

# Where plan files are written, relative to the project
plans_dir = "plans"

# Project directory (defaults to the current directory)
# project_path = "/path/to/project"

# Confidence (0.0 - 1.0) a response needs before it is routed to a plan
commit_confidence = 0.4

# Characters streamed before plan detection starts
min_detection_length = 100

# Extra regular expressions, tried after the built-in ones
# extra_marker_patterns = ['(?im)^#+\s+(roadmap.*)$']
# extra_intro_patterns = ['(?i)\bgame plan\b']
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            cli_path = "/opt/claude/bin/claude"
            commit_confidence = 0.6
            extra_intro_patterns = ['(?i)\bgame plan\b']
            "#,
        )
        .unwrap();
        assert_eq!(config.cli_path, "/opt/claude/bin/claude");
        assert_eq!(config.plans_dir, "plans");
        assert_eq!(config.min_detection_length, 100);

        let router = config.router_config();
        assert_eq!(router.commit_confidence, 0.6);
        assert!(router.settle_on_complete);

        let detector = config.detector();
        assert_eq!(
            detector.patterns().intros().len(),
            PatternSet::builtin().intros().len() + 1
        );
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("quire-config-{}.toml", std::process::id()));
        fs::write(&path, "cli_path = [unterminated").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("quire-config-does-not-exist.toml");
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let config = Config {
            commit_confidence: 3.0,
            ..Default::default()
        };
        assert_eq!(config.router_config().commit_confidence, 1.0);
    }
}
