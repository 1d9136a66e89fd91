//! Runtime configuration.
//!
//! Everything that depends on the target page's current markup (selectors,
//! placeholder text, timings) lives here rather than in the interaction code,
//! since the page can change under us at any time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_TARGET: &str = "COMMENT_HELPER_TARGET";
pub const ENV_SAMPLE_TEXT: &str = "COMMENT_HELPER_SAMPLE_TEXT";
pub const ENV_CHROME_URL: &str = "COMMENT_HELPER_CHROME_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Substring a tab URL must contain before the controller acts on it.
    pub target_marker: String,
    /// Substring a tab URL must contain for an interactor to be registered.
    pub inject_match: String,
    /// Remote debugging endpoint of an already running Chrome.
    pub chrome_url: String,
    /// Dedicated profile used when we have to launch Chrome ourselves.
    pub profile_dir: Option<PathBuf>,
    /// Page opened in a freshly launched Chrome.
    pub start_url: String,
    /// First port tried by the local web UI; the next nine are fallbacks.
    pub ui_port: u16,
    pub interactor: InteractorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_marker: "reddit.com".to_string(),
            inject_match: "reddit.com".to_string(),
            chrome_url: "http://127.0.0.1:9222".to_string(),
            profile_dir: None,
            start_url: "https://www.reddit.com/".to_string(),
            ui_port: 3000,
            interactor: InteractorConfig::default(),
        }
    }
}

impl Config {
    /// Reads a JSON config file. Missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the optional file, then applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(target) = lookup(ENV_TARGET).filter(|v| !v.is_empty()) {
            self.inject_match = target.clone();
            self.target_marker = target;
        }
        if let Some(text) = lookup(ENV_SAMPLE_TEXT).filter(|v| !v.is_empty()) {
            self.interactor.sample_text = text;
        }
        if let Some(url) = lookup(ENV_CHROME_URL).filter(|v| !v.is_empty()) {
            self.chrome_url = url;
        }
    }
}

/// Check applied to a candidate input before it is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Validity {
    /// Accept anything the selector matched.
    Any,
    /// Rendered height must be strictly greater than `px`. Collapsed
    /// placeholders and hidden decoys usually fail this.
    TallerThan { px: f64 },
}

impl Validity {
    pub fn accepts(&self, height: f64) -> bool {
        match self {
            Validity::Any => true,
            Validity::TallerThan { px } => height > *px,
        }
    }

    pub fn needs_height(&self) -> bool {
        matches!(self, Validity::TallerThan { .. })
    }
}

/// One way of finding the comment text input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputStrategy {
    pub name: String,
    pub selector: String,
    pub validity: Validity,
}

impl InputStrategy {
    pub fn new(name: &str, selector: &str, validity: Validity) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            validity,
        }
    }
}

const MIN_INPUT_HEIGHT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractorConfig {
    pub sample_text: String,
    pub activation_selector: String,
    pub activation_attempts: u32,
    pub activation_retry_delay_ms: u64,
    pub press_pause_ms: u64,
    pub activation_settle_ms: u64,
    /// Tried in order; the first candidate passing its validity check wins.
    pub input_strategies: Vec<InputStrategy>,
    pub input_attempts: u32,
    pub input_retry_delay_ms: u64,
    pub fallback_selector: String,
    pub observer_timeout_ms: u64,
    pub focus_settle_ms: u64,
    pub preview_chars: usize,
}

impl Default for InteractorConfig {
    fn default() -> Self {
        let tall = Validity::TallerThan {
            px: MIN_INPUT_HEIGHT,
        };
        Self {
            sample_text: "This is a sample comment".to_string(),
            activation_selector: r#"faceplate-tracker[noun="add_comment_button"]"#.to_string(),
            activation_attempts: 5,
            activation_retry_delay_ms: 1000,
            press_pause_ms: 50,
            activation_settle_ms: 2000,
            input_strategies: vec![
                InputStrategy::new("placeholder", r#"[placeholder*="conversation"]"#, tall.clone()),
                InputStrategy::new("contenteditable", r#"[contenteditable="true"]"#, tall.clone()),
                InputStrategy::new("textarea", "textarea", tall.clone()),
                InputStrategy::new("role-textbox", r#"[role="textbox"]"#, tall),
            ],
            input_attempts: 2,
            input_retry_delay_ms: 500,
            fallback_selector: "textarea".to_string(),
            observer_timeout_ms: 5000,
            focus_settle_ms: 1000,
            preview_chars: 100,
        }
    }
}

impl InteractorConfig {
    pub fn activation_retry_delay(&self) -> Duration {
        Duration::from_millis(self.activation_retry_delay_ms)
    }

    pub fn press_pause(&self) -> Duration {
        Duration::from_millis(self.press_pause_ms)
    }

    pub fn activation_settle(&self) -> Duration {
        Duration::from_millis(self.activation_settle_ms)
    }

    pub fn input_retry_delay(&self) -> Duration {
        Duration::from_millis(self.input_retry_delay_ms)
    }

    pub fn observer_timeout(&self) -> Duration {
        Duration::from_millis(self.observer_timeout_ms)
    }

    pub fn focus_settle(&self) -> Duration {
        Duration::from_millis(self.focus_settle_ms)
    }
}
