//! Engine configuration, loaded from an optional `kbase.toml`.
//!
//! Priority: CLI flags > config file > defaults.

use crate::error::{KbError, Result};
use crate::excerpt::DEFAULT_EXCERPT_LENGTH;
use crate::store::DuplicatePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "kbase.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `knowledge_base.json`
    pub data_dir: PathBuf,
    /// Excerpt window length in characters
    pub excerpt_length: usize,
    /// Results returned when the caller gives no limit
    pub default_top_k: usize,
    /// Hard cap on requested limits
    pub max_top_k: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            excerpt_length: DEFAULT_EXCERPT_LENGTH,
            default_top_k: 10,
            max_top_k: 100,
            duplicate_policy: DuplicatePolicy::Replace,
        }
    }
}

impl Config {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(|e| KbError::Config { details: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| KbError::io(path, e))?;
        Self::from_toml_str(&s)
    }

    /// Load `path` if given, else `./kbase.toml` if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let local = Path::new(CONFIG_FILE);
                if local.is_file() { Self::load(local) } else { Ok(Self::default()) }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.excerpt_length == 0 {
            return Err(KbError::Config { details: "excerpt_length must be positive".into() });
        }
        if self.default_top_k == 0 || self.max_top_k < self.default_top_k {
            return Err(KbError::Config {
                details: format!("need 0 < default_top_k ({}) <= max_top_k ({})", self.default_top_k, self.max_top_k),
            });
        }
        Ok(())
    }

    /// Clamp a caller-supplied limit into `1..=max_top_k`.
    pub fn clamp_top_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_top_k).clamp(1, self.max_top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = Config::from_toml_str("duplicate_policy = \"reject\"\nexcerpt_length = 120\n").unwrap();
        assert_eq!(c.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(c.excerpt_length, 120);
        assert_eq!(c.default_top_k, 10);
    }

    #[test]
    fn rejects_bad_limits() {
        assert!(Config::from_toml_str("default_top_k = 0").is_err());
        assert!(Config::from_toml_str("default_top_k = 50\nmax_top_k = 20").is_err());
        assert!(Config::from_toml_str("duplicate_policy = \"merge\"").is_err());
    }

    #[test]
    fn clamps_requested_limit() {
        let c = Config::default();
        assert_eq!(c.clamp_top_k(None), 10);
        assert_eq!(c.clamp_top_k(Some(0)), 1);
        assert_eq!(c.clamp_top_k(Some(5000)), 100);
    }
}
