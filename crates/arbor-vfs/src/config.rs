//! Filesystem configuration.
//!
//! Defaults match the behavior of a plain `MemFs::new()`. A config can be
//! built in code with the `with_*` setters or loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{VfsError, VfsResult};

/// Default permissions for new regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o664;
/// Default permissions for new directories.
pub const DEFAULT_DIR_MODE: u32 = 0o775;
/// Default buffer growth multiplier.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.618;
/// Largest content a single file may hold.
pub const MAX_CONTENT_LEN: usize = isize::MAX as usize;

/// Which paths a filesystem accepts.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PathPolicy {
    /// Any string is a path.
    #[default]
    Permissive,
    /// Only lexically valid relative paths.
    Strict,
}

/// Configuration for an in-memory filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Permission bits used by `create`.
    pub file_mode: u32,

    /// Permission bits for directories created implicitly.
    pub dir_mode: u32,

    /// Buffer capacity reserved for each new file.
    pub initial_capacity: usize,

    /// Multiplier applied when a write outgrows the buffer. Must be > 1.0.
    pub growth_factor: f64,

    /// Upper bound on a file's buffer capacity.
    pub max_content_len: usize,

    /// Path validity policy.
    pub path_policy: PathPolicy,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            file_mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
            initial_capacity: 0,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            max_content_len: MAX_CONTENT_LEN,
            path_policy: PathPolicy::Permissive,
        }
    }
}

impl VfsConfig {
    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> VfsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| VfsError::invalid_input(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> VfsResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> VfsResult<()> {
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(VfsError::invalid_input(format!(
                "growth_factor must be greater than 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.max_content_len == 0 || self.max_content_len > MAX_CONTENT_LEN {
            return Err(VfsError::invalid_input(format!(
                "max_content_len must be in 1..={MAX_CONTENT_LEN}, got {}",
                self.max_content_len
            )));
        }
        if self.initial_capacity > self.max_content_len {
            return Err(VfsError::invalid_input(format!(
                "initial_capacity {} exceeds max_content_len {}",
                self.initial_capacity, self.max_content_len
            )));
        }
        Ok(())
    }

    /// Set the default file permissions.
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Set the default directory permissions.
    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Set the initial buffer capacity.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the growth multiplier.
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set the maximum content length.
    pub fn with_max_content_len(mut self, len: usize) -> Self {
        self.max_content_len = len;
        self
    }

    /// Set the path policy.
    pub fn with_path_policy(mut self, policy: PathPolicy) -> Self {
        self.path_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let config = VfsConfig::default();
        assert_eq!(config.file_mode, 0o664);
        assert_eq!(config.dir_mode, 0o775);
        assert_eq!(config.initial_capacity, 0);
        assert_eq!(config.growth_factor, 1.618);
        assert_eq!(config.max_content_len, isize::MAX as usize);
        assert_eq!(config.path_policy, PathPolicy::Permissive);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_toml_partial() {
        let config = VfsConfig::from_toml_str(
            r#"
            initial_capacity = 64
            path_policy = "strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.initial_capacity, 64);
        assert_eq!(config.path_policy, PathPolicy::Strict);
        assert_eq!(config.growth_factor, DEFAULT_GROWTH_FACTOR);
    }

    #[test]
    fn test_from_toml_rejects_bad_factor() {
        let err = VfsConfig::from_toml_str("growth_factor = 1.0").unwrap_err();
        assert!(matches!(err, VfsError::InvalidInput(_)));
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(VfsConfig::from_toml_str("path_policy = \"sideways\"").is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vfs.toml");
        std::fs::write(&path, "file_mode = 0o600\nmax_content_len = 4096\n").unwrap();
        let config = VfsConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.file_mode, 0o600);
        assert_eq!(config.max_content_len, 4096);
    }

    #[test]
    fn test_validate_capacity_bounds() {
        let config = VfsConfig::default()
            .with_max_content_len(16)
            .with_initial_capacity(32);
        assert!(config.validate().is_err());
        assert!(VfsConfig::default().with_max_content_len(0).validate().is_err());
    }

    #[test]
    fn test_path_policy_strings() {
        assert_eq!(PathPolicy::Strict.to_string(), "strict");
        assert_eq!(PathPolicy::from_str("permissive").unwrap(), PathPolicy::Permissive);
    }
}
