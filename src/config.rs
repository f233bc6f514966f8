//! Configuration file parser for handbook.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! The `HANDBOOK_DB` environment variable outranks the file, mirroring how
//! deployments point staging instances at scratch databases.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified; missing keys fall back to `Default::default()`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file. The parent directory is created
    /// on open when missing.
    pub db_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_file: "var/data.db".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// The database path to open: `HANDBOOK_DB` when set, the configured
    /// `db_file` otherwise.
    pub fn database_path(&self) -> String {
        match std::env::var("HANDBOOK_DB") {
            Ok(path) if !path.trim().is_empty() => path,
            _ => self.db_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("handbook-config-{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(std::path::Path::new("/nonexistent/handbook.toml")).unwrap();
        assert_eq!(config.db_file, "var/data.db");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let path = temp_file("empty.toml", "");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.db_file, "var/data.db");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn db_file_key_parses() {
        let path = temp_file("dbfile.toml", "db_file = \"/srv/handbook/content.db\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.db_file, "/srv/handbook/content.db");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let path = temp_file("broken.toml", "db_file = [unclosed\n");
        assert!(Config::load(&path).is_err());
        let _ = std::fs::remove_file(path);
    }
}
