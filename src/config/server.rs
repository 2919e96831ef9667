use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which persistence backend holds the ledger and progress data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::File => f.write_str("file"),
            Backend::Sqlite => f.write_str("sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub backend: Backend,
    /// Syllabus definition (JSON or YAML). When unset, the sqlite backend
    /// falls back to the imported syllabus tables.
    pub syllabus: Option<PathBuf>,
    /// Upper bound on any storage lock wait. `0` waits indefinitely.
    pub lock_timeout_ms: u64,
    /// Maximum number of leaderboard entries a single read returns.
    pub leaderboard_limit: usize,
    pub session_ttl_hours: i64,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.leaderboard_limit == 0 {
            return Err(Error::Config(
                "leaderboard_limit must be at least 1".to_string(),
            ));
        }
        if self.session_ttl_hours <= 0 {
            return Err(Error::Config(
                "session_ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        match self.lock_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            backend: Backend::File,
            syllabus: None,
            lock_timeout_ms: 5_000,
            leaderboard_limit: 100,
            session_ttl_hours: 24 * 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("studytrack.toml");
        std::fs::write(&path, "backend = \"sqlite\"\nport = 9000\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.leaderboard_limit, 100);
        assert_eq!(config.lock_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_lock_timeout_waits_indefinitely() {
        let config = ServerConfig {
            lock_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.lock_timeout(), None);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("studytrack.toml");
        std::fs::write(&path, "public_base_url = \"http://x\"\n").unwrap();

        let err = ServerConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_leaderboard_limit_is_invalid() {
        let config = ServerConfig {
            leaderboard_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
