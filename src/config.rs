//! Credentials and `.env` loading

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use tsrouter_auth::{obscure, Secret};

pub const CLIENT_ID_VAR: &str = "TS_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "TS_CLIENT_SECRET";
pub const TAILNET_VAR: &str = "TS_TAILNET";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
}

/// OAuth client and tailnet the node is provisioned for
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub tailnet: String,
}

impl Credentials {
    /// Values come from flags or their environment fallbacks; blank counts as missing
    pub fn from_values(
        client_id: Option<String>,
        client_secret: Option<String>,
        tailnet: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required(client_id, CLIENT_ID_VAR)?,
            client_secret: Secret::new(required(client_secret, CLIENT_SECRET_VAR)?),
            tailnet: required(tailnet, TAILNET_VAR)?,
        })
    }

    pub fn log(&self) {
        debug!(
            client_id = %obscure(&self.client_id),
            client_secret = %self.client_secret,
            tailnet = %self.tailnet,
            "Loaded OAuth credentials"
        );
    }
}

fn required(value: Option<String>, var: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(var)),
    }
}

/// What happened to one `.env` candidate
#[derive(Debug)]
pub enum EnvFile {
    Loaded(PathBuf),
    NotFound(PathBuf),
    Failed(PathBuf, String),
}

impl EnvFile {
    /// Called once logging is up, since `.env` is read before it
    pub fn log(&self) {
        match self {
            EnvFile::Loaded(path) => debug!(path = %path.display(), "Loaded .env file"),
            EnvFile::NotFound(path) => debug!(path = %path.display(), "No .env file"),
            EnvFile::Failed(path, reason) => {
                debug!(path = %path.display(), "Failed to load .env file: {}", reason)
            }
        }
    }
}

/// Load `.env` next to the executable, falling back to the working
/// directory only when that one could not be loaded. Variables already set
/// in the environment win.
pub fn load_env_files() -> Vec<EnvFile> {
    load_first_env_file(&env_file_candidates())
}

/// Try `candidates` in order and stop at the first file that loads
fn load_first_env_file(candidates: &[PathBuf]) -> Vec<EnvFile> {
    let mut outcomes = Vec::new();
    for path in candidates {
        let outcome = load_env_file(path);
        let loaded = matches!(outcome, EnvFile::Loaded(_));
        outcomes.push(outcome);
        if loaded {
            break;
        }
    }
    outcomes
}

fn env_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(".env"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(".env");
        if !candidates.contains(&path) {
            candidates.push(path);
        }
    }
    candidates
}

pub fn load_env_file(path: &Path) -> EnvFile {
    match dotenvy::from_path(path) {
        Ok(()) => EnvFile::Loaded(path.to_path_buf()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            EnvFile::NotFound(path.to_path_buf())
        }
        Err(e) => EnvFile::Failed(path.to_path_buf(), e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_credentials_complete() {
        let creds = Credentials::from_values(some("abc"), some("xyz"), some(" example ")).unwrap();

        assert_eq!(creds.client_id, "abc");
        assert_eq!(creds.client_secret.expose(), "xyz");
        assert_eq!(creds.tailnet, "example");
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(
            Credentials::from_values(None, some("xyz"), some("example")).unwrap_err(),
            ConfigError::Missing(CLIENT_ID_VAR)
        );
        assert_eq!(
            Credentials::from_values(some("abc"), some("  "), some("example")).unwrap_err(),
            ConfigError::Missing(CLIENT_SECRET_VAR)
        );
        assert_eq!(
            Credentials::from_values(some("abc"), some("xyz"), some("")).unwrap_err(),
            ConfigError::Missing(TAILNET_VAR)
        );
        assert_eq!(
            Credentials::from_values(some("abc"), some("xyz"), None)
                .unwrap_err()
                .to_string(),
            "TS_TAILNET environment variable is required"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds =
            Credentials::from_values(some("abc"), some("tskey-client-secret"), some("example"))
                .unwrap();
        assert!(!format!("{:?}", creds).contains("tskey-client-secret"));
    }

    #[test]
    fn test_load_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "TSROUTER_TEST_DOTENV_VALUE=from-file\n").unwrap();

        assert!(matches!(load_env_file(&path), EnvFile::Loaded(_)));
        assert_eq!(
            std::env::var("TSROUTER_TEST_DOTENV_VALUE").unwrap(),
            "from-file"
        );
    }

    #[test]
    fn test_missing_env_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_env_file(&dir.path().join(".env")),
            EnvFile::NotFound(_)
        ));
    }

    #[test]
    fn test_fallback_skipped_when_first_file_loads() {
        let exe_dir = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let first = exe_dir.path().join(".env");
        let second = cwd.path().join(".env");
        std::fs::write(&first, "TSROUTER_TEST_FIRST_ENV=exe\n").unwrap();
        std::fs::write(&second, "TSROUTER_TEST_SECOND_ENV=cwd\n").unwrap();

        let outcomes = load_first_env_file(&[first, second]);

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], EnvFile::Loaded(_)));
        assert_eq!(std::env::var("TSROUTER_TEST_FIRST_ENV").unwrap(), "exe");
        assert!(std::env::var("TSROUTER_TEST_SECOND_ENV").is_err());
    }

    #[test]
    fn test_fallback_used_when_first_file_missing() {
        let exe_dir = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let second = cwd.path().join(".env");
        std::fs::write(&second, "TSROUTER_TEST_FALLBACK_ENV=cwd\n").unwrap();

        let outcomes = load_first_env_file(&[exe_dir.path().join(".env"), second]);

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], EnvFile::NotFound(_)));
        assert!(matches!(outcomes[1], EnvFile::Loaded(_)));
        assert_eq!(std::env::var("TSROUTER_TEST_FALLBACK_ENV").unwrap(), "cwd");
    }

    #[test]
    fn test_env_file_candidates() {
        let candidates = env_file_candidates();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|p| p.ends_with(".env")));
    }
}
