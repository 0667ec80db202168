//! Redacted secret values.
//!
//! A [`Secret`] never prints its value. Engines hand the plaintext to a
//! container through environment inheritance or a private temp file, never
//! through an argument vector.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

/// A named secret value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    name: String,
    value: Arc<str>,
}

impl Secret {
    pub fn new(name: impl Into<String>, value: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            value: Arc::from(value.as_ref()),
        }
    }

    /// Read a secret from an environment variable of the same name.
    pub fn from_env(var: &str) -> EngineResult<Self> {
        let value = std::env::var(var).map_err(|e| EngineError::SecretUnavailable {
            name: var.to_string(),
            reason: e.to_string(),
        })?;
        if value.is_empty() {
            return Err(EngineError::SecretUnavailable {
                name: var.to_string(),
                reason: "variable is empty".to_string(),
            });
        }
        Ok(Self::new(var, value))
    }

    /// Read a secret from a file (e.g. a service account key).
    pub fn from_file(name: impl Into<String>, path: &Path) -> EngineResult<Self> {
        let name = name.into();
        let value = std::fs::read_to_string(path).map_err(|e| EngineError::SecretUnavailable {
            name: name.clone(),
            reason: format!("{}: {e}", path.display()),
        })?;
        Ok(Self::new(name, value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The plaintext value.
    pub fn plaintext(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"***")
            .finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let s = Secret::new("GHCR_TOKEN", "ghp_supersecret");
        assert!(!format!("{s:?}").contains("ghp_supersecret"));
        assert!(!format!("{s}").contains("ghp_supersecret"));
        assert_eq!(s.plaintext(), "ghp_supersecret");
    }

    #[test]
    fn missing_env_secret_is_an_error() {
        let err = Secret::from_env("ATHAME_TEST_SECRET_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, EngineError::SecretUnavailable { .. }));
    }

    #[test]
    fn reads_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, "{\"type\":\"service_account\"}").unwrap();
        let s = Secret::from_file("gcloud-key", &path).unwrap();
        assert_eq!(s.name(), "gcloud-key");
        assert!(s.plaintext().contains("service_account"));
    }
}
