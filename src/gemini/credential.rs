//! Credential sources for the Gemini API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Primary environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Fallback variable used by hosted environments that inject `API_KEY`.
pub const FALLBACK_API_KEY_ENV: &str = "API_KEY";

/// Errors raised while selecting a credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to reload environment: {0}")]
    Reload(String),
}

/// Source of the API credential used for every backend call.
///
/// `api_key` is resolved on each request so that a new selection is picked
/// up without rebuilding the client.
pub trait CredentialProvider: Send + Sync {
    /// Whether a credential is currently available.
    fn has_credential(&self) -> bool {
        self.api_key().is_some()
    }

    /// Run the external selection flow. Callers assume success afterwards.
    fn select_credential(&self) -> Result<(), CredentialError>;

    /// The current key, if any.
    fn api_key(&self) -> Option<String>;
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn has_credential(&self) -> bool {
        (**self).has_credential()
    }

    fn select_credential(&self) -> Result<(), CredentialError> {
        (**self).select_credential()
    }

    fn api_key(&self) -> Option<String> {
        (**self).api_key()
    }
}

/// Reads the key from the process environment (and `.env`).
#[derive(Debug, Default, Clone)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialProvider for EnvCredentials {
    fn select_credential(&self) -> Result<(), CredentialError> {
        // Re-read .env, overriding values that were loaded at startup.
        match dotenv::dotenv_iter() {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|e| CredentialError::Reload(e.to_string()))?;
                    std::env::set_var(key, value);
                }
                Ok(())
            }
            Err(e) if e.not_found() => {
                log::debug!("No .env file found; keeping current environment");
                Ok(())
            }
            Err(e) => Err(CredentialError::Reload(e.to_string())),
        }
    }

    fn api_key(&self) -> Option<String> {
        [GEMINI_API_KEY_ENV, FALLBACK_API_KEY_ENV]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|key| !key.trim().is_empty())
    }
}

/// A fixed key, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    key: String,
}

impl StaticCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl CredentialProvider for StaticCredential {
    fn select_credential(&self) -> Result<(), CredentialError> {
        Ok(())
    }

    fn api_key(&self) -> Option<String> {
        if self.key.is_empty() {
            None
        } else {
            Some(self.key.clone())
        }
    }
}

/// Process-wide authorization flag.
///
/// Initialized from [`CredentialProvider::has_credential`] at startup,
/// cleared when the backend rejects the credential and set again after a
/// successful selection. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct AuthState {
    authorized: Arc<AtomicBool>,
}

impl AuthState {
    pub fn new(authorized: bool) -> Self {
        Self {
            authorized: Arc::new(AtomicBool::new(authorized)),
        }
    }

    pub fn from_provider(provider: &impl CredentialProvider) -> Self {
        Self::new(provider.has_credential())
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    pub fn grant(&self) {
        self.authorized.store(true, Ordering::SeqCst);
    }

    pub fn revoke(&self) {
        if self.authorized.swap(false, Ordering::SeqCst) {
            log::warn!("Credential rejected by backend; re-authorization required");
        }
    }
}
