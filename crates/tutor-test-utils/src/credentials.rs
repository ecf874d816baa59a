//! Scripted credential source.

use async_trait::async_trait;
use common::secret::SecretString;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tutor_session::credential::{Credential, CredentialError, CredentialSource};

/// Credential source with scriptable failures.
///
/// Unlike the production provider there is no internal retry here; the
/// retry schedule is owned by the provider and covered by its own
/// tests.
#[derive(Default)]
pub struct ScriptedCredentials {
    fetches: AtomicU32,
    refreshes: AtomicU32,
    fail_initial: AtomicBool,
    fail_refresh: AtomicBool,
}

impl ScriptedCredentials {
    /// Create a source scripted for the happy path.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total initial fetches so far.
    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Total refresh attempts so far.
    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Make initial fetches fail.
    pub fn fail_initial(&self) {
        self.fail_initial.store(true, Ordering::SeqCst);
    }

    /// Make refresh attempts fail.
    pub fn fail_refresh(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    fn credential() -> Credential {
        Credential {
            secret: SecretString::from("ek_scripted"),
            expires_at: None,
        }
    }
}

#[async_trait]
impl CredentialSource for ScriptedCredentials {
    async fn fetch_initial(&self) -> Result<Credential, CredentialError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_initial.load(Ordering::SeqCst) {
            return Err(CredentialError::Http(
                "scripted credential outage".to_string(),
            ));
        }
        Ok(Self::credential())
    }

    async fn refresh(&self) -> Result<Credential, CredentialError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(CredentialError::Http(
                "scripted refresh outage".to_string(),
            ));
        }
        Ok(Self::credential())
    }
}
