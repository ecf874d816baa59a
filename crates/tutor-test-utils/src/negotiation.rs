//! Scripted SDP exchanger.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tutor_session::credential::Credential;
use tutor_session::negotiation::{NegotiationError, SdpExchanger};

/// SDP exchanger with scriptable failures.
#[derive(Default)]
pub struct ScriptedExchanger {
    exchanges: AtomicU32,
    fail: AtomicBool,
}

impl ScriptedExchanger {
    /// Create an exchanger scripted for the happy path.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total exchanges so far.
    pub fn exchanges(&self) -> u32 {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Make every subsequent exchange fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SdpExchanger for ScriptedExchanger {
    async fn exchange(
        &self,
        _credential: &Credential,
        _offer_sdp: &str,
    ) -> Result<String, NegotiationError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NegotiationError::Status {
                status: 502,
                body: "scripted negotiation failure".to_string(),
            });
        }
        Ok("v=0\r\nscripted-answer".to_string())
    }
}
