//! # Tutor Test Utilities
//!
//! Scripted collaborators for session lifecycle tests. The session
//! actor depends on three seams (credential source, SDP exchanger,
//! media connector); this crate provides scriptable implementations of
//! all three so lifecycle tests run under paused tokio time with no
//! network, no microphone, and no peer connection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tutor_test_utils::scripted_deps;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let (deps, world) = scripted_deps();
//!     let (handle, _task) = TutorSession::spawn(config, deps, token);
//!
//!     handle.start().await.unwrap();
//!     world.media.inject_message(r#"{"type":"audio.start"}"#).await;
//!     // ...assert on handle.snapshot()
//! }
//! ```
//!
//! The [`MediaControl`] shared with the scripted connector records
//! every control-channel event the session sends and injects inbound
//! media events into the live session.

pub mod credentials;
pub mod media;
pub mod negotiation;

pub use credentials::ScriptedCredentials;
pub use media::{MediaControl, ScriptedConnector};
pub use negotiation::ScriptedExchanger;

use std::sync::Arc;
use tutor_session::credential::CredentialSource;
use tutor_session::metrics::SessionMetrics;
use tutor_session::negotiation::SdpExchanger;
use tutor_session::session::SessionDeps;

/// Handles to every scripted collaborator behind a [`SessionDeps`].
pub struct ScriptedWorld {
    /// Scripted credential source.
    pub credentials: Arc<ScriptedCredentials>,
    /// Scripted SDP exchanger.
    pub exchanger: Arc<ScriptedExchanger>,
    /// Control surface of the scripted media connector.
    pub media: Arc<MediaControl>,
    /// The session counters wired into the deps.
    pub metrics: Arc<SessionMetrics>,
}

/// Build fully scripted session dependencies.
///
/// Defaults to the happy path: credentials fetch and refresh succeed,
/// negotiation succeeds, connects succeed, and the control channel
/// opens immediately.
#[must_use]
pub fn scripted_deps() -> (SessionDeps, ScriptedWorld) {
    let credentials = ScriptedCredentials::new();
    let exchanger = ScriptedExchanger::new();
    let connector = ScriptedConnector::new();
    let media = connector.control();
    let metrics = SessionMetrics::new();

    let deps = SessionDeps {
        credentials: Arc::clone(&credentials) as Arc<dyn CredentialSource>,
        exchanger: Arc::clone(&exchanger) as Arc<dyn SdpExchanger>,
        connector: Arc::new(connector),
        metrics: Arc::clone(&metrics),
    };

    let world = ScriptedWorld {
        credentials,
        exchanger,
        media,
        metrics,
    };

    (deps, world)
}
