//! Voice Tutor Session Library
//!
//! This library provides the realtime voice-practice session core for
//! the flashcard tutor - a bounded, time-limited, single-peer WebRTC
//! session with one control channel, responsible for:
//!
//! - Ephemeral credential acquisition with bounded retry
//! - SDP offer/answer negotiation with the realtime endpoint
//! - Control-channel protocol handling (configuration, conversation
//!   start, audio markers, transcript deltas)
//! - Session timers: 1 Hz countdown, hard deadline, credential refresh
//! - Bounded reconnection on transport failure
//!
//! # Architecture
//!
//! One spawned actor per tutor instance owns the session lifecycle:
//!
//! ```text
//! TutorSession (actor)
//! ├── CredentialSource   (ephemeral key fetch + refresh)
//! ├── SdpExchanger       (offer/answer over HTTP)
//! └── MediaConnector     (peer connection + control channel)
//! ```
//!
//! The embedding layer holds a [`session::TutorSessionHandle`]:
//! commands flow in through a mailbox, state flows out through a
//! `watch` snapshot. All three collaborators sit behind traits so the
//! lifecycle is testable under paused time without a network or a
//! microphone.
//!
//! # Key Design Decisions
//!
//! - **One session at a time**: re-entrant starts are ignored; restart
//!   requires an explicit stop or a session end
//! - **Timers live inside the active loop**: leaving the loop cancels
//!   them structurally, so a tick can never observe an ended session
//! - **Refresh never renegotiates**: a refreshed credential only keeps
//!   reconnection possible; the transport keeps its negotiated session
//!
//! # Modules
//!
//! - [`config`] - Configuration from environment
//! - [`credential`] - Ephemeral credential provider
//! - [`errors`] - Session error taxonomy
//! - [`media`] - Media transport seam and WebRTC implementation
//! - [`negotiation`] - SDP exchange with the realtime endpoint
//! - [`protocol`] - Control-channel wire protocol
//! - [`session`] - The session state machine actor

pub mod config;
pub mod credential;
pub mod errors;
pub mod media;
pub mod metrics;
pub mod negotiation;
pub mod protocol;
pub mod session;

pub use config::Config;
pub use errors::{SessionError, SessionGone};
pub use session::{
    ConnectionStatus, SessionCommand, SessionDeps, SessionSnapshot, TutorSession,
    TutorSessionHandle, COMPLETION_MESSAGE,
};
