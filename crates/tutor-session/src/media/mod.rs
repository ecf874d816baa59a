//! Media transport seam.
//!
//! The session state machine owns exactly one [`MediaSession`] at a
//! time and drives it through the connect sequence: microphone first,
//! then offer/answer, then the control channel. The traits here keep
//! the state machine testable without a real peer connection; the
//! production implementation lives in [`webrtc`](self::webrtc).

pub mod webrtc;

use crate::protocol::ClientEvent;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

pub use self::webrtc::{WebRtcConnector, WebRtcConnectorConfig};

/// Media-layer failures.
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    /// Microphone capture was refused. Kept distinct so the UI can
    /// message it differently from connection problems.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Peer connection or data channel failure.
    #[error("peer transport error: {0}")]
    Peer(String),

    /// A session description could not be produced or applied.
    #[error("session description error: {0}")]
    Sdp(String),
}

/// Events surfaced by a media session to the state machine.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// The control channel is open and writable.
    ChannelOpen,

    /// The control channel closed; the session treats this as a
    /// transport failure.
    ChannelClosed,

    /// One inbound control-channel payload (raw JSON text).
    Message(String),

    /// Connectivity failed at the ICE level.
    TransportFailed(String),
}

/// Source of captured microphone audio.
///
/// Opening the source is where the permission prompt happens; denial
/// must surface as [`MediaError::PermissionDenied`]. The returned
/// receiver yields encoded samples ready for the local track.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Request capture and return the sample stream.
    async fn capture(&self) -> Result<mpsc::Receiver<::webrtc::media::Sample>, MediaError>;
}

/// Playback sink for remote model speech.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Write one RTP payload of remote audio.
    async fn play(&self, frame: Bytes);
}

/// Builds one media session per connect attempt.
#[async_trait]
pub trait MediaConnector: Send + Sync {
    /// Acquire the microphone, build the peer transport, attach the
    /// local track and remote-track handler, and open the control
    /// channel. Negotiation happens afterwards via
    /// [`MediaSession::create_offer`] / [`MediaSession::apply_answer`].
    async fn connect(&self) -> Result<Box<dyn MediaSession>, MediaError>;
}

/// One live peer transport with its control channel.
#[async_trait]
pub trait MediaSession: Send {
    /// Produce the local session description (audio receive enabled,
    /// video disabled), with ICE gathering completed.
    async fn create_offer(&mut self) -> Result<String, MediaError>;

    /// Apply the remote answer description.
    async fn apply_answer(&mut self, answer_sdp: &str) -> Result<(), MediaError>;

    /// Send a control-channel event. When the channel is not open this
    /// is a guarded no-op with a warning, never an error.
    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), MediaError>;

    /// Next media event; `None` once the session is defunct.
    async fn next_event(&mut self) -> Option<MediaEvent>;

    /// Release the peer connection, control channel, and playback
    /// sink. Idempotent.
    async fn close(&mut self);
}
