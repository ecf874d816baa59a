//! WebRTC-backed media session.
//!
//! One peer connection per session: a single local Opus track fed from
//! the [`AudioSource`], a remote-track handler forwarding model speech
//! to the [`AudioSink`], and the `oai-events` data channel for control
//! events. ICE failure and channel closure are surfaced as
//! [`MediaEvent`]s; the state machine decides what they mean.

use super::{AudioSink, AudioSource, MediaConnector, MediaError, MediaEvent, MediaSession};
use crate::protocol::ClientEvent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Control channel label expected by the realtime endpoint.
const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Buffer for media events between the transport callbacks and the
/// session loop.
const MEDIA_EVENT_BUFFER: usize = 64;

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct WebRtcConnectorConfig {
    /// ICE servers for candidate gathering.
    pub ice_servers: Vec<String>,
}

impl Default for WebRtcConnectorConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

/// Production [`MediaConnector`] backed by the `webrtc` crate.
pub struct WebRtcConnector {
    config: WebRtcConnectorConfig,
    source: Arc<dyn AudioSource>,
    sink: Arc<dyn AudioSink>,
}

impl WebRtcConnector {
    /// Create a connector with the given device seams.
    #[must_use]
    pub fn new(
        config: WebRtcConnectorConfig,
        source: Arc<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
        }
    }

    async fn build_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, MediaError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| MediaError::Peer(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| MediaError::Peer(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(config)
            .await
            .map_err(|e| MediaError::Peer(e.to_string()))?;

        Ok(Arc::new(pc))
    }
}

#[async_trait]
impl MediaConnector for WebRtcConnector {
    async fn connect(&self) -> Result<Box<dyn MediaSession>, MediaError> {
        // Microphone first: a permission denial must abort before any
        // transport object exists.
        let mut mic_rx = self.source.capture().await?;

        let pc = self.build_peer_connection().await?;
        let (event_tx, event_rx) = mpsc::channel(MEDIA_EVENT_BUFFER);

        // Local microphone track.
        let mic_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "tutor-mic".to_owned(),
        ));
        pc.add_track(Arc::clone(&mic_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| MediaError::Peer(e.to_string()))?;

        let mic_pump = tokio::spawn(async move {
            while let Some(sample) = mic_rx.recv().await {
                if let Err(e) = mic_track.write_sample(&sample).await {
                    debug!(target: "tutor.media", error = %e, "Microphone pump stopped");
                    break;
                }
            }
        });

        // Remote model speech goes to the playback sink.
        let sink = Arc::clone(&self.sink);
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    debug!(target: "tutor.media", "Remote audio track attached");
                    tokio::spawn(async move {
                        // Ends when the peer connection closes.
                        while let Ok((packet, _)) = track.read_rtp().await {
                            sink.play(packet.payload).await;
                        }
                    });
                })
            },
        ));

        // ICE failure is the reconnection trigger.
        let ice_tx = event_tx.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let ice_tx = ice_tx.clone();
            Box::pin(async move {
                debug!(target: "tutor.media", %state, "ICE connection state changed");
                if state == RTCIceConnectionState::Failed {
                    let _ = ice_tx
                        .send(MediaEvent::TransportFailed(
                            "ICE connection failed".to_string(),
                        ))
                        .await;
                }
            })
        }));

        // Control channel.
        let channel = pc
            .create_data_channel(CONTROL_CHANNEL_LABEL, None)
            .await
            .map_err(|e| MediaError::Peer(e.to_string()))?;

        let channel_open = Arc::new(AtomicBool::new(false));

        let open_flag = Arc::clone(&channel_open);
        let open_tx = event_tx.clone();
        channel.on_open(Box::new(move || {
            open_flag.store(true, Ordering::SeqCst);
            Box::pin(async move {
                let _ = open_tx.send(MediaEvent::ChannelOpen).await;
            })
        }));

        let close_flag = Arc::clone(&channel_open);
        let close_tx = event_tx.clone();
        channel.on_close(Box::new(move || {
            close_flag.store(false, Ordering::SeqCst);
            let close_tx = close_tx.clone();
            Box::pin(async move {
                let _ = close_tx.send(MediaEvent::ChannelClosed).await;
            })
        }));

        let message_tx = event_tx;
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let message_tx = message_tx.clone();
            Box::pin(async move {
                let payload = String::from_utf8_lossy(&message.data).to_string();
                let _ = message_tx.send(MediaEvent::Message(payload)).await;
            })
        }));

        Ok(Box::new(WebRtcSession {
            pc,
            channel,
            channel_open,
            events: event_rx,
            mic_pump: Some(mic_pump),
            closed: false,
        }))
    }
}

/// One live WebRTC session.
struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
    channel_open: Arc<AtomicBool>,
    events: mpsc::Receiver<MediaEvent>,
    mic_pump: Option<JoinHandle<()>>,
    closed: bool,
}

#[async_trait]
impl MediaSession for WebRtcSession {
    async fn create_offer(&mut self) -> Result<String, MediaError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| MediaError::Sdp(e.to_string()))?;

        // Wait for candidate gathering so the offer posted to the
        // realtime endpoint is complete (no trickle over HTTP).
        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| MediaError::Sdp(e.to_string()))?;
        let _ = gather_complete.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| MediaError::Sdp("no local description after gathering".to_string()))?;

        Ok(local.sdp)
    }

    async fn apply_answer(&mut self, answer_sdp: &str) -> Result<(), MediaError> {
        let answer = RTCSessionDescription::answer(answer_sdp.to_string())
            .map_err(|e| MediaError::Sdp(format!("malformed remote description: {e}")))?;

        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| MediaError::Sdp(format!("malformed remote description: {e}")))
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), MediaError> {
        if self.closed || !self.channel_open.load(Ordering::SeqCst) {
            warn!(
                target: "tutor.media",
                "Dropping control event: channel not open"
            );
            return Ok(());
        }

        let json = serde_json::to_string(event).map_err(|e| MediaError::Peer(e.to_string()))?;
        if let Err(e) = self.channel.send_text(json).await {
            // The channel can close between the flag check and the
            // send; closure is reported through the event stream.
            warn!(target: "tutor.media", error = %e, "Control-channel send failed");
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MediaEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(pump) = self.mic_pump.take() {
            pump.abort();
        }
        if let Err(e) = self.pc.close().await {
            debug!(target: "tutor.media", error = %e, "Peer connection close reported an error");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bytes::Bytes;

    struct SilentSource;

    #[async_trait]
    impl AudioSource for SilentSource {
        async fn capture(&self) -> Result<mpsc::Receiver<::webrtc::media::Sample>, MediaError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    struct DeniedSource;

    #[async_trait]
    impl AudioSource for DeniedSource {
        async fn capture(&self) -> Result<mpsc::Receiver<::webrtc::media::Sample>, MediaError> {
            Err(MediaError::PermissionDenied(
                "user dismissed the prompt".to_string(),
            ))
        }
    }

    struct NullSink;

    #[async_trait]
    impl AudioSink for NullSink {
        async fn play(&self, _frame: Bytes) {}
    }

    fn local_connector(source: Arc<dyn AudioSource>) -> WebRtcConnector {
        // Host candidates only: tests must not reach out to STUN.
        let config = WebRtcConnectorConfig {
            ice_servers: Vec::new(),
        };
        WebRtcConnector::new(config, source, Arc::new(NullSink))
    }

    #[tokio::test]
    async fn offer_contains_audio_section() {
        let connector = local_connector(Arc::new(SilentSource));
        let mut session = connector.connect().await.unwrap();

        let offer = session.create_offer().await.unwrap();
        assert!(offer.contains("m=audio"));
        assert!(!offer.contains("m=video"));

        session.close().await;
    }

    #[tokio::test]
    async fn microphone_denial_aborts_before_transport_exists() {
        let connector = local_connector(Arc::new(DeniedSource));
        let result = connector.connect().await;

        assert!(matches!(result, Err(MediaError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let connector = local_connector(Arc::new(SilentSource));
        let mut session = connector.connect().await.unwrap();

        session.close().await;
        session.close().await;
    }

    #[tokio::test]
    async fn send_before_open_is_a_guarded_no_op() {
        let connector = local_connector(Arc::new(SilentSource));
        let mut session = connector.connect().await.unwrap();

        let event = ClientEvent::AudioEnd;
        session.send_event(&event).await.unwrap();

        session.close().await;
    }
}
