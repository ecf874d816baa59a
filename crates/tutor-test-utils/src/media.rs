//! Scripted media connector and session.
//!
//! The connector hands out one [`ScriptedSession`] per connect; the
//! shared [`MediaControl`] scripts failures, records what the session
//! sends on the control channel, and injects inbound events.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tutor_session::media::{MediaConnector, MediaError, MediaEvent, MediaSession};
use tutor_session::protocol::ClientEvent;

const EVENT_BUFFER: usize = 64;

/// Shared control surface for the scripted media layer.
#[derive(Default)]
pub struct MediaControl {
    connects: AtomicU32,
    closes: AtomicU32,
    deny_microphone: AtomicBool,
    fail_connects: AtomicU32,
    sent: Mutex<Vec<serde_json::Value>>,
    injector: Mutex<Option<mpsc::Sender<MediaEvent>>>,
}

impl MediaControl {
    /// Total connect attempts so far.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Total sessions closed so far.
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make every subsequent connect fail with a permission denial.
    pub fn deny_microphone(&self) {
        self.deny_microphone.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` connects fail with a peer error.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Every control-channel event the session has sent, in order,
    /// across all sessions.
    pub fn sent_events(&self) -> Vec<serde_json::Value> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }

    /// The `type` tags of the sent events, in order.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent_events()
            .iter()
            .filter_map(|event| event.get("type"))
            .filter_map(|tag| tag.as_str())
            .map(str::to_string)
            .collect()
    }

    /// Inject a media event into the live session.
    ///
    /// # Panics
    ///
    /// Panics if no session is live or its event channel is closed.
    pub async fn inject(&self, event: MediaEvent) {
        let sender = self
            .injector
            .lock()
            .expect("injector lock poisoned")
            .clone()
            .expect("no live media session to inject into");
        sender
            .send(event)
            .await
            .expect("media event channel closed");
    }

    /// Inject an inbound control-channel message.
    pub async fn inject_message(&self, payload: &str) {
        self.inject(MediaEvent::Message(payload.to_string())).await;
    }

    /// Inject a transport failure.
    pub async fn fail_transport(&self, reason: &str) {
        self.inject(MediaEvent::TransportFailed(reason.to_string()))
            .await;
    }

    fn record_sent(&self, event: &ClientEvent) {
        let value = serde_json::to_value(event).expect("client event serializes");
        self.sent.lock().expect("sent lock poisoned").push(value);
    }
}

/// Scripted [`MediaConnector`].
pub struct ScriptedConnector {
    control: Arc<MediaControl>,
}

impl ScriptedConnector {
    /// Create a connector scripted for the happy path.
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: Arc::new(MediaControl::default()),
        }
    }

    /// The shared control surface.
    #[must_use]
    pub fn control(&self) -> Arc<MediaControl> {
        Arc::clone(&self.control)
    }
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn MediaSession>, MediaError> {
        self.control.connects.fetch_add(1, Ordering::SeqCst);

        if self.control.deny_microphone.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied(
                "scripted microphone denial".to_string(),
            ));
        }

        let remaining = self.control.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.control
                .fail_connects
                .store(remaining - 1, Ordering::SeqCst);
            return Err(MediaError::Peer("scripted connect failure".to_string()));
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        // Queued before the session ever polls, so the channel opens
        // immediately after negotiation.
        tx.send(MediaEvent::ChannelOpen)
            .await
            .expect("fresh channel accepts the open event");
        *self.control.injector.lock().expect("injector lock poisoned") = Some(tx);

        Ok(Box::new(ScriptedSession {
            control: Arc::clone(&self.control),
            events: rx,
            closed: false,
        }))
    }
}

/// One scripted media session.
pub struct ScriptedSession {
    control: Arc<MediaControl>,
    events: mpsc::Receiver<MediaEvent>,
    closed: bool,
}

#[async_trait]
impl MediaSession for ScriptedSession {
    async fn create_offer(&mut self) -> Result<String, MediaError> {
        Ok("v=0\r\nscripted-offer".to_string())
    }

    async fn apply_answer(&mut self, _answer_sdp: &str) -> Result<(), MediaError> {
        Ok(())
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), MediaError> {
        self.control.record_sent(event);
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
        self.control.closes.fetch_add(1, Ordering::SeqCst);
    }
}
