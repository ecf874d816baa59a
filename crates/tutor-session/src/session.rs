//! Tutor session state machine.
//!
//! One spawned actor owns the whole voice-session lifecycle:
//! credential acquisition, media connect, SDP negotiation, the control
//! channel, and the three session timers (1 Hz countdown, hard
//! deadline, credential refresh). The embedding layer talks to it
//! through a [`TutorSessionHandle`]: commands in via a mailbox, state
//! out via a [`watch`] snapshot.
//!
//! # Lifecycle
//!
//! `Idle → Connecting → Active → Ended`, with a bounded `Reconnecting`
//! detour on transport failure. The timers exist only inside the
//! active select loop, so leaving that loop cancels them structurally;
//! a tick can never observe an ended session.

use crate::config::{Config, ConfigError};
use crate::credential::{Credential, CredentialProvider, CredentialSource};
use crate::errors::{SessionError, SessionGone};
use crate::media::{MediaConnector, MediaError, MediaEvent, MediaSession};
use crate::metrics::{CredentialMetrics, SessionMetrics};
use crate::negotiation::{HttpSdpExchanger, SdpExchanger};
use crate::protocol::{contains_reward_trigger, parse_server_event, ClientEvent, ServerEvent};

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Command mailbox buffer size.
const SESSION_CHANNEL_BUFFER: usize = 32;

/// How long the reward animation flag stays set.
const REWARD_DISPLAY: Duration = Duration::from_secs(3);

/// Shown when a genuinely active session ends without an error.
pub const COMPLETION_MESSAGE: &str = "Thank you for practicing! 新年快乐! 🎊";

/// Connection status visible to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session; start is available.
    Idle,
    /// First connect sequence in progress.
    Connecting,
    /// Connected with the control channel configured.
    Active,
    /// Transport failed; a bounded reconnect is in progress.
    Reconnecting,
    /// Session over (stop, deadline, or terminal error).
    Ended,
}

/// Observable session state.
///
/// The actor publishes a fresh snapshot on every change; the
/// presentation layer renders from this and nothing else.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current lifecycle state.
    pub status: ConnectionStatus,
    /// Whether the model is currently speaking.
    pub speaking: bool,
    /// Accumulated transcript text. Persists across sessions of one
    /// tutor instance.
    pub transcript: String,
    /// Seconds remaining on the countdown.
    pub time_left: u64,
    /// Most recent terminal error, if any.
    pub error: Option<SessionError>,
    /// Positive message set when an active session ends cleanly.
    pub completion_message: Option<String>,
    /// Transient reward-animation flag; self-clears after 3 seconds.
    pub reward_visible: bool,
    /// Consecutive transport failures in the current session.
    pub reconnect_attempts: u32,
}

impl SessionSnapshot {
    fn initial(time_left: u64) -> Self {
        Self {
            status: ConnectionStatus::Idle,
            speaking: false,
            transcript: String::new(),
            time_left,
            error: None,
            completion_message: None,
            reward_visible: false,
            reconnect_attempts: 0,
        }
    }
}

/// User intents accepted by the session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Begin a session. Ignored while one is already running.
    Start,
    /// End the session. Safe from any state, including after the
    /// session already ended.
    Stop,
    /// The user started speaking; emits the audio-start marker.
    StartSpeaking,
}

/// Collaborators the session actor drives.
///
/// Everything behind a trait so lifecycle tests can script credential,
/// negotiation, and media behavior under paused time.
pub struct SessionDeps {
    /// Ephemeral credential source.
    pub credentials: Arc<dyn CredentialSource>,
    /// SDP offer/answer exchanger.
    pub exchanger: Arc<dyn SdpExchanger>,
    /// Media transport factory.
    pub connector: Arc<dyn MediaConnector>,
    /// Session counters.
    pub metrics: Arc<SessionMetrics>,
}

impl SessionDeps {
    /// Production wiring: HTTP credential provider and SDP exchanger
    /// from configuration, plus the given media connector.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if either HTTP client
    /// cannot be constructed.
    pub fn from_config(
        config: &Config,
        connector: Arc<dyn MediaConnector>,
    ) -> Result<Self, ConfigError> {
        let provider = CredentialProvider::new(config, CredentialMetrics::new())
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let exchanger =
            HttpSdpExchanger::new(config).map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            credentials: Arc::new(provider),
            exchanger: Arc::new(exchanger),
            connector,
            metrics: SessionMetrics::new(),
        })
    }
}

/// Handle to a running session actor.
#[derive(Clone)]
pub struct TutorSessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionSnapshot>,
    cancel_token: CancellationToken,
}

impl TutorSessionHandle {
    /// Request session start.
    ///
    /// # Errors
    ///
    /// Returns [`SessionGone`] if the actor task has stopped.
    pub async fn start(&self) -> Result<(), SessionGone> {
        self.send(SessionCommand::Start).await
    }

    /// Request session stop. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionGone`] if the actor task has stopped.
    pub async fn stop(&self) -> Result<(), SessionGone> {
        self.send(SessionCommand::Stop).await
    }

    /// Signal that the user started speaking.
    ///
    /// # Errors
    ///
    /// Returns [`SessionGone`] if the actor task has stopped.
    pub async fn start_speaking(&self) -> Result<(), SessionGone> {
        self.send(SessionCommand::StartSpeaking).await
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionGone> {
        self.sender.send(command).await.map_err(|_| SessionGone)
    }

    /// Current state snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Tear the actor down (component unmount).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether the actor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Why the active loop exited.
enum ActiveExit {
    /// User stop intent.
    Stopped,
    /// Countdown reached zero or the hard deadline fired.
    Deadline,
    /// Mid-session credential refresh failed.
    RefreshFailed(String),
    /// Transport connectivity lost (ICE failure or channel closure).
    TransportFailed(String),
    /// Actor cancelled or mailbox dropped.
    Shutdown,
}

/// Terminal disposition of one session.
enum SessionOutcome {
    /// Ran out the clock.
    Completed,
    /// Stopped by the user.
    Stopped,
    /// Terminal error.
    Failed(SessionError),
    /// Actor shutting down entirely.
    Shutdown,
}

/// The session actor.
pub struct TutorSession {
    config: Config,
    deps: SessionDeps,
    receiver: mpsc::Receiver<SessionCommand>,
    cancel_token: CancellationToken,
    state: watch::Sender<SessionSnapshot>,
    /// Credential for the current session; replaced on refresh,
    /// dropped on teardown.
    credential: Option<Credential>,
}

impl TutorSession {
    /// Spawn the session actor.
    ///
    /// Returns a handle and the task join handle. One actor serves one
    /// tutor instance for its whole lifetime; sessions start and end
    /// within it.
    #[must_use]
    pub fn spawn(
        config: Config,
        deps: SessionDeps,
        cancel_token: CancellationToken,
    ) -> (TutorSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::initial(
            config.session_limit_seconds,
        ));

        let actor = Self {
            config,
            deps,
            receiver,
            cancel_token: cancel_token.clone(),
            state: state_tx,
            credential: None,
        };

        let task = tokio::spawn(actor.run());

        let handle = TutorSessionHandle {
            sender,
            state: state_rx,
            cancel_token,
        };

        (handle, task)
    }

    async fn run(mut self) {
        info!(target: "tutor.session", "Session actor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "tutor.session", "Session actor cancelled");
                    break;
                }
                command = self.receiver.recv() => match command {
                    Some(SessionCommand::Start) => self.run_session().await,
                    Some(command) => {
                        debug!(
                            target: "tutor.session",
                            ?command,
                            "Ignoring command with no session running"
                        );
                    }
                    None => break,
                },
            }
        }

        info!(target: "tutor.session", "Session actor stopped");
    }

    /// One full session: connect, stay active, reconnect within the
    /// cap, tear down.
    async fn run_session(&mut self) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut remaining = self.config.session_limit_seconds;
        let mut reconnect_attempts: u32 = 0;
        let mut was_active = false;
        let cancel = self.cancel_token.clone();

        info!(
            target: "tutor.session",
            session_id = %session_id,
            time_limit = remaining,
            "Session starting"
        );

        let outcome = loop {
            let reconnecting = reconnect_attempts > 0;
            self.publish(|s| {
                s.status = if reconnecting {
                    ConnectionStatus::Reconnecting
                } else {
                    ConnectionStatus::Connecting
                };
                s.error = None;
                s.completion_message = None;
                s.reconnect_attempts = reconnect_attempts;
                s.time_left = remaining;
            });

            let connected = tokio::select! {
                () = cancel.cancelled() => break SessionOutcome::Shutdown,
                result = self.connect() => result,
            };

            let mut media = match connected {
                Ok(media) => media,
                Err(error) => break SessionOutcome::Failed(error),
            };

            was_active = true;
            self.publish(|s| {
                s.status = ConnectionStatus::Active;
                s.time_left = remaining;
            });
            info!(
                target: "tutor.session",
                session_id = %session_id,
                time_left = remaining,
                reconnect_attempts,
                "Session active"
            );

            let exit = self.run_active(media.as_mut(), &mut remaining).await;
            media.close().await;

            match exit {
                ActiveExit::Stopped => break SessionOutcome::Stopped,
                ActiveExit::Deadline => break SessionOutcome::Completed,
                ActiveExit::RefreshFailed(message) => {
                    break SessionOutcome::Failed(SessionError::RefreshFailed(message));
                }
                ActiveExit::Shutdown => break SessionOutcome::Shutdown,
                ActiveExit::TransportFailed(reason) => {
                    reconnect_attempts += 1;
                    if reconnect_attempts >= self.config.max_reconnect_attempts {
                        warn!(
                            target: "tutor.session",
                            reconnect_attempts,
                            reason = %reason,
                            "Reconnection cap reached"
                        );
                        break SessionOutcome::Failed(SessionError::ReconnectExhausted);
                    }
                    warn!(
                        target: "tutor.session",
                        reconnect_attempts,
                        reason = %reason,
                        "Transport failed; reconnecting"
                    );
                }
            }
        };

        self.finish(outcome, was_active);
    }

    /// The `Connecting → Active` sequence, shared by first connect and
    /// every reconnect.
    async fn connect(&mut self) -> Result<Box<dyn MediaSession>, SessionError> {
        self.deps.metrics.record_connection_attempt();

        let credential = self
            .deps
            .credentials
            .fetch_initial()
            .await
            .map_err(|e| SessionError::CredentialFetch(e.to_string()))?;

        // Microphone acquisition happens inside connect(); denial must
        // surface before any transport object is allocated.
        let mut media = self
            .deps
            .connector
            .connect()
            .await
            .map_err(|e| match e {
                MediaError::PermissionDenied(reason) => SessionError::PermissionDenied(reason),
                other => SessionError::Transport(other.to_string()),
            })?;

        if let Err(error) = self.establish(media.as_mut(), &credential).await {
            // Leave no partial transport behind a failed connect.
            media.close().await;
            return Err(error);
        }

        self.credential = Some(credential);
        Ok(media)
    }

    /// Negotiate and configure an already-connected media session.
    async fn establish(
        &mut self,
        media: &mut dyn MediaSession,
        credential: &Credential,
    ) -> Result<(), SessionError> {
        let offer = media
            .create_offer()
            .await
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;

        let answer = self
            .deps
            .exchanger
            .exchange(credential, &offer)
            .await
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;

        media
            .apply_answer(&answer)
            .await
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;

        self.await_channel_open(media).await?;

        // Configuration before conversation start, both before any
        // inbound message is processed.
        media
            .send_event(&ClientEvent::session_update(&self.config))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        media
            .send_event(&ClientEvent::response_create(&self.config))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(())
    }

    async fn await_channel_open(&self, media: &mut dyn MediaSession) -> Result<(), SessionError> {
        let wait = async {
            loop {
                match media.next_event().await {
                    Some(MediaEvent::ChannelOpen) => return Ok(()),
                    Some(MediaEvent::TransportFailed(reason)) => {
                        return Err(SessionError::Transport(reason));
                    }
                    // Nothing meaningful arrives before open; drop it.
                    Some(_) => {}
                    None => {
                        return Err(SessionError::Transport(
                            "media session ended before the control channel opened".to_string(),
                        ));
                    }
                }
            }
        };

        match time::timeout(self.config.channel_open_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Transport(
                "control channel did not open in time".to_string(),
            )),
        }
    }

    /// The active select loop. Owns all three session timers plus the
    /// reward-clear timer; exiting the loop cancels every one of them.
    async fn run_active(&mut self, media: &mut dyn MediaSession, remaining: &mut u64) -> ActiveExit {
        let second = Duration::from_secs(1);
        let mut countdown = time::interval_at(Instant::now() + second, second);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Burst);

        // The hard deadline backs up the countdown; either may end the
        // session first.
        let deadline = time::sleep(Duration::from_secs(*remaining));
        tokio::pin!(deadline);

        let mut refresh =
            time::interval_at(Instant::now() + self.config.refresh_interval, self.config.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reward_clear = time::sleep(Duration::ZERO);
        tokio::pin!(reward_clear);
        let mut reward_armed = false;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => return ActiveExit::Shutdown,

                () = &mut deadline => return ActiveExit::Deadline,

                _ = countdown.tick() => {
                    *remaining = remaining.saturating_sub(1);
                    let time_left = *remaining;
                    self.publish(|s| s.time_left = time_left);
                    if time_left == 0 {
                        return ActiveExit::Deadline;
                    }
                }

                _ = refresh.tick() => {
                    match self.deps.credentials.refresh().await {
                        Ok(credential) => {
                            self.deps.metrics.record_credential_refresh();
                            debug!(
                                target: "tutor.session",
                                expires_at = ?credential.expires_at,
                                "Credential refreshed"
                            );
                            // No renegotiation; the transport keeps the
                            // originally negotiated session.
                            self.credential = Some(credential);
                        }
                        Err(e) => return ActiveExit::RefreshFailed(e.to_string()),
                    }
                }

                () = &mut reward_clear, if reward_armed => {
                    reward_armed = false;
                    self.publish(|s| s.reward_visible = false);
                }

                event = media.next_event() => match event {
                    Some(MediaEvent::Message(payload)) => {
                        if let Some(event) = parse_server_event(&payload) {
                            self.apply_server_event(event, &mut reward_armed, reward_clear.as_mut());
                        }
                    }
                    Some(MediaEvent::ChannelClosed) => {
                        return ActiveExit::TransportFailed("control channel closed".to_string());
                    }
                    Some(MediaEvent::TransportFailed(reason)) => {
                        return ActiveExit::TransportFailed(reason);
                    }
                    Some(MediaEvent::ChannelOpen) => {}
                    None => {
                        return ActiveExit::TransportFailed(
                            "media event stream ended".to_string(),
                        );
                    }
                },

                command = self.receiver.recv() => match command {
                    Some(SessionCommand::Stop) => {
                        // Polite goodbye when the channel is still open;
                        // send_event is a guarded no-op otherwise.
                        if let Err(e) = media.send_event(&ClientEvent::AudioEnd).await {
                            debug!(
                                target: "tutor.session",
                                error = %e,
                                "audio.end not delivered during stop"
                            );
                        }
                        return ActiveExit::Stopped;
                    }
                    Some(SessionCommand::StartSpeaking) => {
                        if let Err(e) = media.send_event(&ClientEvent::audio_start()).await {
                            debug!(
                                target: "tutor.session",
                                error = %e,
                                "audio.start not delivered"
                            );
                        }
                    }
                    Some(SessionCommand::Start) => {
                        debug!(
                            target: "tutor.session",
                            "Ignoring start; session already running"
                        );
                    }
                    None => return ActiveExit::Shutdown,
                },
            }
        }
    }

    /// Apply one inbound control-channel event to the snapshot.
    fn apply_server_event(
        &mut self,
        event: ServerEvent,
        reward_armed: &mut bool,
        mut reward_clear: Pin<&mut Sleep>,
    ) {
        match event {
            ServerEvent::TextDelta { delta } => {
                let reward = contains_reward_trigger(&delta);
                self.publish(|s| {
                    s.transcript.push_str(&delta);
                    if reward {
                        s.reward_visible = true;
                    }
                });
                if reward {
                    *reward_armed = true;
                    reward_clear.as_mut().reset(Instant::now() + REWARD_DISPLAY);
                }
            }
            ServerEvent::AudioStart => self.publish(|s| s.speaking = true),
            ServerEvent::AudioEnd => self.publish(|s| s.speaking = false),
            ServerEvent::Unknown => {}
        }
    }

    /// Teardown, every path. Resets the snapshot to a restartable
    /// state; the transcript deliberately survives.
    fn finish(&mut self, outcome: SessionOutcome, was_active: bool) {
        self.credential = None;
        let limit = self.config.session_limit_seconds;

        let (error, completed) = match outcome {
            SessionOutcome::Completed => {
                info!(target: "tutor.session", "Session completed at the time limit");
                (None, true)
            }
            SessionOutcome::Stopped => {
                info!(target: "tutor.session", "Session stopped by the user");
                (None, was_active)
            }
            SessionOutcome::Shutdown => (None, false),
            SessionOutcome::Failed(error) => {
                self.deps.metrics.record_error();
                warn!(target: "tutor.session", error = %error, "Session ended with an error");
                (Some(error), false)
            }
        };

        self.publish(|s| {
            s.status = ConnectionStatus::Ended;
            s.speaking = false;
            s.reward_visible = false;
            s.time_left = limit;
            s.reconnect_attempts = 0;
            s.error = error;
            s.completion_message = if completed {
                Some(COMPLETION_MESSAGE.to_string())
            } else {
                None
            };
        });
    }

    fn publish(&self, update: impl FnOnce(&mut SessionSnapshot)) {
        self.state.send_modify(update);
    }
}
