//! Session manager for the PeerChat runtime
//!
//! `SessionManager` is the single-session engine. It owns the connection
//! lifecycle (`Idle → Connecting → Open → Closed → Idle`), arbitrates inbound
//! connections, and routes envelopes through the codec and the presence,
//! delivery and outbox sub-protocols.
//!
//! Every operation is synchronous and returns an [`Outcome`] describing the
//! effects for the transport and the app events for the UI. Timers are
//! deadlines checked by [`SessionManager::poll_timers`]; the caller decides
//! when to poll, usually at [`SessionManager::next_deadline`].

use peerchat_core::{
    AppEvent, Body, CaptureFailure, ChatConfig, ChatError, ChatResult, CloseReason,
    ConnectionHandle, ConnectionMetadata, CredentialGate, DeliveryTracker, Effect, Envelope,
    EnvelopeCodec, EnvelopeKind, InboundMessage, MediaError, MediaValidator,
    MessageId, MessageIdAllocator, PeerId, PendingOutbox, PendingStage, PresenceTracker,
    ReceiptOutcome, RefuseReason, SessionContext, SessionError, SessionState, Severity,
    TimeSource, Timestamp, TransportError,
};
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Outcome
// ----------------------------------------------------------------------------

/// Effects and app events produced by one manager operation
#[derive(Debug, Default)]
pub struct Outcome {
    pub effects: Vec<Effect>,
    pub app_events: Vec<AppEvent>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.app_events.is_empty()
    }

    pub fn push_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn push_event(&mut self, event: AppEvent) {
        self.app_events.push(event);
    }

    fn status<S: Into<String>>(&mut self, text: S, severity: Severity) {
        self.app_events.push(AppEvent::StatusChanged {
            text: text.into(),
            severity,
        });
    }

    fn notice<S: Into<String>>(&mut self, text: S) {
        self.app_events
            .push(AppEvent::SystemNotice { text: text.into() });
    }

    /// Report a handled failure in the status line
    fn failure_status(&mut self, error: &ChatError) {
        self.status(error.notice(), error.severity());
    }

    fn state(&mut self, state: SessionState, remote: Option<&PeerId>) {
        self.app_events.push(AppEvent::SessionStateChanged {
            state,
            remote: remote.cloned(),
        });
    }

    fn pending(&mut self, message_id: MessageId, kind: EnvelopeKind, stage: PendingStage) {
        self.app_events.push(AppEvent::PendingStateChanged {
            message_id,
            kind,
            stage,
        });
    }

    pub fn extend(&mut self, other: Outcome) {
        self.effects.extend(other.effects);
        self.app_events.extend(other.app_events);
    }

    pub fn into_parts(self) -> (Vec<Effect>, Vec<AppEvent>) {
        (self.effects, self.app_events)
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// The one live connection attempt or session
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    pub remote: PeerId,
    pub handle: ConnectionHandle,
    shared_secret: String,
    connect_deadline: Option<Timestamp>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("remote", &self.remote)
            .field("handle", &self.handle)
            .field("connect_deadline", &self.connect_deadline)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Owns the single session and every per-session sub-protocol
#[derive(Debug)]
pub struct SessionManager<T: TimeSource> {
    context: SessionContext,
    connect_timeout_ms: u64,
    codec: EnvelopeCodec,
    presence: PresenceTracker,
    delivery: DeliveryTracker,
    outbox: PendingOutbox,
    ids: MessageIdAllocator,
    media: MediaValidator,
    session: Option<Session>,
    /// Time source for deadlines and envelope timestamps
    time_source: T,
}

impl<T: TimeSource> SessionManager<T> {
    /// Create a new session manager
    pub fn new(context: SessionContext, config: &ChatConfig, time_source: T) -> Self {
        Self {
            context,
            connect_timeout_ms: config.session.connect_timeout_ms,
            codec: EnvelopeCodec::default(),
            presence: PresenceTracker::new(config.presence.clone()),
            delivery: DeliveryTracker::new(),
            outbox: PendingOutbox::new(config.outbox.clone()),
            ids: MessageIdAllocator::new(),
            media: MediaValidator::new(config.media.clone()),
            session: None,
            time_source,
        }
    }

    /// Replace the envelope codec, e.g. to plug in another cipher
    pub fn with_codec(mut self, codec: EnvelopeCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |session| session.state)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn remote(&self) -> Option<&PeerId> {
        self.session.as_ref().map(|session| &session.remote)
    }

    pub fn local_id(&self) -> &PeerId {
        &self.context.local_id
    }

    pub fn delivery(&self) -> &DeliveryTracker {
        &self.delivery
    }

    pub fn outbox(&self) -> &PendingOutbox {
        &self.outbox
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Earliest instant at which [`Self::poll_timers`] has work to do
    pub fn next_deadline(&self) -> Option<Timestamp> {
        [
            self.session
                .as_ref()
                .and_then(|session| session.connect_deadline),
            self.presence.next_deadline(),
            self.outbox.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// The transport registered us under `local_id`
    pub fn on_listening(&mut self, local_id: PeerId) -> Outcome {
        if local_id != self.context.local_id {
            debug!(old = %self.context.local_id, new = %local_id, "Transport assigned a different identity");
            self.context.local_id = local_id.clone();
        }
        info!(peer = %local_id, "Listening for connections");

        let mut outcome = Outcome::new();
        outcome.status(format!("Your ID: {}", local_id), Severity::Success);
        outcome.push_event(AppEvent::IdentityAssigned { local_id });
        outcome
    }

    /// Adopt a fresh identity after a collision and ask to listen under it
    pub fn replace_identity(&mut self, local_id: PeerId) -> Effect {
        info!(old = %self.context.local_id, new = %local_id, "Replacing local identity");
        self.context.local_id = local_id.clone();
        Effect::Listen { local_id }
    }

    // ------------------------------------------------------------------------
    // Connection Lifecycle
    // ------------------------------------------------------------------------

    /// Start an outbound connection to `remote`
    ///
    /// `secret` is attached as connection metadata and used for envelope
    /// encryption; it defaults to the local secret.
    pub fn initiate_connection(
        &mut self,
        remote: &str,
        secret: Option<String>,
    ) -> ChatResult<Outcome> {
        if let Some(session) = &self.session {
            return Err(ChatError::already_connected(session.remote.as_str()));
        }

        let remote = match remote.parse::<PeerId>() {
            Ok(remote) => remote,
            Err(ChatError::Session(SessionError::EmptyRemoteId)) => {
                let mut outcome = Outcome::new();
                outcome.status(SessionError::EmptyRemoteId.to_string(), Severity::Error);
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        let secret = secret
            .filter(|secret| !secret.is_empty())
            .unwrap_or_else(|| self.context.local_secret.clone());
        let handle = ConnectionHandle::new();
        let deadline = self.time_source.now() + self.connect_timeout_ms;
        info!(remote = %remote, %handle, "Connecting");

        let mut outcome = Outcome::new();
        outcome.push_effect(Effect::Connect {
            handle,
            remote: remote.clone(),
            metadata: ConnectionMetadata::with_password(secret.clone()),
        });
        outcome.state(SessionState::Connecting, Some(&remote));
        outcome.status(format!("Connecting to {}...", remote), Severity::Info);

        self.session = Some(Session {
            state: SessionState::Connecting,
            remote,
            handle,
            shared_secret: secret,
            connect_deadline: Some(deadline),
        });
        Ok(outcome)
    }

    /// The transport opened our outbound connection
    pub fn handle_transport_open(&mut self, handle: ConnectionHandle) -> Outcome {
        let mut outcome = Outcome::new();
        let Some(session) = self.session.as_mut() else {
            debug!(%handle, "Open for unknown connection ignored");
            return outcome;
        };
        if session.handle != handle || session.state != SessionState::Connecting {
            debug!(%handle, "Stale open ignored");
            return outcome;
        }

        session.state = SessionState::Open;
        session.connect_deadline = None;
        info!(remote = %session.remote, %handle, "Session open");

        let connected = format!("Connected to {}", session.remote);
        outcome.state(SessionState::Open, Some(&session.remote));
        outcome.status(connected.clone(), Severity::Success);
        outcome.notice(connected);
        outcome
    }

    /// The transport reported an error, for a connection or for signaling
    pub fn handle_transport_error(
        &mut self,
        handle: Option<ConnectionHandle>,
        error: &str,
    ) -> Outcome {
        warn!(?handle, error, "Transport error");
        let mut outcome = Outcome::new();

        let failed_attempt = matches!(
            &self.session,
            Some(session) if Some(session.handle) == handle && session.state == SessionState::Connecting
        );
        if failed_attempt {
            if let Some(session) = self.session.take() {
                outcome.state(SessionState::Rejected, Some(&session.remote));
                outcome.state(SessionState::Idle, None);
                outcome.app_events.extend(self.reset_subprotocols());
            }
        }

        outcome.failure_status(&ChatError::connection_failed(error));
        outcome
    }

    /// Handle an inbound connection request
    ///
    /// First session wins: while a session is open every further request is
    /// refused without touching it. Otherwise the declared secret must match
    /// the local one; a pending outbound attempt is superseded.
    pub fn accept_inbound_connection(
        &mut self,
        handle: ConnectionHandle,
        remote: PeerId,
        metadata: &ConnectionMetadata,
    ) -> Outcome {
        let mut outcome = Outcome::new();

        if self.state() == SessionState::Open {
            warn!(remote = %remote, %handle, "Refusing duplicate connection");
            outcome.push_effect(Effect::Refuse {
                handle,
                reason: RefuseReason::Duplicate,
            });
            outcome.notice(format!("Rejected duplicate connection from {}", remote));
            return outcome;
        }

        if let Err(refusal) =
            CredentialGate::verify(&remote, metadata, &self.context.local_secret)
        {
            warn!(remote = %remote, %handle, error = %refusal, "Refusing connection");
            outcome.push_effect(Effect::Refuse {
                handle,
                reason: RefuseReason::WrongCredential,
            });
            outcome.notice(ChatError::from(refusal).notice());
            return outcome;
        }

        if let Some(superseded) = self.session.take() {
            info!(remote = %superseded.remote, handle = %superseded.handle, "Inbound connection supersedes pending attempt");
            outcome.push_effect(Effect::Close {
                handle: superseded.handle,
            });
        }

        info!(remote = %remote, %handle, "Session open");
        outcome.push_effect(Effect::Accept { handle });
        let connected = format!("Connected to {}", remote);
        outcome.state(SessionState::Open, Some(&remote));
        outcome.status(connected.clone(), Severity::Success);
        outcome.notice(connected);

        self.session = Some(Session {
            state: SessionState::Open,
            remote,
            handle,
            shared_secret: self.context.local_secret.clone(),
            connect_deadline: None,
        });
        outcome
    }

    /// End the current session or connection attempt
    pub fn close_session(&mut self, reason: CloseReason) -> Outcome {
        let mut outcome = Outcome::new();
        let Some(session) = self.session.take() else {
            return outcome;
        };
        info!(remote = %session.remote, handle = %session.handle, ?reason, "Session closed");

        if reason != CloseReason::Remote {
            outcome.push_effect(Effect::Close {
                handle: session.handle,
            });
        }
        outcome.state(SessionState::Closed, Some(&session.remote));
        outcome.state(SessionState::Idle, None);
        match reason {
            CloseReason::Timeout => outcome.failure_status(&TransportError::Timeout.into()),
            CloseReason::Local | CloseReason::Remote => {
                outcome.status("Disconnected", Severity::Error);
                outcome.notice(format!("Disconnected from {}", session.remote));
            }
        }
        outcome.app_events.extend(self.reset_subprotocols());
        outcome
    }

    /// The remote side closed `handle`
    pub fn handle_transport_close(&mut self, handle: ConnectionHandle) -> Outcome {
        match &self.session {
            Some(session) if session.handle == handle => self.close_session(CloseReason::Remote),
            _ => {
                debug!(%handle, "Close for unknown connection ignored");
                Outcome::new()
            }
        }
    }

    /// Expire the connect deadline, the typing idle timer and cancel holds
    pub fn poll_timers(&mut self) -> ChatResult<Outcome> {
        let now = self.time_source.now();
        let mut outcome = Outcome::new();

        let timed_out = matches!(
            &self.session,
            Some(Session { connect_deadline: Some(deadline), .. }) if now >= *deadline
        );
        if timed_out {
            warn!("Connection attempt timed out");
            outcome.extend(self.close_session(CloseReason::Timeout));
        }

        if let Some(active) = self.presence.poll(now) {
            if self.state() == SessionState::Open {
                outcome.push_effect(self.typing_effect(active, now)?);
            }
        }

        for entry in self.outbox.poll(now) {
            debug!(message_id = %entry.id, "Message deleted by hold");
            self.delivery.discard(entry.id);
            outcome.pending(entry.id, entry.kind, PendingStage::Cancelled);
        }

        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Inbound Data
    // ------------------------------------------------------------------------

    /// Route one inbound envelope
    pub fn handle_transport_data(
        &mut self,
        handle: ConnectionHandle,
        data: &[u8],
    ) -> ChatResult<Outcome> {
        let mut outcome = Outcome::new();
        let secret = match &self.session {
            Some(session) if session.handle == handle && session.state == SessionState::Open => {
                session.shared_secret.clone()
            }
            _ => {
                debug!(%handle, "Data outside an open session dropped");
                return Ok(outcome);
            }
        };

        let envelope = match Envelope::from_bytes(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%handle, error = %e, "Dropping malformed envelope");
                return Ok(outcome);
            }
        };

        match envelope.kind {
            EnvelopeKind::Typing => match self.codec.decode(&envelope, &secret) {
                Ok(Body::Typing { active }) => {
                    if let Some(typing) = self.presence.on_remote_typing(active) {
                        outcome.push_event(AppEvent::TypingChanged { typing });
                    }
                }
                Ok(_) | Err(_) => warn!(%handle, "Dropping invalid typing envelope"),
            },
            EnvelopeKind::ReadReceipt => match envelope.id {
                Some(message_id) => match self.delivery.acknowledge(message_id) {
                    ReceiptOutcome::Updated => {
                        debug!(%message_id, "Message read");
                        outcome.push_event(AppEvent::ReceiptUpdated { message_id });
                    }
                    ReceiptOutcome::AlreadyAcknowledged => {
                        debug!(%message_id, "Duplicate read receipt");
                    }
                    ReceiptOutcome::Unknown => {
                        debug!(%message_id, "Read receipt for unknown message");
                    }
                },
                None => warn!(%handle, "Dropping read receipt without id"),
            },
            EnvelopeKind::Message | EnvelopeKind::File | EnvelopeKind::Audio => {
                let content = self.codec.decode(&envelope, &secret);
                if let Err(failure) = &content {
                    warn!(%handle, message_id = ?envelope.id, %failure, "Could not decode envelope");
                }

                // Receipt acknowledges arrival, not readability.
                if let Some(message_id) = envelope.id {
                    let now = self.time_source.now();
                    let receipt = self
                        .codec
                        .encode(&Body::ReadReceipt, &secret, Some(message_id), now)?;
                    outcome.push_effect(Effect::Send {
                        handle,
                        message_id: None,
                        data: receipt.to_bytes()?,
                    });
                }

                outcome.push_event(AppEvent::MessageReceived {
                    message: InboundMessage {
                        message_id: envelope.id,
                        kind: envelope.kind,
                        created_at: envelope.created_at,
                        content,
                    },
                });
            }
        }

        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Send a text message; surrounding whitespace is trimmed and empty
    /// messages are ignored
    pub fn send_text(&mut self, text: &str) -> ChatResult<Outcome> {
        self.require_open()?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(Outcome::new());
        }
        self.stage_send(Body::text(text))
    }

    /// Send a file after checking its size and type
    pub fn send_file(
        &mut self,
        filename: String,
        file_type: String,
        data: Vec<u8>,
    ) -> ChatResult<Outcome> {
        self.media.validate_file(&file_type, data.len())?;
        self.require_open()?;
        self.stage_send(Body::File {
            filename,
            file_type,
            data,
        })
    }

    /// Send a finished voice recording
    pub fn send_audio(&mut self, mime: String, data: Vec<u8>) -> ChatResult<Outcome> {
        self.require_open()?;
        self.media.validate_audio(data.len())?;
        self.stage_send(Body::Audio { mime, data })
    }

    /// The media source could not record
    pub fn media_capture_failed(&self, failure: CaptureFailure) -> ChatResult<Outcome> {
        let error = match failure {
            CaptureFailure::Denied => MediaError::CaptureDenied,
            CaptureFailure::Unsupported => MediaError::CaptureUnsupported,
        };
        Err(error.into())
    }

    /// The user typed; emits Typing(true) on the rising edge only
    pub fn composing(&mut self) -> ChatResult<Outcome> {
        let mut outcome = Outcome::new();
        if self.state() != SessionState::Open {
            return Ok(outcome);
        }
        let now = self.time_source.now();
        if let Some(active) = self.presence.on_local_composing(now) {
            outcome.push_effect(self.typing_effect(active, now)?);
        }
        Ok(outcome)
    }

    /// Start the hold that deletes `message_id` once it elapses
    pub fn begin_cancel_hold(&mut self, message_id: MessageId) -> Outcome {
        let now = self.time_source.now();
        match self.outbox.begin_cancel_hold(message_id, now) {
            Ok(deadline) => debug!(%message_id, deadline = deadline.as_millis(), "Hold started"),
            Err(e) => debug!(%message_id, error = %e, "Hold on unknown message ignored"),
        }
        Outcome::new()
    }

    /// Release the hold early; the message stays as it was
    pub fn release_cancel_hold(&mut self, message_id: MessageId) -> Outcome {
        if self.outbox.cancel_cancel_hold(message_id) {
            debug!(%message_id, "Hold released");
        }
        Outcome::new()
    }

    /// The transport delivered an envelope we staged
    pub fn handle_send_complete(
        &mut self,
        handle: ConnectionHandle,
        message_id: MessageId,
    ) -> Outcome {
        let mut outcome = Outcome::new();
        match self.outbox.commit(message_id) {
            Some(entry) => outcome.pending(entry.id, entry.kind, entry.stage),
            None => debug!(%handle, %message_id, "Stale send completion ignored"),
        }
        outcome
    }

    /// The transport could not deliver an envelope we staged
    pub fn handle_send_failed(
        &mut self,
        handle: ConnectionHandle,
        message_id: MessageId,
        error: &str,
    ) -> Outcome {
        let mut outcome = Outcome::new();
        match self.outbox.abort(message_id) {
            Some(entry) => {
                warn!(%handle, %message_id, error, "Send failed");
                self.delivery.discard(message_id);
                outcome.pending(entry.id, entry.kind, entry.stage);
                outcome.notice(ChatError::send_failed(error).notice());
            }
            None => debug!(%handle, %message_id, "Stale send failure ignored"),
        }
        outcome
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn require_open(&self) -> ChatResult<(ConnectionHandle, String)> {
        match &self.session {
            Some(session) if session.state == SessionState::Open => {
                Ok((session.handle, session.shared_secret.clone()))
            }
            _ => Err(ChatError::not_connected()),
        }
    }

    fn stage_send(&mut self, body: Body) -> ChatResult<Outcome> {
        let (handle, secret) = self.require_open()?;
        let now = self.time_source.now();
        let message_id = self.ids.next(now);
        let kind = body.kind();
        self.outbox.begin_staging(message_id, kind)?;

        let mut outcome = Outcome::new();
        outcome.push_event(AppEvent::MessageSent {
            message_id,
            body: body.clone(),
            created_at: now,
        });
        outcome.pending(message_id, kind, PendingStage::Staging);

        let encoded = self
            .codec
            .encode(&body, &secret, Some(message_id), now)
            .and_then(|envelope| envelope.to_bytes());
        match encoded {
            Ok(data) => {
                debug!(%handle, %message_id, ?kind, "Sending envelope");
                self.delivery.track_sent(message_id);
                outcome.push_effect(Effect::Send {
                    handle,
                    message_id: Some(message_id),
                    data,
                });
            }
            Err(e) => {
                warn!(%message_id, error = %e, "Could not encode envelope");
                if let Some(entry) = self.outbox.abort(message_id) {
                    outcome.pending(entry.id, entry.kind, entry.stage);
                }
                outcome.notice(ChatError::send_failed(e.to_string()).notice());
            }
        }
        Ok(outcome)
    }

    fn typing_effect(&self, active: bool, now: Timestamp) -> ChatResult<Effect> {
        let (handle, secret) = self.require_open()?;
        let envelope = self
            .codec
            .encode(&Body::Typing { active }, &secret, None, now)?;
        Ok(Effect::Send {
            handle,
            message_id: None,
            data: envelope.to_bytes()?,
        })
    }

    /// Forget all per-session state, reporting abandoned sends as cancelled
    fn reset_subprotocols(&mut self) -> Vec<AppEvent> {
        let mut events = Vec::new();
        if self.presence.state().remote_typing {
            events.push(AppEvent::TypingChanged { typing: false });
        }
        self.presence.reset();
        self.delivery.clear();
        for entry in self.outbox.clear() {
            events.push(AppEvent::PendingStateChanged {
                message_id: entry.id,
                kind: entry.kind,
                stage: entry.stage,
            });
        }
        events
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::{DecryptFailure, Payload};
    use peerchat_harness::MockTimeSource;

    const START: u64 = 1_700_000_000_000;

    fn manager_with(id: &str, secret: &str) -> (SessionManager<MockTimeSource>, MockTimeSource) {
        let clock = MockTimeSource::new_at(START);
        let manager = SessionManager::new(
            SessionContext::new(PeerId::new(id), secret),
            &ChatConfig::default(),
            clock.clone(),
        );
        (manager, clock)
    }

    fn manager() -> (SessionManager<MockTimeSource>, MockTimeSource) {
        manager_with("alice", "hunter2")
    }

    fn statuses(outcome: &Outcome) -> Vec<(String, Severity)> {
        outcome
            .app_events
            .iter()
            .filter_map(|event| match event {
                AppEvent::StatusChanged { text, severity } => Some((text.clone(), *severity)),
                _ => None,
            })
            .collect()
    }

    fn notices(outcome: &Outcome) -> Vec<String> {
        outcome
            .app_events
            .iter()
            .filter_map(|event| match event {
                AppEvent::SystemNotice { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn sent_envelopes(outcome: &Outcome) -> Vec<Envelope> {
        outcome
            .effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send { data, .. } => Some(Envelope::from_bytes(data).unwrap()),
                _ => None,
            })
            .collect()
    }

    /// Open an inbound session from `bob` and return its handle
    fn open_inbound(manager: &mut SessionManager<MockTimeSource>) -> ConnectionHandle {
        let handle = ConnectionHandle::new();
        let outcome = manager.accept_inbound_connection(
            handle,
            PeerId::new("bob"),
            &ConnectionMetadata::with_password("hunter2"),
        );
        assert!(matches!(outcome.effects[0], Effect::Accept { .. }));
        handle
    }

    fn sent_id(outcome: &Outcome) -> MessageId {
        outcome
            .effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Send {
                    message_id: Some(id),
                    ..
                } => Some(*id),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_outbound_connection_opens() {
        let (mut manager, _clock) = manager();
        let outcome = manager.initiate_connection(" bob ", None).unwrap();

        let Effect::Connect {
            handle,
            remote,
            metadata,
        } = &outcome.effects[0]
        else {
            panic!("expected connect effect");
        };
        assert_eq!(remote.as_str(), "bob");
        assert_eq!(metadata.password.as_deref(), Some("hunter2"));
        assert_eq!(
            statuses(&outcome),
            vec![("Connecting to bob...".to_string(), Severity::Info)]
        );
        assert_eq!(manager.state(), SessionState::Connecting);

        let outcome = manager.handle_transport_open(*handle);
        assert_eq!(manager.state(), SessionState::Open);
        assert_eq!(notices(&outcome), vec!["Connected to bob".to_string()]);
        assert_eq!(
            statuses(&outcome),
            vec![("Connected to bob".to_string(), Severity::Success)]
        );
        assert_eq!(manager.next_deadline(), None);
    }

    #[test]
    fn test_connect_requires_idle_and_a_remote_id() {
        let (mut manager, _clock) = manager();

        let outcome = manager.initiate_connection("   ", None).unwrap();
        assert!(outcome.effects.is_empty());
        assert_eq!(
            statuses(&outcome),
            vec![("Please enter a friend ID".to_string(), Severity::Error)]
        );
        assert_eq!(manager.state(), SessionState::Idle);

        manager.initiate_connection("bob", None).unwrap();
        assert!(matches!(
            manager.initiate_connection("carol", None),
            Err(ChatError::Session(SessionError::AlreadyConnected { .. }))
        ));
    }

    #[test]
    fn test_connect_attempt_times_out() {
        let (mut manager, clock) = manager();
        let outcome = manager.initiate_connection("bob", None).unwrap();
        let Effect::Connect { handle, .. } = outcome.effects[0].clone() else {
            panic!("expected connect effect");
        };
        assert_eq!(manager.next_deadline(), Some(Timestamp::new(START + 10_000)));

        clock.advance(9_999);
        assert!(manager.poll_timers().unwrap().is_empty());

        clock.advance(1);
        let outcome = manager.poll_timers().unwrap();
        assert!(matches!(outcome.effects[0], Effect::Close { handle: h } if h == handle));
        assert_eq!(
            statuses(&outcome),
            vec![("Connection timed out".to_string(), Severity::Error)]
        );
        assert_eq!(manager.state(), SessionState::Idle);

        // A late open for the abandoned attempt changes nothing.
        assert!(manager.handle_transport_open(handle).is_empty());
        assert_eq!(manager.state(), SessionState::Idle);
    }

    #[test]
    fn test_connection_error_rejects_attempt() {
        let (mut manager, _clock) = manager();
        let outcome = manager.initiate_connection("bob", None).unwrap();
        let Effect::Connect { handle, .. } = outcome.effects[0].clone() else {
            panic!("expected connect effect");
        };

        let outcome = manager.handle_transport_error(Some(handle), "peer unavailable");
        let states: Vec<SessionState> = outcome
            .app_events
            .iter()
            .filter_map(|event| match event {
                AppEvent::SessionStateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![SessionState::Rejected, SessionState::Idle]);
        assert_eq!(
            statuses(&outcome),
            vec![(
                "Connection error: peer unavailable".to_string(),
                Severity::Error
            )]
        );
        assert_eq!(manager.state(), SessionState::Idle);
    }

    #[test]
    fn test_duplicate_inbound_is_refused_without_touching_session() {
        let (mut manager, _clock) = manager();
        let first = open_inbound(&mut manager);

        let second = ConnectionHandle::new();
        let outcome = manager.accept_inbound_connection(
            second,
            PeerId::new("carol"),
            &ConnectionMetadata::with_password("hunter2"),
        );

        assert!(matches!(
            outcome.effects.as_slice(),
            [Effect::Refuse { handle, reason: RefuseReason::Duplicate }] if *handle == second
        ));
        assert_eq!(
            notices(&outcome),
            vec!["Rejected duplicate connection from carol".to_string()]
        );
        let session = manager.session().unwrap();
        assert_eq!(session.handle, first);
        assert_eq!(session.remote.as_str(), "bob");
        assert_eq!(session.state, SessionState::Open);
    }

    #[test]
    fn test_wrong_credential_is_refused() {
        let (mut manager, _clock) = manager_with("bob", "other");
        let handle = ConnectionHandle::new();
        let outcome = manager.accept_inbound_connection(
            handle,
            PeerId::new("alice"),
            &ConnectionMetadata::with_password("hunter2"),
        );

        assert!(matches!(
            outcome.effects.as_slice(),
            [Effect::Refuse { reason: RefuseReason::WrongCredential, .. }]
        ));
        assert_eq!(
            notices(&outcome),
            vec!["Rejected connection from alice: wrong credential".to_string()]
        );
        assert_eq!(manager.state(), SessionState::Idle);

        let outcome = manager.accept_inbound_connection(
            ConnectionHandle::new(),
            PeerId::new("alice"),
            &ConnectionMetadata::default(),
        );
        assert!(matches!(
            outcome.effects.as_slice(),
            [Effect::Refuse { reason: RefuseReason::WrongCredential, .. }]
        ));
        assert_eq!(
            notices(&outcome),
            vec!["Rejected connection from alice: no credential".to_string()]
        );
    }

    #[test]
    fn test_inbound_supersedes_pending_attempt() {
        let (mut manager, _clock) = manager();
        let outcome = manager.initiate_connection("bob", None).unwrap();
        let Effect::Connect { handle: outbound, .. } = outcome.effects[0].clone() else {
            panic!("expected connect effect");
        };

        let inbound = ConnectionHandle::new();
        let outcome = manager.accept_inbound_connection(
            inbound,
            PeerId::new("bob"),
            &ConnectionMetadata::with_password("hunter2"),
        );

        assert!(matches!(outcome.effects[0], Effect::Close { handle } if handle == outbound));
        assert!(matches!(outcome.effects[1], Effect::Accept { handle } if handle == inbound));
        assert_eq!(manager.session().unwrap().handle, inbound);
        assert_eq!(manager.next_deadline(), None);
    }

    #[test]
    fn test_send_requires_open_session() {
        let (mut manager, _clock) = manager();
        let err = manager.send_text("hello").unwrap_err();
        assert_eq!(err.notice(), "Not connected to anyone");
        assert_eq!(manager.outbox().pending_len(), 0);
    }

    #[test]
    fn test_send_text_stages_and_tracks() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);

        assert!(manager.send_text("   ").unwrap().is_empty());

        let outcome = manager.send_text("  hello  ").unwrap();
        let id = sent_id(&outcome);
        assert!(matches!(
            &outcome.app_events[0],
            AppEvent::MessageSent { body: Body::Message { text }, .. } if text == "hello"
        ));
        assert_eq!(manager.outbox().stage(&id), Some(PendingStage::Staging));
        assert_eq!(manager.delivery().len(), 1);

        let envelope = &sent_envelopes(&outcome)[0];
        assert_eq!(envelope.kind, EnvelopeKind::Message);
        assert_eq!(envelope.id, Some(id));
        assert!(matches!(envelope.payload, Some(Payload::Ciphertext(_))));

        let outcome = manager.handle_send_complete(handle, id);
        assert!(matches!(
            outcome.app_events.as_slice(),
            [AppEvent::PendingStateChanged { stage: PendingStage::Committed, .. }]
        ));
        assert_eq!(manager.outbox().stage(&id), Some(PendingStage::Committed));
    }

    #[test]
    fn test_message_ids_increase_on_stalled_clock() {
        let (mut manager, _clock) = manager();
        open_inbound(&mut manager);

        let first = sent_id(&manager.send_text("one").unwrap());
        let second = sent_id(&manager.send_text("two").unwrap());
        assert!(first < second);
    }

    #[test]
    fn test_media_validation_happens_before_staging() {
        let (mut manager, _clock) = manager();
        open_inbound(&mut manager);

        let too_large = manager.send_file(
            "big.png".to_string(),
            "image/png".to_string(),
            vec![0; 5 * 1024 * 1024 + 1],
        );
        assert_eq!(too_large.unwrap_err().notice(), "File is too large (max 5MB)");

        let wrong_type =
            manager.send_file("doc.pdf".to_string(), "application/pdf".to_string(), vec![1]);
        assert_eq!(
            wrong_type.unwrap_err().notice(),
            "Unsupported file type. Please send images or videos."
        );

        assert!(matches!(
            manager.send_audio("audio/webm".to_string(), Vec::new()),
            Err(ChatError::Media(MediaError::EmptyRecording))
        ));
        assert_eq!(manager.outbox().pending_len(), 0);

        let outcome = manager
            .send_file("cat.png".to_string(), "image/png".to_string(), vec![1, 2, 3])
            .unwrap();
        assert_eq!(sent_envelopes(&outcome)[0].filename.as_deref(), Some("cat.png"));
    }

    #[test]
    fn test_capture_failures_map_to_notices() {
        let (manager, _clock) = manager();
        assert_eq!(
            manager
                .media_capture_failed(CaptureFailure::Denied)
                .unwrap_err()
                .notice(),
            "Microphone access denied"
        );
        assert_eq!(
            manager
                .media_capture_failed(CaptureFailure::Unsupported)
                .unwrap_err()
                .notice(),
            "Voice recording not supported"
        );
    }

    #[test]
    fn test_inbound_message_is_decoded_and_acknowledged() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);

        let codec = EnvelopeCodec::default();
        let envelope = codec
            .encode(
                &Body::text("hello"),
                "hunter2",
                Some(MessageId::new(42)),
                Timestamp::new(START),
            )
            .unwrap();

        let outcome = manager
            .handle_transport_data(handle, &envelope.to_bytes().unwrap())
            .unwrap();

        assert!(matches!(
            &outcome.app_events[0],
            AppEvent::MessageReceived { message } if message.content == Ok(Body::text("hello"))
        ));
        let receipts = sent_envelopes(&outcome);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].kind, EnvelopeKind::ReadReceipt);
        assert_eq!(receipts[0].id, Some(MessageId::new(42)));
    }

    #[test]
    fn test_undecryptable_message_is_still_acknowledged() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);

        let envelope = EnvelopeCodec::default()
            .encode(
                &Body::text("secret"),
                "other",
                Some(MessageId::new(7)),
                Timestamp::new(START),
            )
            .unwrap();
        let outcome = manager
            .handle_transport_data(handle, &envelope.to_bytes().unwrap())
            .unwrap();

        assert!(matches!(
            &outcome.app_events[0],
            AppEvent::MessageReceived { message } if message.content == Err(DecryptFailure::Unreadable)
        ));
        assert_eq!(sent_envelopes(&outcome)[0].kind, EnvelopeKind::ReadReceipt);
        assert_eq!(manager.state(), SessionState::Open);
    }

    #[test]
    fn test_malformed_and_foreign_data_is_dropped() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);

        assert!(manager
            .handle_transport_data(handle, b"not json")
            .unwrap()
            .is_empty());
        assert!(manager
            .handle_transport_data(ConnectionHandle::new(), b"{\"type\":\"typing\",\"payload\":true}")
            .unwrap()
            .is_empty());
        assert_eq!(manager.state(), SessionState::Open);
    }

    #[test]
    fn test_duplicate_receipts_update_once() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);
        let id = sent_id(&manager.send_text("hello").unwrap());

        let receipt = EnvelopeCodec::default()
            .encode(&Body::ReadReceipt, "hunter2", Some(id), Timestamp::new(START))
            .unwrap()
            .to_bytes()
            .unwrap();

        let first = manager.handle_transport_data(handle, &receipt).unwrap();
        let second = manager.handle_transport_data(handle, &receipt).unwrap();

        assert!(matches!(
            first.app_events.as_slice(),
            [AppEvent::ReceiptUpdated { message_id }] if *message_id == id
        ));
        assert!(second.is_empty());
        assert!(manager.delivery().get(&id).unwrap().acknowledged);
    }

    #[test]
    fn test_typing_edges() {
        let (mut manager, clock) = manager();
        open_inbound(&mut manager);

        let first = manager.composing().unwrap();
        clock.advance(500);
        let second = manager.composing().unwrap();
        assert_eq!(sent_envelopes(&first)[0].payload, Some(Payload::Flag(true)));
        assert!(second.is_empty());

        clock.advance(1_999);
        assert!(manager.poll_timers().unwrap().is_empty());
        clock.advance(1);
        let idle = manager.poll_timers().unwrap();
        assert_eq!(sent_envelopes(&idle)[0].payload, Some(Payload::Flag(false)));
        assert!(manager.poll_timers().unwrap().is_empty());
    }

    #[test]
    fn test_composing_without_session_sends_nothing() {
        let (mut manager, _clock) = manager();
        assert!(manager.composing().unwrap().is_empty());
        assert_eq!(manager.next_deadline(), None);
    }

    #[test]
    fn test_remote_typing_reported_on_change() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);
        let typing = |active: bool| {
            EnvelopeCodec::default()
                .encode(&Body::Typing { active }, "hunter2", None, Timestamp::new(START))
                .unwrap()
                .to_bytes()
                .unwrap()
        };

        let on = manager.handle_transport_data(handle, &typing(true)).unwrap();
        let again = manager.handle_transport_data(handle, &typing(true)).unwrap();
        assert!(matches!(
            on.app_events.as_slice(),
            [AppEvent::TypingChanged { typing: true }]
        ));
        assert!(again.is_empty());
    }

    #[test]
    fn test_hold_released_early_keeps_message() {
        let (mut manager, clock) = manager();
        let handle = open_inbound(&mut manager);
        let id = sent_id(&manager.send_text("keep me").unwrap());
        manager.handle_send_complete(handle, id);

        manager.begin_cancel_hold(id);
        clock.advance(999);
        manager.release_cancel_hold(id);
        clock.advance(10);

        assert!(manager.poll_timers().unwrap().is_empty());
        assert_eq!(manager.outbox().stage(&id), Some(PendingStage::Committed));
        assert!(manager.delivery().get(&id).is_some());
    }

    #[test]
    fn test_hold_past_deadline_cancels_message() {
        let (mut manager, clock) = manager();
        let handle = open_inbound(&mut manager);
        let id = sent_id(&manager.send_text("delete me").unwrap());

        manager.begin_cancel_hold(id);
        clock.advance(1_000);
        let outcome = manager.poll_timers().unwrap();

        assert!(matches!(
            outcome.app_events.as_slice(),
            [AppEvent::PendingStateChanged { message_id, stage: PendingStage::Cancelled, .. }] if *message_id == id
        ));
        assert!(manager.delivery().get(&id).is_none());

        // The transport confirming afterwards does not resurrect it.
        assert!(manager.handle_send_complete(handle, id).is_empty());
        assert_eq!(manager.outbox().stage(&id), None);
    }

    #[test]
    fn test_send_failure_cancels_message() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);
        let id = sent_id(&manager.send_text("lost").unwrap());

        let outcome = manager.handle_send_failed(handle, id, "channel closed");
        assert!(matches!(
            outcome.app_events[0],
            AppEvent::PendingStateChanged { stage: PendingStage::Cancelled, .. }
        ));
        assert_eq!(
            notices(&outcome),
            vec!["Failed to send message: channel closed".to_string()]
        );
        assert!(manager.delivery().is_empty());
    }

    #[test]
    fn test_remote_close_resets_session_state() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);
        let id = sent_id(&manager.send_text("in flight").unwrap());

        let outcome = manager.handle_transport_close(handle);
        assert!(outcome.effects.is_empty());
        assert_eq!(
            statuses(&outcome),
            vec![("Disconnected".to_string(), Severity::Error)]
        );
        assert_eq!(notices(&outcome), vec!["Disconnected from bob".to_string()]);
        assert!(outcome.app_events.iter().any(|event| matches!(
            event,
            AppEvent::PendingStateChanged { message_id, stage: PendingStage::Cancelled, .. } if *message_id == id
        )));
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(manager.delivery().is_empty());
        assert_eq!(manager.outbox().pending_len(), 0);

        // A new session can be opened afterwards.
        open_inbound(&mut manager);
        assert_eq!(manager.state(), SessionState::Open);
    }

    #[test]
    fn test_local_close_emits_close_effect() {
        let (mut manager, _clock) = manager();
        let handle = open_inbound(&mut manager);

        let outcome = manager.close_session(CloseReason::Local);
        assert!(matches!(outcome.effects.as_slice(), [Effect::Close { handle: h }] if *h == handle));
        assert!(manager.close_session(CloseReason::Local).is_empty());
    }

    #[test]
    fn test_listening_assigns_identity() {
        let (mut manager, _clock) = manager();
        let outcome = manager.on_listening(PeerId::new("alice"));
        assert_eq!(
            statuses(&outcome),
            vec![("Your ID: alice".to_string(), Severity::Success)]
        );

        let effect = manager.replace_identity(PeerId::new("fresh123"));
        assert!(matches!(effect, Effect::Listen { local_id } if local_id.as_str() == "fresh123"));
        assert_eq!(manager.local_id().as_str(), "fresh123");
    }
}
