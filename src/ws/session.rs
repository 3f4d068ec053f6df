//! Per-client session state machine and emission activity.
//!
//! A session moves through Connecting → Active → Closing → Closed. On
//! accept it asks the [`ConnectionRegistry`] for a slot; refusal closes
//! the socket with code 1013 before anything else is sent. Once admitted
//! it runs two cooperating activities: the inbound loop (this task) and a
//! lazily spawned emission task that samples the frame source while
//! tracking is enabled.
//!
//! Only the session task writes to the transport. The emitter enqueues
//! its notifications on an mpsc channel, so sends are never interleaved
//! and per-session ordering is exactly enqueue order.
//!
//! Whichever side notices termination first stops the other: the inbound
//! loop cancels the per-session token on exit, and a failed send from the
//! emitter closes the channel the session is draining. Teardown releases
//! the registry slot exactly once on every path.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::messages::{
    CLOSE_AT_CAPACITY, CLOSE_GOING_AWAY, INVALID_JSON_MESSAGE, InboundCommand, ParseFailure,
    ServerMessage,
};
use super::transport::{Incoming, Transport, TransportError};
use crate::capture::{CaptureError, FrameSource, FrameSupply};
use crate::domain::{ConnectionRegistry, SessionId};

/// Bound on notifications queued between the emitter and the socket.
const OUTBOUND_QUEUE: usize = 32;

/// Server-side state for one connected client.
pub struct Session<T> {
    id: SessionId,
    remote: String,
    transport: T,
    registry: Arc<ConnectionRegistry>,
    supply: FrameSupply,
    /// Child of the process shutdown token; cancelled on teardown.
    cancel: CancellationToken,
    /// Tracking-enabled flag, written here, read by the emitter.
    tracking: watch::Sender<bool>,
    out_tx: mpsc::Sender<ServerMessage>,
    out_rx: Option<mpsc::Receiver<ServerMessage>>,
    emitter: Option<JoinHandle<()>>,
}

impl<T: Transport> Session<T> {
    /// Creates a session for a freshly accepted transport.
    ///
    /// `shutdown` is the process-wide shutdown token; the session derives
    /// a child token from it so that server shutdown reaches every
    /// emission activity.
    #[must_use]
    pub fn new(
        transport: T,
        remote: String,
        registry: Arc<ConnectionRegistry>,
        supply: FrameSupply,
        shutdown: &CancellationToken,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (tracking, _) = watch::channel(false);
        Self {
            id: SessionId::new(),
            remote,
            transport,
            registry,
            supply,
            cancel: shutdown.child_token(),
            tracking,
            out_tx,
            out_rx: Some(out_rx),
            emitter: None,
        }
    }

    /// Runs the session to completion.
    ///
    /// Handles admission, the welcome notification, command dispatch, and
    /// unconditional teardown. Never leaves an emission task running or a
    /// registry slot occupied behind it.
    pub async fn run(mut self) {
        let Some(mut out_rx) = self.out_rx.take() else {
            return;
        };

        if !self.registry.try_admit(self.id).await {
            tracing::warn!(
                session = %self.id,
                remote = %self.remote,
                max = self.registry.max_connections(),
                "connection refused - server at capacity"
            );
            let _ = self
                .transport
                .close(CLOSE_AT_CAPACITY, "Server at capacity")
                .await;
            return;
        }
        let total = self.registry.count().await;
        tracing::info!(
            session = %self.id,
            remote = %self.remote,
            total,
            "client connected"
        );

        let welcome = ServerMessage::welcome(self.registry.max_connections());
        if self.transport.send(&welcome).await.is_err() {
            self.teardown().await;
            return;
        }

        loop {
            tokio::select! {
                incoming = self.transport.recv() => match incoming {
                    Some(Ok(Incoming::Text(text))) => {
                        if self.handle_text(&text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Incoming::Close)) | None => break,
                    Some(Ok(Incoming::Other)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(session = %self.id, error = %err, "transport receive failed");
                        break;
                    }
                },
                Some(msg) = out_rx.recv() => {
                    if self.transport.send(&msg).await.is_err() {
                        break;
                    }
                }
                () = self.cancel.cancelled() => {
                    let _ = self
                        .transport
                        .close(CLOSE_GOING_AWAY, "server shutting down")
                        .await;
                    break;
                }
            }
        }

        self.teardown().await;
    }

    async fn handle_text(&mut self, text: &str) -> Result<(), TransportError> {
        match InboundCommand::parse(text) {
            Ok(cmd) => self.handle_command(cmd).await,
            Err(ParseFailure) => {
                tracing::warn!(session = %self.id, remote = %self.remote, "invalid JSON received");
                self.transport
                    .send(&ServerMessage::error(INVALID_JSON_MESSAGE))
                    .await
            }
        }
    }

    async fn handle_command(&mut self, cmd: InboundCommand) -> Result<(), TransportError> {
        match cmd {
            InboundCommand::Ping => self.transport.send(&ServerMessage::pong()).await,
            InboundCommand::StartTracking => self.start_tracking().await,
            InboundCommand::StopTracking => {
                tracing::info!(session = %self.id, "tracking stopped");
                self.tracking.send_replace(false);
                Ok(())
            }
            InboundCommand::Unknown(tag) => {
                tracing::warn!(session = %self.id, message_type = %tag, "unknown message type");
                Ok(())
            }
        }
    }

    /// Enables tracking, spawning the emission task on first request.
    ///
    /// Idempotent: repeated `start_tracking` only flips the flag; a
    /// session never has two emitters.
    async fn start_tracking(&mut self) -> Result<(), TransportError> {
        match self.supply.clone() {
            FrameSupply::Unavailable(reason) => {
                tracing::warn!(session = %self.id, %reason, "tracking requested without frame source");
                self.transport.send(&ServerMessage::error(reason)).await
            }
            FrameSupply::Ready(source) => {
                self.tracking.send_replace(true);
                if self.emitter.is_none() {
                    tracing::info!(
                        session = %self.id,
                        mode = source.mode(),
                        cadence = ?source.cadence(),
                        "tracking started"
                    );
                    self.emitter = Some(tokio::spawn(emission_loop(
                        source,
                        self.out_tx.clone(),
                        self.tracking.subscribe(),
                        self.cancel.clone(),
                    )));
                }
                Ok(())
            }
        }
    }

    /// Stops the emission activity and releases the registry slot.
    ///
    /// Runs on every exit path after admission. The cancellation is an
    /// explicit signal to the emitter, interrupting a pending timer wait
    /// rather than waiting for it to poll a flag.
    async fn teardown(&mut self) {
        self.cancel.cancel();
        if let Some(emitter) = self.emitter.take() {
            let _ = emitter.await;
        }
        self.registry.release(self.id).await;
        let total = self.registry.count().await;
        tracing::info!(
            session = %self.id,
            remote = %self.remote,
            total,
            "client disconnected"
        );
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("tracking", &*self.tracking.borrow())
            .finish_non_exhaustive()
    }
}

/// Periodic emission activity for one session.
///
/// Parks while tracking is disabled (resumable without respawning),
/// samples the source once per cadence tick while enabled, and terminates
/// on cancellation or when the session side of the channel is gone. A
/// transient read failure skips the tick; any other capture error is
/// reported once and the loop parks until tracking is toggled again.
async fn emission_loop(
    source: Arc<dyn FrameSource>,
    out: mpsc::Sender<ServerMessage>,
    mut enabled: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(source.cadence());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        while !*enabled.borrow() {
            tokio::select! {
                () = cancel.cancelled() => return,
                changed = enabled.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if !*enabled.borrow() {
            continue;
        }

        match source.capture().await {
            Ok(result) => {
                // The queue may be full while the session stalls in a
                // slow transport write; cancellation must still win.
                tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = out.send(ServerMessage::eye_data(result)) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(CaptureError::TransientReadFailure) => {
                tracing::debug!("transient frame read failure, retrying next tick");
            }
            Err(err) => {
                tracing::warn!(error = %err, "frame capture failed");
                let report = ServerMessage::error(format!("frame capture failed: {err}"));
                tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = out.send(report) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
                // Wait for the client to toggle tracking rather than
                // repeating the same error every tick.
                tokio::select! {
                    () = cancel.cancelled() => return,
                    changed = enabled.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::timeout;

    use super::*;
    use crate::capture::SimulatedFrameSource;

    const CADENCE: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(2);

    struct MockTransport {
        incoming: mpsc::Receiver<Incoming>,
        sent: mpsc::UnboundedSender<ServerMessage>,
        closed: Arc<StdMutex<Option<(u16, String)>>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, msg: &ServerMessage) -> Result<(), TransportError> {
            self.sent
                .send(msg.clone())
                .map_err(|_| TransportError::Closed)
        }

        async fn recv(&mut self) -> Option<Result<Incoming, TransportError>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
            if let Ok(mut closed) = self.closed.lock() {
                *closed = Some((code, reason.to_owned()));
            }
            Ok(())
        }
    }

    struct Harness {
        incoming_tx: mpsc::Sender<Incoming>,
        sent_rx: mpsc::UnboundedReceiver<ServerMessage>,
        closed: Arc<StdMutex<Option<(u16, String)>>>,
        shutdown: CancellationToken,
        session: JoinHandle<()>,
    }

    impl Harness {
        fn spawn(registry: Arc<ConnectionRegistry>, supply: FrameSupply) -> Self {
            let (incoming_tx, incoming) = mpsc::channel(16);
            let (sent, sent_rx) = mpsc::unbounded_channel();
            let closed = Arc::new(StdMutex::new(None));
            let transport = MockTransport {
                incoming,
                sent,
                closed: Arc::clone(&closed),
            };
            let shutdown = CancellationToken::new();
            let session = Session::new(
                transport,
                "test-client".to_owned(),
                registry,
                supply,
                &shutdown,
            );
            Self {
                incoming_tx,
                sent_rx,
                closed,
                shutdown,
                session: tokio::spawn(session.run()),
            }
        }

        async fn send_text(&self, text: &str) {
            let Ok(()) = self.incoming_tx.send(Incoming::Text(text.to_owned())).await else {
                panic!("session dropped its inbound channel");
            };
        }

        async fn next_sent(&mut self) -> ServerMessage {
            let Ok(Some(msg)) = timeout(WAIT, self.sent_rx.recv()).await else {
                panic!("no outbound message within {WAIT:?}");
            };
            msg
        }

        fn close_code(&self) -> Option<u16> {
            self.closed
                .lock()
                .ok()
                .and_then(|closed| closed.as_ref().map(|(code, _)| *code))
        }
    }

    fn simulated_supply() -> FrameSupply {
        FrameSupply::ready(Arc::new(SimulatedFrameSource::new(CADENCE)))
    }

    #[tokio::test]
    async fn admission_sends_welcome_with_capacity() {
        let registry = Arc::new(ConnectionRegistry::new(3));
        let mut harness = Harness::spawn(Arc::clone(&registry), simulated_supply());

        let ServerMessage::Connection { server_info, .. } = harness.next_sent().await else {
            panic!("expected connection welcome first");
        };
        assert_eq!(server_info.max_connections, 3);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn capacity_refusal_closes_with_1013_and_sends_nothing() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        assert!(registry.try_admit(SessionId::new()).await);

        let mut harness = Harness::spawn(Arc::clone(&registry), simulated_supply());
        let Ok(Ok(())) = timeout(WAIT, &mut harness.session).await else {
            panic!("refused session did not finish");
        };

        assert_eq!(harness.close_code(), Some(CLOSE_AT_CAPACITY));
        assert!(harness.sent_rx.try_recv().is_err());
        // Refused sessions never occupy a slot.
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let mut harness = Harness::spawn(registry, simulated_supply());
        let _welcome = harness.next_sent().await;

        harness.send_text(r#"{"type":"ping"}"#).await;
        let ServerMessage::Pong { .. } = harness.next_sent().await else {
            panic!("expected pong");
        };
    }

    #[tokio::test]
    async fn malformed_json_reports_error_and_session_survives() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let mut harness = Harness::spawn(Arc::clone(&registry), simulated_supply());
        let _welcome = harness.next_sent().await;

        harness.send_text("{not json").await;
        let ServerMessage::Error { message, .. } = harness.next_sent().await else {
            panic!("expected error notification");
        };
        assert_eq!(message, INVALID_JSON_MESSAGE);

        // The session is still serving commands.
        harness.send_text(r#"{"type":"ping"}"#).await;
        let ServerMessage::Pong { .. } = harness.next_sent().await else {
            panic!("expected pong after error");
        };
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn unknown_type_is_ignored() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let mut harness = Harness::spawn(registry, simulated_supply());
        let _welcome = harness.next_sent().await;

        harness.send_text(r#"{"type":"calibrate"}"#).await;
        harness.send_text(r#"{"type":"ping"}"#).await;

        // The unrecognized command produced no reply; pong comes next.
        let ServerMessage::Pong { .. } = harness.next_sent().await else {
            panic!("expected pong, not a reply to the unknown command");
        };
    }

    #[tokio::test]
    async fn start_tracking_streams_eye_data() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let mut harness = Harness::spawn(registry, simulated_supply());
        let _welcome = harness.next_sent().await;

        harness.send_text(r#"{"type":"start_tracking"}"#).await;

        let mut samples = 0;
        while samples < 3 {
            let ServerMessage::EyeData {
                confidence,
                eye_count,
                ..
            } = harness.next_sent().await
            else {
                continue;
            };
            assert!((0.0..=1.0).contains(&confidence));
            assert!(eye_count >= 2);
            samples += 1;
        }
    }

    #[tokio::test]
    async fn stop_tracking_pauses_emission() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let mut harness = Harness::spawn(registry, simulated_supply());
        let _welcome = harness.next_sent().await;

        harness.send_text(r#"{"type":"start_tracking"}"#).await;
        let ServerMessage::EyeData { .. } = harness.next_sent().await else {
            panic!("expected eye_data after start_tracking");
        };

        harness.send_text(r#"{"type":"stop_tracking"}"#).await;
        // Drain anything already in flight.
        tokio::time::sleep(CADENCE * 2).await;
        while harness.sent_rx.try_recv().is_ok() {}

        // No further samples arrive within two emission intervals.
        let quiet = timeout(CADENCE * 2, harness.sent_rx.recv()).await;
        assert!(quiet.is_err(), "eye_data kept flowing after stop_tracking");
    }

    #[tokio::test]
    async fn tracking_resumes_after_stop_without_duplicate_emitter() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let (_incoming_tx, incoming) = mpsc::channel(16);
        let (sent, _sent_rx) = mpsc::unbounded_channel();
        let transport = MockTransport {
            incoming,
            sent,
            closed: Arc::new(StdMutex::new(None)),
        };
        let shutdown = CancellationToken::new();
        let mut session = Session::new(
            transport,
            "test-client".to_owned(),
            registry,
            simulated_supply(),
            &shutdown,
        );

        for cmd in [
            InboundCommand::StartTracking,
            InboundCommand::StopTracking,
            InboundCommand::StartTracking,
            InboundCommand::StartTracking,
        ] {
            let Ok(()) = session.handle_command(cmd).await else {
                panic!("command dispatch failed");
            };
        }

        // One emitter, one watch subscription, regardless of how often
        // tracking was toggled.
        assert!(session.emitter.is_some());
        assert_eq!(session.tracking.receiver_count(), 1);
        assert!(*session.tracking.borrow());

        session.teardown().await;
        assert!(session.emitter.is_none());
    }

    #[tokio::test]
    async fn unavailable_source_reports_error_on_start_tracking() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let supply = FrameSupply::unavailable("no camera available");
        let mut harness = Harness::spawn(Arc::clone(&registry), supply);
        let _welcome = harness.next_sent().await;

        harness.send_text(r#"{"type":"start_tracking"}"#).await;
        let ServerMessage::Error { message, .. } = harness.next_sent().await else {
            panic!("expected error notification");
        };
        assert_eq!(message, "no camera available");

        // The session itself is not torn down.
        harness.send_text(r#"{"type":"ping"}"#).await;
        let ServerMessage::Pong { .. } = harness.next_sent().await else {
            panic!("expected pong");
        };
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn client_disconnect_releases_slot() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let mut harness = Harness::spawn(Arc::clone(&registry), simulated_supply());
        let _welcome = harness.next_sent().await;
        assert_eq!(registry.count().await, 1);

        harness.send_text(r#"{"type":"start_tracking"}"#).await;
        let ServerMessage::EyeData { .. } = harness.next_sent().await else {
            panic!("expected eye_data");
        };

        // Dropping the inbound side ends the stream: the session must
        // stop its emitter and free the slot.
        drop(harness.incoming_tx);
        let Ok(Ok(())) = timeout(WAIT, harness.session).await else {
            panic!("session did not finish after disconnect");
        };
        assert_eq!(registry.count().await, 0);
    }

    /// Transport whose post-welcome writes stall and then fail, backing
    /// the outbound queue up behind a slow client.
    struct StallingTransport {
        incoming: mpsc::Receiver<Incoming>,
        sent_welcome: bool,
    }

    #[async_trait]
    impl Transport for StallingTransport {
        async fn send(&mut self, _msg: &ServerMessage) -> Result<(), TransportError> {
            if !self.sent_welcome {
                self.sent_welcome = true;
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            Err(TransportError::Closed)
        }

        async fn recv(&mut self) -> Option<Result<Incoming, TransportError>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self, _code: u16, _reason: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn teardown_completes_with_backlogged_emitter() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let (incoming_tx, incoming) = mpsc::channel(4);
        let transport = StallingTransport {
            incoming,
            sent_welcome: false,
        };
        // Cadence far below the transport stall, so the outbound queue
        // fills and the emitter blocks mid-send before the stall ends.
        let supply = FrameSupply::ready(Arc::new(SimulatedFrameSource::new(
            Duration::from_millis(1),
        )));
        let shutdown = CancellationToken::new();
        let session = Session::new(
            transport,
            "test-client".to_owned(),
            Arc::clone(&registry),
            supply,
            &shutdown,
        );
        let handle = tokio::spawn(session.run());

        let start = Incoming::Text(r#"{"type":"start_tracking"}"#.to_owned());
        let Ok(()) = incoming_tx.send(start).await else {
            panic!("session dropped its inbound channel");
        };

        // The failed write ends the session; teardown must still reach
        // the blocked emitter and release the slot.
        let Ok(Ok(())) = timeout(WAIT, handle).await else {
            panic!("session did not finish teardown with a backlogged emitter");
        };
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn server_shutdown_closes_session_and_releases_slot() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let mut harness = Harness::spawn(Arc::clone(&registry), simulated_supply());
        let _welcome = harness.next_sent().await;

        harness.shutdown.cancel();
        let Ok(Ok(())) = timeout(WAIT, &mut harness.session).await else {
            panic!("session did not finish after shutdown");
        };
        assert_eq!(harness.close_code(), Some(CLOSE_GOING_AWAY));
        assert_eq!(registry.count().await, 0);
    }
}
