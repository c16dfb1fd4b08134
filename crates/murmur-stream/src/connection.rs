//! Connection life-cycle state machine.
//!
//! Maintains exactly one logical stream session at a time. The manager owns
//! the single transport handle and the single outstanding retry timer;
//! replacing either first invalidates the previous one.
//!
//! ```text
//! Idle --start()--> Connecting
//! Connecting --open ok, event-stream content type--> Ready
//! Connecting --4xx (except 429)--> Fatal
//! Connecting --any other open failure--> Retrying
//! Ready --record--> Ready
//! Ready --unexpected close--> Retrying
//! Ready --server fatal marker / kick--> Fatal
//! Retrying --fixed delay elapses--> Connecting
//! any state --stop()--> Idle
//! ```
//!
//! `established` and `establishing` guard against duplicate sessions: both
//! reset on `stop()` and on `Fatal`, and `start()` is a no-op while either
//! is set, so rapid repeated `start()` calls (network-status flapping) can
//! never open two physical connections.
//!
//! Network-loss failures are special-cased: the session stops without
//! self-scheduling a timer, because reconnection is driven by the external
//! online/offline gate (`set_ready`) once connectivity returns.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use murmur_core::{ServerEvent, UserId};
use murmur_replica::SharedReplica;

use crate::classify::{classify_open, classify_stream_error, OpenDisposition, StreamFailure};
use crate::dispatcher::{Dispatcher, Flow};
use crate::transport::{StreamRequest, Transport};

/// Stream-level event name the server uses for a fatal marker record.
const FATAL_EVENT: &str = "FatalError";

/// Fixed delay between a retriable failure and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Stream life-cycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; nothing scheduled.
    Idle,
    /// A transport open is in flight.
    Connecting,
    /// Headers confirmed an event stream; records are being consumed.
    Ready,
    /// A retriable failure occurred; one reconnect timer is pending.
    Retrying,
    /// A non-retriable failure occurred. Terminal until an external actor
    /// stops and restarts the connection (typically after re-auth).
    Fatal,
}

/// The opaque credential plus the signed-in user it belongs to.
#[derive(Clone, Debug)]
pub struct Credential {
    /// Opaque token passed to the transport as `api-key`.
    pub token: String,
    /// The signed-in user's id.
    pub uid: UserId,
}

/// Connection manager configuration.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Server base URL, e.g. `https://chat.example.com/api`.
    pub base_url: String,
    /// Delay between `Retrying` and the next attempt.
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    /// Config with the default fixed reconnect delay.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn halt(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

struct Inner {
    state: ConnectionState,
    /// A session open confirmed as an event stream is being consumed.
    established: bool,
    /// A session open is in flight.
    establishing: bool,
    /// External gate: whether streaming should run at all.
    gate_open: bool,
    credential: Option<Credential>,
    session: Option<SessionHandle>,
    retry: Option<SessionHandle>,
}

/// Owns the stream session life-cycle. Cheap to clone; all clones share the
/// same state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Mutex<Inner>>,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    replica: SharedReplica,
    config: Arc<ConnectionConfig>,
}

impl ConnectionManager {
    /// Create a manager. No session is opened until [`start`](Self::start).
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
        replica: SharedReplica,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Idle,
                established: false,
                establishing: false,
                gate_open: false,
                credential: None,
                session: None,
                retry: None,
            })),
            transport,
            dispatcher,
            replica,
            config: Arc::new(config),
        }
    }

    /// Current life-cycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Install or clear the credential used for subsequent `start()` calls.
    pub fn set_credential(&self, credential: Option<Credential>) {
        self.inner.lock().credential = credential;
    }

    /// Open a new session.
    ///
    /// Idempotent: a no-op while a session is establishing or established.
    /// Returns silently when no credential is installed. The resume cursor
    /// is read freshly from the replica on every call; zero components are
    /// omitted from the request.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        self.start_locked(&mut inner);
    }

    /// Abort any open or pending connection and return to `Idle`.
    ///
    /// Cancels an in-flight open, releases record iteration, and cancels any
    /// pending reconnect timer. No further events or reconnect attempts are
    /// observable after this returns. Safe to call from any state.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        Self::halt_locked(&mut inner, ConnectionState::Idle);
        debug!("streaming stopped");
    }

    /// External gate: when `false`, stop; when newly `true`, start.
    pub fn set_ready(&self, ready: bool) {
        let previously = {
            let mut inner = self.inner.lock();
            let previously = inner.gate_open;
            inner.gate_open = ready;
            previously
        };
        if ready {
            if !previously {
                self.start();
            }
        } else {
            self.stop();
        }
    }

    fn start_locked(&self, inner: &mut Inner) {
        if inner.establishing || inner.established {
            debug!(
                establishing = inner.establishing,
                established = inner.established,
                "start ignored: session already active"
            );
            return;
        }
        let Some(credential) = inner.credential.clone() else {
            debug!("start ignored: no credential");
            return;
        };
        // Replace any pending retry timer and stale session handle.
        if let Some(retry) = inner.retry.take() {
            retry.halt();
        }
        if let Some(session) = inner.session.take() {
            session.halt();
        }

        let request = StreamRequest {
            base_url: self.config.base_url.clone(),
            api_key: credential.token,
            cursor: self.replica.lock().cursor(),
        };

        inner.establishing = true;
        inner.state = ConnectionState::Connecting;
        info!(after_mid = request.cursor.after_mid, users_version = request.cursor.users_version, "opening stream session");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(
            self.clone(),
            request,
            credential.uid,
            cancel.clone(),
        ));
        inner.session = Some(SessionHandle { cancel, task });
    }

    fn halt_locked(inner: &mut Inner, state: ConnectionState) {
        if let Some(retry) = inner.retry.take() {
            retry.halt();
        }
        if let Some(session) = inner.session.take() {
            session.halt();
        }
        inner.establishing = false;
        inner.established = false;
        inner.state = state;
    }

    // ── Transitions driven by the session task ──────────────────────────
    //
    // Each takes the session's cancellation token and no-ops once the token
    // is cancelled: a session that `stop()` already halted must not move the
    // state machine again.

    fn note_established(&self, cancel: &CancellationToken) {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() {
            return;
        }
        inner.establishing = false;
        inner.established = true;
        inner.state = ConnectionState::Ready;
        info!("stream session established");
    }

    fn fail_fatal(&self, cancel: &CancellationToken) {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() {
            return;
        }
        let _ = inner.session.take();
        if let Some(retry) = inner.retry.take() {
            retry.halt();
        }
        inner.establishing = false;
        inner.established = false;
        inner.state = ConnectionState::Fatal;
        metrics::counter!("stream_fatal_total").increment(1);
        error!("stream session failed fatally; not retrying");
    }

    /// Network loss: stop the dead session but do not self-schedule a
    /// reconnect. The external online/offline gate re-triggers `start()`.
    fn halt_for_network_loss(&self, cancel: &CancellationToken) {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() {
            return;
        }
        let _ = inner.session.take();
        if let Some(retry) = inner.retry.take() {
            retry.halt();
        }
        inner.establishing = false;
        inner.established = false;
        inner.state = ConnectionState::Idle;
        warn!("network lost; waiting for the online gate to restart streaming");
    }

    fn schedule_retry(&self, cancel: &CancellationToken) {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() {
            return;
        }
        let _ = inner.session.take();
        // Only one retry timer may be outstanding; a new schedule replaces
        // any pending one.
        if let Some(retry) = inner.retry.take() {
            retry.halt();
        }
        inner.establishing = false;
        inner.established = false;
        inner.state = ConnectionState::Retrying;

        let delay = self.config.reconnect_delay;
        metrics::counter!("stream_reconnects_total").increment(1);
        warn!(delay_secs = delay.as_secs_f64(), "scheduling reconnect");

        let manager = self.clone();
        let token = CancellationToken::new();
        let timer_token = token.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                () = timer_token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let mut inner = manager.inner.lock();
                    if timer_token.is_cancelled() {
                        return;
                    }
                    let _ = inner.retry.take();
                    manager.start_locked(&mut inner);
                }
            }
        });
        inner.retry = Some(SessionHandle {
            cancel: token,
            task,
        });
    }
}

/// One session: open, classify, consume records until the stream ends or the
/// session is cancelled.
async fn run_session(
    manager: ConnectionManager,
    request: StreamRequest,
    local_uid: UserId,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        () = cancel.cancelled() => return,
        result = manager.transport.open(&request) => result,
    };

    let stream = match opened {
        Ok(stream) => stream,
        Err(error) => {
            if error.is_network_loss() {
                warn!(error = %error, "open failed: network lost");
                manager.halt_for_network_loss(&cancel);
            } else {
                warn!(error = %error, "open failed");
                manager.schedule_retry(&cancel);
            }
            return;
        }
    };

    match classify_open(stream.status, stream.content_type.as_deref()) {
        OpenDisposition::Ready => manager.note_established(&cancel),
        OpenDisposition::Fatal => {
            error!(status = stream.status, "open rejected with client error");
            manager.fail_fatal(&cancel);
            return;
        }
        OpenDisposition::Retry => {
            warn!(
                status = stream.status,
                content_type = stream.content_type.as_deref().unwrap_or(""),
                "open not usable; will retry"
            );
            manager.schedule_retry(&cancel);
            return;
        }
    }

    let mut frames = stream.frames;
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => return,
            item = frames.next() => item,
        };
        match item {
            Some(Ok(frame)) => {
                if frame.event == FATAL_EVENT {
                    error!(data = %frame.data, "server pushed fatal marker");
                    manager.fail_fatal(&cancel);
                    return;
                }
                let event = match ServerEvent::decode(&frame.data) {
                    Ok(event) => event,
                    Err(error) => {
                        warn!(error = %error, "undecodable event record skipped");
                        continue;
                    }
                };
                match manager.dispatcher.apply(event, local_uid) {
                    Flow::Continue => {}
                    Flow::Shutdown => {
                        manager.fail_fatal(&cancel);
                        return;
                    }
                }
            }
            Some(Err(error)) => {
                match classify_stream_error(&error) {
                    StreamFailure::NetworkLost => {
                        warn!(error = %error, "stream failed: network lost");
                        manager.halt_for_network_loss(&cancel);
                    }
                    StreamFailure::Retriable => {
                        warn!(error = %error, "stream failed; will retry");
                        manager.schedule_retry(&cancel);
                    }
                }
                return;
            }
            None => {
                warn!("stream closed unexpectedly; will retry");
                manager.schedule_retry(&cancel);
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use futures::stream;
    use tokio::sync::broadcast;

    use murmur_core::ChannelId;
    use murmur_replica::replica::shared;

    use crate::signals::Signal;
    use crate::transport::{EventFrame, FrameStream, OpenedStream, TransportError};

    use super::*;

    const BASE: &str = "https://chat.example.com/api";

    enum ScriptedOpen {
        /// The open never resolves (until cancelled).
        Hang,
        /// The open fails outright.
        Fail(TransportError),
        /// The open responds; `hold_open` keeps the stream alive after the
        /// scripted frames.
        Respond {
            status: u16,
            content_type: Option<&'static str>,
            frames: Vec<Result<EventFrame, TransportError>>,
            hold_open: bool,
        },
    }

    struct FakeTransport {
        opens: AtomicU32,
        script: parking_lot::Mutex<VecDeque<ScriptedOpen>>,
    }

    impl FakeTransport {
        fn new(script: Vec<ScriptedOpen>) -> Self {
            Self {
                opens: AtomicU32::new(0),
                script: parking_lot::Mutex::new(script.into()),
            }
        }

        fn opens(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, _request: &StreamRequest) -> Result<OpenedStream, TransportError> {
            let _ = self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            match next {
                None | Some(ScriptedOpen::Hang) => {
                    std::future::pending::<Result<OpenedStream, TransportError>>().await
                }
                Some(ScriptedOpen::Fail(error)) => Err(error),
                Some(ScriptedOpen::Respond {
                    status,
                    content_type,
                    frames,
                    hold_open,
                }) => {
                    let scripted = stream::iter(frames);
                    let frames: FrameStream = if hold_open {
                        Box::pin(scripted.chain(stream::pending()))
                    } else {
                        Box::pin(scripted)
                    };
                    Ok(OpenedStream {
                        status,
                        content_type: content_type.map(str::to_owned),
                        frames,
                    })
                }
            }
        }
    }

    fn frame(json: &str) -> Result<EventFrame, TransportError> {
        Ok(EventFrame {
            event: "message".into(),
            data: json.into(),
        })
    }

    fn live(frames: Vec<Result<EventFrame, TransportError>>) -> ScriptedOpen {
        ScriptedOpen::Respond {
            status: 200,
            content_type: Some("text/event-stream"),
            frames,
            hold_open: true,
        }
    }

    fn harness(
        script: Vec<ScriptedOpen>,
    ) -> (
        ConnectionManager,
        Arc<FakeTransport>,
        SharedReplica,
        broadcast::Receiver<Signal>,
    ) {
        let replica = shared(BASE);
        let (signals, receiver) = broadcast::channel(16);
        let dispatcher = Arc::new(Dispatcher::new(replica.clone(), signals));
        let transport = Arc::new(FakeTransport::new(script));
        let manager = ConnectionManager::new(
            transport.clone(),
            dispatcher,
            replica.clone(),
            ConnectionConfig::new(BASE),
        );
        manager.set_credential(Some(Credential {
            token: "tok".into(),
            uid: UserId::new(10),
        }));
        (manager, transport, replica, receiver)
    }

    /// Let spawned tasks run without advancing paused time.
    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    // ── Duplicate-session guard ──────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn start_twice_opens_one_connection() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Hang]);
        manager.start();
        settle().await;
        manager.start();
        settle().await;
        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_credential_is_silent() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Hang]);
        manager.set_credential(None);
        manager.start();
        settle().await;
        assert_eq!(transport.opens(), 0);
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    // ── Open classification ──────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn open_404_goes_fatal_with_no_timer() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Respond {
            status: 404,
            content_type: None,
            frames: vec![],
            hold_open: false,
        }]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Fatal);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn open_503_retries_after_fixed_delay() {
        let (manager, transport, _replica, _rx) = harness(vec![
            ScriptedOpen::Respond {
                status: 503,
                content_type: None,
                frames: vec![],
                hold_open: false,
            },
            ScriptedOpen::Hang,
        ]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Retrying);
        assert_eq!(transport.opens(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(transport.opens(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn ok_with_wrong_content_type_retries() {
        let (manager, _transport, _replica, _rx) = harness(vec![ScriptedOpen::Respond {
            status: 200,
            content_type: Some("text/html"),
            frames: vec![],
            hold_open: false,
        }]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Retrying);
    }

    // ── Reconnect / stop interplay ───────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn stop_before_backoff_elapses_cancels_reconnect() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Respond {
            status: 503,
            content_type: None,
            frames: vec![],
            hold_open: false,
        }]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Retrying);

        manager.stop();
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_start_replaces_pending_retry_timer() {
        let (manager, transport, _replica, _rx) = harness(vec![
            ScriptedOpen::Respond {
                status: 503,
                content_type: None,
                frames: vec![],
                hold_open: false,
            },
            ScriptedOpen::Hang,
        ]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Retrying);

        manager.start();
        settle().await;
        assert_eq!(transport.opens(), 2);

        // The replaced timer must not fire a third attempt.
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_connecting_lands_idle() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Hang]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.stop();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Idle);
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.opens(), 1);
    }

    // ── Established sessions ─────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn successful_open_reaches_ready_and_applies_events() {
        let (manager, _transport, replica, _rx) = harness(vec![live(vec![
            frame(r#"{"type":"related_groups","groups":[{"gid":1,"members":[10,20]}]}"#),
            frame(r#"{"type":"user_joined_group","gid":1,"uid":[30]}"#),
        ])]);
        manager.start();
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Ready);
        let replica = replica.lock();
        let members = &replica.channels.get(ChannelId::new(1)).unwrap().members;
        assert_eq!(members.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_close_schedules_reconnect() {
        let (manager, transport, _replica, _rx) = harness(vec![
            ScriptedOpen::Respond {
                status: 200,
                content_type: Some("text/event-stream"),
                frames: vec![frame(r#"{"type":"heartbeat"}"#)],
                hold_open: false,
            },
            ScriptedOpen::Hang,
        ]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Retrying);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(transport.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn server_fatal_marker_goes_fatal() {
        let (manager, transport, _replica, _rx) = harness(vec![live(vec![Ok(EventFrame {
            event: "FatalError".into(),
            data: "boom".into(),
        })])]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Fatal);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn kick_goes_fatal_and_signals() {
        let (manager, _transport, _replica, mut rx) = harness(vec![live(vec![frame(
            r#"{"type":"kick","reason":"login_from_other_device"}"#,
        )])]);
        manager.start();
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Fatal);
        assert_matches!(rx.try_recv(), Ok(Signal::AuthInvalidated(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_record_is_skipped_not_fatal() {
        let (manager, _transport, replica, _rx) = harness(vec![live(vec![
            frame("this is not json"),
            frame(r#"{"type":"related_groups","groups":[{"gid":5}]}"#),
        ])]);
        manager.start();
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Ready);
        assert_eq!(replica.lock().channels.len(), 1);
    }

    // ── Network loss ─────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn network_loss_mid_stream_stops_without_timer() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Respond {
            status: 200,
            content_type: Some("text/event-stream"),
            frames: vec![Err(TransportError::NetworkLost("gone".into()))],
            hold_open: false,
        }]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Idle);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_loss_on_open_stops_without_timer() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Fail(
            TransportError::NetworkLost("no route".into()),
        )]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Idle);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_open_failure_retries() {
        let (manager, transport, _replica, _rx) = harness(vec![
            ScriptedOpen::Fail(TransportError::Other("handshake".into())),
            ScriptedOpen::Hang,
        ]);
        manager.start();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Retrying);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(transport.opens(), 2);
    }

    // ── The external gate ────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn gate_drives_start_and_stop() {
        let (manager, transport, _replica, _rx) = harness(vec![
            ScriptedOpen::Hang,
            ScriptedOpen::Hang,
        ]);
        manager.set_ready(true);
        settle().await;
        assert_eq!(transport.opens(), 1);

        manager.set_ready(false);
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Idle);

        manager.set_ready(true);
        settle().await;
        assert_eq!(transport.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_reopen_is_noop_when_already_open() {
        let (manager, transport, _replica, _rx) = harness(vec![ScriptedOpen::Hang]);
        manager.set_ready(true);
        settle().await;
        manager.set_ready(true);
        settle().await;
        assert_eq!(transport.opens(), 1);
    }

    // ── Cursor resume ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn restart_reads_a_fresh_cursor() {
        // First session applies a directory snapshot, then closes; the
        // reconnect must carry the advanced cursor.
        struct CapturingTransport {
            inner: FakeTransport,
            urls: parking_lot::Mutex<Vec<String>>,
        }

        #[async_trait]
        impl Transport for CapturingTransport {
            async fn open(
                &self,
                request: &StreamRequest,
            ) -> Result<OpenedStream, TransportError> {
                self.urls.lock().push(request.url());
                self.inner.open(request).await
            }
        }

        let transport = Arc::new(CapturingTransport {
            inner: FakeTransport::new(vec![
                ScriptedOpen::Respond {
                    status: 200,
                    content_type: Some("text/event-stream"),
                    frames: vec![frame(r#"{"type":"users_snapshot","version":9}"#)],
                    hold_open: false,
                },
                ScriptedOpen::Hang,
            ]),
            urls: parking_lot::Mutex::new(Vec::new()),
        });

        let replica = shared(BASE);
        let (signals, _rx) = broadcast::channel(16);
        let dispatcher = Arc::new(Dispatcher::new(replica.clone(), signals));
        let manager = ConnectionManager::new(
            transport.clone(),
            dispatcher,
            replica,
            ConnectionConfig::new(BASE),
        );
        manager.set_credential(Some(Credential {
            token: "tok".into(),
            uid: UserId::new(10),
        }));

        manager.start();
        settle().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        let urls = transport.urls.lock();
        assert_eq!(urls.len(), 2);
        assert!(!urls[0].contains("users_version"));
        assert!(urls[1].contains("users_version=9"));
    }
}
