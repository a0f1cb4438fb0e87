/// Push Connection Manager
///
/// Keeps at most one push subscription alive per session and hands every
/// well-formed pushed notification to a dispatcher channel.
///
/// State machine:
///
/// ```text
/// Disconnected --connect--> Connecting --ack--> Connected --error|drop--> Disconnected
///       ^                        |                                             |
///       +------ fixed delay -----+---------------------------------------------+
///
/// any state --teardown()--> TornDown (terminal)
/// ```
///
/// Reconnection never gives up and never backs off; the delay comes from the
/// `ReconnectPolicy`.
use resilience::ReconnectPolicy;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::transport::{PushChannel, PushTransport};
use crate::error::{AppError, Result};
use crate::models::Notification;
use crate::services::Session;

/// Sender half the manager pushes parsed notifications into
pub type PushSink = mpsc::UnboundedSender<Notification>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    TornDown,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::TornDown => "torn_down",
        }
    }
}

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    session: Session,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PushTransport>, session: Session, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            session,
            policy,
            state: Arc::new(state),
            shutdown,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Spawn the receive loop. A second call while running is a no-op.
    pub async fn start(&self, sink: PushSink) -> Result<()> {
        let mut task = self.task.lock().await;
        if *self.shutdown.borrow() {
            return Err(AppError::TornDown);
        }
        if task.is_some() {
            debug!("Push connection already running");
            return Ok(());
        }

        let worker = PushLoop {
            transport: self.transport.clone(),
            session: self.session.clone(),
            policy: self.policy,
            state: self.state.clone(),
            shutdown: self.shutdown.subscribe(),
            sink,
        };
        *task = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Stop the receive loop and close the connection. Safe to call repeatedly.
    pub async fn teardown(&self) {
        let already = self.shutdown.send_replace(true);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Push loop ended abnormally: {}", e);
            }
        }

        self.state.send_replace(ConnectionState::TornDown);
        if !already {
            info!("Push connection torn down");
        }
    }
}

/// Resolves once teardown was requested or the manager was dropped
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

enum PumpExit {
    Shutdown,
    Dropped,
}

struct PushLoop {
    transport: Arc<dyn PushTransport>,
    session: Session,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: watch::Receiver<bool>,
    sink: PushSink,
}

impl PushLoop {
    async fn run(mut self) {
        let mut schedule = self.policy.schedule();

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = stopped(&mut self.shutdown) => break,
                opened = self.transport.open(self.session.bearer()) => opened,
            };

            match opened {
                Ok(mut channel) => {
                    schedule.reset();
                    self.set_state(ConnectionState::Connected);

                    let exit = self.pump(channel.as_mut()).await;
                    channel.close().await;
                    if let PumpExit::Shutdown = exit {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Push connection failed: {}", e);
                }
            }

            self.set_state(ConnectionState::Disconnected);

            let delay = schedule.next_delay();
            info!("Reconnecting push channel in {:?} (attempt {})", delay, schedule.attempts());

            tokio::select! {
                _ = stopped(&mut self.shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Push loop stopped");
    }

    async fn pump(&mut self, channel: &mut dyn PushChannel) -> PumpExit {
        loop {
            let next = tokio::select! {
                _ = stopped(&mut self.shutdown) => return PumpExit::Shutdown,
                next = channel.next_payload() => next,
            };

            match next {
                Some(Ok(payload)) => self.deliver(&payload),
                Some(Err(e)) => {
                    warn!("Push connection dropped: {}", e);
                    return PumpExit::Dropped;
                }
                None => {
                    info!("Push connection closed by server");
                    return PumpExit::Dropped;
                }
            }
        }
    }

    /// Malformed payloads are logged and skipped; the subscription stays up
    fn deliver(&self, payload: &str) {
        match Notification::from_json(payload) {
            Ok(notification) => {
                debug!("Push received: {}", notification.id);
                if self.sink.send(notification).is_err() {
                    debug!("No dispatcher listening, push dropped");
                }
            }
            Err(e) => {
                warn!("Discarding malformed push payload: {}", e);
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            // teardown owns the terminal state
            if *state == next || *state == ConnectionState::TornDown {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            info!("Push connection {}", next.as_str());
        }
    }
}
