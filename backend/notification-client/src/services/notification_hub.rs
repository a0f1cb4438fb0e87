/// Session-wide notification state
///
/// Wires the push connection, the unread-count reconciler and the inbox
/// together. Pushes are handled strictly in arrival order by one dispatcher
/// task: bump the counter, record in the inbox, then confirm with a refresh.
use resilience::ReconnectPolicy;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::models::Notification;
use crate::services::{
    HttpNotificationsApi, NotificationInbox, NotificationsApi, Session, UnreadReconciler,
};
use crate::websocket::{ConnectionManager, ConnectionState, PushTransport, StompTransport};

pub struct NotificationHub {
    session: Session,
    reconciler: Arc<UnreadReconciler>,
    inbox: Arc<NotificationInbox>,
    connection: ConnectionManager,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationHub {
    pub fn new(
        api: Arc<dyn NotificationsApi>,
        transport: Arc<dyn PushTransport>,
        session: Session,
        policy: ReconnectPolicy,
        inbox_capacity: usize,
    ) -> Self {
        Self {
            reconciler: Arc::new(UnreadReconciler::new(api.clone())),
            inbox: Arc::new(NotificationInbox::new(api, inbox_capacity)),
            connection: ConnectionManager::new(transport, session.clone(), policy),
            session,
            dispatcher: Mutex::new(None),
        }
    }

    /// Production wiring: HTTP API + STOMP push endpoint from configuration
    pub fn from_config(config: &Config) -> Self {
        let session = Session::new(
            config.auth.access_token.clone(),
            config.auth.refresh_token.clone(),
        );
        let api = Arc::new(HttpNotificationsApi::new(&config.api.base_url, session.clone()));
        let transport = Arc::new(StompTransport::from_config(&config.push));

        Self::new(
            api,
            transport,
            session,
            ReconnectPolicy::fixed(config.push.reconnect_delay),
            config.inbox.capacity,
        )
    }

    /// Initial fetch, then open the push subscription. A second call is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut dispatcher = self.dispatcher.lock().await;
        if dispatcher.is_some() {
            debug!("Notification hub already started");
            return Ok(());
        }

        let count = self.reconciler.refresh().await;
        // a failed load is logged by the inbox and retried on the next explicit load
        let _ = self.inbox.load().await;
        info!("Notification hub starting with {} unread", count);

        let (tx, rx) = mpsc::unbounded_channel();
        self.connection.start(tx).await?;
        *dispatcher = Some(tokio::spawn(dispatch(
            rx,
            self.reconciler.clone(),
            self.inbox.clone(),
        )));
        Ok(())
    }

    pub async fn refresh(&self) -> u64 {
        self.reconciler.refresh().await
    }

    pub async fn reload_inbox(&self) -> Result<usize> {
        self.inbox.load().await
    }

    pub async fn mark_read(&self, id: &str) -> Result<()> {
        self.reconciler.mark_read(id).await?;
        self.inbox.mark_read_local(id);
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.reconciler.mark_all_read().await?;
        self.inbox.mark_all_read_local();
        Ok(())
    }

    /// Tear the push connection down and stop the dispatcher. Idempotent.
    ///
    /// Queued pushes and an in-flight refresh are abandoned.
    pub async fn shutdown(&self) {
        self.connection.teardown().await;

        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            match handle.await {
                Err(e) if e.is_panic() => warn!("Push dispatcher ended abnormally: {}", e),
                _ => debug!("Push dispatcher stopped"),
            }
        }
    }

    pub fn unread_count(&self) -> u64 {
        self.reconciler.current()
    }

    pub fn subscribe_unread(&self) -> watch::Receiver<u64> {
        self.reconciler.subscribe()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inbox.snapshot()
    }

    pub fn subscribe_notifications(&self) -> watch::Receiver<Vec<Notification>> {
        self.inbox.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn reconciler(&self) -> &UnreadReconciler {
        &self.reconciler
    }
}

/// Runs until `shutdown` aborts it or the connection manager drops its sender
async fn dispatch(
    mut pushes: mpsc::UnboundedReceiver<Notification>,
    reconciler: Arc<UnreadReconciler>,
    inbox: Arc<NotificationInbox>,
) {
    while let Some(notification) = pushes.recv().await {
        reconciler.increment_on_push(&notification);
        inbox.record_push(notification);
        reconciler.refresh().await;
    }
    debug!("Push dispatcher stopped");
}
