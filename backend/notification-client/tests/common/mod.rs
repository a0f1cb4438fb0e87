//! Shared fakes for notification-client integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use notification_client::models::Notification;
use notification_client::{AppError, NotificationsApi, PushChannel, PushTransport, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;

/// In-memory stand-in for the backend: holds the authoritative unread count
#[derive(Default)]
pub struct FakeBackend {
    pub unread: Mutex<u64>,
    pub notifications: Mutex<Vec<Notification>>,
    pub fail: AtomicBool,
    pub stall: AtomicBool,
    pub unread_calls: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
    pub mark_all_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn with_unread(count: u64) -> Arc<Self> {
        let backend = FakeBackend::default();
        *backend.unread.lock() = count;
        Arc::new(backend)
    }

    pub fn set_unread(&self, count: u64) {
        *self.unread.lock() = count;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Unread-count requests from now on never get an answer
    pub fn set_stalled(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(AppError::Status {
                status: 503,
                body: "backend unavailable".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationsApi for FakeBackend {
    async fn unread_count(&self) -> Result<u64> {
        self.unread_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check()?;
        Ok(*self.unread.lock())
    }

    async fn list(&self) -> Result<Vec<Notification>> {
        self.check()?;
        Ok(self.notifications.lock().clone())
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut notifications = self.notifications.lock();
        if let Some(n) = notifications.iter_mut().find(|n| n.id == id && !n.read) {
            n.read = true;
        }
        let mut unread = self.unread.lock();
        *unread = unread.saturating_sub(1);
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.mark_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        for n in self.notifications.lock().iter_mut() {
            n.read = true;
        }
        *self.unread.lock() = 0;
        Ok(())
    }
}

/// Backend whose unread-count responses are released by the test, in any order
#[derive(Default)]
pub struct GatedBackend {
    pending: Mutex<Vec<oneshot::Sender<u64>>>,
    arrived: Notify,
}

impl GatedBackend {
    /// Wait until `n` unread-count requests are in flight
    pub async fn wait_for_pending(&self, n: usize) {
        loop {
            let notified = self.arrived.notified();
            if self.pending.lock().len() >= n {
                return;
            }
            notified.await;
        }
    }

    /// Answer the `index`-th request (in issue order) with `count`
    pub fn respond(&self, index: usize, count: u64) {
        let mut pending = self.pending.lock();
        let (tx, _) = oneshot::channel();
        let sender = std::mem::replace(&mut pending[index], tx);
        let _ = sender.send(count);
    }
}

#[async_trait]
impl NotificationsApi for GatedBackend {
    async fn unread_count(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push(tx);
        self.arrived.notify_waiters();
        rx.await
            .map_err(|_| AppError::Http("request abandoned".into()))
    }

    async fn list(&self) -> Result<Vec<Notification>> {
        Ok(vec![])
    }

    async fn mark_read(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        Ok(())
    }
}

enum OpenOutcome {
    Accept,
    Refuse,
}

/// Push transport whose connections are driven by the test
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<OpenOutcome>>,
    live: Mutex<Option<mpsc::UnboundedSender<Result<String>>>>,
    pub attempts: Mutex<Vec<Instant>>,
    pub bearers: Mutex<Vec<Option<String>>>,
    pub open_channels: Arc<AtomicUsize>,
    pub closed_channels: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` connection attempts fail
    pub fn refuse_next(&self, n: usize) {
        let mut script = self.script.lock();
        for _ in 0..n {
            script.push_back(OpenOutcome::Refuse);
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    /// Deliver a raw payload on the live connection
    pub fn push(&self, payload: &str) {
        if let Some(tx) = self.live.lock().as_ref() {
            let _ = tx.send(Ok(payload.to_string()));
        }
    }

    pub fn push_notification(&self, id: &str, read: bool) {
        let payload = serde_json::json!({
            "id": id,
            "title": "Receipt update",
            "message": format!("Notification {}", id),
            "read": read,
            "createdAt": "2024-05-01T10:00:00Z",
        });
        self.push(&payload.to_string());
    }

    /// Simulate the server or network dropping the connection
    pub fn drop_connection(&self) {
        self.live.lock().take();
    }

    /// Simulate a broker ERROR frame
    pub fn fail_connection(&self, reason: &str) {
        if let Some(tx) = self.live.lock().take() {
            let _ = tx.send(Err(AppError::Broker(reason.to_string())));
        }
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn open(&self, bearer: Option<String>) -> Result<Box<dyn PushChannel>> {
        self.attempts.lock().push(Instant::now());
        self.bearers.lock().push(bearer);

        if let Some(OpenOutcome::Refuse) = self.script.lock().pop_front() {
            return Err(AppError::Transport("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock() = Some(tx);
        self.open_channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeChannel {
            rx,
            open_channels: self.open_channels.clone(),
            closed_channels: self.closed_channels.clone(),
        }))
    }
}

struct FakeChannel {
    rx: mpsc::UnboundedReceiver<Result<String>>,
    open_channels: Arc<AtomicUsize>,
    closed_channels: Arc<AtomicUsize>,
}

#[async_trait]
impl PushChannel for FakeChannel {
    async fn next_payload(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closed_channels.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        self.open_channels.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn notification(id: &str, read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        title: "Receipt update".to_string(),
        message: format!("Notification {}", id),
        read,
        created_at: None,
        sender_name: None,
    }
}
