/// Cached notification list backing the inbox view and the badge dropdown
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::Notification;
use crate::services::NotificationsApi;

pub struct NotificationInbox {
    api: Arc<dyn NotificationsApi>,
    items: watch::Sender<Vec<Notification>>,
    capacity: usize,
}

impl NotificationInbox {
    pub fn new(api: Arc<dyn NotificationsApi>, capacity: usize) -> Self {
        let (items, _) = watch::channel(Vec::new());
        Self {
            api,
            items,
            capacity: capacity.max(1),
        }
    }

    /// Replace the cache with the backend's list.
    ///
    /// On failure the previously cached list stays visible.
    pub async fn load(&self) -> Result<usize> {
        match self.api.list().await {
            Ok(mut notifications) => {
                notifications.truncate(self.capacity);
                let len = notifications.len();
                self.items.send_replace(notifications);
                debug!("Loaded {} notifications", len);
                Ok(len)
            }
            Err(e) => {
                warn!("Failed to load notifications: {}", e);
                Err(e)
            }
        }
    }

    /// Newest first; the oldest entry falls off once the inbox is full
    pub fn record_push(&self, notification: Notification) {
        let capacity = self.capacity;
        self.items.send_modify(|items| {
            items.insert(0, notification);
            items.truncate(capacity);
        });
    }

    pub fn mark_read_local(&self, id: &str) {
        self.items.send_if_modified(|items| {
            let mut changed = false;
            for n in items.iter_mut().filter(|n| n.id == id && !n.read) {
                n.read = true;
                changed = true;
            }
            changed
        });
    }

    pub fn mark_all_read_local(&self) {
        self.items.send_if_modified(|items| {
            let mut changed = false;
            for n in items.iter_mut().filter(|n| !n.read) {
                n.read = true;
                changed = true;
            }
            changed
        });
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.items.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.items.subscribe()
    }
}
