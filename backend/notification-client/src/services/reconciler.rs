/// Unread-count reconciler
///
/// Owns the single unread counter shared by every consumer (badge, list).
/// Three event sources mutate it:
/// 1. `refresh()`: authoritative value from the backend
/// 2. `increment_on_push()`: optimistic +1 for an unread push
/// 3. `mark_read()` / `mark_all_read()`: optimistic -1 / reset after the backend call
///
/// Every write carries a sequence number. A refresh response is applied only if
/// no newer write has landed since its request was issued, so a slow response
/// can never roll the counter back to older data.
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::Notification;
use crate::services::NotificationsApi;

pub struct UnreadReconciler {
    api: Arc<dyn NotificationsApi>,
    count: watch::Sender<u64>,
    /// Last sequence number handed out
    issued: AtomicU64,
    /// Sequence number of the write currently reflected in `count`
    applied: Mutex<u64>,
}

impl UnreadReconciler {
    pub fn new(api: Arc<dyn NotificationsApi>) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            api,
            count,
            issued: AtomicU64::new(0),
            applied: Mutex::new(0),
        }
    }

    /// Current local value
    pub fn current(&self) -> u64 {
        *self.count.borrow()
    }

    /// Observe the counter; receivers see every committed change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.count.subscribe()
    }

    fn next_seq(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the local value with the server's count.
    ///
    /// Returns the value visible after the call. On failure the previous value
    /// is kept.
    pub async fn refresh(&self) -> u64 {
        let seq = self.next_seq();

        match self.api.unread_count().await {
            Ok(count) => {
                let mut applied = self.applied.lock();
                if seq > *applied {
                    *applied = seq;
                    self.count.send_replace(count);
                } else {
                    debug!(
                        "Discarding stale unread count {} (request #{}, last applied #{})",
                        count, seq, *applied
                    );
                }
            }
            Err(e) => {
                warn!("Failed to refresh unread count: {}", e);
            }
        }

        self.current()
    }

    /// Optimistic bump for a pushed notification; the caller follows up with `refresh()`.
    ///
    /// Returns whether the counter changed.
    pub fn increment_on_push(&self, notification: &Notification) -> bool {
        if notification.read {
            return false;
        }
        self.apply_local(|count| count.saturating_add(1));
        true
    }

    /// Mark one notification read on the backend, then adjust and confirm locally
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        if let Err(e) = self.api.mark_read(id).await {
            warn!("Failed to mark notification {} as read: {}", id, e);
            return Err(e);
        }

        self.apply_local(|count| count.saturating_sub(1));
        self.refresh().await;
        Ok(())
    }

    /// Mark everything read on the backend, then reset and confirm locally
    pub async fn mark_all_read(&self) -> Result<()> {
        if let Err(e) = self.api.mark_all_read().await {
            warn!("Failed to mark all notifications as read: {}", e);
            return Err(e);
        }

        self.apply_local(|_| 0);
        self.refresh().await;
        Ok(())
    }

    /// Local writes take their sequence number under the lock so they are
    /// never ordered behind a concurrent refresh that started later.
    fn apply_local<F>(&self, update: F)
    where
        F: FnOnce(u64) -> u64,
    {
        let mut applied = self.applied.lock();
        *applied = self.next_seq();
        self.count.send_modify(|count| *count = update(*count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;

    struct FixedApi {
        count: Mutex<std::result::Result<u64, AppError>>,
    }

    #[async_trait]
    impl NotificationsApi for FixedApi {
        async fn unread_count(&self) -> Result<u64> {
            self.count.lock().clone()
        }

        async fn list(&self) -> Result<Vec<Notification>> {
            Ok(vec![])
        }

        async fn mark_read(&self, _id: &str) -> Result<()> {
            self.count.lock().clone().map(|_| ())
        }

        async fn mark_all_read(&self) -> Result<()> {
            self.count.lock().clone().map(|_| ())
        }
    }

    fn notification(read: bool) -> Notification {
        Notification {
            id: "n".into(),
            title: "t".into(),
            message: "m".into(),
            read,
            created_at: None,
            sender_name: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_replaces_value() {
        let api = Arc::new(FixedApi {
            count: Mutex::new(Ok(3)),
        });
        let reconciler = UnreadReconciler::new(api);

        assert_eq!(reconciler.current(), 0);
        assert_eq!(reconciler.refresh().await, 3);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_value() {
        let api = Arc::new(FixedApi {
            count: Mutex::new(Ok(2)),
        });
        let reconciler = UnreadReconciler::new(api.clone());
        reconciler.refresh().await;

        *api.count.lock() = Err(AppError::Http("connection refused".into()));
        assert_eq!(reconciler.refresh().await, 2);
    }

    #[test]
    fn test_increment_only_for_unread() {
        let api = Arc::new(FixedApi {
            count: Mutex::new(Ok(0)),
        });
        let reconciler = UnreadReconciler::new(api);

        assert!(!reconciler.increment_on_push(&notification(true)));
        assert_eq!(reconciler.current(), 0);

        assert!(reconciler.increment_on_push(&notification(false)));
        assert_eq!(reconciler.current(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_failure_leaves_count() {
        let api = Arc::new(FixedApi {
            count: Mutex::new(Ok(4)),
        });
        let reconciler = UnreadReconciler::new(api.clone());
        reconciler.refresh().await;

        *api.count.lock() = Err(AppError::Status {
            status: 500,
            body: "boom".into(),
        });
        assert!(reconciler.mark_read("n-1").await.is_err());
        assert!(reconciler.mark_all_read().await.is_err());
        assert_eq!(reconciler.current(), 4);
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let api = Arc::new(FixedApi {
            count: Mutex::new(Ok(9)),
        });
        let reconciler = UnreadReconciler::new(api);
        let mut badge = reconciler.subscribe();

        reconciler.refresh().await;
        badge.changed().await.unwrap();
        assert_eq!(*badge.borrow_and_update(), 9);
    }
}
