pub mod inbox;
pub mod notification_hub;
pub mod notifications_api;
pub mod reconciler;
pub mod session;

pub use inbox::NotificationInbox;
pub use notification_hub::NotificationHub;
pub use notifications_api::{HttpNotificationsApi, NotificationsApi};
pub use reconciler::UnreadReconciler;
pub use session::Session;
