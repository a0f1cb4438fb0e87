/// Resilience patterns for long-lived client connections
///
/// This library provides:
/// - **Reconnect policy**: fixed-delay reconnection, retried forever
/// - **Timeout**: time limits on handshakes and other bounded waits
///
/// # Example: reconnect loop
///
/// ```rust,no_run
/// use resilience::ReconnectPolicy;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let policy = ReconnectPolicy::fixed(Duration::from_millis(5000));
///     let mut schedule = policy.schedule();
///
///     loop {
///         // try to connect here, break on success
///         tokio::time::sleep(schedule.next_delay()).await;
///     }
/// }
/// ```

pub mod reconnect;
pub mod timeout;

pub use reconnect::{ReconnectPolicy, ReconnectSchedule};
pub use timeout::{with_timeout_result, TimeoutError};
