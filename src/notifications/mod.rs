//! Outbound notifications: delivery attempts, provider client and dispatcher.

mod dispatcher;
mod models;
mod provider;
mod retry_policy;
mod store;
mod template;

#[cfg(test)]
pub(crate) use dispatcher::test_support;
pub use dispatcher::NotificationDispatcher;
pub use models::{NotificationAttempt, NotificationKind, NotificationStatus, NotificationTarget};
pub use provider::{DisabledNotificationProvider, HttpNotificationProvider, NotificationProvider};
pub use retry_policy::RetryPolicy;
pub use store::NotificationStore;
pub use template::{RenderedMessage, TemplateContext};
