pub mod config;
pub mod error;
pub mod event_bus;
pub mod lock;
pub mod queue;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{NotifyError, NotifyResult};
pub use types::{Channel, Notification, NotificationId, NotificationState, SendJob};
