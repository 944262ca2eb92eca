//! Outbound channel senders and the dispatcher that routes notifications to them.
//!
//! Each sender consumes a per-recipient rate-limit unit before touching its
//! channel; the channel call itself goes through a [`DeliveryBackend`].

pub mod backend;
pub mod chat;
pub mod dispatcher;
pub mod email;
pub mod registry;
pub mod sender;
pub mod sms;
pub mod webhook;

pub use backend::{DeliveryBackend, HttpBackend, LogBackend};
pub use chat::ChatSender;
pub use dispatcher::Dispatcher;
pub use email::EmailSender;
pub use registry::{senders_from_config, ChannelSenders};
pub use sender::NotificationSender;
pub use sms::SmsSender;
pub use webhook::WebhookSender;
