pub mod mailer;
pub mod outbox;
pub mod producer;
pub mod templates;
pub mod worker;

pub use mailer::{mailer_from_config, LogMailer, Mailer, WebhookMailer};
pub use producer::NotificationDispatcher;
pub use worker::NotificationWorker;
