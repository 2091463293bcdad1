pub mod config;
pub mod mailer;
pub mod scheduler;
pub mod server;
pub mod store;
