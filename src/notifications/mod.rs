pub mod encryption;
pub mod format;
pub mod models;
pub mod senders;
pub mod service;
