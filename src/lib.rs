pub mod db;
pub mod diff;
pub mod monitoring;
pub mod notifications;
pub mod selector;
pub mod server;
pub mod web;
