// Library for tests to access modules

pub mod collector;
pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod log_monitor;
pub mod models;
pub mod observers;
pub mod routes;
pub mod sanitize;
pub mod telemetry;
pub mod version;
