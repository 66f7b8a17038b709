// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod actions;
pub mod app;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod focus;
pub mod model;
pub mod projection;
pub mod subscriptions;
pub mod vmix;
