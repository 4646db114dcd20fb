//! Missionbox - file-coordinated mission queue for autonomous agent loops

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod notify;
pub mod queue;
pub mod signals;
pub mod store;
pub mod subprocess;
pub mod telemetry;
