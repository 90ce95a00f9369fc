//! Scheduled-task inventory: domain model, source adapters, correlation.

pub mod correlate;
pub mod history;
pub mod model;
pub mod tasks;
