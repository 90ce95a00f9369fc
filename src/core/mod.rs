//! Core types: errors, configuration, host identity.

pub mod config;
pub mod errors;
pub mod host;
