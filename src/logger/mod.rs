//! Diagnostic logging: size-rotated human-readable log with stderr degradation.

pub mod diagnostic;

pub use diagnostic::{DiagnosticLogger, Level, LogConfig};
