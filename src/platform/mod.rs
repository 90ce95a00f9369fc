//! Platform abstraction: OS task scheduler and event log collaborators.

pub mod pal;
pub mod windows;
