//! Subcommand implementations

pub mod encode;
pub mod predict;
