//! Command implementations behind the clap surface.

pub mod get;
pub mod search;
