//! Command implementations

pub mod aliases;
pub mod maintain;
pub mod setup;
pub mod version;
