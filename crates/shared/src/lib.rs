//! Shared types and utilities for the SkillSwap client and its test backends.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
