//! Shared building blocks for the workspace orchestrator: identifier derivation,
//! field validation and the core error type.

pub mod error;
pub mod uid;
pub mod validation;

pub use error::{CoreError, Result};
pub use uid::{generate_uid, MAX_UID_LENGTH};
