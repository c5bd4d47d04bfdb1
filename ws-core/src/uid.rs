//! Cluster-safe identifiers derived from human readable names.
//!
//! The same name always maps to the same uid, so the derived value is used both
//! to look up existing records and to name new ones.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{CoreError, Result};

/// Longest uid accepted by the cluster naming rules the uid ends up in.
pub const MAX_UID_LENGTH: usize = 30;

static INVALID_RUN_RE: OnceLock<Regex> = OnceLock::new();

fn invalid_run_regex() -> &'static Regex {
    INVALID_RUN_RE
        .get_or_init(|| Regex::new(r"[^a-zA-Z0-9-]+").expect("uid pattern is a valid regex"))
}

/// Derive a uid from `input`.
///
/// The input is lower-cased and every maximal run of characters outside
/// `[a-zA-Z0-9-]` is replaced by a single `-`. Results longer than
/// [`MAX_UID_LENGTH`] are rejected with [`CoreError::LengthExceeded`].
pub fn generate_uid(input: &str) -> Result<String> {
    let uid = invalid_run_regex().replace_all(input, "-").to_lowercase();

    if uid.len() > MAX_UID_LENGTH {
        return Err(CoreError::LengthExceeded {
            uid,
            max: MAX_UID_LENGTH,
        });
    }

    Ok(uid)
}
