use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    LengthExceeded { uid: String, max: usize },
    Validation(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            CoreError::LengthExceeded { uid, max } => write!(
                f,
                "Length of '{}' exceeds {} characters, invalid for cluster resource names",
                uid, max
            ),
            CoreError::Validation(s) => write!(f, "Validation error: {}", s),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
