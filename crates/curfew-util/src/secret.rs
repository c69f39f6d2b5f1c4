//! Account credential wrapper

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of generated temporary secrets
pub const TEMPORARY_SECRET_LEN: usize = 12;

/// An account secret. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh single-use secret from a random v4 UUID.
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(raw[..TEMPORARY_SECRET_LEN].to_string())
    }

    /// The plain value. Only for handing to the backend or to an operator.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
