//! Pod and container ID generation and validation.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{CorralError, CorralResult};

/// Maximum length of an entity ID.
pub const MAX_ID_LENGTH: usize = 64;

/// Generate a random 64-character lowercase hex string.
fn random_hex_id() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    hex::encode(bytes)
}

/// Check an ID against the shared format rules.
///
/// IDs must be 1-64 characters, contain only alphanumerics, hyphens and
/// underscores, and start with an alphanumeric character.
fn is_valid_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_ID_LENGTH {
        return false;
    }

    let mut chars = id.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an ID, validating the format.
            ///
            /// # Errors
            ///
            /// Returns an error if the ID format is invalid.
            pub fn new(id: impl Into<String>) -> CorralResult<Self> {
                let id = id.into();
                if !is_valid_id(&id) {
                    return Err(CorralError::invalid_argument(format!(
                        "invalid {} ID {:?}: IDs must be 1-64 alphanumeric, '-' or '_' characters",
                        $kind, id
                    )));
                }
                Ok(Self(id))
            }

            /// Generate a new random 64-character hex ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(random_hex_id())
            }

            /// Get the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a short version of the ID (first 12 characters).
            #[must_use]
            pub fn short(&self) -> &str {
                if self.0.len() <= 12 {
                    &self.0
                } else {
                    &self.0[..12]
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CorralError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CorralError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

entity_id!(
    /// A validated pod ID.
    PodId,
    "pod"
);

entity_id!(
    /// A validated container ID.
    ContainerId,
    "container"
);
