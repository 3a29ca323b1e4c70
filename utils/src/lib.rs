//! # Field Engineer Utilities
//!
//! Identifier helpers shared by the storage and HTTP crates.
//!
//! - [`sid`]: GUID to database security-identifier literal encoding
//! - [`generate_id`] / [`generate_version`]: server-assigned record identity
//!   and opaque version tokens

pub mod sid;

pub use sid::{id_to_sid, sid_to_id};

use uuid::Uuid;

/// Generate a new record identifier (hyphenated UUID v4).
///
/// # Examples
///
/// ```
/// let id = utils::generate_id();
/// assert_eq!(id.len(), 36);
/// ```
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate an opaque version token.
///
/// Tokens are compared for equality only; their content carries no meaning.
#[must_use]
pub fn generate_version() -> String {
    hex::encode(Uuid::new_v4().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_valid_uuid() {
        let id = generate_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_generate_version_is_unique() {
        let a = generate_version();
        let b = generate_version();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
