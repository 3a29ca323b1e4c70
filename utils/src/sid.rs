//! Security-identifier encoding for managed identities.
//!
//! A managed identity is bound to a database login through its object id.
//! The database expects that id as the raw 16 GUID bytes in the platform's
//! canonical layout (first three groups little-endian, last eight bytes as
//! written), rendered as `0x` followed by one `\hh` group per byte.

use errors::IdentityError;
use uuid::Uuid;

const SID_PREFIX: &str = "0x";

/// Encode a textual GUID as a security-identifier literal.
///
/// Accepts the hyphenated, simple, braced and URN GUID forms.
///
/// # Examples
///
/// ```
/// let sid = utils::id_to_sid("00000000-0000-0000-0000-000000000001").unwrap();
/// assert_eq!(sid, r"0x\00\00\00\00\00\00\00\00\00\00\00\00\00\00\00\01");
/// ```
pub fn id_to_sid(id: &str) -> Result<String, IdentityError> {
    let guid = Uuid::parse_str(id.trim()).map_err(|e| IdentityError::InvalidIdentifier {
        value: id.to_string(),
        reason: e.to_string()
    })?;

    let bytes = guid.to_bytes_le();
    let mut sid = String::with_capacity(SID_PREFIX.len() + bytes.len() * 3);
    sid.push_str(SID_PREFIX);
    for byte in bytes {
        sid.push('\\');
        sid.push_str(&hex::encode([byte]));
    }
    Ok(sid)
}

/// Decode a security-identifier literal back into its GUID.
pub fn sid_to_id(sid: &str) -> Result<Uuid, IdentityError> {
    let invalid = |reason: &str| IdentityError::InvalidSid {
        value: sid.to_string(),
        reason: reason.to_string()
    };

    let body = sid
        .strip_prefix(SID_PREFIX)
        .ok_or_else(|| invalid("missing 0x prefix"))?;
    let body = body
        .strip_prefix('\\')
        .ok_or_else(|| invalid("missing byte separator"))?;

    let mut bytes = [0u8; 16];
    let mut count = 0;
    for group in body.split('\\') {
        if count == bytes.len() {
            return Err(invalid("more than 16 bytes"));
        }
        let decoded = hex::decode(group).map_err(|e| invalid(&e.to_string()))?;
        match decoded.as_slice() {
            [byte] => bytes[count] = *byte,
            _ => return Err(invalid("each group must be exactly two hex digits"))
        }
        count += 1;
    }
    if count != bytes.len() {
        return Err(invalid("fewer than 16 bytes"));
    }

    Ok(Uuid::from_bytes_le(bytes))
}
