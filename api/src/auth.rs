//! Admin-level key check.
//!
//! The key is accepted from the `x-functions-key` header or the `code`
//! query parameter. A missing key is 401; a wrong key, or no key configured
//! on the server, is 403.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, Uri, request::Parts};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";
pub const FUNCTION_KEY_QUERY: &str = "code";

/// Key supplied by the caller, header first.
pub fn presented_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(key) = headers
        .get(FUNCTION_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }

    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == FUNCTION_KEY_QUERY)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Checks the caller's key against the configured admin key.
pub fn authorize(
    configured: Option<&str>,
    headers: &HeaderMap,
    uri: &Uri
) -> Result<(), ApiError> {
    let Some(presented) = presented_key(headers, uri) else {
        return Err(ApiError::Unauthorized);
    };
    match configured {
        Some(expected) if keys_match(expected, &presented) => Ok(()),
        Some(_) => Err(ApiError::Forbidden),
        None => {
            tracing::warn!("Admin request rejected: no admin key configured");
            Err(ApiError::Forbidden)
        }
    }
}

fn keys_match(expected: &str, presented: &str) -> bool {
    expected.len() == presented.len()
        && expected
            .bytes()
            .zip(presented.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Extractor that admits only callers holding the admin key.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

impl FromRequestParts<Arc<AppState>> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>
    ) -> Result<Self, Self::Rejection> {
        authorize(
            state.settings.admin.function_key.as_deref(),
            &parts.headers,
            &parts.uri
        )?;
        Ok(Self)
    }
}
