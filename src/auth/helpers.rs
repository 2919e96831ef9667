use chrono::Utc;

use super::{AuthContext, TokenGenerator, parse_token};
use crate::error::{Error, Result};
use crate::store::Store;

/// Extracts the token from an `Authorization: Bearer` header.
/// Returns `None` when the header is absent and an error for any other scheme.
pub fn extract_bearer_token(auth_header: Option<&str>) -> Result<Option<String>> {
    match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(Error::Unauthorized),
        None => Ok(None),
    }
}

/// Resolves a raw session token to the caller it belongs to.
///
/// Expired sessions are deleted on sight. A session whose user no longer
/// exists is treated as invalid.
pub fn authenticate(
    store: &dyn Store,
    tokens: &TokenGenerator,
    raw_token: &str,
) -> Result<AuthContext> {
    let (lookup, _secret) = parse_token(raw_token)?;

    let session = store
        .get_session_by_lookup(&lookup)?
        .ok_or(Error::Unauthorized)?;

    if !tokens.verify(raw_token, &session.token_hash)? {
        return Err(Error::Unauthorized);
    }

    if session.expires_at <= Utc::now() {
        if let Err(e) = store.delete_session(&session.id) {
            tracing::warn!("Failed to delete expired session: {e}");
        }
        return Err(Error::TokenExpired);
    }

    let user = store
        .get_user(&session.username)?
        .ok_or(Error::Unauthorized)?;

    Ok(AuthContext { user, session })
}
