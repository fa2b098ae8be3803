//! Minimal access-token inspection.
//!
//! The relay only needs the `scope` claim, to tell a plain app password
//! (no DM access) apart from a privileged one. The signature is not
//! verified; the token came straight from the PDS over TLS.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::GatewayError;

/// Scope granted to app passwords created without DM privileges.
pub const APP_PASS_SCOPE: &str = "com.atproto.appPass";

#[derive(Debug, Deserialize)]
struct AccessClaims {
    #[serde(default)]
    scope: Option<String>,
}

/// Read the `scope` claim of a JWT without verifying it.
pub fn decode_scope(token: &str) -> Result<Option<String>, GatewayError> {
    let invalid = |reason: String| GatewayError::AuthFailed {
        reason: format!("malformed access token: {reason}"),
    };

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| invalid("missing payload segment".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| invalid(e.to_string()))?;
    let claims: AccessClaims = serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
    Ok(claims.scope)
}

/// Whether a token scope allows chat access.
pub fn scope_grants_chat(scope: Option<&str>) -> bool {
    scope != Some(APP_PASS_SCOPE)
}
