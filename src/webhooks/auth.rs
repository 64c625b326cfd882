//! Shared-secret verification for inbound webhooks.
//!
//! GitLab sends the configured secret verbatim in the `X-Gitlab-Token` header
//! (no HMAC signing). Verification is a constant-time equality check so that
//! timing differences don't leak how much of a guessed token matched.

use subtle::ConstantTimeEq;

/// Verifies the webhook token header against the configured secret.
///
/// Returns `true` only when the two values are byte-for-byte equal. The
/// comparison is constant-time in the token contents; only the length is
/// allowed to influence timing.
pub fn verify_token(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        return false;
    }
    provided.ct_eq(expected).into()
}
