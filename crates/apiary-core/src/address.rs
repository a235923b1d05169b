//! Email address validation for membership operations.
//!
//! Addresses are validated before any remote call is made; an invalid
//! address fails that item without aborting the rest of a batch.

/// Check that `address` is a well-formed email: one `@`, a non-empty local
/// part, and a dotted domain without whitespace.
pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    if domain.contains('@') || !domain.contains('.') {
        return false;
    }
    // No empty labels: "a@b." and "a@.b" are malformed.
    domain.split('.').all(|label| !label.is_empty())
}
