//! Injection defense for user-supplied identifiers and search filters.
//!
//! Two independent mechanisms are used: raw login identifiers are *rejected* when they
//! contain filter metacharacters, and every value interpolated into a generated filter is
//! *escaped* regardless of where it came from.

use std::borrow::Cow;

use dirauth_core::{Error, Result};
use tracing::warn;

use crate::dn::DistinguishedName;

/// Longest identifier accepted, in characters.
pub const MAX_IDENTIFIER_LEN: usize = 256;

const FORBIDDEN_IDENTIFIER_CHARS: &[char] = &['*', '(', ')', '\\', '\0'];

/// Rejects identifiers that can never be a legitimate login name.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the identifier is empty, longer than
/// [`MAX_IDENTIFIER_LEN`] characters, or contains `*`, `(`, `)`, `\` or NUL.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(Error::InvalidInput("identifier cannot be empty".to_string()));
    }

    if identifier.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "identifier exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }

    if identifier.contains(FORBIDDEN_IDENTIFIER_CHARS) {
        return Err(Error::InvalidInput(
            "identifier contains forbidden characters".to_string(),
        ));
    }

    Ok(())
}

/// Returns true if `dn` looks like a full DN: at least two `attribute=value` components.
#[must_use]
pub fn is_valid_dn(dn: &str) -> bool {
    if !dn.contains('=') || !dn.contains(',') {
        return false;
    }

    DistinguishedName::parse(dn).is_ok_and(|parsed| parsed.len() >= 2)
}

/// Escapes a value for use inside an LDAP search filter (RFC 4515).
///
/// Values without metacharacters are returned borrowed and unchanged. When escaping
/// changes the value, an audit record is written since legitimate input rarely carries
/// filter syntax.
#[must_use]
pub fn escape_filter_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['*', '(', ')', '\\', '\0']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }

    warn!(
        target: "dirauth::audit",
        original = %value.escape_debug(),
        escaped = %escaped,
        "filter value contained metacharacters, possible injection attempt"
    );
    Cow::Owned(escaped)
}
