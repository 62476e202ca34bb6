//! Search filter builders.
//!
//! Callers pass values that have already gone through
//! [`escape_filter_value`](crate::sanitize::escape_filter_value); the builders only
//! assemble filter structure.

/// Filter matching every entry, used for base-scope reads.
pub const MATCH_ALL: &str = "(objectClass=*)";

/// `(<attribute>=<value>)`, ANDed with `extra` when present.
#[must_use]
pub fn user_filter(attribute: &str, escaped_value: &str, extra: Option<&str>) -> String {
    and_with_extra(format!("({attribute}={escaped_value})"), extra)
}

/// Forward-link membership filter for `member` and `uniqueMember`, ANDed with `extra`.
#[must_use]
pub fn member_filter(escaped_dn: &str, extra: Option<&str>) -> String {
    and_with_extra(
        format!("(|(member={escaped_dn})(uniqueMember={escaped_dn}))"),
        extra,
    )
}

fn and_with_extra(filter: String, extra: Option<&str>) -> String {
    match extra.map(str::trim).filter(|extra| !extra.is_empty()) {
        Some(extra) if extra.starts_with('(') => format!("(&{filter}{extra})"),
        Some(extra) => format!("(&{filter}({extra}))"),
        None => filter,
    }
}
