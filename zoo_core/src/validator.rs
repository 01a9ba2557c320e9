//! Pure syntax checks for profile fields.
//!
//! Nothing in here touches state; [`ProfileDraft::validate`](crate::storage::ProfileDraft::validate)
//! runs these before the store is allowed to persist anything.

use once_cell::sync::Lazy;
use regex::Regex;

static HOST_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9._-]+):([0-9]{1,5})$").expect("host:port pattern compiles")
});

static ACL_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+:[^:\s]+:[^:\s]+$").expect("acl pattern compiles")
});

/// `true` iff `s` is `host:port` with a non-empty host and a port in `0..=65535`.
///
/// Hosts are DNS names or IPv4 literals (`[A-Za-z0-9._-]`); bracketed IPv6
/// literals are not accepted.
pub fn validate_host_port(s: &str) -> bool {
    split_host_port(s).is_some()
}

/// Splits a well-formed `host:port` string. Returns `None` for anything
/// [`validate_host_port`] would reject.
pub fn split_host_port(s: &str) -> Option<(&str, u16)> {
    let caps = HOST_PORT.captures(s)?;
    let host = caps.get(1)?.as_str();
    let port = caps.get(2)?.as_str().parse::<u16>().ok()?;
    Some((host, port))
}

pub fn validate_non_empty(s: &str) -> bool {
    !s.trim().is_empty()
}

/// Checks a single `scheme:id:permissions` entry.
pub fn validate_acl_entry(entry: &str) -> bool {
    ACL_ENTRY.is_match(entry)
}

/// Checks multi-line ACL text. Blank lines are ignored and an empty text is
/// valid (no ACLs configured).
pub fn validate_acl(text: &str) -> bool {
    acl_lines(text).all(validate_acl_entry)
}

/// Parses ACL text into its ordered list of entries, or `None` if any
/// non-empty line is malformed.
pub fn parse_acl(text: &str) -> Option<Vec<String>> {
    acl_lines(text)
        .map(|line| validate_acl_entry(line).then(|| line.to_string()))
        .collect()
}

fn acl_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}
