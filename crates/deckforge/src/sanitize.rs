//! Helpers for sanitizing data before it enters tracing span attributes
//! or user-visible messages.
//!
//! Locators are user input and may embed credentials, either as URL userinfo
//! or as signed query parameters. These functions keep the parts useful for
//! debugging and mask the rest.

use std::path::Path;

/// Query parameter names whose values are masked.
const SENSITIVE_PARAMS: &[&str] = &[
    "token",
    "access_token",
    "auth",
    "key",
    "api_key",
    "apikey",
    "sig",
    "signature",
    "password",
    "secret",
];

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks userinfo and sensitive query values in a locator, and drops the
/// fragment.
///
/// - `https://user:pw@host/a` → `https://****@host/a`
/// - `https://host/v?id=1&token=abc` → `https://host/v?id=1&token=****`
/// - `https://host/a#t=30` → `https://host/a`
pub fn redact_locator(locator: &str) -> String {
    let without_fragment = match locator.find('#') {
        Some(pos) => &locator[..pos],
        None => locator,
    };

    let (base, query) = match without_fragment.find('?') {
        Some(pos) => (&without_fragment[..pos], Some(&without_fragment[pos + 1..])),
        None => (without_fragment, None),
    };

    let mut redacted = redact_userinfo(base);

    if let Some(query) = query {
        let params: Vec<String> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(redact_param)
            .collect();
        if !params.is_empty() {
            redacted.push('?');
            redacted.push_str(&params.join("&"));
        }
    }

    redacted
}

fn redact_userinfo(base: &str) -> String {
    if let Some(scheme_end) = base.find("://") {
        let after_scheme = &base[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        let authority = &after_scheme[..authority_end];
        if let Some(at_pos) = authority.rfind('@') {
            let scheme = &base[..scheme_end + 3];
            let rest = &after_scheme[at_pos + 1..];
            return format!("{}****@{}", scheme, rest);
        }
    }
    base.to_string()
}

fn redact_param(param: &str) -> String {
    match param.split_once('=') {
        Some((name, _)) if SENSITIVE_PARAMS.contains(&name.to_ascii_lowercase().as_str()) => {
            format!("{}=****", name)
        }
        _ => param.to_string(),
    }
}
