//! Outgoing request header assembly.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorDetails};

pub const DEFAULT_ACCEPT: &str = "text/html,*/*";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Headers callers may never set: credentials don't belong in a shared cache key.
pub const RESTRICTED_HEADERS: [&str; 3] = ["authorization", "cookie", "set-cookie"];

pub fn is_restricted(name: &str) -> bool {
    let name = name.trim().to_ascii_lowercase();
    RESTRICTED_HEADERS.contains(&name.as_str())
}

/// Default headers overlaid with `extra`. Names are lower-cased.
///
/// # Errors
///
/// `invalid_usage` when `extra` names a restricted header or an empty name.
pub fn build_request_headers(user_agent: &str, extra: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, Error> {
    let mut headers = BTreeMap::from([
        ("accept".to_string(), DEFAULT_ACCEPT.to_string()),
        ("accept-language".to_string(), DEFAULT_ACCEPT_LANGUAGE.to_string()),
        ("user-agent".to_string(), user_agent.to_string()),
    ]);

    for (name, value) in extra {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(Error::invalid_usage("header name must not be empty"));
        }
        if is_restricted(&key) {
            return Err(Error::invalid_usage(format!("refusing to set restricted header: {name}"))
                .with_details(ErrorDetails { reason: Some("restricted_header".into()), ..Default::default() }));
        }
        headers.insert(key, value.trim().to_string());
    }

    Ok(headers)
}
