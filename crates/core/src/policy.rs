//! Domain allow/block rules and policy modes.
//!
//! Rules are host suffixes matched on a dot boundary: `python.org` matches
//! `docs.python.org` but not `evilpython.org`. A block match always wins; a
//! non-empty allow list turns the default from permit to deny.
//!
//! Policy modes gate *when* rules are required rather than what they allow:
//! - `strict` requires a non-empty allow list and forbids browser profile reuse
//! - `permissive` is the only mode that allows automatic HTTP→browser escalation
//! - `standard` imposes neither constraint

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCode, ErrorDetails};

/// Allow and block host suffix sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRules {
    pub allow: Vec<String>,
    pub block: Vec<String>,
}

impl DomainRules {
    pub fn new<A, B>(allow: A, block: B) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            block: block.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.block.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    #[default]
    Standard,
    Strict,
    Permissive,
}

impl PolicyMode {
    pub fn requires_allow_list(self) -> bool {
        self == PolicyMode::Strict
    }

    pub fn allows_profile_reuse(self) -> bool {
        self != PolicyMode::Strict
    }

    pub fn allows_escalation(self) -> bool {
        self == PolicyMode::Permissive
    }
}

/// How robots.txt verdicts are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RobotsStance {
    /// Proceed on a disallow, but attach a warning.
    #[default]
    Warn,
    /// Refuse disallowed paths.
    Respect,
    /// Never fetch robots.txt.
    Ignore,
}

pub fn normalize_host(host: &str) -> String {
    host.trim().trim_matches('.').to_lowercase()
}

/// Normalized host of a URL, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = normalize_host(parsed.host_str()?);
    if host.is_empty() { None } else { Some(host) }
}

/// Exact host or dot-boundary suffix match.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let domain = normalize_host(domain);
    if domain.is_empty() {
        return false;
    }
    host == domain || host.strip_suffix(domain.as_str()).is_some_and(|prefix| prefix.ends_with('.'))
}

/// Evaluate `rules` against the host of `url`. URLs without a host are denied.
pub fn is_allowed(url: &str, rules: &DomainRules) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };

    if rules.block.iter().any(|d| host_matches_domain(&host, d)) {
        return false;
    }
    if !rules.allow.is_empty() {
        return rules.allow.iter().any(|d| host_matches_domain(&host, d));
    }
    true
}

pub fn filter_urls<'a, I>(urls: I, rules: &DomainRules) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    urls.into_iter()
        .filter(|u| is_allowed(u, rules))
        .map(str::to_string)
        .collect()
}

/// Pre-flight policy checks run before any network operation.
#[derive(Debug, Clone, Default)]
pub struct PolicyGate {
    pub rules: DomainRules,
    pub mode: PolicyMode,
}

impl PolicyGate {
    pub fn new(rules: DomainRules, mode: PolicyMode) -> Self {
        Self { rules, mode }
    }

    /// Check that `operation` may touch `url` at all.
    pub fn check_url(&self, url: &str, operation: &str) -> Result<(), Error> {
        if self.mode.requires_allow_list() && self.rules.allow.is_empty() {
            return Err(Error::new(
                ErrorCode::PolicyViolation,
                format!("strict policy requires an allow-domain rule for network {operation}"),
            ));
        }
        if !self.rules.is_empty() && !is_allowed(url, &self.rules) {
            return Err(
                Error::new(ErrorCode::DomainBlocked, "URL blocked by domain rules").with_details(ErrorDetails::for_url(url))
            );
        }
        Ok(())
    }

    pub fn check_escalation(&self) -> Result<(), Error> {
        if self.mode.allows_escalation() {
            Ok(())
        } else {
            Err(Error::new(ErrorCode::PolicyViolation, "auto browser escalation requires the permissive policy"))
        }
    }

    pub fn check_profile(&self, uses_profile: bool) -> Result<(), Error> {
        if uses_profile && !self.mode.allows_profile_reuse() {
            return Err(Error::new(ErrorCode::PolicyViolation, "strict policy forbids browser profile reuse"));
        }
        Ok(())
    }
}
