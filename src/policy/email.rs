//! Email address classification.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::attributes::is_sentinel;

pub const DEFAULT_FREE_PROVIDERS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "msn.com",
    "yahoo.com",
    "ymail.com",
    "aol.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "protonmail.com",
    "proton.me",
    "mail.com",
    "gmx.com",
    "gmx.net",
    "zoho.com",
    "yandex.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    /// Consumer mailbox provider (gmail, outlook, ...).
    Free,
    /// Anything with a domain that is not a known free provider.
    Business,
    /// No address, or not shaped like one.
    Unknown,
}

/// Set of consumer email domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeEmailProviders {
    domains: HashSet<String>,
}

impl Default for FreeEmailProviders {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_PROVIDERS.iter().copied())
    }
}

impl FreeEmailProviders {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(&domain.to_ascii_lowercase())
    }

    pub fn classify(&self, email: Option<&str>) -> EmailKind {
        match email.and_then(email_domain) {
            Some(domain) if self.contains(domain) => EmailKind::Free,
            Some(_) => EmailKind::Business,
            None => EmailKind::Unknown,
        }
    }
}

/// Domain part of an email address, if it looks like one.
pub fn email_domain(email: &str) -> Option<&str> {
    let email = email.trim();
    if is_sentinel(email) {
        return None;
    }
    let (local, domain) = email.rsplit_once('@')?;
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') {
        return None;
    }
    Some(domain)
}
