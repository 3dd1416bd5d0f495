//! Preference ordering over domain suffixes.

use std::collections::HashMap;

use crate::attributes::is_sentinel;

use super::Side;

/// Default ordering, most preferred first.
pub const DEFAULT_SUFFIXES: &[&str] = &["com", "io", "ai", "net", "org", "co", "tech", "biz"];

/// Maps a domain suffix (`com`, `io`, ...) to a priority. Lower is better.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRank {
    ranks: HashMap<String, u32>,
}

impl Default for DomainRank {
    fn default() -> Self {
        Self::from_ordered(DEFAULT_SUFFIXES.iter().copied())
    }
}

impl DomainRank {
    /// Build from suffixes in preference order; the first gets rank 1.
    ///
    /// Leading dots are ignored, so `.com` and `com` are the same entry.
    /// A repeated suffix keeps its first (better) rank.
    pub fn from_ordered<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranks = HashMap::new();
        let mut next = 1;
        for suffix in suffixes {
            let key = suffix.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
            if key.is_empty() || ranks.contains_key(&key) {
                continue;
            }
            ranks.insert(key, next);
            next += 1;
        }
        Self { ranks }
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Rank of a domain, URL, or email address; `None` when unranked.
    pub fn rank_of(&self, domain: &str) -> Option<u32> {
        let suffix = suffix_of(domain)?;
        self.ranks.get(&suffix).copied()
    }

    /// The side whose domain ranks strictly better.
    ///
    /// Returns `None` unless both sides are ranked and the ranks differ.
    pub fn compare(&self, left: Option<&str>, right: Option<&str>) -> Option<Side> {
        let left = self.rank_of(left?)?;
        let right = self.rank_of(right?)?;
        match left.cmp(&right) {
            std::cmp::Ordering::Less => Some(Side::Left),
            std::cmp::Ordering::Greater => Some(Side::Right),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Last DNS label of a domain, URL host, or email domain, lowercased.
///
/// ```
/// use mergepilot::policy::domain_rank::suffix_of;
///
/// assert_eq!(suffix_of("acme.io").as_deref(), Some("io"));
/// assert_eq!(suffix_of("https://www.acme.com/about").as_deref(), Some("com"));
/// assert_eq!(suffix_of("bob@acme.net").as_deref(), Some("net"));
/// assert_eq!(suffix_of("--"), None);
/// ```
pub fn suffix_of(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if is_sentinel(raw) {
        return None;
    }

    let host = if let Some((_, domain)) = raw.rsplit_once('@') {
        domain.to_string()
    } else if raw.contains("://") {
        url::Url::parse(raw).ok()?.host_str()?.to_string()
    } else {
        // Bare "acme.com/path" or "acme.com:8080"
        let end = raw.find(['/', ':', '?', '#']).unwrap_or(raw.len());
        raw[..end].to_string()
    };

    let host = host.trim_end_matches('.');
    let (_, label) = host.rsplit_once('.')?;
    if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(label.to_ascii_lowercase())
}
