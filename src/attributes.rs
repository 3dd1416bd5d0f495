//! Parsed record attributes and the text parsing rules behind them.

use serde::{Deserialize, Serialize};

use crate::adapter::RawRecord;
use crate::error::PairError;
use crate::policy::Side;
use crate::policy::email::email_domain;

/// Placeholders the CRM renders for a field with no data.
const SENTINELS: &[&str] = &["--", "-", "—", "–", "n/a", "none", "null"];

/// True for empty text or a "no data" placeholder.
pub fn is_sentinel(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || SENTINELS.iter().any(|s| text.eq_ignore_ascii_case(s))
}

/// Attributes of one record, as used by the merge policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordAttributes {
    pub name: Option<String>,
    /// Associated contacts. `None` when the field is absent.
    pub contact_count: Option<u32>,
    pub domain: Option<String>,
    pub email: Option<String>,
    /// Whether a phone number is on file. `None` when the field is absent.
    pub phone: Option<bool>,
    pub contact_type: Option<String>,
}

impl RecordAttributes {
    /// Parse the text read from one side of the comparison view.
    ///
    /// Sentinel counts become zero. Counts that are neither a sentinel nor a
    /// number fail with [`PairError::ExtractionAmbiguous`].
    pub fn parse(side: Side, raw: &RawRecord) -> Result<Self, PairError> {
        let contact_count = match raw.contact_count.as_deref() {
            None => None,
            Some(text) => Some(parse_count(text).ok_or_else(|| PairError::ExtractionAmbiguous {
                side,
                field: "contact count",
                value: text.to_string(),
            })?),
        };

        Ok(Self {
            name: clean(raw.name.as_deref()),
            contact_count,
            domain: clean(raw.domain.as_deref()),
            email: clean(raw.email.as_deref()),
            phone: raw.phone.as_deref().map(has_phone_number),
            contact_type: clean(raw.contact_type.as_deref()),
        })
    }

    /// An address with a usable domain; placeholders and bare names do not count.
    pub fn has_email(&self) -> bool {
        self.email.as_deref().and_then(email_domain).is_some()
    }

    pub fn has_phone(&self) -> bool {
        self.phone.unwrap_or(false)
    }
}

/// Parse a rendered count such as `12`, `1,204` or `--`.
pub fn parse_count(text: &str) -> Option<u32> {
    let text = text.trim();
    if is_sentinel(text) {
        return Some(0);
    }
    let digits: String = text.chars().filter(|c| !matches!(c, ',' | '\u{a0}' | ' ')).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn clean(text: Option<&str>) -> Option<String> {
    let text = text?.trim();
    (!is_sentinel(text)).then(|| text.to_string())
}

fn has_phone_number(text: &str) -> bool {
    !is_sentinel(text) && text.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count(" 1,204 "), Some(1204));
        assert_eq!(parse_count("--"), Some(0));
        assert_eq!(parse_count(""), Some(0));
        assert_eq!(parse_count("12 contacts"), None);
        assert_eq!(parse_count("-3"), None);
        assert_eq!(parse_count("99999999999"), None);
    }

    #[test]
    fn test_parse_record() {
        let raw = RawRecord {
            name: Some(" Acme Inc ".into()),
            contact_count: Some("--".into()),
            domain: Some("--".into()),
            email: Some("".into()),
            phone: Some("+1 (555) 010-2000".into()),
            contact_type: None,
        };
        let attrs = RecordAttributes::parse(Side::Left, &raw).unwrap();
        assert_eq!(attrs.name.as_deref(), Some("Acme Inc"));
        assert_eq!(attrs.contact_count, Some(0));
        assert_eq!(attrs.domain, None);
        assert_eq!(attrs.email, None);
        assert_eq!(attrs.phone, Some(true));
        assert!(attrs.has_phone());
        assert!(!attrs.has_email());
    }

    #[test]
    fn test_malformed_email_is_not_an_email() {
        let raw = RawRecord {
            email: Some("n/a-address".into()),
            ..RawRecord::default()
        };
        let attrs = RecordAttributes::parse(Side::Left, &raw).unwrap();
        assert_eq!(attrs.email.as_deref(), Some("n/a-address"));
        assert!(!attrs.has_email());
    }

    #[test]
    fn test_parse_rejects_malformed_count() {
        let raw = RawRecord {
            contact_count: Some("loading…".into()),
            ..Default::default()
        };
        let err = RecordAttributes::parse(Side::Right, &raw).unwrap_err();
        assert!(matches!(
            err,
            PairError::ExtractionAmbiguous { side: Side::Right, field: "contact count", .. }
        ));
    }

    #[test]
    fn test_phone_sentinel_is_absent() {
        let raw = RawRecord {
            phone: Some("--".into()),
            ..Default::default()
        };
        let attrs = RecordAttributes::parse(Side::Left, &raw).unwrap();
        assert_eq!(attrs.phone, Some(false));
    }
}
