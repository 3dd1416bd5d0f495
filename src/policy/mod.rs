//! Record-selection policies.
//!
//! A policy looks at the attributes of both records in a duplicate pair and
//! returns a [`Verdict`]: merge with a chosen primary side, or reject the
//! pair outright. Policies are pure; the same inputs always give the same
//! verdict.
//!
//! One policy exists per entity type:
//!
//! - [`CompanyPolicy`]: contact count, then domain rank, then left.
//! - [`ContactPolicy`]: employee pre-filter, then email, then phone, then left.

mod company;
mod contact;
pub mod domain_rank;
pub mod email;

pub use company::CompanyPolicy;
pub use contact::{ContactPolicy, DEFAULT_EMPLOYEE_TYPE};
pub use domain_rank::DomainRank;
pub use email::{EmailKind, FreeEmailProviders};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::RecordAttributes;
use crate::config::PolicyConfig;

/// One side of a candidate pair, as laid out in the comparison view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rule that settled a merge decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    ContactCount,
    DomainRank,
    EmailPresence,
    BusinessEmail,
    EmailDomainRank,
    PhonePresence,
    DefaultLeft,
}

impl DecisionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContactCount => "contact_count",
            Self::DomainRank => "domain_rank",
            Self::EmailPresence => "email_presence",
            Self::BusinessEmail => "business_email",
            Self::EmailDomainRank => "email_domain_rank",
            Self::PhonePresence => "phone_presence",
            Self::DefaultLeft => "default_left",
        }
    }
}

impl fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which record survives, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub primary: Side,
    pub rule: DecisionRule,
}

impl MergeDecision {
    pub fn new(primary: Side, rule: DecisionRule) -> Self {
        Self { primary, rule }
    }

    /// Fallback when no signal separates the two records.
    pub fn default_left() -> Self {
        Self::new(Side::Left, DecisionRule::DefaultLeft)
    }

    /// True when no signal was decisive and the choice is the fallback.
    pub fn is_ambiguous(&self) -> bool {
        self.rule == DecisionRule::DefaultLeft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Neither contact carries the configured employee type.
    NotCompanyEmployee,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCompanyEmployee => f.write_str("neither record is a company employee"),
        }
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Merge(MergeDecision),
    Reject { reason: RejectReason },
}

/// Entity type whose duplicates are being reviewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Company,
    Contact,
}

/// How large a contact-count difference must be to settle a company merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CountRule {
    /// Any strict majority is decisive.
    #[default]
    Strict,
    /// The larger count must exceed the smaller by more than 50%.
    Margin,
}

impl CountRule {
    /// The side whose count is decisively larger, if any.
    pub fn winner(self, left: u32, right: u32) -> Option<Side> {
        let (side, high, low) = match left.cmp(&right) {
            std::cmp::Ordering::Greater => (Side::Left, left, right),
            std::cmp::Ordering::Less => (Side::Right, right, left),
            std::cmp::Ordering::Equal => return None,
        };
        match self {
            Self::Strict => Some(side),
            Self::Margin => (u64::from(high) * 2 > u64::from(low) * 3).then_some(side),
        }
    }
}

/// A record-selection rule set for one entity type.
pub trait MergePolicy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Decide the fate of a pair.
    fn decide(&self, left: &RecordAttributes, right: &RecordAttributes) -> Verdict;
}

/// Build the policy selected by configuration.
pub fn from_config(config: &PolicyConfig) -> Box<dyn MergePolicy> {
    let ranks = config.domain_rank();
    match config.entity {
        EntityKind::Company => Box::new(CompanyPolicy::new(config.count_rule, ranks)),
        EntityKind::Contact => Box::new(ContactPolicy::new(
            ranks,
            config.free_providers(),
            config.employee_type.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_count_rule() {
        assert_eq!(CountRule::Strict.winner(3, 2), Some(Side::Left));
        assert_eq!(CountRule::Strict.winner(2, 3), Some(Side::Right));
        assert_eq!(CountRule::Strict.winner(4, 4), None);
    }

    #[test]
    fn test_margin_count_rule() {
        // 14 is only 40% above 10
        assert_eq!(CountRule::Margin.winner(10, 14), None);
        // exactly 50% is not enough
        assert_eq!(CountRule::Margin.winner(10, 15), None);
        assert_eq!(CountRule::Margin.winner(10, 16), Some(Side::Right));
        assert_eq!(CountRule::Margin.winner(1, 0), Some(Side::Left));
        assert_eq!(CountRule::Margin.winner(u32::MAX, u32::MAX - 1), None);
    }

    #[test]
    fn test_default_left_is_ambiguous() {
        assert!(MergeDecision::default_left().is_ambiguous());
        assert!(!MergeDecision::new(Side::Left, DecisionRule::ContactCount).is_ambiguous());
    }

    #[test]
    fn test_from_config_selects_profile() {
        let mut config = PolicyConfig::default();
        assert_eq!(from_config(&config).name(), "company");
        config.entity = EntityKind::Contact;
        assert_eq!(from_config(&config).name(), "contact");
    }
}
