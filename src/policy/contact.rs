use crate::attributes::RecordAttributes;

use super::{
    DecisionRule, DomainRank, EmailKind, FreeEmailProviders, MergeDecision, MergePolicy,
    RejectReason, Side, Verdict,
};
use super::email::email_domain;

pub const DEFAULT_EMPLOYEE_TYPE: &str = "Company Employee";

/// Contact merges.
///
/// Pairs where neither contact is a company employee are rejected. Otherwise
/// the record with an email wins, a business address beats a free one, and
/// two business addresses go by domain rank. Phone presence breaks the
/// remaining ties before falling back to left.
#[derive(Debug, Clone)]
pub struct ContactPolicy {
    ranks: DomainRank,
    free: FreeEmailProviders,
    employee_type: String,
}

impl Default for ContactPolicy {
    fn default() -> Self {
        Self::new(
            DomainRank::default(),
            FreeEmailProviders::default(),
            DEFAULT_EMPLOYEE_TYPE.to_string(),
        )
    }
}

impl ContactPolicy {
    pub fn new(ranks: DomainRank, free: FreeEmailProviders, employee_type: String) -> Self {
        Self {
            ranks,
            free,
            employee_type,
        }
    }

    fn is_employee(&self, record: &RecordAttributes) -> bool {
        record
            .contact_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(self.employee_type.trim()))
    }

    fn by_email(&self, left: &RecordAttributes, right: &RecordAttributes) -> Option<MergeDecision> {
        match (left.has_email(), right.has_email()) {
            (true, false) => return Some(MergeDecision::new(Side::Left, DecisionRule::EmailPresence)),
            (false, true) => return Some(MergeDecision::new(Side::Right, DecisionRule::EmailPresence)),
            (false, false) => return None,
            (true, true) => {}
        }

        let left_kind = self.free.classify(left.email.as_deref());
        let right_kind = self.free.classify(right.email.as_deref());
        match (left_kind, right_kind) {
            (EmailKind::Business, EmailKind::Free) => {
                Some(MergeDecision::new(Side::Left, DecisionRule::BusinessEmail))
            }
            (EmailKind::Free, EmailKind::Business) => {
                Some(MergeDecision::new(Side::Right, DecisionRule::BusinessEmail))
            }
            (EmailKind::Business, EmailKind::Business) => self
                .ranks
                .compare(
                    left.email.as_deref().and_then(email_domain),
                    right.email.as_deref().and_then(email_domain),
                )
                .map(|side| MergeDecision::new(side, DecisionRule::EmailDomainRank)),
            _ => None,
        }
    }

    fn by_phone(left: &RecordAttributes, right: &RecordAttributes) -> Option<MergeDecision> {
        match (left.has_phone(), right.has_phone()) {
            (true, false) => Some(MergeDecision::new(Side::Left, DecisionRule::PhonePresence)),
            (false, true) => Some(MergeDecision::new(Side::Right, DecisionRule::PhonePresence)),
            _ => None,
        }
    }
}

impl MergePolicy for ContactPolicy {
    fn name(&self) -> &'static str {
        "contact"
    }

    fn decide(&self, left: &RecordAttributes, right: &RecordAttributes) -> Verdict {
        if !self.is_employee(left) && !self.is_employee(right) {
            return Verdict::Reject {
                reason: RejectReason::NotCompanyEmployee,
            };
        }

        let decision = self
            .by_email(left, right)
            .or_else(|| Self::by_phone(left, right))
            .unwrap_or_else(MergeDecision::default_left);
        Verdict::Merge(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(email: Option<&str>, phone: bool) -> RecordAttributes {
        RecordAttributes {
            email: email.map(str::to_string),
            phone: Some(phone),
            contact_type: Some(DEFAULT_EMPLOYEE_TYPE.to_string()),
            ..Default::default()
        }
    }

    fn merged(verdict: Verdict) -> MergeDecision {
        match verdict {
            Verdict::Merge(decision) => decision,
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_when_neither_is_employee() {
        let policy = ContactPolicy::default();
        let left = RecordAttributes {
            contact_type: Some("Customer".into()),
            ..Default::default()
        };
        let right = RecordAttributes::default();
        assert_eq!(
            policy.decide(&left, &right),
            Verdict::Reject {
                reason: RejectReason::NotCompanyEmployee
            }
        );
    }

    #[test]
    fn test_one_employee_is_enough() {
        let policy = ContactPolicy::default();
        let left = RecordAttributes {
            contact_type: Some("company employee".into()),
            ..Default::default()
        };
        let right = RecordAttributes::default();
        assert_eq!(merged(policy.decide(&left, &right)), MergeDecision::default_left());
    }

    #[test]
    fn test_email_presence_wins() {
        let policy = ContactPolicy::default();
        let decision = merged(policy.decide(&employee(None, true), &employee(Some("a@gmail.com"), false)));
        assert_eq!(decision, MergeDecision::new(Side::Right, DecisionRule::EmailPresence));
    }

    #[test]
    fn test_business_beats_free() {
        let policy = ContactPolicy::default();
        let decision = merged(policy.decide(
            &employee(Some("a@acme.biz"), false),
            &employee(Some("a@gmail.com"), true),
        ));
        assert_eq!(decision, MergeDecision::new(Side::Left, DecisionRule::BusinessEmail));
    }

    #[test]
    fn test_business_domains_by_rank() {
        let policy = ContactPolicy::default();
        let decision = merged(policy.decide(
            &employee(Some("a@acme.org"), true),
            &employee(Some("a@acme.io"), false),
        ));
        assert_eq!(decision, MergeDecision::new(Side::Right, DecisionRule::EmailDomainRank));
    }

    #[test]
    fn test_phone_breaks_email_tie() {
        let policy = ContactPolicy::default();
        let decision = merged(policy.decide(
            &employee(Some("a@gmail.com"), false),
            &employee(Some("b@yahoo.com"), true),
        ));
        assert_eq!(decision, MergeDecision::new(Side::Right, DecisionRule::PhonePresence));

        let decision = merged(policy.decide(&employee(None, false), &employee(None, true)));
        assert_eq!(decision, MergeDecision::new(Side::Right, DecisionRule::PhonePresence));
    }

    #[test]
    fn test_full_tie_defaults_left() {
        let policy = ContactPolicy::default();
        let decision = merged(policy.decide(
            &employee(Some("a@acme.com"), true),
            &employee(Some("b@other.com"), true),
        ));
        assert!(decision.is_ambiguous());
    }
}
