use crate::attributes::RecordAttributes;

use super::{CountRule, DecisionRule, DomainRank, MergeDecision, MergePolicy, Verdict};

/// Company merges: more associated contacts wins, then the better domain,
/// then left.
#[derive(Debug, Clone, Default)]
pub struct CompanyPolicy {
    count_rule: CountRule,
    ranks: DomainRank,
}

impl CompanyPolicy {
    pub fn new(count_rule: CountRule, ranks: DomainRank) -> Self {
        Self { count_rule, ranks }
    }

    pub fn decision(&self, left: &RecordAttributes, right: &RecordAttributes) -> MergeDecision {
        let left_count = left.contact_count.unwrap_or(0);
        let right_count = right.contact_count.unwrap_or(0);
        if let Some(side) = self.count_rule.winner(left_count, right_count) {
            return MergeDecision::new(side, DecisionRule::ContactCount);
        }

        if let Some(side) = self
            .ranks
            .compare(left.domain.as_deref(), right.domain.as_deref())
        {
            return MergeDecision::new(side, DecisionRule::DomainRank);
        }

        MergeDecision::default_left()
    }
}

impl MergePolicy for CompanyPolicy {
    fn name(&self) -> &'static str {
        "company"
    }

    fn decide(&self, left: &RecordAttributes, right: &RecordAttributes) -> Verdict {
        Verdict::Merge(self.decision(left, right))
    }
}
