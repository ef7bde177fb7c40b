//! Required-count normalization
//!
//! The single authority for turning a [`RequiredRule`] into a participant
//! count. The scheduler (creation-time snapshot), the evaluator (live
//! recomputation), and the preview all go through [`normalize_required_count`].

use crate::config::schema::RequiredRule;
use crate::governance::roster::RosterSnapshot;

/// Number of participants `rule` requires given the roster snapshot.
///
/// Only present, non-exempt participants are eligible.
#[must_use]
pub fn normalize_required_count(rule: RequiredRule, snapshot: &RosterSnapshot) -> usize {
    required_for_eligible(rule, snapshot.eligible_count())
}

/// Number of participants `rule` requires out of `eligible`.
#[must_use]
pub fn required_for_eligible(rule: RequiredRule, eligible: usize) -> usize {
    match rule {
        RequiredRule::All => eligible,
        RequiredRule::Any => eligible.min(1),
        RequiredRule::Count(k) => usize::try_from(k).map_or(eligible, |k| k.min(eligible)),
        RequiredRule::Fraction {
            numerator,
            denominator,
        } => {
            let numerator = numerator as usize;
            let denominator = (denominator as usize).max(1);
            (numerator * eligible).div_ceil(denominator).min(eligible)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frac(numerator: u32, denominator: u32) -> RequiredRule {
        RequiredRule::Fraction {
            numerator,
            denominator,
        }
    }

    #[test]
    fn test_all_counts_eligible() {
        assert_eq!(required_for_eligible(RequiredRule::All, 0), 0);
        assert_eq!(required_for_eligible(RequiredRule::All, 7), 7);
    }

    #[test]
    fn test_any_is_one_when_anyone_eligible() {
        assert_eq!(required_for_eligible(RequiredRule::Any, 0), 0);
        assert_eq!(required_for_eligible(RequiredRule::Any, 4), 1);
    }

    #[test]
    fn test_fixed_count_capped() {
        assert_eq!(required_for_eligible(RequiredRule::Count(5), 3), 3);
        assert_eq!(required_for_eligible(RequiredRule::Count(2), 3), 2);
    }

    #[test]
    fn test_fraction_rounds_up() {
        assert_eq!(required_for_eligible(frac(2, 3), 3), 2);
        assert_eq!(required_for_eligible(frac(2, 3), 4), 3);
        assert_eq!(required_for_eligible(frac(1, 2), 5), 3);
        assert_eq!(required_for_eligible(frac(1, 2), 0), 0);
        assert_eq!(required_for_eligible(frac(3, 3), 5), 5);
    }

    #[test]
    fn test_snapshot_excludes_exempt_and_absent() {
        let snapshot = RosterSnapshot {
            active_participants: vec!["A".into(), "B".into(), "C".into()],
            exempt: ["C".to_string()].into_iter().collect(),
            total_count: 4,
            ..RosterSnapshot::default()
        };
        assert_eq!(normalize_required_count(RequiredRule::All, &snapshot), 2);
        assert_eq!(normalize_required_count(frac(1, 2), &snapshot), 1);
    }
}
