//! Property-based tests for the composite ranking key.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use crate::model::{Action, DetailLevel, Effect, Policy, Subject};
use crate::resolver::{winning_candidate, winning_effect, PolicyCandidate};

fn candidate_strategy() -> impl Strategy<Value = PolicyCandidate> {
    (
        any::<bool>(),
        0u32..6,
        prop_oneof![
            (1i64..100).prop_map(Subject::User),
            (1i64..100).prop_map(Subject::Organization),
            Just(Subject::Public),
        ],
        0i64..100_000,
    )
        .prop_map(|(deny, distance, subject, created_offset)| {
            let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            let policy = Policy {
                id: Uuid::new_v4(),
                node_id: Uuid::new_v4(),
                level: DetailLevel::Full,
                action: Action::View,
                subject,
                effect: if deny { Effect::Deny } else { Effect::Allow },
                granted_by: 1,
                expires_at: None,
                created_at: base + Duration::seconds(created_offset),
            };
            PolicyCandidate::new(Uuid::nil(), distance, policy)
        })
}

proptest! {
    /// A deny anywhere in the eligible set wins outright.
    #[test]
    fn any_deny_forces_a_deny_decision(
        candidates in prop::collection::vec(candidate_strategy(), 1..20)
    ) {
        let has_deny = candidates.iter().any(|c| c.policy.effect == Effect::Deny);
        let effect = winning_effect(&candidates);
        if has_deny {
            prop_assert_eq!(effect, Some(Effect::Deny));
        } else {
            prop_assert_eq!(effect, Some(Effect::Allow));
        }
    }

    /// The winner is always an element of the candidate set.
    #[test]
    fn winner_is_drawn_from_the_candidates(
        candidates in prop::collection::vec(candidate_strategy(), 1..20)
    ) {
        let winner = winning_candidate(&candidates).unwrap();
        prop_assert!(candidates.iter().any(|c| c.policy.id == winner.policy.id));
    }

    /// Ranking is a total order: input order never changes the winner.
    #[test]
    fn winner_is_invariant_under_reversal(
        candidates in prop::collection::vec(candidate_strategy(), 1..20)
    ) {
        let reversed: Vec<_> = candidates.iter().rev().cloned().collect();
        let a = winning_candidate(&candidates).map(|c| c.policy.id);
        let b = winning_candidate(&reversed).map(|c| c.policy.id);
        prop_assert_eq!(a, b);
    }

    /// Among equal effects, no candidate sits strictly closer than the
    /// winner; at the winner's distance, none is strictly more specific.
    #[test]
    fn winner_minimizes_distance_then_specificity(
        candidates in prop::collection::vec(candidate_strategy(), 1..20)
    ) {
        let winner = winning_candidate(&candidates).unwrap();
        let peers: Vec<_> = candidates
            .iter()
            .filter(|c| c.policy.effect == winner.policy.effect)
            .collect();
        prop_assert!(peers.iter().all(|c| c.distance >= winner.distance));
        prop_assert!(peers
            .iter()
            .filter(|c| c.distance == winner.distance)
            .all(|c| c.policy.subject.specificity() <= winner.policy.subject.specificity()));
    }
}

#[test]
fn empty_candidate_set_is_implicit_deny() {
    assert_eq!(winning_effect(&[]), None);
}
