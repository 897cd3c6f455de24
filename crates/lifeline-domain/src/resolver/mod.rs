//! Precedence resolver for node authorization.
//!
//! Given a requesting subject, target nodes, an action and a detail level,
//! the resolver determines the single effective policy per node among all
//! policies attached to the node itself and to every ancestor, then returns
//! its effect.
//!
//! # Ranking
//!
//! Candidates are ranked by a composite key:
//!
//! 1. `Deny` before `Allow` — a deny anywhere in the eligible set wins
//!    outright;
//! 2. ascending closure distance — a policy on the node itself overrides
//!    one inherited from an ancestor;
//! 3. descending subject specificity — user over organization over public
//!    at equal distance;
//! 4. descending creation time, then id, as final tiebreaks.
//!
//! The rank-1 policy's effect is the decision; no eligible policy means
//! implicit deny. Candidate generation is one store query per call (the
//! closure join and the eligibility window live behind [`PolicyReader`]);
//! the sort-and-pick happens here, uniformly for every backend.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::DomainResult;
use crate::model::{Action, DetailLevel, Effect, Subject, UserId};

mod traits;
mod types;

#[cfg(test)]
pub(crate) mod tests;

#[cfg(test)]
mod rank_proptest;

pub use traits::{HierarchyReader, MembershipReader, PolicyReader, PolicyWriter};
pub use types::PolicyCandidate;

/// Picks the rank-1 candidate — the single effective policy — or `None`
/// when the set is empty.
///
/// Exposed as a free function so the ranking can be property-tested and
/// benchmarked without a store behind it.
pub fn winning_candidate(candidates: &[PolicyCandidate]) -> Option<&PolicyCandidate> {
    candidates.iter().min_by_key(|c| rank_key(c))
}

/// The effect of the rank-1 candidate, or `None` when the set is empty
/// (implicit deny).
pub fn winning_effect(candidates: &[PolicyCandidate]) -> Option<Effect> {
    winning_candidate(candidates).map(|c| c.policy.effect)
}

/// The composite ordering key. Lower sorts first; the minimum is the
/// winning candidate.
fn rank_key(
    candidate: &PolicyCandidate,
) -> (
    u8,
    u32,
    Reverse<u8>,
    Reverse<chrono::DateTime<Utc>>,
    Reverse<Uuid>,
) {
    let effect_rank = match candidate.policy.effect {
        Effect::Deny => 0,
        Effect::Allow => 1,
    };
    (
        effect_rank,
        candidate.distance,
        Reverse(candidate.policy.subject.specificity()),
        Reverse(candidate.policy.created_at),
        Reverse(candidate.policy.id),
    )
}

/// The precedence resolver.
///
/// Stateless per request; all state lives behind the reader traits. Safe
/// for unlimited concurrent callers.
pub struct PrecedenceResolver<P, M> {
    policies: Arc<P>,
    memberships: Arc<M>,
}

impl<P, M> PrecedenceResolver<P, M>
where
    P: PolicyReader,
    M: MembershipReader,
{
    /// Creates a resolver over the given policy and membership readers.
    pub fn new(policies: Arc<P>, memberships: Arc<M>) -> Self {
        Self {
            policies,
            memberships,
        }
    }

    /// Builds the candidate subject-key set for a requester, ordered by
    /// specificity: the user key, one key per organization the user
    /// belongs to, and the public key. Anonymous requesters match only
    /// public policies.
    pub async fn subject_keys(&self, subject: Option<UserId>) -> DomainResult<Vec<Subject>> {
        let mut keys = Vec::new();
        if let Some(user_id) = subject {
            keys.push(Subject::User(user_id));
            for org_id in self.memberships.organizations_for(user_id).await? {
                keys.push(Subject::Organization(org_id));
            }
        }
        keys.push(Subject::Public);
        Ok(keys)
    }

    /// Resolves the effective policy for a single node.
    ///
    /// Returns the winning effect, or `None` when no eligible policy
    /// applies (implicit deny). The owner fast-path is the service's job;
    /// the resolver treats the owner like any other subject.
    pub async fn resolve(
        &self,
        subject: Option<UserId>,
        node_id: Uuid,
        action: Action,
        level: DetailLevel,
    ) -> DomainResult<Option<Effect>> {
        let decisions = self.resolve_batch(subject, &[node_id], action, level).await?;
        Ok(decisions.get(&node_id).copied())
    }

    /// Resolves many nodes in one pass: one candidate query, then a
    /// per-node sort over the composite key.
    ///
    /// The returned map holds an entry for every node that had at least
    /// one eligible candidate; absent nodes are implicit denies.
    pub async fn resolve_batch(
        &self,
        subject: Option<UserId>,
        node_ids: &[Uuid],
        action: Action,
        level: DetailLevel,
    ) -> DomainResult<HashMap<Uuid, Effect>> {
        if node_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let keys = self.subject_keys(subject).await?;
        let candidates = self
            .policies
            .candidate_policies(node_ids, &keys, action, level, Utc::now())
            .await?;

        debug!(
            targets = node_ids.len(),
            candidates = candidates.len(),
            %action,
            %level,
            "ranking policy candidates"
        );

        let mut grouped: HashMap<Uuid, Vec<PolicyCandidate>> = HashMap::new();
        for candidate in candidates {
            grouped.entry(candidate.target_id).or_default().push(candidate);
        }

        let mut decisions = HashMap::with_capacity(grouped.len());
        for (target_id, group) in grouped {
            if let Some(effect) = winning_effect(&group) {
                decisions.insert(target_id, effect);
            }
        }
        Ok(decisions)
    }
}
