//! The public-facing authorization API.
//!
//! Every operation is an independent, synchronous request-response
//! computation; the service holds no per-request state and is safe for
//! unlimited concurrent callers. All state lives behind the reader and
//! writer traits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::model::{
    validate_drafts, validate_requester, validate_subject_id, Action, DetailLevel, Effect,
    Policy, PolicyDraft, UserId,
};
use crate::resolver::{
    HierarchyReader, MembershipReader, PolicyReader, PolicyWriter, PrecedenceResolver,
};

mod batch;


pub use batch::{AccessBucket, BatchAccessResponse, MAX_BATCH_SIZE};

/// The node authorization service.
///
/// Decides, for any (requesting subject, target node, action, detail
/// level) tuple, whether access is granted; answers for a single node or
/// for thousands of nodes in one pass. Owner-only mutation of a node's
/// policy set lives here too.
pub struct AuthorizationService<H, P, M> {
    hierarchy: Arc<H>,
    policies: Arc<P>,
    memberships: Arc<M>,
    resolver: PrecedenceResolver<P, M>,
}

impl<H, P, M> AuthorizationService<H, P, M>
where
    H: HierarchyReader,
    P: PolicyReader + PolicyWriter,
    M: MembershipReader,
{
    /// Creates a service over the given stores.
    pub fn new(hierarchy: Arc<H>, policies: Arc<P>, memberships: Arc<M>) -> Self {
        let resolver = PrecedenceResolver::new(Arc::clone(&policies), Arc::clone(&memberships));
        Self {
            hierarchy,
            policies,
            memberships,
            resolver,
        }
    }

    /// Whether `subject` may perform `action` on `node_id` at `level`.
    ///
    /// The node's own owner is allowed unconditionally — ownership cannot
    /// be revoked by any policy, including an explicit deny. Ownership is
    /// per target node: an ancestor's owner gets no fast-path on this
    /// node. Denial is an ordinary `false`, never an error.
    #[instrument(skip(self), fields(%node_id, %action, %level))]
    pub async fn can_access(
        &self,
        subject: Option<UserId>,
        node_id: Uuid,
        action: Action,
        level: DetailLevel,
    ) -> DomainResult<bool> {
        validate_requester(subject)?;

        let node = self
            .hierarchy
            .get_node(node_id)
            .await?
            .ok_or(DomainError::NodeNotFound { node_id })?;

        if subject == Some(node.owner_id) {
            return Ok(true);
        }

        let effect = self.resolver.resolve(subject, node_id, action, level).await?;
        Ok(effect == Some(Effect::Allow))
    }

    /// The highest detail level at which `subject` may view `node_id`:
    /// `Full` for the owner, otherwise the best level for which a `View`
    /// grant holds, or `None` when none does.
    pub async fn access_level(
        &self,
        subject: Option<UserId>,
        node_id: Uuid,
    ) -> DomainResult<Option<DetailLevel>> {
        validate_requester(subject)?;

        let node = self
            .hierarchy
            .get_node(node_id)
            .await?
            .ok_or(DomainError::NodeNotFound { node_id })?;

        if subject == Some(node.owner_id) {
            return Ok(Some(DetailLevel::Full));
        }

        for level in [DetailLevel::Full, DetailLevel::Overview] {
            let effect = self
                .resolver
                .resolve(subject, node_id, Action::View, level)
                .await?;
            if effect == Some(Effect::Allow) {
                return Ok(Some(level));
            }
        }
        Ok(None)
    }

    /// Whether `user_id` is the owner of `node_id`.
    pub async fn is_owner(&self, user_id: UserId, node_id: Uuid) -> DomainResult<bool> {
        validate_subject_id(user_id)?;
        let node = self
            .hierarchy
            .get_node(node_id)
            .await?
            .ok_or(DomainError::NodeNotFound { node_id })?;
        Ok(node.owner_id == user_id)
    }

    /// Replaces the full policy set for a node. Owner-only.
    ///
    /// Validation happens before any write: the draft set is checked
    /// syntactically (count bound, level rules, expiry window, subject
    /// ids), ownership is confirmed, and every organization subject is
    /// checked against the membership index. On success the stored set is
    /// replaced wholesale — never merged — and the acting user is stamped
    /// as `granted_by`.
    #[instrument(skip(self, drafts), fields(%node_id, acting_user, drafts = drafts.len()))]
    pub async fn set_policies(
        &self,
        node_id: Uuid,
        acting_user: UserId,
        drafts: Vec<PolicyDraft>,
    ) -> DomainResult<()> {
        validate_subject_id(acting_user)?;
        let now = Utc::now();
        validate_drafts(&drafts, now)?;

        let node = self
            .hierarchy
            .get_node(node_id)
            .await?
            .ok_or(DomainError::NodeNotFound { node_id })?;
        if node.owner_id != acting_user {
            return Err(DomainError::NotOwner {
                user_id: acting_user,
                node_id,
            });
        }

        for draft in &drafts {
            if let crate::model::Subject::Organization(org_id) = draft.subject {
                if !self.memberships.is_member(acting_user, org_id).await? {
                    return Err(DomainError::NotOrgMember {
                        user_id: acting_user,
                        org_id,
                    });
                }
            }
        }

        let policies: Vec<Policy> = drafts
            .into_iter()
            .map(|draft| Policy {
                id: Uuid::new_v4(),
                node_id,
                level: draft.level,
                action: draft.action,
                subject: draft.subject,
                effect: draft.effect,
                granted_by: acting_user,
                expires_at: draft.expires_at,
                created_at: now,
            })
            .collect();

        debug!(count = policies.len(), "replacing policy set");
        self.policies.replace_policies(node_id, policies).await
    }

    /// Returns all policies attached to a node. Owner-only.
    pub async fn get_policies(
        &self,
        node_id: Uuid,
        acting_user: UserId,
    ) -> DomainResult<Vec<Policy>> {
        validate_subject_id(acting_user)?;
        let node = self
            .hierarchy
            .get_node(node_id)
            .await?
            .ok_or(DomainError::NodeNotFound { node_id })?;
        if node.owner_id != acting_user {
            return Err(DomainError::NotOwner {
                user_id: acting_user,
                node_id,
            });
        }
        self.policies.policies_for_node(node_id).await
    }

    /// Evaluates access for many nodes of one owner in a single pass.
    ///
    /// Buckets every input id into exactly one of authorized /
    /// unauthorized / not-found; ids that do not exist or are not owned by
    /// `target_owner` land in not-found. Duplicate ids are evaluated once.
    /// The policy store is hit with one candidate query for the whole
    /// batch — never one resolver call per node — and is not consulted at
    /// all when the requester is the target owner.
    #[instrument(skip(self, node_ids), fields(batch = node_ids.len(), target_owner, %action, %level))]
    pub async fn check_batch(
        &self,
        subject: Option<UserId>,
        node_ids: &[Uuid],
        target_owner: UserId,
        action: Action,
        level: DetailLevel,
    ) -> DomainResult<BatchAccessResponse> {
        validate_requester(subject)?;
        validate_subject_id(target_owner)?;
        if node_ids.len() > MAX_BATCH_SIZE {
            return Err(DomainError::BatchTooLarge {
                size: node_ids.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        // Dedup preserving first-seen order.
        let mut seen = HashSet::with_capacity(node_ids.len());
        let ids: Vec<Uuid> = node_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Ok(BatchAccessResponse::default());
        }

        let nodes = self.hierarchy.get_nodes(&ids).await?;
        let owners: HashMap<Uuid, UserId> =
            nodes.into_iter().map(|n| (n.id, n.owner_id)).collect();

        let mut response = BatchAccessResponse::default();
        let mut to_resolve = Vec::new();
        for &id in &ids {
            match owners.get(&id) {
                Some(&owner) if owner == target_owner => {
                    if subject == Some(target_owner) {
                        // Owner fast-path: no policy lookup for the
                        // owner's own nodes.
                        response.authorized.push(id);
                    } else {
                        to_resolve.push(id);
                    }
                }
                // Nodes of a different owner are indistinguishable from
                // missing ones to the caller.
                _ => response.not_found.push(id),
            }
        }

        if !to_resolve.is_empty() {
            let decisions = self
                .resolver
                .resolve_batch(subject, &to_resolve, action, level)
                .await?;
            for id in to_resolve {
                if decisions.get(&id) == Some(&Effect::Allow) {
                    response.authorized.push(id);
                } else {
                    response.unauthorized.push(id);
                }
            }
        }

        debug!(
            authorized = response.authorized.len(),
            unauthorized = response.unauthorized.len(),
            not_found = response.not_found.len(),
            "batch authorization complete"
        );
        Ok(response)
    }
}
