//! Traits for store operations needed by the resolver and service.
//!
//! The domain crate never depends on a concrete backend; storage
//! implementations provide these narrow traits and map their own error
//! types into `DomainError::Store`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainResult;
use crate::model::{Action, DetailLevel, Node, OrgId, Policy, Subject, UserId};

use super::types::PolicyCandidate;

/// Read access to the node tree.
#[async_trait]
pub trait HierarchyReader: Send + Sync {
    /// Fetches a node by id, or `None` if it does not exist.
    async fn get_node(&self, id: Uuid) -> DomainResult<Option<Node>>;

    /// Fetches many nodes in one pass. Ids with no matching node are
    /// simply absent from the result; order is not significant.
    async fn get_nodes(&self, ids: &[Uuid]) -> DomainResult<Vec<Node>>;
}

/// Read access to policies, filtered through the closure relation.
#[async_trait]
pub trait PolicyReader: Send + Sync {
    /// Collects every eligible policy for the given target nodes in one
    /// query: policies attached to a target or to any of its ancestors,
    /// whose subject is in `subjects`, whose action equals `action`, whose
    /// recorded level satisfies `level` (a `Full` grant satisfies an
    /// `Overview` request), and whose expiry, if any, is after `now`.
    ///
    /// Each candidate carries the closure distance between its target and
    /// the node the policy is attached to. Implementations must issue one
    /// store query regardless of how many targets are passed; the batch
    /// authorization path depends on it.
    async fn candidate_policies(
        &self,
        targets: &[Uuid],
        subjects: &[Subject],
        action: Action,
        level: DetailLevel,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<PolicyCandidate>>;

    /// Returns all policies attached to one node, including expired ones,
    /// newest first.
    async fn policies_for_node(&self, node_id: Uuid) -> DomainResult<Vec<Policy>>;
}

/// Write access to a node's policy set.
#[async_trait]
pub trait PolicyWriter: Send + Sync {
    /// Replaces the full policy set for a node atomically. A concurrent
    /// reader must never observe the old set deleted with the new set not
    /// yet inserted.
    async fn replace_policies(&self, node_id: Uuid, policies: Vec<Policy>) -> DomainResult<()>;
}

/// Organization membership lookup, consumed but not owned by the engine.
#[async_trait]
pub trait MembershipReader: Send + Sync {
    /// Whether `user_id` is a member of `org_id`.
    async fn is_member(&self, user_id: UserId, org_id: OrgId) -> DomainResult<bool>;

    /// Every organization the user belongs to. Used to build the
    /// candidate subject-key set for authenticated requesters.
    async fn organizations_for(&self, user_id: UserId) -> DomainResult<Vec<OrgId>>;
}
