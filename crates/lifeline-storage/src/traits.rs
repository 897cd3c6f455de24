//! Store trait definitions.
//!
//! Three traits cover the engine's collaborators: the node tree with its
//! closure relation, the policy store, and the organization membership
//! index. Implementations must be thread-safe and support async
//! operations; the memory and Postgres backends implement all three.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lifeline_domain::model::{
    Action, DetailLevel, Node, Policy, Subject, MAX_POLICIES_PER_NODE,
};
use lifeline_domain::resolver::PolicyCandidate;

use crate::error::{StorageError, StorageResult};

/// Input shape for node creation. When `id` is `None` the backend
/// generates one.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub owner_id: i64,
    pub node_type: String,
    pub metadata: serde_json::Value,
}

impl NewNode {
    /// A root node with empty metadata.
    pub fn root(owner_id: i64, node_type: impl Into<String>) -> Self {
        Self {
            id: None,
            parent_id: None,
            owner_id,
            node_type: node_type.into(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// A child node with empty metadata.
    pub fn child(parent_id: Uuid, owner_id: i64, node_type: impl Into<String>) -> Self {
        Self {
            id: None,
            parent_id: Some(parent_id),
            owner_id,
            node_type: node_type.into(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }
}

/// One row of the transitive closure relation, including the reflexive
/// depth-0 row every node has to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureEdge {
    pub ancestor_id: Uuid,
    pub descendant_id: Uuid,
    pub depth: u32,
}

/// Rejects a policy set that violates storage invariants: the per-node
/// bound, and rows pointing at a different node than the one being
/// written.
pub fn validate_policy_set(node_id: Uuid, policies: &[Policy]) -> StorageResult<()> {
    if policies.len() > MAX_POLICIES_PER_NODE {
        return Err(StorageError::InvalidInput {
            message: format!(
                "policy set of {} exceeds the per-node bound of {}",
                policies.len(),
                MAX_POLICIES_PER_NODE
            ),
        });
    }
    for policy in policies {
        if policy.node_id != node_id {
            return Err(StorageError::InvalidInput {
                message: format!(
                    "policy {} targets node {} but is being written to node {}",
                    policy.id, policy.node_id, node_id
                ),
            });
        }
    }
    Ok(())
}

/// The node tree and its derived closure relation.
///
/// The closure relation is a cache, never a source of truth: it must stay
/// rebuildable from the node table alone, and every structural mutation
/// updates it synchronously before returning. A stale closure row is a
/// stale authorization decision.
#[async_trait]
pub trait HierarchyStore: Send + Sync + 'static {
    /// Creates a node and its closure rows. Fails with `NodeNotFound` if
    /// the parent does not exist, `NodeExists` on id collision.
    async fn create_node(&self, new: NewNode) -> StorageResult<Node>;

    /// Fetches a node by id.
    async fn get_node(&self, id: Uuid) -> StorageResult<Option<Node>>;

    /// Fetches many nodes in one pass; missing ids are simply absent.
    async fn get_nodes(&self, ids: &[Uuid]) -> StorageResult<Vec<Node>>;

    /// Reparents a node (or detaches it when `new_parent` is `None`),
    /// rewriting the closure rows of the whole moved subtree. Fails with
    /// `WouldCreateCycle` when the new parent lies inside that subtree.
    async fn move_node(&self, id: Uuid, new_parent: Option<Uuid>) -> StorageResult<()>;

    /// Deletes a node and its entire subtree, with their closure rows and
    /// policies.
    async fn delete_node(&self, id: Uuid) -> StorageResult<()>;

    /// The ancestor chain of a node, self included at depth 0, ordered by
    /// ascending depth.
    async fn ancestors(&self, id: Uuid) -> StorageResult<Vec<ClosureEdge>>;

    /// Recomputes the whole closure relation from the node table. The
    /// recovery path; incremental maintenance is tested against it.
    async fn rebuild_closure(&self) -> StorageResult<()>;
}

/// Policy persistence and the bulk candidate query.
#[async_trait]
pub trait PolicyStore: Send + Sync + 'static {
    /// Replaces the full policy set for a node atomically: a concurrent
    /// reader sees the old set or the new set, never a partial one.
    async fn replace_policies(&self, node_id: Uuid, policies: Vec<Policy>) -> StorageResult<()>;

    /// All policies attached to one node, expired ones included, newest
    /// first.
    async fn policies_for_node(&self, node_id: Uuid) -> StorageResult<Vec<Policy>>;

    /// Every eligible policy for the given targets in one query: attached
    /// to a target or any of its ancestors, subject in `subjects`, action
    /// equal, recorded level satisfying `level`, unexpired at `now`. Each
    /// row carries the closure distance to its target.
    async fn candidate_policies(
        &self,
        targets: &[Uuid],
        subjects: &[Subject],
        action: Action,
        level: DetailLevel,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<PolicyCandidate>>;
}

/// Organization membership lookup. Maintained by the surrounding
/// application; the engine only reads it.
#[async_trait]
pub trait MembershipIndex: Send + Sync + 'static {
    /// Whether `user_id` belongs to `org_id`.
    async fn is_member(&self, user_id: i64, org_id: i64) -> StorageResult<bool>;

    /// Every organization `user_id` belongs to.
    async fn organizations_for(&self, user_id: i64) -> StorageResult<Vec<i64>>;
}
