//! In-memory storage implementation.
//!
//! The development and test backend. Closure rows are kept as a
//! per-node ancestor chain and maintained incrementally on every
//! structural mutation, the same contract the Postgres backend honors
//! with its closure table.
//!
//! # Performance Characteristics
//!
//! - **Node lookup**: O(1) (DashMap)
//! - **Ancestor chain**: O(depth) clone
//! - **Candidate query**: O(targets × depth × policies-per-node)
//! - **Subtree collection (move/delete)**: O(N) scan over all chains
//! - **Policy replacement**: O(1) per-key entry swap — a concurrent
//!   reader sees the old vector or the new one, never a mix
//!
//! Structural mutations (`move_node`, `delete_node`) touch several keys
//! and are not transactional across them; production deployments use the
//! Postgres backend for that.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::instrument;
use uuid::Uuid;

use lifeline_domain::model::{Action, DetailLevel, Node, Policy, Subject};
use lifeline_domain::resolver::PolicyCandidate;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    validate_policy_set, ClosureEdge, HierarchyStore, MembershipIndex, NewNode, PolicyStore,
};

/// In-memory implementation of all three store traits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: DashMap<Uuid, Node>,
    /// Ancestor chain per node, self included at depth 0. This is the
    /// closure relation grouped by descendant.
    ancestors: DashMap<Uuid, Vec<(Uuid, u32)>>,
    policies: DashMap<Uuid, Vec<Policy>>,
    /// Org id to member user ids.
    memberships: DashMap<i64, HashSet<i64>>,
}

impl MemoryBackend {
    /// Creates a new in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seeds an organization membership. The membership index is owned by
    /// the surrounding application; this is its write path for tests and
    /// embedded deployments.
    pub fn add_member(&self, org_id: i64, user_id: i64) {
        self.memberships.entry(org_id).or_default().insert(user_id);
    }

    /// Removes an organization membership.
    pub fn remove_member(&self, org_id: i64, user_id: i64) {
        if let Some(mut members) = self.memberships.get_mut(&org_id) {
            members.remove(&user_id);
        }
    }

    /// Every node inside the subtree rooted at `id`, with its depth below
    /// the root. Includes the root itself at depth 0.
    fn subtree_of(&self, id: Uuid) -> Vec<(Uuid, u32)> {
        self.ancestors
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .iter()
                    .find(|&&(ancestor, _)| ancestor == id)
                    .map(|&(_, depth)| (*entry.key(), depth))
            })
            .collect()
    }
}

#[async_trait]
impl HierarchyStore for MemoryBackend {
    #[instrument(skip(self, new), fields(owner = new.owner_id))]
    async fn create_node(&self, new: NewNode) -> StorageResult<Node> {
        let parent_chain = match new.parent_id {
            Some(parent_id) => {
                let chain = self
                    .ancestors
                    .get(&parent_id)
                    .map(|c| c.value().clone())
                    .ok_or(StorageError::NodeNotFound { node_id: parent_id })?;
                Some(chain)
            }
            None => None,
        };

        let id = new.id.unwrap_or_else(Uuid::new_v4);
        let now = Utc::now();
        let node = Node {
            id,
            parent_id: new.parent_id,
            owner_id: new.owner_id,
            node_type: new.node_type,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        // Entry API so an explicit-id collision cannot overwrite.
        use dashmap::mapref::entry::Entry;
        match self.nodes.entry(id) {
            Entry::Occupied(_) => return Err(StorageError::NodeExists { node_id: id }),
            Entry::Vacant(entry) => {
                entry.insert(node.clone());
            }
        }

        let mut chain = vec![(id, 0)];
        if let Some(parent_chain) = parent_chain {
            chain.extend(parent_chain.iter().map(|&(a, d)| (a, d + 1)));
        }
        self.ancestors.insert(id, chain);

        Ok(node)
    }

    async fn get_node(&self, id: Uuid) -> StorageResult<Option<Node>> {
        Ok(self.nodes.get(&id).map(|n| n.value().clone()))
    }

    async fn get_nodes(&self, ids: &[Uuid]) -> StorageResult<Vec<Node>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|n| n.value().clone()))
            .collect())
    }

    #[instrument(skip(self))]
    async fn move_node(&self, id: Uuid, new_parent: Option<Uuid>) -> StorageResult<()> {
        if !self.nodes.contains_key(&id) {
            return Err(StorageError::NodeNotFound { node_id: id });
        }

        let subtree = self.subtree_of(id);
        let new_parent_chain = match new_parent {
            Some(parent_id) => {
                if subtree.iter().any(|&(n, _)| n == parent_id) {
                    return Err(StorageError::WouldCreateCycle {
                        node_id: id,
                        new_parent: parent_id,
                    });
                }
                let chain = self
                    .ancestors
                    .get(&parent_id)
                    .map(|c| c.value().clone())
                    .ok_or(StorageError::NodeNotFound { node_id: parent_id })?;
                Some(chain)
            }
            None => None,
        };

        let members: HashSet<Uuid> = subtree.iter().map(|&(n, _)| n).collect();
        for &(member, depth_below) in &subtree {
            let Some(mut chain) = self.ancestors.get_mut(&member) else {
                continue;
            };
            // Rows internal to the moved subtree survive; rows pairing
            // the member with an outside ancestor are rewritten through
            // the new parent.
            chain.retain(|(ancestor, _)| members.contains(ancestor));
            if let Some(parent_chain) = &new_parent_chain {
                chain.extend(
                    parent_chain
                        .iter()
                        .map(|&(a, d)| (a, d + depth_below + 1)),
                );
            }
        }

        if let Some(mut node) = self.nodes.get_mut(&id) {
            node.parent_id = new_parent;
            node.updated_at = Utc::now();
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, id: Uuid) -> StorageResult<()> {
        if !self.nodes.contains_key(&id) {
            return Err(StorageError::NodeNotFound { node_id: id });
        }
        for (member, _) in self.subtree_of(id) {
            self.nodes.remove(&member);
            self.ancestors.remove(&member);
            self.policies.remove(&member);
        }
        Ok(())
    }

    async fn ancestors(&self, id: Uuid) -> StorageResult<Vec<ClosureEdge>> {
        let chain = self
            .ancestors
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(StorageError::NodeNotFound { node_id: id })?;
        let mut edges: Vec<ClosureEdge> = chain
            .into_iter()
            .map(|(ancestor_id, depth)| ClosureEdge {
                ancestor_id,
                descendant_id: id,
                depth,
            })
            .collect();
        edges.sort_by_key(|e| e.depth);
        Ok(edges)
    }

    async fn rebuild_closure(&self) -> StorageResult<()> {
        self.ancestors.clear();
        for entry in self.nodes.iter() {
            let mut chain = Vec::new();
            let mut current = Some(*entry.key());
            let mut depth = 0;
            while let Some(node_id) = current {
                chain.push((node_id, depth));
                current = self.nodes.get(&node_id).and_then(|n| n.parent_id);
                depth += 1;
                if depth as usize > self.nodes.len() {
                    return Err(StorageError::InvalidInput {
                        message: format!("parent chain of {} does not terminate", entry.key()),
                    });
                }
            }
            self.ancestors.insert(*entry.key(), chain);
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for MemoryBackend {
    #[instrument(skip(self, policies), fields(%node_id, count = policies.len()))]
    async fn replace_policies(&self, node_id: Uuid, policies: Vec<Policy>) -> StorageResult<()> {
        validate_policy_set(node_id, &policies)?;
        if !self.nodes.contains_key(&node_id) {
            return Err(StorageError::NodeNotFound { node_id });
        }
        // Single-key insert: wholesale replacement is atomic per key.
        self.policies.insert(node_id, policies);
        Ok(())
    }

    async fn policies_for_node(&self, node_id: Uuid) -> StorageResult<Vec<Policy>> {
        let mut attached = self
            .policies
            .get(&node_id)
            .map(|p| p.value().clone())
            .unwrap_or_default();
        attached.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(attached)
    }

    async fn candidate_policies(
        &self,
        targets: &[Uuid],
        subjects: &[Subject],
        action: Action,
        level: DetailLevel,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<PolicyCandidate>> {
        let mut candidates = Vec::new();
        for &target in targets {
            let Some(chain) = self.ancestors.get(&target).map(|c| c.value().clone()) else {
                continue;
            };
            for (ancestor, distance) in chain {
                let Some(attached) = self.policies.get(&ancestor) else {
                    continue;
                };
                for policy in attached.value() {
                    if subjects.contains(&policy.subject)
                        && policy.action == action
                        && policy.level.satisfies(level)
                        && policy.is_active(now)
                    {
                        candidates.push(PolicyCandidate::new(target, distance, policy.clone()));
                    }
                }
            }
        }
        Ok(candidates)
    }
}

#[async_trait]
impl MembershipIndex for MemoryBackend {
    async fn is_member(&self, user_id: i64, org_id: i64) -> StorageResult<bool> {
        Ok(self
            .memberships
            .get(&org_id)
            .is_some_and(|members| members.contains(&user_id)))
    }

    async fn organizations_for(&self, user_id: i64) -> StorageResult<Vec<i64>> {
        let mut orgs: Vec<i64> = self
            .memberships
            .iter()
            .filter(|entry| entry.value().contains(&user_id))
            .map(|entry| *entry.key())
            .collect();
        orgs.sort_unstable();
        Ok(orgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_derives_closure_from_parent() {
        let store = MemoryBackend::new();
        let root = store.create_node(NewNode::root(1, "job")).await.unwrap();
        let child = store
            .create_node(NewNode::child(root.id, 1, "project"))
            .await
            .unwrap();
        let grandchild = store
            .create_node(NewNode::child(child.id, 1, "event"))
            .await
            .unwrap();

        let edges = store.ancestors(grandchild.id).await.unwrap();
        let chain: Vec<(Uuid, u32)> = edges.iter().map(|e| (e.ancestor_id, e.depth)).collect();
        assert_eq!(
            chain,
            vec![(grandchild.id, 0), (child.id, 1), (root.id, 2)]
        );
    }

    #[tokio::test]
    async fn create_under_missing_parent_fails() {
        let store = MemoryBackend::new();
        let err = store
            .create_node(NewNode::child(Uuid::new_v4(), 1, "job"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn explicit_id_collision_fails() {
        let store = MemoryBackend::new();
        let mut new = NewNode::root(1, "job");
        new.id = Some(Uuid::new_v4());
        store.create_node(new.clone()).await.unwrap();
        assert!(matches!(
            store.create_node(new).await.unwrap_err(),
            StorageError::NodeExists { .. }
        ));
    }

    #[tokio::test]
    async fn move_rewrites_subtree_closure() {
        let store = MemoryBackend::new();
        let a = store.create_node(NewNode::root(1, "job")).await.unwrap();
        let b = store.create_node(NewNode::root(1, "job")).await.unwrap();
        let child = store
            .create_node(NewNode::child(a.id, 1, "project"))
            .await
            .unwrap();
        let leaf = store
            .create_node(NewNode::child(child.id, 1, "event"))
            .await
            .unwrap();

        store.move_node(child.id, Some(b.id)).await.unwrap();

        let chain: Vec<(Uuid, u32)> = store
            .ancestors(leaf.id)
            .await
            .unwrap()
            .iter()
            .map(|e| (e.ancestor_id, e.depth))
            .collect();
        assert_eq!(chain, vec![(leaf.id, 0), (child.id, 1), (b.id, 2)]);
        assert_eq!(
            store.get_node(child.id).await.unwrap().unwrap().parent_id,
            Some(b.id)
        );
    }

    #[tokio::test]
    async fn move_into_own_subtree_is_rejected() {
        let store = MemoryBackend::new();
        let root = store.create_node(NewNode::root(1, "job")).await.unwrap();
        let child = store
            .create_node(NewNode::child(root.id, 1, "project"))
            .await
            .unwrap();

        let err = store.move_node(root.id, Some(child.id)).await.unwrap_err();
        assert!(matches!(err, StorageError::WouldCreateCycle { .. }));
        // Closure unchanged.
        let chain = store.ancestors(child.id).await.unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn delete_cascades_to_subtree_and_policies() {
        let store = MemoryBackend::new();
        let root = store.create_node(NewNode::root(1, "job")).await.unwrap();
        let child = store
            .create_node(NewNode::child(root.id, 1, "project"))
            .await
            .unwrap();
        let policy = Policy {
            id: Uuid::new_v4(),
            node_id: child.id,
            level: DetailLevel::Full,
            action: Action::View,
            subject: Subject::Public,
            effect: lifeline_domain::model::Effect::Allow,
            granted_by: 1,
            expires_at: None,
            created_at: Utc::now(),
        };
        store.replace_policies(child.id, vec![policy]).await.unwrap();

        store.delete_node(root.id).await.unwrap();
        assert!(store.get_node(root.id).await.unwrap().is_none());
        assert!(store.get_node(child.id).await.unwrap().is_none());
        assert!(store.policies_for_node(child.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuild_matches_incremental_maintenance() {
        let store = MemoryBackend::new();
        let a = store.create_node(NewNode::root(1, "job")).await.unwrap();
        let b = store
            .create_node(NewNode::child(a.id, 1, "project"))
            .await
            .unwrap();
        let c = store
            .create_node(NewNode::child(b.id, 1, "event"))
            .await
            .unwrap();
        let d = store.create_node(NewNode::root(2, "job")).await.unwrap();
        store.move_node(b.id, Some(d.id)).await.unwrap();

        let incremental = store.ancestors(c.id).await.unwrap();
        store.rebuild_closure().await.unwrap();
        let rebuilt = store.ancestors(c.id).await.unwrap();
        assert_eq!(incremental, rebuilt);
    }
}
