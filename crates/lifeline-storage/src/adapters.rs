//! Implementations of the domain reader/writer traits for the backends.
//!
//! The domain crate defines narrow traits for the data access the
//! resolver and service need; the backends implement them here by
//! delegating to their wide store traits and mapping `StorageError` into
//! the domain's `Store` passthrough, so backend failures propagate
//! unchanged to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lifeline_domain::error::{DomainError, DomainResult};
use lifeline_domain::model::{Action, DetailLevel, Node, Policy, Subject};
use lifeline_domain::resolver::{
    HierarchyReader, MembershipReader, PolicyCandidate, PolicyReader, PolicyWriter,
};

use crate::error::StorageError;
use crate::memory::MemoryBackend;
use crate::postgres::PostgresBackend;
use crate::traits::{HierarchyStore, MembershipIndex, PolicyStore};

fn store_err(e: StorageError) -> DomainError {
    DomainError::Store {
        message: e.to_string(),
    }
}

macro_rules! impl_domain_traits {
    ($backend:ty) => {
        #[async_trait]
        impl HierarchyReader for $backend {
            async fn get_node(&self, id: Uuid) -> DomainResult<Option<Node>> {
                HierarchyStore::get_node(self, id).await.map_err(store_err)
            }

            async fn get_nodes(&self, ids: &[Uuid]) -> DomainResult<Vec<Node>> {
                HierarchyStore::get_nodes(self, ids).await.map_err(store_err)
            }
        }

        #[async_trait]
        impl PolicyReader for $backend {
            async fn candidate_policies(
                &self,
                targets: &[Uuid],
                subjects: &[Subject],
                action: Action,
                level: DetailLevel,
                now: DateTime<Utc>,
            ) -> DomainResult<Vec<PolicyCandidate>> {
                PolicyStore::candidate_policies(self, targets, subjects, action, level, now)
                    .await
                    .map_err(store_err)
            }

            async fn policies_for_node(&self, node_id: Uuid) -> DomainResult<Vec<Policy>> {
                PolicyStore::policies_for_node(self, node_id)
                    .await
                    .map_err(store_err)
            }
        }

        #[async_trait]
        impl PolicyWriter for $backend {
            async fn replace_policies(
                &self,
                node_id: Uuid,
                policies: Vec<Policy>,
            ) -> DomainResult<()> {
                PolicyStore::replace_policies(self, node_id, policies)
                    .await
                    .map_err(store_err)
            }
        }

        #[async_trait]
        impl MembershipReader for $backend {
            async fn is_member(&self, user_id: i64, org_id: i64) -> DomainResult<bool> {
                MembershipIndex::is_member(self, user_id, org_id)
                    .await
                    .map_err(store_err)
            }

            async fn organizations_for(&self, user_id: i64) -> DomainResult<Vec<i64>> {
                MembershipIndex::organizations_for(self, user_id)
                    .await
                    .map_err(store_err)
            }
        }
    };
}

impl_domain_traits!(MemoryBackend);
impl_domain_traits!(PostgresBackend);
