//! lifeline-storage: Storage backends for the node authorization engine
//!
//! Two backends behind one set of traits:
//! - [`MemoryBackend`]: DashMap-based, for tests and development
//! - [`PostgresBackend`]: sqlx, for production
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              lifeline-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits    - HierarchyStore / PolicyStore / │
//! │              MembershipIndex                │
//! │  memory    - In-memory backend              │
//! │  postgres  - PostgreSQL backend             │
//! │  adapters  - lifeline-domain trait impls    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Both backends also implement the narrow reader/writer traits from
//! `lifeline-domain`, so an `Arc<MemoryBackend>` or `Arc<PostgresBackend>`
//! plugs straight into `AuthorizationService::new`.

mod adapters;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use postgres::{PostgresBackend, PostgresConfig};
pub use traits::{
    validate_policy_set, ClosureEdge, HierarchyStore, MembershipIndex, NewNode, PolicyStore,
};
