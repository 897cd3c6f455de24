//! lifeline-domain: Core node authorization logic
//!
//! This crate contains the authorization engine for the lifeline timeline
//! application:
//! - Canonical data model (nodes, policies, subjects, detail levels)
//! - Precedence resolver for inherited, competing policies
//! - The public authorization service (single check, access level,
//!   owner-only policy mutation, batch authorization)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               lifeline-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/     - Policy & node types, boundary │
//! │               validation                    │
//! │  resolver/  - Precedence resolution engine  │
//! │  service/   - Public authorization API      │
//! │  observe    - Logging setup                 │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Storage backends live in `lifeline-storage` and plug in through the
//! narrow reader/writer traits in [`resolver`].

pub mod error;
pub mod model;
pub mod observe;
pub mod resolver;
pub mod service;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use model::{Action, DetailLevel, Effect, Node, Policy, PolicyDraft, Subject};
pub use service::{AccessBucket, AuthorizationService, BatchAccessResponse};
