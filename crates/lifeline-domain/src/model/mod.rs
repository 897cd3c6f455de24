//! Canonical types and boundary validation for the authorization engine.

mod types;
mod validate;

pub use types::{
    Action, DetailLevel, Effect, Node, OrgId, Policy, PolicyDraft, Subject, UserId,
    MAX_EXPIRY_DAYS, MAX_POLICIES_PER_NODE,
};
pub use validate::{parse_node_id, validate_drafts, validate_requester, validate_subject_id};
