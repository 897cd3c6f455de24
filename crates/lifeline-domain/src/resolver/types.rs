//! Types for precedence resolution.

use uuid::Uuid;

use crate::model::Policy;

/// A policy reachable from a target node, tagged with how far up the tree
/// it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyCandidate {
    /// The node the question is being asked about.
    pub target_id: Uuid,
    /// Closure distance from the target to the node the policy is attached
    /// to: 0 for the target itself, 1 for its parent, and so on.
    pub distance: u32,
    pub policy: Policy,
}

impl PolicyCandidate {
    pub fn new(target_id: Uuid, distance: u32, policy: Policy) -> Self {
        Self {
            target_id,
            distance,
            policy,
        }
    }
}
