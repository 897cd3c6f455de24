//! Canonical data model for nodes and authorization policies.
//!
//! The engine accepts exactly one strongly typed policy representation;
//! request shaping (alternate field names, string coercion) belongs to the
//! application layer, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for an individual user. Always positive.
pub type UserId = i64;

/// Identifier for an organization. Always positive.
pub type OrgId = i64;

/// Maximum number of policies that may attach to a single node,
/// enforced at mutation time.
pub const MAX_POLICIES_PER_NODE: usize = 50;

/// Maximum allowed policy expiry horizon, in days from now.
pub const MAX_EXPIRY_DAYS: i64 = 365;

/// Visibility granularity of a grant.
///
/// Levels are ordered: `Full` satisfies an `Overview` request, but an
/// `Overview` grant never satisfies a `Full` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Overview,
    Full,
}

impl DetailLevel {
    /// Returns true if a grant recorded at `self` satisfies a request
    /// for `requested`.
    pub fn satisfies(self, requested: DetailLevel) -> bool {
        self >= requested
    }

    /// Wire/storage name for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            DetailLevel::Overview => "overview",
            DetailLevel::Full => "full",
        }
    }
}

impl std::str::FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overview" => Ok(DetailLevel::Overview),
            "full" => Ok(DetailLevel::Full),
            other => Err(format!("unknown detail level: {other}")),
        }
    }
}

impl std::fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of access a policy grants or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Edit,
    Share,
    Delete,
}

impl Action {
    /// Whether a grant for this action must be recorded at full detail
    /// level. Editing rights never make sense at summary level.
    pub fn requires_full_level(self) -> bool {
        !matches!(self, Action::View)
    }

    /// Wire/storage name for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::Share => "share",
            Action::Delete => "delete",
        }
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Action::View),
            "edit" => Ok(Action::Edit),
            "share" => Ok(Action::Share),
            "delete" => Ok(Action::Delete),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow or Deny outcome of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    /// Wire/storage name for this effect.
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "ALLOW",
            Effect::Deny => "DENY",
        }
    }
}

impl std::str::FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOW" => Ok(Effect::Allow),
            "DENY" => Ok(Effect::Deny),
            other => Err(format!("unknown effect: {other}")),
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity a policy applies to.
///
/// A `Public` subject structurally cannot carry a subject id, which makes
/// the "public policy with subject id" invariant unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    User(UserId),
    Organization(OrgId),
    Public,
}

impl Subject {
    /// Precedence specificity of this subject kind. A user-specific grant
    /// overrides an organization grant overrides a public grant at equal
    /// distance.
    pub fn specificity(self) -> u8 {
        match self {
            Subject::User(_) => 3,
            Subject::Organization(_) => 2,
            Subject::Public => 0,
        }
    }

    /// Wire/storage name for this subject kind.
    pub fn kind_str(self) -> &'static str {
        match self {
            Subject::User(_) => "user",
            Subject::Organization(_) => "organization",
            Subject::Public => "public",
        }
    }

    /// The subject id column value: present for users and organizations,
    /// absent for the public.
    pub fn id(self) -> Option<i64> {
        match self {
            Subject::User(id) | Subject::Organization(id) => Some(id),
            Subject::Public => None,
        }
    }

    /// Reassembles a subject from its storage representation.
    pub fn from_parts(kind: &str, id: Option<i64>) -> Result<Self, String> {
        match (kind, id) {
            ("user", Some(id)) => Ok(Subject::User(id)),
            ("organization", Some(id)) => Ok(Subject::Organization(id)),
            ("public", None) => Ok(Subject::Public),
            ("public", Some(_)) => Err("public subject cannot carry a subject id".to_string()),
            ("user", None) | ("organization", None) => {
                Err(format!("{kind} subject requires a subject id"))
            }
            (other, _) => Err(format!("unknown subject type: {other}")),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}:{}", self.kind_str(), id),
            None => f.write_str(self.kind_str()),
        }
    }
}

/// A rule binding a subject, action, detail level, and effect to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub id: Uuid,
    pub node_id: Uuid,
    pub level: DetailLevel,
    pub action: Action,
    pub subject: Subject,
    pub effect: Effect,
    /// The user who recorded this policy. Stamped by the service.
    pub granted_by: UserId,
    /// Optional expiry; an expired policy is treated as absent by every
    /// evaluation path, never physically required to be deleted.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Returns true if this policy is eligible at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Caller-supplied shape for `set_policies`. The service stamps `id`,
/// `granted_by` and `created_at` on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDraft {
    pub level: DetailLevel,
    pub action: Action,
    pub subject: Subject,
    pub effect: Effect,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PolicyDraft {
    /// Creates a draft with no expiry.
    pub fn new(level: DetailLevel, action: Action, subject: Subject, effect: Effect) -> Self {
        Self {
            level,
            action,
            subject,
            effect,
            expires_at: None,
        }
    }

    /// Creates a draft with an expiry.
    pub fn expiring(
        level: DetailLevel,
        action: Action,
        subject: Subject,
        effect: Effect,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            action,
            subject,
            effect,
            expires_at: Some(expires_at),
        }
    }
}

/// A single element of a user's timeline tree.
///
/// `node_type` and `metadata` follow the surrounding application's timeline
/// shape (job, education, project, ...; free-form JSON) and are opaque to
/// the authorization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: Uuid,
    /// Exactly one parent or none; the parent graph is a forest.
    pub parent_id: Option<Uuid>,
    /// Immutable after creation. Only this user passes the owner fast-path.
    pub owner_id: UserId,
    pub node_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
