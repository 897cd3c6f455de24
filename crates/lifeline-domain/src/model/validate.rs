//! Input validation at the engine boundary.
//!
//! Validation failures are detected and rejected before any store access.
//! Format checks happen before existence checks: a malformed id is
//! `InvalidIdentifier`, a well-formed id that matches nothing is
//! `NodeNotFound`.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::model::{
    DetailLevel, PolicyDraft, Subject, UserId, MAX_EXPIRY_DAYS, MAX_POLICIES_PER_NODE,
};

/// Parses a textual node id into its canonical form.
///
/// This is the sanctioned boundary helper for callers holding string ids
/// (HTTP paths, frontend payloads); everything past this point is
/// `Uuid`-typed.
///
/// # Examples
///
/// ```
/// use lifeline_domain::model::parse_node_id;
///
/// assert!(parse_node_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(parse_node_id("not-a-node-id").is_err());
/// assert!(parse_node_id("").is_err());
/// ```
pub fn parse_node_id(raw: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| DomainError::InvalidIdentifier {
        value: raw.to_string(),
    })
}

/// Validates that a subject id is a positive integer.
///
/// # Examples
///
/// ```
/// use lifeline_domain::model::validate_subject_id;
///
/// assert!(validate_subject_id(42).is_ok());
/// assert!(validate_subject_id(0).is_err());
/// assert!(validate_subject_id(-7).is_err());
/// ```
pub fn validate_subject_id(id: i64) -> DomainResult<()> {
    if id > 0 {
        Ok(())
    } else {
        Err(DomainError::InvalidSubject { value: id })
    }
}

/// Validates an optional requesting subject. `None` is the anonymous
/// public requester and always valid.
pub fn validate_requester(subject: Option<UserId>) -> DomainResult<()> {
    match subject {
        Some(id) => validate_subject_id(id),
        None => Ok(()),
    }
}

/// Validates a full draft set for `set_policies`, without touching any
/// store. Membership checks require the membership index and happen in the
/// service after this passes.
pub fn validate_drafts(drafts: &[PolicyDraft], now: DateTime<Utc>) -> DomainResult<()> {
    if drafts.len() > MAX_POLICIES_PER_NODE {
        return Err(DomainError::TooManyPolicies {
            count: drafts.len(),
            max: MAX_POLICIES_PER_NODE,
        });
    }

    let horizon = now + Duration::days(MAX_EXPIRY_DAYS);
    for draft in drafts {
        if let Subject::User(id) | Subject::Organization(id) = draft.subject {
            validate_subject_id(id)?;
        }

        if draft.action.requires_full_level() && draft.level != DetailLevel::Full {
            return Err(DomainError::InsufficientLevelForAction {
                action: draft.action.to_string(),
            });
        }

        if let Some(expires_at) = draft.expires_at {
            if expires_at <= now {
                return Err(DomainError::InvalidExpiry {
                    message: format!("expiry {expires_at} is not in the future"),
                });
            }
            if expires_at > horizon {
                return Err(DomainError::InvalidExpiry {
                    message: format!(
                        "expiry {expires_at} is more than {MAX_EXPIRY_DAYS} days ahead"
                    ),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, DetailLevel, Effect};

    fn draft(level: DetailLevel, action: Action) -> PolicyDraft {
        PolicyDraft::new(level, action, Subject::Public, Effect::Allow)
    }

    #[test]
    fn malformed_node_id_is_rejected() {
        assert!(matches!(
            parse_node_id("timeline-node-1"),
            Err(DomainError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn edit_at_overview_level_is_rejected() {
        let err = validate_drafts(&[draft(DetailLevel::Overview, Action::Edit)], Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientLevelForAction { .. }));
    }

    #[test]
    fn share_and_delete_require_full_level() {
        let now = Utc::now();
        for action in [Action::Share, Action::Delete] {
            assert!(validate_drafts(&[draft(DetailLevel::Overview, action)], now).is_err());
            assert!(validate_drafts(&[draft(DetailLevel::Full, action)], now).is_ok());
        }
    }

    #[test]
    fn past_expiry_is_rejected() {
        let now = Utc::now();
        let mut d = draft(DetailLevel::Full, Action::View);
        d.expires_at = Some(now - Duration::seconds(5));
        assert!(matches!(
            validate_drafts(&[d], now),
            Err(DomainError::InvalidExpiry { .. })
        ));
    }

    #[test]
    fn expiry_beyond_horizon_is_rejected() {
        let now = Utc::now();
        let mut d = draft(DetailLevel::Full, Action::View);
        d.expires_at = Some(now + Duration::days(MAX_EXPIRY_DAYS + 1));
        assert!(matches!(
            validate_drafts(&[d], now),
            Err(DomainError::InvalidExpiry { .. })
        ));
    }

    #[test]
    fn expiry_within_horizon_is_accepted() {
        let now = Utc::now();
        let mut d = draft(DetailLevel::Full, Action::View);
        d.expires_at = Some(now + Duration::days(30));
        assert!(validate_drafts(&[d], now).is_ok());
    }

    #[test]
    fn oversized_draft_set_is_rejected() {
        let now = Utc::now();
        let drafts = vec![draft(DetailLevel::Full, Action::View); MAX_POLICIES_PER_NODE + 1];
        assert!(matches!(
            validate_drafts(&drafts, now),
            Err(DomainError::TooManyPolicies { .. })
        ));
    }

    #[test]
    fn non_positive_subject_ids_are_rejected() {
        let now = Utc::now();
        let d = PolicyDraft::new(
            DetailLevel::Full,
            Action::View,
            Subject::User(0),
            Effect::Allow,
        );
        assert!(matches!(
            validate_drafts(&[d], now),
            Err(DomainError::InvalidSubject { .. })
        ));
    }
}
