//! Data types for batch authorization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of node ids per batch authorization request. Generous
/// because the dominant caller renders whole timelines; the bound exists
/// to keep one request from pinning a connection indefinitely.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// The bucket an input node id landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessBucket {
    Authorized,
    Unauthorized,
    NotFound,
}

/// Response from a batch authorization check.
///
/// Every input id lands in exactly one bucket; duplicates are evaluated
/// and reported once. Ids that do not exist, or are not owned by the
/// requested target owner, land in `not_found`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAccessResponse {
    pub authorized: Vec<Uuid>,
    pub unauthorized: Vec<Uuid>,
    pub not_found: Vec<Uuid>,
}

impl BatchAccessResponse {
    /// Looks up which bucket an id landed in.
    pub fn bucket_of(&self, id: Uuid) -> Option<AccessBucket> {
        if self.authorized.contains(&id) {
            Some(AccessBucket::Authorized)
        } else if self.unauthorized.contains(&id) {
            Some(AccessBucket::Unauthorized)
        } else if self.not_found.contains(&id) {
            Some(AccessBucket::NotFound)
        } else {
            None
        }
    }

    /// Flattens the response into the node-id-to-bucket map shape the
    /// surrounding application consumes.
    pub fn into_bucket_map(self) -> HashMap<Uuid, AccessBucket> {
        let mut map = HashMap::with_capacity(
            self.authorized.len() + self.unauthorized.len() + self.not_found.len(),
        );
        for id in self.authorized {
            map.insert(id, AccessBucket::Authorized);
        }
        for id in self.unauthorized {
            map.insert(id, AccessBucket::Unauthorized);
        }
        for id in self.not_found {
            map.insert(id, AccessBucket::NotFound);
        }
        map
    }

    /// Total number of distinct ids across all buckets.
    pub fn len(&self) -> usize {
        self.authorized.len() + self.unauthorized.len() + self.not_found.len()
    }

    /// True when no ids were evaluated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_serialize_with_application_wire_names() {
        let json = serde_json::to_string(&AccessBucket::NotFound).unwrap();
        assert_eq!(json, "\"notFound\"");
        let json = serde_json::to_string(&AccessBucket::Authorized).unwrap();
        assert_eq!(json, "\"authorized\"");
    }

    #[test]
    fn response_flattens_to_bucket_map() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let response = BatchAccessResponse {
            authorized: vec![a],
            unauthorized: vec![b],
            not_found: vec![c],
        };
        assert_eq!(response.bucket_of(a), Some(AccessBucket::Authorized));
        assert_eq!(response.bucket_of(Uuid::new_v4()), None);

        let map = response.into_bucket_map();
        assert_eq!(map[&b], AccessBucket::Unauthorized);
        assert_eq!(map[&c], AccessBucket::NotFound);
        assert_eq!(map.len(), 3);
    }
}
