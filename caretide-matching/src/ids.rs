//! Identifier newtypes for the matching domain
//!
//! Every entity id is a distinct wrapper over a v4 UUID so shift, visit,
//! caregiver, and proposal ids cannot be confused at call sites.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MatchingError, MatchingResult};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from string form
            pub fn parse_str(s: &str) -> MatchingResult<Self> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    MatchingError::Validation(format!("Invalid {} id: {}", $label, e))
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for an open shift
    OpenShiftId,
    "open shift"
);
entity_id!(
    /// Unique identifier for a visit
    VisitId,
    "visit"
);
entity_id!(
    /// Unique identifier for a caregiver
    CaregiverId,
    "caregiver"
);
entity_id!(
    /// Unique identifier for an assignment proposal
    ProposalId,
    "proposal"
);
entity_id!(
    /// Unique identifier for an organization
    OrganizationId,
    "organization"
);
entity_id!(
    /// Unique identifier for a branch
    BranchId,
    "branch"
);
entity_id!(
    /// Unique identifier for a client
    ClientId,
    "client"
);
entity_id!(
    /// Unique identifier for a matching configuration
    ConfigurationId,
    "configuration"
);
entity_id!(
    /// Unique identifier for a service type
    ServiceTypeId,
    "service type"
);
entity_id!(
    /// Unique identifier for a platform user (auditing)
    UserId,
    "user"
);
entity_id!(
    /// Unique identifier for a match history row
    MatchHistoryId,
    "match history"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_string() {
        let id = OpenShiftId::new();
        let parsed = OpenShiftId::parse_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CaregiverId::parse_str("not-a-uuid").is_err());
    }

    #[test]
    fn test_ids_are_distinct() {
        assert_ne!(ProposalId::new(), ProposalId::new());
    }
}
