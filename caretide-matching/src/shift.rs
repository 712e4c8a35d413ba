//! Open shifts and their matching lifecycle
//!
//! An open shift is an unassigned visit offered for matching. Only the
//! matching engine moves a shift through its lifecycle; every transition is
//! checked here and illegal moves surface as `InvalidTransition`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{MatchingError, MatchingResult};
use crate::ids::{
    BranchId, CaregiverId, ClientId, OpenShiftId, OrganizationId, ServiceTypeId, UserId, VisitId,
};

/// Matching lifecycle state of an open shift
///
/// `NEW → MATCHING → {MATCHED, NO_MATCH}`, `MATCHED → PROPOSED →
/// {ASSIGNED, MATCHED}`, `NO_MATCH → MATCHING` for re-attempts.
/// `ASSIGNED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingStatus {
    /// Shift was created and has never been matched
    New,
    /// A matcher currently holds the shift
    Matching,
    /// Ranking finished with at least one eligible candidate
    Matched,
    /// Proposals are out to caregivers
    Proposed,
    /// A proposal was accepted and the visit is scheduled
    Assigned,
    /// Ranking finished with no eligible candidate
    NoMatch,
}

impl MatchingStatus {
    /// States a matcher may take hold of
    pub fn is_matchable(self) -> bool {
        matches!(
            self,
            MatchingStatus::New
                | MatchingStatus::NoMatch
                | MatchingStatus::Matched
                | MatchingStatus::Proposed
        )
    }

    /// Terminal states block further proposal creation
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchingStatus::Assigned)
    }

    /// Wire/storage label, matching the serde encoding
    pub fn as_str(self) -> &'static str {
        match self {
            MatchingStatus::New => "NEW",
            MatchingStatus::Matching => "MATCHING",
            MatchingStatus::Matched => "MATCHED",
            MatchingStatus::Proposed => "PROPOSED",
            MatchingStatus::Assigned => "ASSIGNED",
            MatchingStatus::NoMatch => "NO_MATCH",
        }
    }
}

/// Scheduling priority of a shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for ShiftPriority {
    fn default() -> Self {
        ShiftPriority::Normal
    }
}

/// Client gender preference for the assigned caregiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Female,
    Male,
    NonBinary,
}

/// An unassigned visit offered for matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenShift {
    /// Unique shift identifier
    pub id: OpenShiftId,
    /// Owning visit; at most one live shift exists per visit
    pub visit_id: VisitId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Branch the shift is matched within
    pub branch_id: BranchId,
    /// Client receiving care
    pub client_id: ClientId,

    /// Calendar date of the visit
    pub scheduled_date: NaiveDate,
    /// Local start time
    pub start_time: NaiveTime,
    /// Local end time
    pub end_time: NaiveTime,
    /// Visit length in minutes
    pub duration_minutes: i64,
    /// IANA timezone of the visit location
    pub timezone: String,

    /// Skills the caregiver must bring
    pub required_skills: BTreeSet<String>,
    /// Certifications the caregiver must hold
    pub required_certifications: BTreeSet<String>,
    /// Service type of the underlying visit
    pub service_type_id: ServiceTypeId,

    /// Caregivers the client prefers
    pub preferred_caregivers: BTreeSet<CaregiverId>,
    /// Caregivers the client has blocked; never offered this shift
    pub blocked_caregivers: BTreeSet<CaregiverId>,
    /// Client gender preference, if any
    pub gender_preference: Option<Gender>,
    /// Client language preference, if any
    pub language_preference: Option<String>,

    /// Street address of the visit
    pub address: Option<String>,
    /// Latitude, when geocoded
    pub latitude: Option<f64>,
    /// Longitude, when geocoded
    pub longitude: Option<f64>,

    /// Current lifecycle state
    pub matching_status: MatchingStatus,
    /// Number of match attempts run so far; monotone
    pub match_attempts: u32,
    /// Instant of the most recent match attempt
    pub last_matched_at: Option<DateTime<Utc>>,
    /// Scheduling priority
    pub priority: ShiftPriority,
    /// Urgent shifts are surfaced first to caregivers
    pub is_urgent: bool,
    /// Date the shift must be filled by
    pub fill_by_date: Option<NaiveDate>,
    /// Coordinator notes
    pub notes: Option<String>,

    /// Creation stamp
    pub created_at: DateTime<Utc>,
    /// Creating user
    pub created_by: Option<UserId>,
    /// Last update stamp
    pub updated_at: DateTime<Utc>,
    /// Last updating user
    pub updated_by: Option<UserId>,
    /// Soft-delete stamp; deleted rows are invisible to queries
    pub deleted_at: Option<DateTime<Utc>>,
    /// Soft-deleting user
    pub deleted_by: Option<UserId>,
    /// Optimistic concurrency version; bumped on every write
    pub version: u64,
}

impl OpenShift {
    /// Whether the row is visible to queries
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Shift length in fractional hours
    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes as f64 / 60.0
    }

    /// Whether the target status is reachable from the current one
    ///
    /// Besides the matcher loop edges, `PROPOSED` is reachable directly
    /// from `NEW`, `MATCHED`, and `NO_MATCH`: manual proposals and
    /// caregiver self-select emit offers without a ranking pass.
    pub fn can_transition_to(&self, to: MatchingStatus) -> bool {
        use MatchingStatus::*;
        match (self.matching_status, to) {
            (from, Matching) => from.is_matchable(),
            (Matching, Matched) | (Matching, NoMatch) => true,
            (New | Matched | NoMatch, Proposed) => true,
            (Proposed, Assigned) | (Proposed, Matched) => true,
            _ => false,
        }
    }

    /// Move to a new lifecycle state, stamping the update
    pub fn transition_to(
        &mut self,
        to: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        if !self.can_transition_to(to) {
            return Err(MatchingError::InvalidTransition {
                entity: "open shift",
                from: self.matching_status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.matching_status = to;
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    /// Force the shift back to a prior non-`MATCHING` state after a failed
    /// or cancelled attempt
    pub fn revert_to(&mut self, prior: MatchingStatus, now: DateTime<Utc>) {
        debug_assert_ne!(prior, MatchingStatus::Matching);
        self.matching_status = prior;
        self.updated_at = now;
        self.version += 1;
    }
}
