//! Persistence capabilities
//!
//! `ProposalStore` owns open shifts, proposals, match history, and
//! preference profiles; `ConfigStore` owns matching configurations. Both
//! are capability traits: implementations may be relational, in-memory,
//! or embedded. Soft-deleted rows are invisible everywhere except
//! explicit audit paths, and the concurrency-sensitive transitions
//! (shift CAS, accept, supersede, expire) are single store operations so
//! every implementation can make them atomic.

mod memory;
mod persist;

pub use memory::{InMemoryDataPort, MemoryStore};
pub use persist::SledStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::config::MatchingConfiguration;
use crate::error::MatchingResult;
use crate::history::MatchHistory;
use crate::ids::{
    BranchId, CaregiverId, ConfigurationId, OpenShiftId, OrganizationId, ProposalId, UserId,
    VisitId,
};
use crate::preferences::CaregiverPreferenceProfile;
use crate::proposal::{AssignmentProposal, ResponseMethod};
use crate::query::{PagedResult, Pagination, ProposalFilters, ShiftFilters};
use crate::shift::{MatchingStatus, OpenShift};

/// Store surface for shifts, proposals, history, and preference profiles
#[async_trait]
pub trait ProposalStore: Send + Sync {
    // Open shifts

    /// Insert a new shift; fails `Conflict` when a live shift already
    /// exists for the visit
    async fn insert_shift(&self, shift: OpenShift) -> MatchingResult<OpenShift>;

    /// Load one live shift
    async fn get_shift(&self, id: OpenShiftId) -> MatchingResult<Option<OpenShift>>;

    /// Find the live shift owning a visit
    async fn find_shift_by_visit(&self, visit_id: VisitId)
        -> MatchingResult<Option<OpenShift>>;

    /// Atomically take hold of a shift for matching: CAS any matchable
    /// status to `MATCHING`, increment the attempt counter, and stamp
    /// `last_matched_at`. Fails `Concurrency` when another matcher holds
    /// the shift and `InvalidTransition` from terminal states.
    async fn begin_matching(
        &self,
        id: OpenShiftId,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift>;

    /// Atomically apply a legal lifecycle transition
    async fn transition_shift(
        &self,
        id: OpenShiftId,
        to: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift>;

    /// Force a shift out of `MATCHING` back to its prior status after a
    /// failed or cancelled attempt
    async fn revert_shift(
        &self,
        id: OpenShiftId,
        prior: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift>;

    /// Live shifts in a branch within a date window, restricted to the
    /// given statuses
    async fn shifts_in_window(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
        statuses: &[MatchingStatus],
    ) -> MatchingResult<Vec<OpenShift>>;

    /// Filtered, paginated shift search
    async fn search_shifts(
        &self,
        filters: &ShiftFilters,
        pagination: &Pagination,
    ) -> MatchingResult<PagedResult<OpenShift>>;

    /// Soft-delete a shift and its still-open proposals
    async fn soft_delete_shift(
        &self,
        id: OpenShiftId,
        by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> MatchingResult<()>;

    // Proposals

    /// Insert a new proposal
    async fn insert_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal>;

    /// Load one live proposal
    async fn get_proposal(
        &self,
        id: ProposalId,
    ) -> MatchingResult<Option<AssignmentProposal>>;

    /// All live proposals of one shift
    async fn proposals_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<AssignmentProposal>>;

    /// Write back a mutated proposal; fails `Conflict` unless the row
    /// advanced exactly one version from the stored one
    async fn update_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal>;

    /// Unconditionally restore a proposal snapshot; compensation path for
    /// a failed accept sequence
    async fn restore_proposal(&self, snapshot: AssignmentProposal) -> MatchingResult<()>;

    /// Atomically accept a proposal: the row must still be open and no
    /// live sibling of the same shift may already be `ACCEPTED`
    async fn mark_proposal_accepted(
        &self,
        id: ProposalId,
        response_method: ResponseMethod,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> MatchingResult<AssignmentProposal>;

    /// Atomically supersede every open sibling of a shift except the
    /// accepted proposal; returns the rows that transitioned
    async fn supersede_open_siblings(
        &self,
        shift_id: OpenShiftId,
        except: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Vec<AssignmentProposal>>;

    /// Conditionally expire a proposal: a no-op returning `None` when the
    /// row already left the open set, so sweeps are idempotent
    async fn expire_proposal(
        &self,
        id: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Option<AssignmentProposal>>;

    /// All live proposals still in an open state
    async fn list_open_proposals(&self) -> MatchingResult<Vec<AssignmentProposal>>;

    /// Filtered, paginated proposal search
    async fn search_proposals(
        &self,
        filters: &ProposalFilters,
        pagination: &Pagination,
    ) -> MatchingResult<PagedResult<AssignmentProposal>>;

    // Match history

    /// Append one audit row; append-only, no updates
    async fn append_history(&self, row: MatchHistory) -> MatchingResult<()>;

    /// Audit rows of one shift, oldest first
    async fn history_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<MatchHistory>>;

    // Preference profiles

    /// Load the profile of one caregiver
    async fn get_preference_profile(
        &self,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Option<CaregiverPreferenceProfile>>;

    /// Create or replace the profile of one caregiver
    async fn upsert_preference_profile(
        &self,
        profile: CaregiverPreferenceProfile,
    ) -> MatchingResult<CaregiverPreferenceProfile>;
}

/// Store surface for matching configurations
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load one live configuration
    async fn get_configuration(
        &self,
        id: ConfigurationId,
    ) -> MatchingResult<Option<MatchingConfiguration>>;

    /// Resolve the active default for an (organization, branch) pair;
    /// a branch-scoped default shadows the organization-wide one
    async fn resolve_default(
        &self,
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
    ) -> MatchingResult<Option<MatchingConfiguration>>;

    /// Create or replace a configuration, keeping at most one active
    /// default per (organization, branch) scope
    async fn upsert_configuration(
        &self,
        config: MatchingConfiguration,
    ) -> MatchingResult<MatchingConfiguration>;
}
