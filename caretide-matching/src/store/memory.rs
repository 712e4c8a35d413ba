//! In-memory store and data port
//!
//! Backed by `DashMap` so row mutations are atomic per key; the accept
//! path's cross-row invariant (one `ACCEPTED` per shift, siblings
//! superseded together) is serialized by a dedicated mutex. Used by the
//! integration tests and by embedded deployments without a database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::caregiver::{CaregiverRecord, TimeInterval};
use crate::config::MatchingConfiguration;
use crate::error::{MatchingError, MatchingResult};
use crate::history::MatchHistory;
use crate::ids::{
    BranchId, CaregiverId, ClientId, ConfigurationId, OpenShiftId, OrganizationId, ProposalId,
    UserId, VisitId,
};
use crate::ports::{ClientExperience, DataPort, VisitRecord, VisitStatus};
use crate::preferences::CaregiverPreferenceProfile;
use crate::proposal::{AssignmentProposal, ProposalStatus, ResponseMethod};
use crate::query::{PagedResult, Pagination, ProposalFilters, ShiftFilters, SortOrder};
use crate::shift::{MatchingStatus, OpenShift};

use super::{ConfigStore, ProposalStore};

/// DashMap-backed implementation of `ProposalStore` and `ConfigStore`
#[derive(Default)]
pub struct MemoryStore {
    shifts: DashMap<OpenShiftId, OpenShift>,
    shift_by_visit: DashMap<VisitId, OpenShiftId>,
    proposals: DashMap<ProposalId, AssignmentProposal>,
    history: Mutex<Vec<MatchHistory>>,
    profiles: DashMap<CaregiverId, CaregiverPreferenceProfile>,
    configurations: DashMap<ConfigurationId, MatchingConfiguration>,
    // Serializes accept/supersede so the one-ACCEPTED-per-shift invariant
    // holds across rows
    accept_lock: Mutex<()>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All history rows, for audit assertions in tests
    pub fn history_snapshot(&self) -> Vec<MatchHistory> {
        self.history.lock().clone()
    }

    fn sort_shifts(rows: &mut [OpenShift], pagination: &Pagination) {
        match pagination.sort_by.as_deref() {
            Some("scheduled_date") => rows.sort_by_key(|s| (s.scheduled_date, s.start_time)),
            Some("priority") => rows.sort_by_key(|s| s.priority),
            _ => rows.sort_by_key(|s| s.created_at),
        }
        if pagination.sort_order == SortOrder::Desc {
            rows.reverse();
        }
    }

    fn sort_proposals(rows: &mut [AssignmentProposal], pagination: &Pagination) {
        match pagination.sort_by.as_deref() {
            Some("match_score") => rows.sort_by_key(|p| p.match_score),
            _ => rows.sort_by_key(|p| p.proposed_at),
        }
        if pagination.sort_order == SortOrder::Desc {
            rows.reverse();
        }
    }
}

#[async_trait]
impl ProposalStore for MemoryStore {
    async fn insert_shift(&self, shift: OpenShift) -> MatchingResult<OpenShift> {
        if let Some(existing_id) = self.shift_by_visit.get(&shift.visit_id) {
            if let Some(existing) = self.shifts.get(existing_id.value()) {
                if existing.is_live() {
                    return Err(MatchingError::Conflict(format!(
                        "open shift already exists for visit {}",
                        shift.visit_id
                    )));
                }
            }
        }
        self.shift_by_visit.insert(shift.visit_id, shift.id);
        self.shifts.insert(shift.id, shift.clone());
        Ok(shift)
    }

    async fn get_shift(&self, id: OpenShiftId) -> MatchingResult<Option<OpenShift>> {
        Ok(self
            .shifts
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(OpenShift::is_live))
    }

    async fn find_shift_by_visit(
        &self,
        visit_id: VisitId,
    ) -> MatchingResult<Option<OpenShift>> {
        let Some(shift_id) = self.shift_by_visit.get(&visit_id).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.get_shift(shift_id).await
    }

    async fn begin_matching(
        &self,
        id: OpenShiftId,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        let mut entry = self
            .shifts
            .get_mut(&id)
            .filter(|e| e.is_live())
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;

        if entry.matching_status == MatchingStatus::Matching {
            return Err(MatchingError::Concurrency(id.to_string()));
        }
        entry.transition_to(MatchingStatus::Matching, now)?;
        entry.match_attempts += 1;
        entry.last_matched_at = Some(now);
        Ok(entry.clone())
    }

    async fn transition_shift(
        &self,
        id: OpenShiftId,
        to: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        let mut entry = self
            .shifts
            .get_mut(&id)
            .filter(|e| e.is_live())
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;
        entry.transition_to(to, now)?;
        Ok(entry.clone())
    }

    async fn revert_shift(
        &self,
        id: OpenShiftId,
        prior: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        let mut entry = self
            .shifts
            .get_mut(&id)
            .filter(|e| e.is_live())
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;
        entry.revert_to(prior, now);
        Ok(entry.clone())
    }

    async fn shifts_in_window(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
        statuses: &[MatchingStatus],
    ) -> MatchingResult<Vec<OpenShift>> {
        let mut rows: Vec<OpenShift> = self
            .shifts
            .iter()
            .filter(|entry| {
                let s = entry.value();
                s.is_live()
                    && s.branch_id == branch_id
                    && s.scheduled_date >= from
                    && s.scheduled_date <= to
                    && statuses.contains(&s.matching_status)
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|s| (s.scheduled_date, s.start_time));
        Ok(rows)
    }

    async fn search_shifts(
        &self,
        filters: &ShiftFilters,
        pagination: &Pagination,
    ) -> MatchingResult<PagedResult<OpenShift>> {
        let mut rows: Vec<OpenShift> = self
            .shifts
            .iter()
            .filter(|entry| entry.is_live() && filters.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Self::sort_shifts(&mut rows, pagination);
        Ok(PagedResult::paginate(rows, pagination))
    }

    async fn soft_delete_shift(
        &self,
        id: OpenShiftId,
        by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        {
            let mut entry = self
                .shifts
                .get_mut(&id)
                .filter(|e| e.is_live())
                .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;
            entry.deleted_at = Some(now);
            entry.deleted_by = by;
            entry.version += 1;
        }
        // Dangling open proposals go with the shift
        for mut proposal in self.proposals.iter_mut() {
            if proposal.open_shift_id == id && proposal.is_live() && proposal.status.is_open() {
                proposal.deleted_at = Some(now);
                proposal.deleted_by = by;
                proposal.version += 1;
            }
        }
        Ok(())
    }

    async fn insert_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal> {
        self.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    async fn get_proposal(
        &self,
        id: ProposalId,
    ) -> MatchingResult<Option<AssignmentProposal>> {
        Ok(self
            .proposals
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(AssignmentProposal::is_live))
    }

    async fn proposals_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<AssignmentProposal>> {
        let mut rows: Vec<AssignmentProposal> = self
            .proposals
            .iter()
            .filter(|entry| entry.is_live() && entry.open_shift_id == shift_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|p| p.proposed_at);
        Ok(rows)
    }

    async fn update_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal> {
        let mut entry = self
            .proposals
            .get_mut(&proposal.id)
            .filter(|e| e.is_live())
            .ok_or_else(|| MatchingError::NotFound(format!("proposal {}", proposal.id)))?;
        if proposal.version != entry.version + 1 {
            return Err(MatchingError::Conflict(format!(
                "stale proposal write for {}: stored v{}, incoming v{}",
                proposal.id, entry.version, proposal.version
            )));
        }
        *entry = proposal.clone();
        Ok(proposal)
    }

    async fn restore_proposal(&self, snapshot: AssignmentProposal) -> MatchingResult<()> {
        self.proposals.insert(snapshot.id, snapshot);
        Ok(())
    }

    async fn mark_proposal_accepted(
        &self,
        id: ProposalId,
        response_method: ResponseMethod,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> MatchingResult<AssignmentProposal> {
        let _guard = self.accept_lock.lock();

        let shift_id = {
            let entry = self
                .proposals
                .get(&id)
                .filter(|e| e.is_live())
                .ok_or_else(|| MatchingError::NotFound(format!("proposal {}", id)))?;
            entry.open_shift_id
        };

        // Unique-ACCEPTED-per-shift constraint
        let sibling_accepted = self.proposals.iter().any(|entry| {
            entry.is_live()
                && entry.open_shift_id == shift_id
                && entry.id != id
                && entry.status == ProposalStatus::Accepted
        });
        if sibling_accepted {
            return Err(MatchingError::Conflict(format!(
                "shift {} already has an accepted proposal",
                shift_id
            )));
        }

        let mut entry = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| MatchingError::NotFound(format!("proposal {}", id)))?;
        entry.accept(response_method, notes, now)?;
        Ok(entry.clone())
    }

    async fn supersede_open_siblings(
        &self,
        shift_id: OpenShiftId,
        except: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Vec<AssignmentProposal>> {
        let _guard = self.accept_lock.lock();

        let mut superseded = Vec::new();
        for mut entry in self.proposals.iter_mut() {
            if entry.is_live()
                && entry.open_shift_id == shift_id
                && entry.id != except
                && entry.status.is_open()
            {
                entry.supersede(now)?;
                superseded.push(entry.clone());
            }
        }
        Ok(superseded)
    }

    async fn expire_proposal(
        &self,
        id: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Option<AssignmentProposal>> {
        let Some(mut entry) = self.proposals.get_mut(&id).filter(|e| e.is_live()) else {
            return Ok(None);
        };
        // Lost the race to a response or a sibling accept: not an error
        if !entry.status.is_open() {
            return Ok(None);
        }
        entry.expire(now)?;
        Ok(Some(entry.clone()))
    }

    async fn list_open_proposals(&self) -> MatchingResult<Vec<AssignmentProposal>> {
        let mut rows: Vec<AssignmentProposal> = self
            .proposals
            .iter()
            .filter(|entry| entry.is_live() && entry.status.is_open())
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|p| p.proposed_at);
        Ok(rows)
    }

    async fn search_proposals(
        &self,
        filters: &ProposalFilters,
        pagination: &Pagination,
    ) -> MatchingResult<PagedResult<AssignmentProposal>> {
        let mut rows: Vec<AssignmentProposal> = self
            .proposals
            .iter()
            .filter(|entry| entry.is_live() && filters.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Self::sort_proposals(&mut rows, pagination);
        Ok(PagedResult::paginate(rows, pagination))
    }

    async fn append_history(&self, row: MatchHistory) -> MatchingResult<()> {
        self.history.lock().push(row);
        Ok(())
    }

    async fn history_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<MatchHistory>> {
        let rows = self.history.lock();
        Ok(rows
            .iter()
            .filter(|row| row.open_shift_id == shift_id)
            .cloned()
            .collect())
    }

    async fn get_preference_profile(
        &self,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Option<CaregiverPreferenceProfile>> {
        Ok(self.profiles.get(&caregiver_id).map(|entry| entry.value().clone()))
    }

    async fn upsert_preference_profile(
        &self,
        mut profile: CaregiverPreferenceProfile,
    ) -> MatchingResult<CaregiverPreferenceProfile> {
        if let Some(existing) = self.profiles.get(&profile.caregiver_id) {
            profile.version = existing.version + 1;
            profile.created_at = existing.created_at;
        }
        self.profiles.insert(profile.caregiver_id, profile.clone());
        Ok(profile)
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_configuration(
        &self,
        id: ConfigurationId,
    ) -> MatchingResult<Option<MatchingConfiguration>> {
        Ok(self
            .configurations
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(MatchingConfiguration::is_live))
    }

    async fn resolve_default(
        &self,
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
    ) -> MatchingResult<Option<MatchingConfiguration>> {
        let candidates: Vec<MatchingConfiguration> = self
            .configurations
            .iter()
            .filter(|entry| {
                let c = entry.value();
                c.is_live()
                    && c.is_active
                    && c.is_default
                    && c.organization_id == organization_id
            })
            .map(|entry| entry.value().clone())
            .collect();

        // Branch-scoped default shadows the organization-wide one
        if let Some(branch) = branch_id {
            if let Some(scoped) = candidates
                .iter()
                .find(|c| c.branch_id == Some(branch))
                .cloned()
            {
                return Ok(Some(scoped));
            }
        }
        Ok(candidates.into_iter().find(|c| c.branch_id.is_none()))
    }

    async fn upsert_configuration(
        &self,
        config: MatchingConfiguration,
    ) -> MatchingResult<MatchingConfiguration> {
        if config.is_default && config.is_active {
            // Demote the previous default of the same scope
            for mut entry in self.configurations.iter_mut() {
                if entry.id != config.id
                    && entry.organization_id == config.organization_id
                    && entry.branch_id == config.branch_id
                    && entry.is_default
                    && entry.is_active
                {
                    entry.is_default = false;
                    entry.version += 1;
                }
            }
        }
        self.configurations.insert(config.id, config.clone());
        Ok(config)
    }
}

/// Approximate straight-line miles between two coordinates
fn straight_line_miles(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    const MILES_PER_DEGREE: f64 = 69.17;
    let mean_lat = ((lat_a + lat_b) / 2.0).to_radians();
    let dx = (lon_b - lon_a) * mean_lat.cos() * MILES_PER_DEGREE;
    let dy = (lat_b - lat_a) * MILES_PER_DEGREE;
    (dx * dx + dy * dy).sqrt()
}

/// In-memory `DataPort` with per-concern fixture tables
///
/// Batched reads consult the tables directly; distances fall back to the
/// caregiver's coordinates when no override is set. `fail_batch_reads`
/// makes every batched read fail, for exercising the loader's fail-fast
/// path.
#[derive(Default)]
pub struct InMemoryDataPort {
    visits: DashMap<VisitId, VisitRecord>,
    caregivers: DashMap<CaregiverId, CaregiverRecord>,
    week_hours: DashMap<CaregiverId, f64>,
    conflicts: DashMap<CaregiverId, Vec<TimeInterval>>,
    experience: DashMap<(CaregiverId, ClientId), ClientExperience>,
    reliability: DashMap<CaregiverId, u8>,
    rejections: DashMap<CaregiverId, u32>,
    distance_overrides: DashMap<CaregiverId, f64>,
    fail_batch_reads: AtomicBool,
}

impl InMemoryDataPort {
    /// Empty data port
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a visit row
    pub fn put_visit(&self, visit: VisitRecord) {
        self.visits.insert(visit.id, visit);
    }

    /// Register a caregiver row
    pub fn put_caregiver(&self, caregiver: CaregiverRecord) {
        self.caregivers.insert(caregiver.id, caregiver);
    }

    /// Set scheduled week hours for a caregiver
    pub fn set_week_hours(&self, caregiver_id: CaregiverId, hours: f64) {
        self.week_hours.insert(caregiver_id, hours);
    }

    /// Add a conflicting visit interval for a caregiver
    pub fn add_conflict(&self, caregiver_id: CaregiverId, interval: TimeInterval) {
        self.conflicts.entry(caregiver_id).or_default().push(interval);
    }

    /// Set prior experience of a caregiver with a client
    pub fn set_experience(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
        experience: ClientExperience,
    ) {
        self.experience.insert((caregiver_id, client_id), experience);
    }

    /// Set the reliability score of a caregiver
    pub fn set_reliability(&self, caregiver_id: CaregiverId, score: u8) {
        self.reliability.insert(caregiver_id, score);
    }

    /// Set the 30-day rejection count of a caregiver
    pub fn set_rejection_count(&self, caregiver_id: CaregiverId, count: u32) {
        self.rejections.insert(caregiver_id, count);
    }

    /// Pin the distance from a caregiver to any shift
    pub fn set_distance(&self, caregiver_id: CaregiverId, miles: f64) {
        self.distance_overrides.insert(caregiver_id, miles);
    }

    /// Make every batched read fail with a `DataPort` error
    pub fn set_fail_batch_reads(&self, fail: bool) {
        self.fail_batch_reads.store(fail, Ordering::SeqCst);
    }

    fn check_batch(&self) -> MatchingResult<()> {
        if self.fail_batch_reads.load(Ordering::SeqCst) {
            Err(MatchingError::DataPort("batch read unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataPort for InMemoryDataPort {
    async fn get_visit(&self, visit_id: VisitId) -> MatchingResult<Option<VisitRecord>> {
        Ok(self.visits.get(&visit_id).map(|entry| entry.value().clone()))
    }

    async fn assign_visit(
        &self,
        visit_id: VisitId,
        caregiver_id: CaregiverId,
        _now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        let mut visit = self
            .visits
            .get_mut(&visit_id)
            .ok_or_else(|| MatchingError::NotFound(format!("visit {}", visit_id)))?;
        visit.assigned_caregiver_id = Some(caregiver_id);
        visit.status = VisitStatus::Scheduled;
        Ok(())
    }

    async fn unassign_visit(
        &self,
        visit_id: VisitId,
        _now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        let mut visit = self
            .visits
            .get_mut(&visit_id)
            .ok_or_else(|| MatchingError::NotFound(format!("visit {}", visit_id)))?;
        visit.assigned_caregiver_id = None;
        visit.status = VisitStatus::Pending;
        Ok(())
    }

    async fn get_caregiver(
        &self,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Option<CaregiverRecord>> {
        Ok(self.caregivers.get(&caregiver_id).map(|entry| entry.value().clone()))
    }

    async fn active_caregivers_for_branch(
        &self,
        branch_id: BranchId,
    ) -> MatchingResult<Vec<CaregiverRecord>> {
        let mut rows: Vec<CaregiverRecord> = self
            .caregivers
            .iter()
            .filter(|entry| entry.is_active && entry.primary_branch_id == branch_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    async fn week_hours_for(
        &self,
        caregiver_ids: &[CaregiverId],
        _week_of: NaiveDate,
    ) -> MatchingResult<HashMap<CaregiverId, f64>> {
        self.check_batch()?;
        Ok(caregiver_ids
            .iter()
            .filter_map(|id| self.week_hours.get(id).map(|h| (*id, *h)))
            .collect())
    }

    async fn conflicts_for(
        &self,
        caregiver_ids: &[CaregiverId],
        interval: TimeInterval,
    ) -> MatchingResult<HashMap<CaregiverId, Vec<TimeInterval>>> {
        self.check_batch()?;
        Ok(caregiver_ids
            .iter()
            .filter_map(|id| {
                self.conflicts.get(id).map(|known| {
                    let overlapping: Vec<TimeInterval> = known
                        .iter()
                        .filter(|candidate| candidate.overlaps(&interval))
                        .copied()
                        .collect();
                    (*id, overlapping)
                })
            })
            .filter(|(_, overlapping)| !overlapping.is_empty())
            .collect())
    }

    async fn client_experience_for(
        &self,
        caregiver_ids: &[CaregiverId],
        client_id: ClientId,
    ) -> MatchingResult<HashMap<CaregiverId, ClientExperience>> {
        self.check_batch()?;
        Ok(caregiver_ids
            .iter()
            .filter_map(|id| {
                self.experience
                    .get(&(*id, client_id))
                    .map(|e| (*id, *e.value()))
            })
            .collect())
    }

    async fn reliability_for(
        &self,
        caregiver_ids: &[CaregiverId],
    ) -> MatchingResult<HashMap<CaregiverId, u8>> {
        self.check_batch()?;
        Ok(caregiver_ids
            .iter()
            .filter_map(|id| self.reliability.get(id).map(|score| (*id, *score)))
            .collect())
    }

    async fn rejection_counts_for(
        &self,
        caregiver_ids: &[CaregiverId],
        _since: DateTime<Utc>,
    ) -> MatchingResult<HashMap<CaregiverId, u32>> {
        self.check_batch()?;
        Ok(caregiver_ids
            .iter()
            .filter_map(|id| self.rejections.get(id).map(|count| (*id, *count)))
            .collect())
    }

    async fn distances_to(
        &self,
        caregiver_ids: &[CaregiverId],
        latitude: f64,
        longitude: f64,
    ) -> MatchingResult<HashMap<CaregiverId, f64>> {
        self.check_batch()?;
        let mut distances = HashMap::new();
        for id in caregiver_ids {
            if let Some(miles) = self.distance_overrides.get(id) {
                distances.insert(*id, *miles);
                continue;
            }
            if let Some(caregiver) = self.caregivers.get(id) {
                if let (Some(lat), Some(lon)) = (caregiver.latitude, caregiver.longitude) {
                    distances.insert(*id, straight_line_miles(lat, lon, latitude, longitude));
                }
            }
        }
        Ok(distances)
    }
}

// `week_of` and `since` are unused above: the fixture tables are already
// windowed the way a relational port would window its queries.
