//! Sled-backed durable store
//!
//! Rows are serde_json values under prefixed keys in a single sled tree,
//! so embedded deployments get durability without a relational
//! collaborator. Multi-row invariants (the shift CAS, accept plus
//! supersede, single default configuration) are serialized by one write
//! lock; reads go straight to sled.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::config::MatchingConfiguration;
use crate::error::{MatchingError, MatchingResult};
use crate::history::MatchHistory;
use crate::ids::{
    BranchId, CaregiverId, ConfigurationId, OpenShiftId, OrganizationId, ProposalId, UserId,
    VisitId,
};
use crate::preferences::CaregiverPreferenceProfile;
use crate::proposal::{AssignmentProposal, ResponseMethod};
use crate::query::{PagedResult, Pagination, ProposalFilters, ShiftFilters};
use crate::shift::{MatchingStatus, OpenShift};

use super::{ConfigStore, ProposalStore};

const SHIFT_PREFIX: &str = "shift:";
const VISIT_INDEX_PREFIX: &str = "visit_index:";
const PROPOSAL_PREFIX: &str = "proposal:";
const HISTORY_PREFIX: &str = "history:";
const PROFILE_PREFIX: &str = "profile:";
const CONFIG_PREFIX: &str = "config:";

/// Durable `ProposalStore` / `ConfigStore` over an embedded sled database
pub struct SledStore {
    db: sled::Db,
    write_lock: Mutex<()>,
}

impl SledStore {
    /// Open or create the database at a path
    pub fn open<P: AsRef<Path>>(path: P) -> MatchingResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn put_json<T: Serialize>(&self, key: String, value: &T) -> MatchingResult<()> {
        let encoded = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), encoded)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: String) -> MatchingResult<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> MatchingResult<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (_key, raw) = item?;
            rows.push(serde_json::from_slice(&raw)?);
        }
        Ok(rows)
    }

    fn shift_key(id: OpenShiftId) -> String {
        format!("{}{}", SHIFT_PREFIX, id)
    }

    fn proposal_key(id: ProposalId) -> String {
        format!("{}{}", PROPOSAL_PREFIX, id)
    }

    fn load_shift(&self, id: OpenShiftId) -> MatchingResult<Option<OpenShift>> {
        Ok(self
            .get_json::<OpenShift>(Self::shift_key(id))?
            .filter(OpenShift::is_live))
    }

    fn load_proposal(&self, id: ProposalId) -> MatchingResult<Option<AssignmentProposal>> {
        Ok(self
            .get_json::<AssignmentProposal>(Self::proposal_key(id))?
            .filter(AssignmentProposal::is_live))
    }

    fn store_shift(&self, shift: &OpenShift) -> MatchingResult<()> {
        self.put_json(Self::shift_key(shift.id), shift)
    }

    fn store_proposal(&self, proposal: &AssignmentProposal) -> MatchingResult<()> {
        self.put_json(Self::proposal_key(proposal.id), proposal)
    }

    fn live_proposals_of_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<AssignmentProposal>> {
        let mut rows: Vec<AssignmentProposal> = self
            .scan_json::<AssignmentProposal>(PROPOSAL_PREFIX)?
            .into_iter()
            .filter(|p| p.is_live() && p.open_shift_id == shift_id)
            .collect();
        rows.sort_by_key(|p| p.proposed_at);
        Ok(rows)
    }
}

#[async_trait]
impl ProposalStore for SledStore {
    async fn insert_shift(&self, shift: OpenShift) -> MatchingResult<OpenShift> {
        let _guard = self.write_lock.lock();

        let index_key = format!("{}{}", VISIT_INDEX_PREFIX, shift.visit_id);
        if let Some(existing_id) = self.get_json::<OpenShiftId>(index_key.clone())? {
            if self.load_shift(existing_id)?.is_some() {
                return Err(MatchingError::Conflict(format!(
                    "open shift already exists for visit {}",
                    shift.visit_id
                )));
            }
        }
        self.put_json(index_key, &shift.id)?;
        self.store_shift(&shift)?;
        Ok(shift)
    }

    async fn get_shift(&self, id: OpenShiftId) -> MatchingResult<Option<OpenShift>> {
        self.load_shift(id)
    }

    async fn find_shift_by_visit(
        &self,
        visit_id: VisitId,
    ) -> MatchingResult<Option<OpenShift>> {
        let index_key = format!("{}{}", VISIT_INDEX_PREFIX, visit_id);
        match self.get_json::<OpenShiftId>(index_key)? {
            Some(shift_id) => self.load_shift(shift_id),
            None => Ok(None),
        }
    }

    async fn begin_matching(
        &self,
        id: OpenShiftId,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        let _guard = self.write_lock.lock();

        let mut shift = self
            .load_shift(id)?
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;
        if shift.matching_status == MatchingStatus::Matching {
            return Err(MatchingError::Concurrency(id.to_string()));
        }
        shift.transition_to(MatchingStatus::Matching, now)?;
        shift.match_attempts += 1;
        shift.last_matched_at = Some(now);
        self.store_shift(&shift)?;
        Ok(shift)
    }

    async fn transition_shift(
        &self,
        id: OpenShiftId,
        to: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        let _guard = self.write_lock.lock();

        let mut shift = self
            .load_shift(id)?
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;
        shift.transition_to(to, now)?;
        self.store_shift(&shift)?;
        Ok(shift)
    }

    async fn revert_shift(
        &self,
        id: OpenShiftId,
        prior: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        let _guard = self.write_lock.lock();

        let mut shift = self
            .load_shift(id)?
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;
        shift.revert_to(prior, now);
        self.store_shift(&shift)?;
        Ok(shift)
    }

    async fn shifts_in_window(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
        statuses: &[MatchingStatus],
    ) -> MatchingResult<Vec<OpenShift>> {
        let mut rows: Vec<OpenShift> = self
            .scan_json::<OpenShift>(SHIFT_PREFIX)?
            .into_iter()
            .filter(|s| {
                s.is_live()
                    && s.branch_id == branch_id
                    && s.scheduled_date >= from
                    && s.scheduled_date <= to
                    && statuses.contains(&s.matching_status)
            })
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
            .scan_json::<OpenShift>(SHIFT_PREFIX)?
            .into_iter()
            .filter(|s| s.is_live() && filters.matches(s))
            .collect();
        rows.sort_by_key(|s| s.created_at);
        if pagination.sort_order == crate::query::SortOrder::Desc {
            rows.reverse();
        }
        Ok(PagedResult::paginate(rows, pagination))
    }

    async fn soft_delete_shift(
        &self,
        id: OpenShiftId,
        by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        let _guard = self.write_lock.lock();

        let mut shift = self
            .load_shift(id)?
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", id)))?;
        shift.deleted_at = Some(now);
        shift.deleted_by = by;
        shift.version += 1;
        self.store_shift(&shift)?;

        for mut proposal in self.live_proposals_of_shift(id)? {
            if proposal.status.is_open() {
                proposal.deleted_at = Some(now);
                proposal.deleted_by = by;
                proposal.version += 1;
                self.store_proposal(&proposal)?;
            }
        }
        Ok(())
    }

    async fn insert_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal> {
        self.store_proposal(&proposal)?;
        Ok(proposal)
    }

    async fn get_proposal(
        &self,
        id: ProposalId,
    ) -> MatchingResult<Option<AssignmentProposal>> {
        self.load_proposal(id)
    }

    async fn proposals_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<AssignmentProposal>> {
        self.live_proposals_of_shift(shift_id)
    }

    async fn update_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal> {
        let _guard = self.write_lock.lock();

        let stored = self
            .load_proposal(proposal.id)?
            .ok_or_else(|| MatchingError::NotFound(format!("proposal {}", proposal.id)))?;
        if proposal.version != stored.version + 1 {
            return Err(MatchingError::Conflict(format!(
                "stale proposal write for {}: stored v{}, incoming v{}",
                proposal.id, stored.version, proposal.version
            )));
        }
        self.store_proposal(&proposal)?;
        Ok(proposal)
    }

    async fn restore_proposal(&self, snapshot: AssignmentProposal) -> MatchingResult<()> {
        let _guard = self.write_lock.lock();
        self.store_proposal(&snapshot)
    }

    async fn mark_proposal_accepted(
        &self,
        id: ProposalId,
        response_method: ResponseMethod,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> MatchingResult<AssignmentProposal> {
        let _guard = self.write_lock.lock();

        let mut proposal = self
            .load_proposal(id)?
            .ok_or_else(|| MatchingError::NotFound(format!("proposal {}", id)))?;

        let sibling_accepted = self
            .live_proposals_of_shift(proposal.open_shift_id)?
            .iter()
            .any(|p| p.id != id && p.status == crate::proposal::ProposalStatus::Accepted);
        if sibling_accepted {
            return Err(MatchingError::Conflict(format!(
                "shift {} already has an accepted proposal",
                proposal.open_shift_id
            )));
        }

        proposal.accept(response_method, notes, now)?;
        self.store_proposal(&proposal)?;
        Ok(proposal)
    }

    async fn supersede_open_siblings(
        &self,
        shift_id: OpenShiftId,
        except: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Vec<AssignmentProposal>> {
        let _guard = self.write_lock.lock();

        let mut superseded = Vec::new();
        for mut proposal in self.live_proposals_of_shift(shift_id)? {
            if proposal.id != except && proposal.status.is_open() {
                proposal.supersede(now)?;
                self.store_proposal(&proposal)?;
                superseded.push(proposal);
            }
        }
        Ok(superseded)
    }

    async fn expire_proposal(
        &self,
        id: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Option<AssignmentProposal>> {
        let _guard = self.write_lock.lock();

        let Some(mut proposal) = self.load_proposal(id)? else {
            return Ok(None);
        };
        if !proposal.status.is_open() {
            return Ok(None);
        }
        proposal.expire(now)?;
        self.store_proposal(&proposal)?;
        Ok(Some(proposal))
    }

    async fn list_open_proposals(&self) -> MatchingResult<Vec<AssignmentProposal>> {
        let mut rows: Vec<AssignmentProposal> = self
            .scan_json::<AssignmentProposal>(PROPOSAL_PREFIX)?
            .into_iter()
            .filter(|p| p.is_live() && p.status.is_open())
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
            .scan_json::<AssignmentProposal>(PROPOSAL_PREFIX)?
            .into_iter()
            .filter(|p| p.is_live() && filters.matches(p))
            .collect();
        rows.sort_by_key(|p| p.proposed_at);
        if pagination.sort_order == crate::query::SortOrder::Desc {
            rows.reverse();
        }
        Ok(PagedResult::paginate(rows, pagination))
    }

    async fn append_history(&self, row: MatchHistory) -> MatchingResult<()> {
        // Monotonic key keeps scan order equal to append order
        let seq = self.db.generate_id()?;
        self.put_json(format!("{}{:020}:{}", HISTORY_PREFIX, seq, row.id), &row)
    }

    async fn history_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<MatchHistory>> {
        Ok(self
            .scan_json::<MatchHistory>(HISTORY_PREFIX)?
            .into_iter()
            .filter(|row| row.open_shift_id == shift_id)
            .collect())
    }

    async fn get_preference_profile(
        &self,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Option<CaregiverPreferenceProfile>> {
        self.get_json(format!("{}{}", PROFILE_PREFIX, caregiver_id))
    }

    async fn upsert_preference_profile(
        &self,
        mut profile: CaregiverPreferenceProfile,
    ) -> MatchingResult<CaregiverPreferenceProfile> {
        let _guard = self.write_lock.lock();

        let key = format!("{}{}", PROFILE_PREFIX, profile.caregiver_id);
        if let Some(existing) = self.get_json::<CaregiverPreferenceProfile>(key.clone())? {
            profile.version = existing.version + 1;
            profile.created_at = existing.created_at;
        }
        self.put_json(key, &profile)?;
        Ok(profile)
    }
}

#[async_trait]
impl ConfigStore for SledStore {
    async fn get_configuration(
        &self,
        id: ConfigurationId,
    ) -> MatchingResult<Option<MatchingConfiguration>> {
        Ok(self
            .get_json::<MatchingConfiguration>(format!("{}{}", CONFIG_PREFIX, id))?
            .filter(MatchingConfiguration::is_live))
    }

    async fn resolve_default(
        &self,
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
    ) -> MatchingResult<Option<MatchingConfiguration>> {
        let candidates: Vec<MatchingConfiguration> = self
            .scan_json::<MatchingConfiguration>(CONFIG_PREFIX)?
            .into_iter()
            .filter(|c| {
                c.is_live() && c.is_active && c.is_default && c.organization_id == organization_id
            })
            .collect();

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
        let _guard = self.write_lock.lock();

        if config.is_default && config.is_active {
            let scoped: Vec<MatchingConfiguration> = self
                .scan_json::<MatchingConfiguration>(CONFIG_PREFIX)?
                .into_iter()
                .filter(|c| {
                    c.id != config.id
                        && c.organization_id == config.organization_id
                        && c.branch_id == config.branch_id
                        && c.is_default
                        && c.is_active
                })
                .collect();
            for mut previous in scoped {
                previous.is_default = false;
                previous.version += 1;
                self.put_json(format!("{}{}", CONFIG_PREFIX, previous.id), &previous)?;
            }
        }
        self.put_json(format!("{}{}", CONFIG_PREFIX, config.id), &config)?;
        Ok(config)
    }
}
