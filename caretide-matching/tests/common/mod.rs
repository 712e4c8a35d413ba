//! Shared fixtures for the integration scenarios
//!
//! Every scenario runs against the in-memory store and data port with a
//! manually advanced clock, so timelines and rankings are deterministic.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;

use caretide_config::RuntimeSettings;
use caretide_matching::caregiver::{
    CaregiverRecord, ComplianceStatus, Credential, CredentialStatus, EmploymentType, TimeInterval,
};
use caretide_matching::clock::ManualClock;
use caretide_matching::engine::{ActorRole, AuthContext, CreateShiftRequest, MatchingEngine};
use caretide_matching::error::{MatchingError, MatchingResult};
use caretide_matching::history::MatchHistory;
use caretide_matching::ids::*;
use caretide_matching::ports::{ClientExperience, DataPort, VisitRecord, VisitStatus};
use caretide_matching::preferences::CaregiverPreferenceProfile;
use caretide_matching::proposal::ResponseMethod;
use caretide_matching::query::{PagedResult, Pagination, ProposalFilters, ShiftFilters};
use caretide_matching::shift::{MatchingStatus, OpenShift};
use caretide_matching::{
    AssignmentProposal, InMemoryDataPort, MatchingConfiguration, MemoryStore, ProposalStore,
};

/// Everything a scenario needs, wired together
pub struct Harness {
    pub port: Arc<InMemoryDataPort>,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub engine: MatchingEngine,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub client_id: ClientId,
    pub service_type_id: ServiceTypeId,
    pub configuration: MatchingConfiguration,
}

/// Scenario start instant: a fixed Sunday morning
pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

/// Install a log subscriber honoring `RUST_LOG`; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Harness {
    /// Harness with a configuration tweak applied before insertion
    pub async fn with_config(tweak: impl FnOnce(&mut MatchingConfiguration)) -> Self {
        init_tracing();
        let port = Arc::new(InMemoryDataPort::new());
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::starting_at(start_instant());

        let organization_id = OrganizationId::new();
        let branch_id = BranchId::new();

        let mut configuration =
            MatchingConfiguration::new_default(organization_id, Some(branch_id), start_instant());
        configuration.min_score_for_proposal = 60;
        tweak(&mut configuration);
        use caretide_matching::ConfigStore;
        store
            .upsert_configuration(configuration.clone())
            .await
            .unwrap();

        let engine = MatchingEngine::new(
            port.clone(),
            store.clone(),
            store.clone(),
            RuntimeSettings::default(),
        )
        .with_clock(Arc::new(clock.clone()));

        Self {
            port,
            store,
            clock,
            engine,
            organization_id,
            branch_id,
            client_id: ClientId::new(),
            service_type_id: ServiceTypeId::new(),
            configuration,
        }
    }

    /// Harness with the default scenario configuration (min score 60)
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Coordinator-scoped auth context
    pub fn auth(&self) -> AuthContext {
        AuthContext {
            organization_id: self.organization_id,
            user_id: UserId::new(),
            role: ActorRole::Coordinator,
        }
    }

    /// Caregiver-scoped auth context
    pub fn caregiver_auth(&self) -> AuthContext {
        AuthContext {
            organization_id: self.organization_id,
            user_id: UserId::new(),
            role: ActorRole::Caregiver,
        }
    }

    /// A four-hour personal-care visit two days out, requiring a CNA
    pub fn visit(&self) -> VisitRecord {
        VisitRecord {
            id: VisitId::new(),
            organization_id: self.organization_id,
            branch_id: self.branch_id,
            client_id: self.client_id,
            service_type_id: self.service_type_id,
            scheduled_date: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            duration_minutes: 240,
            timezone: "America/Chicago".to_string(),
            status: VisitStatus::Pending,
            assigned_caregiver_id: None,
            required_skills: ["Personal Care"].into_iter().map(String::from).collect(),
            required_certifications: ["CNA"].into_iter().map(String::from).collect(),
            preferred_caregivers: BTreeSet::new(),
            blocked_caregivers: BTreeSet::new(),
            gender_preference: None,
            language_preference: None,
            address: Some("815 W Monroe St".to_string()),
            latitude: Some(41.88),
            longitude: Some(-87.63),
        }
    }

    /// Register a visit and create its open shift
    pub async fn open_shift(&self, visit: VisitRecord) -> OpenShift {
        self.port.put_visit(visit.clone());
        self.engine
            .create_open_shift(
                &self.auth(),
                CreateShiftRequest {
                    visit_id: visit.id,
                    priority: None,
                    is_urgent: false,
                    fill_by_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap()
    }

    /// Register a qualified caregiver at a distance with a reliability score
    pub fn caregiver(&self, name: &str, miles: f64, reliability: u8) -> CaregiverId {
        let id = CaregiverId::new();
        self.port.put_caregiver(CaregiverRecord {
            id,
            organization_id: self.organization_id,
            primary_branch_id: self.branch_id,
            display_name: name.to_string(),
            employment_type: EmploymentType::FullTime,
            is_active: true,
            skills: ["Personal Care"].into_iter().map(String::from).collect(),
            credentials: vec![Credential {
                name: "CNA".to_string(),
                status: CredentialStatus::Active,
                expires_at: None,
            }],
            compliance_status: ComplianceStatus::Compliant,
            gender: None,
            languages: BTreeSet::new(),
            max_hours_per_week: 40.0,
            latitude: None,
            longitude: None,
        });
        self.port.set_distance(id, miles);
        self.port.set_reliability(id, reliability);
        id
    }

    /// Register an unqualified caregiver: certified but unskilled,
    /// distant, and with mediocre reliability
    pub fn weak_caregiver(&self, name: &str) -> CaregiverId {
        let id = CaregiverId::new();
        self.port.put_caregiver(CaregiverRecord {
            id,
            organization_id: self.organization_id,
            primary_branch_id: self.branch_id,
            display_name: name.to_string(),
            employment_type: EmploymentType::PerDiem,
            is_active: true,
            skills: BTreeSet::new(),
            credentials: vec![Credential {
                name: "CNA".to_string(),
                status: CredentialStatus::Active,
                expires_at: None,
            }],
            compliance_status: ComplianceStatus::Compliant,
            gender: None,
            languages: BTreeSet::new(),
            max_hours_per_week: 40.0,
            latitude: None,
            longitude: None,
        });
        self.port.set_distance(id, 45.0);
        self.port.set_reliability(id, 50);
        id
    }

    /// Record prior experience between a caregiver and the scenario client
    pub fn with_experience(&self, caregiver_id: CaregiverId, visits: u32, rating: Option<f64>) {
        self.port.set_experience(
            caregiver_id,
            self.client_id,
            ClientExperience {
                previous_visits: visits,
                average_rating: rating,
            },
        );
    }
}

/// Data port decorator that delays every branch read; exercises the
/// per-shift match budget
pub struct SlowDataPort {
    inner: Arc<InMemoryDataPort>,
    delay: StdDuration,
}

impl SlowDataPort {
    pub fn new(inner: Arc<InMemoryDataPort>, delay: StdDuration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl DataPort for SlowDataPort {
    async fn get_visit(&self, visit_id: VisitId) -> MatchingResult<Option<VisitRecord>> {
        self.inner.get_visit(visit_id).await
    }

    async fn assign_visit(
        &self,
        visit_id: VisitId,
        caregiver_id: CaregiverId,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        self.inner.assign_visit(visit_id, caregiver_id, now).await
    }

    async fn unassign_visit(&self, visit_id: VisitId, now: DateTime<Utc>) -> MatchingResult<()> {
        self.inner.unassign_visit(visit_id, now).await
    }

    async fn get_caregiver(
        &self,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Option<CaregiverRecord>> {
        self.inner.get_caregiver(caregiver_id).await
    }

    async fn active_caregivers_for_branch(
        &self,
        branch_id: BranchId,
    ) -> MatchingResult<Vec<CaregiverRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.active_caregivers_for_branch(branch_id).await
    }

    async fn week_hours_for(
        &self,
        caregiver_ids: &[CaregiverId],
        week_of: NaiveDate,
    ) -> MatchingResult<HashMap<CaregiverId, f64>> {
        self.inner.week_hours_for(caregiver_ids, week_of).await
    }

    async fn conflicts_for(
        &self,
        caregiver_ids: &[CaregiverId],
        interval: TimeInterval,
    ) -> MatchingResult<HashMap<CaregiverId, Vec<TimeInterval>>> {
        self.inner.conflicts_for(caregiver_ids, interval).await
    }

    async fn client_experience_for(
        &self,
        caregiver_ids: &[CaregiverId],
        client_id: ClientId,
    ) -> MatchingResult<HashMap<CaregiverId, ClientExperience>> {
        self.inner
            .client_experience_for(caregiver_ids, client_id)
            .await
    }

    async fn reliability_for(
        &self,
        caregiver_ids: &[CaregiverId],
    ) -> MatchingResult<HashMap<CaregiverId, u8>> {
        self.inner.reliability_for(caregiver_ids).await
    }

    async fn rejection_counts_for(
        &self,
        caregiver_ids: &[CaregiverId],
        since: DateTime<Utc>,
    ) -> MatchingResult<HashMap<CaregiverId, u32>> {
        self.inner.rejection_counts_for(caregiver_ids, since).await
    }

    async fn distances_to(
        &self,
        caregiver_ids: &[CaregiverId],
        latitude: f64,
        longitude: f64,
    ) -> MatchingResult<HashMap<CaregiverId, f64>> {
        self.inner
            .distances_to(caregiver_ids, latitude, longitude)
            .await
    }
}

/// Store decorator that can be told to fail `supersede_open_siblings`;
/// exercises the accept sequence's rollback of its fourth write
pub struct FailingStore {
    inner: Arc<MemoryStore>,
    fail_supersede: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_supersede: AtomicBool::new(false),
        }
    }

    /// Make the next `supersede_open_siblings` calls fail
    pub fn set_fail_supersede(&self, fail: bool) {
        self.fail_supersede.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProposalStore for FailingStore {
    async fn insert_shift(&self, shift: OpenShift) -> MatchingResult<OpenShift> {
        self.inner.insert_shift(shift).await
    }

    async fn get_shift(&self, id: OpenShiftId) -> MatchingResult<Option<OpenShift>> {
        self.inner.get_shift(id).await
    }

    async fn find_shift_by_visit(&self, visit_id: VisitId) -> MatchingResult<Option<OpenShift>> {
        self.inner.find_shift_by_visit(visit_id).await
    }

    async fn begin_matching(
        &self,
        id: OpenShiftId,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        self.inner.begin_matching(id, now).await
    }

    async fn transition_shift(
        &self,
        id: OpenShiftId,
        to: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        self.inner.transition_shift(id, to, now).await
    }

    async fn revert_shift(
        &self,
        id: OpenShiftId,
        prior: MatchingStatus,
        now: DateTime<Utc>,
    ) -> MatchingResult<OpenShift> {
        self.inner.revert_shift(id, prior, now).await
    }

    async fn shifts_in_window(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
        statuses: &[MatchingStatus],
    ) -> MatchingResult<Vec<OpenShift>> {
        self.inner.shifts_in_window(branch_id, from, to, statuses).await
    }

    async fn search_shifts(
        &self,
        filters: &ShiftFilters,
        pagination: &Pagination,
    ) -> MatchingResult<PagedResult<OpenShift>> {
        self.inner.search_shifts(filters, pagination).await
    }

    async fn soft_delete_shift(
        &self,
        id: OpenShiftId,
        by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        self.inner.soft_delete_shift(id, by, now).await
    }

    async fn insert_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal> {
        self.inner.insert_proposal(proposal).await
    }

    async fn get_proposal(&self, id: ProposalId) -> MatchingResult<Option<AssignmentProposal>> {
        self.inner.get_proposal(id).await
    }

    async fn proposals_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<AssignmentProposal>> {
        self.inner.proposals_for_shift(shift_id).await
    }

    async fn update_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> MatchingResult<AssignmentProposal> {
        self.inner.update_proposal(proposal).await
    }

    async fn restore_proposal(&self, snapshot: AssignmentProposal) -> MatchingResult<()> {
        self.inner.restore_proposal(snapshot).await
    }

    async fn mark_proposal_accepted(
        &self,
        id: ProposalId,
        response_method: ResponseMethod,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> MatchingResult<AssignmentProposal> {
        self.inner
            .mark_proposal_accepted(id, response_method, notes, now)
            .await
    }

    async fn supersede_open_siblings(
        &self,
        shift_id: OpenShiftId,
        except: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Vec<AssignmentProposal>> {
        if self.fail_supersede.load(Ordering::SeqCst) {
            return Err(MatchingError::Store(
                "injected supersede failure".to_string(),
            ));
        }
        self.inner
            .supersede_open_siblings(shift_id, except, now)
            .await
    }

    async fn expire_proposal(
        &self,
        id: ProposalId,
        now: DateTime<Utc>,
    ) -> MatchingResult<Option<AssignmentProposal>> {
        self.inner.expire_proposal(id, now).await
    }

    async fn list_open_proposals(&self) -> MatchingResult<Vec<AssignmentProposal>> {
        self.inner.list_open_proposals().await
    }

    async fn search_proposals(
        &self,
        filters: &ProposalFilters,
        pagination: &Pagination,
    ) -> MatchingResult<PagedResult<AssignmentProposal>> {
        self.inner.search_proposals(filters, pagination).await
    }

    async fn append_history(&self, row: MatchHistory) -> MatchingResult<()> {
        self.inner.append_history(row).await
    }

    async fn history_for_shift(
        &self,
        shift_id: OpenShiftId,
    ) -> MatchingResult<Vec<MatchHistory>> {
        self.inner.history_for_shift(shift_id).await
    }

    async fn get_preference_profile(
        &self,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Option<CaregiverPreferenceProfile>> {
        self.inner.get_preference_profile(caregiver_id).await
    }

    async fn upsert_preference_profile(
        &self,
        profile: CaregiverPreferenceProfile,
    ) -> MatchingResult<CaregiverPreferenceProfile> {
        self.inner.upsert_preference_profile(profile).await
    }
}
