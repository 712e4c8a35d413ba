//! Matching engine
//!
//! The orchestrator behind every external operation: scheduler-initiated
//! matching, manual proposals, proposal responses, caregiver self-select,
//! expiry, and the search surface. The engine owns no state of its own;
//! it drives the stores and the data port and is safe to share behind an
//! `Arc` across workers.

mod expirer;
mod matcher;
mod proposals;
mod self_select;

pub use expirer::Expirer;
pub use matcher::{MatchOutcome, MatchShiftRequest};
pub use proposals::{ManualProposalRequest, ProposalResponse};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use caretide_config::RuntimeSettings;

use crate::clock::{Clock, SystemClock};
use crate::config::MatchingConfiguration;
use crate::error::{MatchingError, MatchingResult};
use crate::history::MatchHistory;
use crate::ids::{ConfigurationId, OrganizationId, UserId, VisitId};
use crate::loader::CandidateLoader;
use crate::ports::{DataPort, LoggingNotificationSink, NotificationSink};
use crate::preferences::CaregiverPreferenceProfile;
use crate::proposal::AssignmentProposal;
use crate::query::{PagedResult, Pagination, ProposalFilters, ShiftFilters};
use crate::scorer::{MlScorer, Scorer};
use crate::shift::{OpenShift, ShiftPriority};
use crate::store::{ConfigStore, ProposalStore};

/// Role of the acting principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    /// Branch coordinator; may create shifts and manual proposals
    Coordinator,
    /// Automated scheduler worker
    Scheduler,
    /// Caregiver acting on their own offers
    Caregiver,
    /// Internal system task (expirer, migrations)
    System,
}

/// Authorization context attached to every external operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuthContext {
    /// Organization the principal acts within
    pub organization_id: OrganizationId,
    /// Acting user
    pub user_id: UserId,
    /// Capability role
    pub role: ActorRole,
}

impl AuthContext {
    /// System-scoped context for internal tasks
    pub fn system(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            user_id: UserId::new(),
            role: ActorRole::System,
        }
    }
}

/// Absolute instant after which an operation must stop and roll back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline(pub DateTime<Utc>);

impl Deadline {
    /// Whether the deadline has passed
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.0
    }
}

/// Request to create an open shift for an unassigned visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShiftRequest {
    /// Visit to offer; at most one live shift per visit
    pub visit_id: VisitId,
    /// Scheduling priority; defaults to normal
    pub priority: Option<ShiftPriority>,
    /// Offer urgently
    pub is_urgent: bool,
    /// Date the shift must be filled by
    pub fill_by_date: Option<NaiveDate>,
    /// Coordinator notes
    pub notes: Option<String>,
}

/// The matching core behind every external operation
pub struct MatchingEngine {
    data: Arc<dyn DataPort>,
    store: Arc<dyn ProposalStore>,
    configs: Arc<dyn ConfigStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    scorer: Scorer,
    loader: CandidateLoader,
    settings: RuntimeSettings,
}

impl MatchingEngine {
    /// Engine over a data port and stores, with default wiring: system
    /// clock, rule-based scorer, logging notification sink
    pub fn new(
        data: Arc<dyn DataPort>,
        store: Arc<dyn ProposalStore>,
        configs: Arc<dyn ConfigStore>,
        settings: RuntimeSettings,
    ) -> Self {
        let loader = CandidateLoader::new(data.clone());
        Self {
            data,
            store,
            configs,
            notifier: Arc::new(LoggingNotificationSink),
            clock: Arc::new(SystemClock),
            scorer: Scorer::rule_based(),
            loader,
            settings,
        }
    }

    /// Replace the notification sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the clock; tests inject a manual clock here
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable the ML blend hook
    pub fn with_ml_scorer(mut self, ml: Arc<dyn MlScorer>) -> Self {
        self.scorer = Scorer::with_ml(ml);
        self
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn store(&self) -> &dyn ProposalStore {
        self.store.as_ref()
    }

    pub(crate) fn data(&self) -> &dyn DataPort {
        self.data.as_ref()
    }

    pub(crate) fn config_store(&self) -> &dyn ConfigStore {
        self.configs.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn NotificationSink {
        self.notifier.as_ref()
    }

    pub(crate) fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub(crate) fn loader(&self) -> &CandidateLoader {
        &self.loader
    }

    pub(crate) fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Fail `Permission` unless the principal belongs to the organization
    pub(crate) fn ensure_same_org(
        &self,
        auth: &AuthContext,
        organization_id: OrganizationId,
    ) -> MatchingResult<()> {
        if auth.organization_id != organization_id {
            return Err(MatchingError::Permission(format!(
                "organization {} is outside the caller's scope",
                organization_id
            )));
        }
        Ok(())
    }

    /// Fail `Permission` unless the principal may act as a coordinator
    pub(crate) fn require_coordinator(&self, auth: &AuthContext) -> MatchingResult<()> {
        match auth.role {
            ActorRole::Coordinator | ActorRole::Scheduler | ActorRole::System => Ok(()),
            ActorRole::Caregiver => Err(MatchingError::Permission(
                "coordinator capability required".to_string(),
            )),
        }
    }

    /// Resolve the configuration for a shift: explicit id first, then the
    /// active default of the shift's (organization, branch) scope
    pub(crate) async fn resolve_config(
        &self,
        shift: &OpenShift,
        explicit: Option<ConfigurationId>,
    ) -> MatchingResult<MatchingConfiguration> {
        if let Some(id) = explicit {
            return self
                .configs
                .get_configuration(id)
                .await?
                .ok_or_else(|| MatchingError::NotFound(format!("configuration {}", id)));
        }
        self.configs
            .resolve_default(shift.organization_id, Some(shift.branch_id))
            .await?
            .ok_or_else(|| {
                MatchingError::Validation(format!(
                    "no active matching configuration for organization {}",
                    shift.organization_id
                ))
            })
    }

    /// Append a history row, best-effort: a failed write is logged and
    /// never fails the primary operation
    pub(crate) async fn record_history(&self, row: MatchHistory) {
        if let Err(err) = self.store.append_history(row).await {
            tracing::warn!(error = %err, "match history append failed");
        }
    }

    /// Create an open shift for an unassigned visit
    pub async fn create_open_shift(
        &self,
        auth: &AuthContext,
        request: CreateShiftRequest,
    ) -> MatchingResult<OpenShift> {
        self.require_coordinator(auth)?;
        let now = self.now();

        let visit = self
            .data
            .get_visit(request.visit_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(format!("visit {}", request.visit_id)))?;
        self.ensure_same_org(auth, visit.organization_id)?;

        if let Some(existing) = self.store.find_shift_by_visit(visit.id).await? {
            return Err(MatchingError::Conflict(format!(
                "open shift {} already exists for visit {}",
                existing.id, visit.id
            )));
        }

        let shift = OpenShift {
            id: crate::ids::OpenShiftId::new(),
            visit_id: visit.id,
            organization_id: visit.organization_id,
            branch_id: visit.branch_id,
            client_id: visit.client_id,
            scheduled_date: visit.scheduled_date,
            start_time: visit.start_time,
            end_time: visit.end_time,
            duration_minutes: visit.duration_minutes,
            timezone: visit.timezone.clone(),
            required_skills: visit.required_skills.clone(),
            required_certifications: visit.required_certifications.clone(),
            service_type_id: visit.service_type_id,
            preferred_caregivers: visit.preferred_caregivers.clone(),
            blocked_caregivers: visit.blocked_caregivers.clone(),
            gender_preference: visit.gender_preference,
            language_preference: visit.language_preference.clone(),
            address: visit.address.clone(),
            latitude: visit.latitude,
            longitude: visit.longitude,
            matching_status: crate::shift::MatchingStatus::New,
            match_attempts: 0,
            last_matched_at: None,
            priority: request.priority.unwrap_or_default(),
            is_urgent: request.is_urgent,
            fill_by_date: request.fill_by_date,
            notes: request.notes,
            created_at: now,
            created_by: Some(auth.user_id),
            updated_at: now,
            updated_by: Some(auth.user_id),
            deleted_at: None,
            deleted_by: None,
            version: 1,
        };

        let inserted = self.store.insert_shift(shift).await?;
        tracing::info!(shift_id = %inserted.id, visit_id = %inserted.visit_id, "open shift created");
        Ok(inserted)
    }

    /// Filtered, paginated shift search scoped to the caller's organization
    pub async fn search_open_shifts(
        &self,
        auth: &AuthContext,
        mut filters: ShiftFilters,
        pagination: Pagination,
    ) -> MatchingResult<PagedResult<OpenShift>> {
        match filters.organization_id {
            Some(org) => self.ensure_same_org(auth, org)?,
            None => filters.organization_id = Some(auth.organization_id),
        }
        self.store.search_shifts(&filters, &pagination).await
    }

    /// Filtered, paginated proposal search scoped to the caller's
    /// organization
    pub async fn search_proposals(
        &self,
        auth: &AuthContext,
        mut filters: ProposalFilters,
        pagination: Pagination,
    ) -> MatchingResult<PagedResult<AssignmentProposal>> {
        match filters.organization_id {
            Some(org) => self.ensure_same_org(auth, org)?,
            None => filters.organization_id = Some(auth.organization_id),
        }
        self.store.search_proposals(&filters, &pagination).await
    }

    /// Load a caregiver's preference profile
    pub async fn preference_profile(
        &self,
        caregiver_id: crate::ids::CaregiverId,
    ) -> MatchingResult<Option<CaregiverPreferenceProfile>> {
        self.store.get_preference_profile(caregiver_id).await
    }

    /// Create or replace a caregiver's preference profile
    pub async fn upsert_preference_profile(
        &self,
        profile: CaregiverPreferenceProfile,
    ) -> MatchingResult<CaregiverPreferenceProfile> {
        self.store.upsert_preference_profile(profile).await
    }
}
