//! Data and notification ports
//!
//! `DataPort` is the read side over visits, caregivers, schedules, and
//! history, plus the single visit-assignment write-back. Reads that fan
//! out over caregivers are batched: one call per concern per match
//! attempt, never one per caregiver. `NotificationSink` is fire-and-forget;
//! a sink failure is logged by the caller and never blocks proposal state.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::caregiver::{CaregiverRecord, TimeInterval};
use crate::error::MatchingResult;
use crate::ids::{
    BranchId, CaregiverId, ClientId, OrganizationId, ProposalId, ServiceTypeId, VisitId,
};
use crate::proposal::NotificationMethod;

/// Visit lifecycle state as seen by the matching core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitStatus {
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

/// Visit row projection used for shift creation and assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Unique visit identifier
    pub id: VisitId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Owning branch
    pub branch_id: BranchId,
    /// Client receiving care
    pub client_id: ClientId,
    /// Service type
    pub service_type_id: ServiceTypeId,
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
    /// Lifecycle state
    pub status: VisitStatus,
    /// Caregiver assigned to the visit, once matched
    pub assigned_caregiver_id: Option<CaregiverId>,
    /// Skills the care plan requires
    pub required_skills: std::collections::BTreeSet<String>,
    /// Certifications the care plan requires
    pub required_certifications: std::collections::BTreeSet<String>,
    /// Caregivers the client prefers
    pub preferred_caregivers: std::collections::BTreeSet<CaregiverId>,
    /// Caregivers the client has blocked
    pub blocked_caregivers: std::collections::BTreeSet<CaregiverId>,
    /// Client gender preference
    pub gender_preference: Option<crate::shift::Gender>,
    /// Client language preference
    pub language_preference: Option<String>,
    /// Street address
    pub address: Option<String>,
    /// Latitude, when geocoded
    pub latitude: Option<f64>,
    /// Longitude, when geocoded
    pub longitude: Option<f64>,
}

/// Batched prior-history lookup result for one (caregiver, client) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientExperience {
    /// Completed visits with the client
    pub previous_visits: u32,
    /// Average rating the client gave the caregiver, 1.0..=5.0
    pub average_rating: Option<f64>,
}

/// Read-only accessors over operational data, plus the visit write-back
///
/// Each `*_for` method takes the full caregiver id slice for one match
/// attempt and returns a map keyed by caregiver id; absent keys mean "no
/// data" (zero hours, no conflicts, unknown distance).
#[async_trait]
pub trait DataPort: Send + Sync {
    /// Load one visit
    async fn get_visit(&self, visit_id: VisitId) -> MatchingResult<Option<VisitRecord>>;

    /// Assign the visit to a caregiver and mark it scheduled
    async fn assign_visit(
        &self,
        visit_id: VisitId,
        caregiver_id: CaregiverId,
        now: DateTime<Utc>,
    ) -> MatchingResult<()>;

    /// Clear a visit assignment; compensating write for a failed accept
    /// sequence
    async fn unassign_visit(
        &self,
        visit_id: VisitId,
        now: DateTime<Utc>,
    ) -> MatchingResult<()>;

    /// Load one caregiver
    async fn get_caregiver(
        &self,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Option<CaregiverRecord>>;

    /// All active caregivers attached to a branch
    async fn active_caregivers_for_branch(
        &self,
        branch_id: BranchId,
    ) -> MatchingResult<Vec<CaregiverRecord>>;

    /// Scheduled hours in the week containing `week_of`, per caregiver
    async fn week_hours_for(
        &self,
        caregiver_ids: &[CaregiverId],
        week_of: NaiveDate,
    ) -> MatchingResult<HashMap<CaregiverId, f64>>;

    /// Visits overlapping the interval on the shift day, per caregiver
    async fn conflicts_for(
        &self,
        caregiver_ids: &[CaregiverId],
        interval: TimeInterval,
    ) -> MatchingResult<HashMap<CaregiverId, Vec<TimeInterval>>>;

    /// Prior visit counts and average rating with one client, per caregiver
    async fn client_experience_for(
        &self,
        caregiver_ids: &[CaregiverId],
        client_id: ClientId,
    ) -> MatchingResult<HashMap<CaregiverId, ClientExperience>>;

    /// Trailing-90-day reliability score, per caregiver
    async fn reliability_for(
        &self,
        caregiver_ids: &[CaregiverId],
    ) -> MatchingResult<HashMap<CaregiverId, u8>>;

    /// Proposals rejected in the trailing 30 days, per caregiver
    async fn rejection_counts_for(
        &self,
        caregiver_ids: &[CaregiverId],
        since: DateTime<Utc>,
    ) -> MatchingResult<HashMap<CaregiverId, u32>>;

    /// Straight-line miles from each caregiver to a point; absent keys
    /// mean either side lacks coordinates
    async fn distances_to(
        &self,
        caregiver_ids: &[CaregiverId],
        latitude: f64,
        longitude: f64,
    ) -> MatchingResult<HashMap<CaregiverId, f64>>;
}

/// Notification payload handed to the sink at proposal emission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalNotice {
    /// Proposal being offered
    pub proposal_id: ProposalId,
    /// Caregiver to notify
    pub caregiver_id: CaregiverId,
    /// Shift date, for the message body
    pub scheduled_date: NaiveDate,
    /// Shift start, for the message body
    pub start_time: NaiveTime,
    /// Requested channel
    pub method: Option<NotificationMethod>,
    /// Urgent shifts may bypass quiet hours downstream
    pub urgent: bool,
}

/// Fire-and-forget caregiver notification channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Attempt to notify a caregiver of an offer
    async fn notify_proposal(&self, notice: &ProposalNotice) -> MatchingResult<()>;
}

/// Sink that records notifications in the log stream; the default wiring
/// for embedded and test deployments
#[derive(Debug, Default, Clone)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify_proposal(&self, notice: &ProposalNotice) -> MatchingResult<()> {
        tracing::info!(
            proposal_id = %notice.proposal_id,
            caregiver_id = %notice.caregiver_id,
            date = %notice.scheduled_date,
            urgent = notice.urgent,
            "proposal notification"
        );
        Ok(())
    }
}
