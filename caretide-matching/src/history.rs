//! Match history audit trail
//!
//! Append-only: one row per matching attempt or proposal outcome. History
//! writes are best-effort and never fail the primary operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::MatchQuality;
use crate::ids::{
    CaregiverId, MatchHistoryId, OpenShiftId, OrganizationId, ProposalId, UserId, VisitId,
};

/// Outcome recorded by a history row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOutcome {
    /// Proposals were emitted for the attempt
    Proposed,
    /// A proposal was accepted and the visit assigned
    Accepted,
    /// A proposal was rejected
    Rejected,
    /// A proposal expired unanswered
    Expired,
    /// Ranking produced no eligible candidate
    NoCandidates,
}

/// One audit row in the append-only match history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchHistory {
    /// Unique row identifier
    pub id: MatchHistoryId,
    /// Shift the row describes
    pub open_shift_id: OpenShiftId,
    /// Underlying visit
    pub visit_id: VisitId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Caregiver involved, when the outcome concerns one proposal
    pub caregiver_id: Option<CaregiverId>,
    /// Proposal involved, when the outcome concerns one proposal
    pub proposal_id: Option<ProposalId>,
    /// What happened
    pub outcome: MatchOutcome,
    /// Score snapshot, when one applies
    pub match_score: Option<u8>,
    /// Quality snapshot, when one applies
    pub match_quality: Option<MatchQuality>,
    /// Attempt counter of the shift at recording time; monotone per shift
    pub attempt_number: u32,
    /// Whether the outcome ended with the visit assigned
    pub assigned_successfully: bool,
    /// Configuration snapshot for audit replay
    pub configuration_snapshot: Option<serde_json::Value>,
    /// Minutes between proposal emission and response
    pub response_time_minutes: Option<i64>,
    /// Free-form note, e.g. eligible/total counts
    pub note: Option<String>,
    /// Recording instant
    pub recorded_at: DateTime<Utc>,
    /// Recording user, when operator-driven
    pub recorded_by: Option<UserId>,
}

impl MatchHistory {
    /// Row skeleton for a shift-level outcome
    pub fn for_attempt(
        shift_id: OpenShiftId,
        visit_id: VisitId,
        organization_id: OrganizationId,
        outcome: MatchOutcome,
        attempt_number: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MatchHistoryId::new(),
            open_shift_id: shift_id,
            visit_id,
            organization_id,
            caregiver_id: None,
            proposal_id: None,
            outcome,
            match_score: None,
            match_quality: None,
            attempt_number,
            assigned_successfully: false,
            configuration_snapshot: None,
            response_time_minutes: None,
            note: None,
            recorded_at: now,
            recorded_by: None,
        }
    }

    /// Attach a proposal's identity and score snapshot
    pub fn with_proposal(
        mut self,
        proposal_id: ProposalId,
        caregiver_id: CaregiverId,
        match_score: u8,
        match_quality: MatchQuality,
    ) -> Self {
        self.proposal_id = Some(proposal_id);
        self.caregiver_id = Some(caregiver_id);
        self.match_score = Some(match_score);
        self.match_quality = Some(match_quality);
        self
    }

    /// Attach a free-form note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
