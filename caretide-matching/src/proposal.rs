//! Assignment proposals and their lifecycle
//!
//! A proposal is a time-bounded offer of one open shift to one caregiver.
//! The status graph only moves forward: `PENDING → SENT → VIEWED` and from
//! any open state into exactly one of the terminal states. Illegal moves
//! surface as `InvalidTransition`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::{MatchQuality, MatchReason};
use crate::error::{MatchingError, MatchingResult};
use crate::ids::{
    BranchId, CaregiverId, OpenShiftId, OrganizationId, ProposalId, UserId, VisitId,
};

/// Lifecycle state of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Created, caregiver not yet notified
    Pending,
    /// Notification handed to the sink
    Sent,
    /// Caregiver opened the offer
    Viewed,
    /// Caregiver took the shift; at most one per shift
    Accepted,
    /// Caregiver declined
    Rejected,
    /// TTL elapsed before a response
    Expired,
    /// A sibling proposal was accepted first
    Superseded,
}

impl ProposalStatus {
    /// Open states: respondable, expirable, supersedable
    pub fn is_open(self) -> bool {
        matches!(
            self,
            ProposalStatus::Pending | ProposalStatus::Sent | ProposalStatus::Viewed
        )
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }

    /// Wire/storage label, matching the serde encoding
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "PENDING",
            ProposalStatus::Sent => "SENT",
            ProposalStatus::Viewed => "VIEWED",
            ProposalStatus::Accepted => "ACCEPTED",
            ProposalStatus::Rejected => "REJECTED",
            ProposalStatus::Expired => "EXPIRED",
            ProposalStatus::Superseded => "SUPERSEDED",
        }
    }

    /// Whether `to` is reachable from `self` in one step
    pub fn can_transition_to(self, to: ProposalStatus) -> bool {
        use ProposalStatus::*;
        match (self, to) {
            (Pending, Sent) => true,
            (Sent, Viewed) => true,
            (from, Accepted | Rejected | Expired | Superseded) => from.is_open(),
            _ => false,
        }
    }
}

/// How a proposal came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalMethod {
    /// Emitted by the matcher after ranking
    Automatic,
    /// Created by a coordinator, bypassing scoring
    Manual,
    /// Claimed by the caregiver from the open-shift board
    CaregiverSelfSelect,
}

/// Channel used to notify the caregiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationMethod {
    Sms,
    Email,
    Push,
    InApp,
}

/// Channel the caregiver responded through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseMethod {
    MobileApp,
    Web,
    Phone,
    Sms,
}

/// Why a caregiver declined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCategory {
    TooFar,
    TimeConflict,
    PersonalReason,
    ClientPreference,
    InsufficientHours,
    Other,
}

/// A time-bounded offer of one open shift to one caregiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentProposal {
    /// Unique proposal identifier
    pub id: ProposalId,
    /// Shift being offered
    pub open_shift_id: OpenShiftId,
    /// Underlying visit
    pub visit_id: VisitId,
    /// Offered caregiver
    pub caregiver_id: CaregiverId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Owning branch
    pub branch_id: BranchId,

    /// Overall score frozen at emission
    pub match_score: u8,
    /// Quality band frozen at emission
    pub match_quality: MatchQuality,
    /// Reasons frozen at emission
    pub match_reasons: Vec<MatchReason>,

    /// Current lifecycle state
    pub status: ProposalStatus,

    /// Creation instant
    pub proposed_at: DateTime<Utc>,
    /// Notification hand-off instant
    pub sent_at: Option<DateTime<Utc>>,
    /// First-view instant
    pub viewed_at: Option<DateTime<Utc>>,
    /// Response instant, accept or reject
    pub responded_at: Option<DateTime<Utc>>,
    /// Accept instant
    pub accepted_at: Option<DateTime<Utc>>,
    /// Reject instant
    pub rejected_at: Option<DateTime<Utc>>,
    /// Expiry instant
    pub expired_at: Option<DateTime<Utc>>,

    /// How the proposal was created
    pub proposal_method: ProposalMethod,
    /// Whether the notification sink was handed the offer
    pub sent_to_caregiver: bool,
    /// Channel requested for notification
    pub notification_method: Option<NotificationMethod>,
    /// Urgent shifts flag through to the notification payload
    pub urgency_flag: bool,

    /// Channel the response arrived through
    pub response_method: Option<ResponseMethod>,
    /// Free-form rejection reason
    pub rejection_reason: Option<String>,
    /// Coded rejection category
    pub rejection_category: Option<RejectionCategory>,
    /// Free-form notes from either party
    pub notes: Option<String>,
    /// Who accepted (audit)
    pub accepted_by: Option<CaregiverId>,

    /// Creation stamp
    pub created_at: DateTime<Utc>,
    /// Creating user, when coordinator-driven
    pub created_by: Option<UserId>,
    /// Last update stamp
    pub updated_at: DateTime<Utc>,
    /// Soft-delete stamp
    pub deleted_at: Option<DateTime<Utc>>,
    /// Soft-deleting user
    pub deleted_by: Option<UserId>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl AssignmentProposal {
    /// Whether the row is visible to queries
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    fn check_transition(&self, to: ProposalStatus) -> MatchingResult<()> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(MatchingError::InvalidTransition {
                entity: "proposal",
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    /// `PENDING → SENT` after the notification sink was invoked
    pub fn mark_sent(
        &mut self,
        method: Option<NotificationMethod>,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        self.check_transition(ProposalStatus::Sent)?;
        self.status = ProposalStatus::Sent;
        self.sent_at = Some(now);
        self.sent_to_caregiver = true;
        self.notification_method = method;
        self.stamp(now);
        Ok(())
    }

    /// `SENT → VIEWED` when the caregiver opens the offer
    pub fn mark_viewed(&mut self, now: DateTime<Utc>) -> MatchingResult<()> {
        self.check_transition(ProposalStatus::Viewed)?;
        self.status = ProposalStatus::Viewed;
        self.viewed_at = Some(now);
        self.stamp(now);
        Ok(())
    }

    /// Open state → `ACCEPTED`
    pub fn accept(
        &mut self,
        response_method: ResponseMethod,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        self.check_transition(ProposalStatus::Accepted)?;
        self.status = ProposalStatus::Accepted;
        self.accepted_at = Some(now);
        self.responded_at = Some(now);
        self.response_method = Some(response_method);
        self.accepted_by = Some(self.caregiver_id);
        if notes.is_some() {
            self.notes = notes;
        }
        self.stamp(now);
        Ok(())
    }

    /// Open state → `REJECTED`
    pub fn reject(
        &mut self,
        response_method: ResponseMethod,
        reason: Option<String>,
        category: Option<RejectionCategory>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> MatchingResult<()> {
        self.check_transition(ProposalStatus::Rejected)?;
        self.status = ProposalStatus::Rejected;
        self.rejected_at = Some(now);
        self.responded_at = Some(now);
        self.response_method = Some(response_method);
        self.rejection_reason = reason;
        self.rejection_category = category;
        if notes.is_some() {
            self.notes = notes;
        }
        self.stamp(now);
        Ok(())
    }

    /// Open state → `EXPIRED` when the TTL elapses
    pub fn expire(&mut self, now: DateTime<Utc>) -> MatchingResult<()> {
        self.check_transition(ProposalStatus::Expired)?;
        self.status = ProposalStatus::Expired;
        self.expired_at = Some(now);
        self.stamp(now);
        Ok(())
    }

    /// Open state → `SUPERSEDED` when a sibling is accepted
    pub fn supersede(&mut self, now: DateTime<Utc>) -> MatchingResult<()> {
        self.check_transition(ProposalStatus::Superseded)?;
        self.status = ProposalStatus::Superseded;
        self.stamp(now);
        Ok(())
    }

    /// Minutes between emission and response, for the audit trail
    pub fn response_time_minutes(&self) -> Option<i64> {
        self.responded_at
            .map(|responded| (responded - self.proposed_at).num_minutes())
    }
}
