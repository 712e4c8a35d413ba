//! Proposal emission and responses
//!
//! Emission snapshots the candidate's score, quality, and reasons into the
//! proposal; notification hand-off drives `PENDING → SENT`, and a sink
//! failure leaves the proposal `PENDING` without failing the operation.
//! The accept path is transactional across its four writes (proposal,
//! visit, shift, siblings): a mid-sequence failure unwinds every write
//! that already landed, leaving the proposal in the state it held before
//! the response.

use serde::{Deserialize, Serialize};

use crate::candidate::{MatchCandidate, MatchQuality, MatchReason, ReasonImpact};
use crate::error::{MatchingError, MatchingResult};
use crate::history::{MatchHistory, MatchOutcome as HistoryOutcome};
use crate::ids::{CaregiverId, OpenShiftId, ProposalId};
use crate::ports::ProposalNotice;
use crate::proposal::{
    AssignmentProposal, NotificationMethod, ProposalMethod, ProposalStatus, RejectionCategory,
    ResponseMethod,
};
use crate::shift::{MatchingStatus, OpenShift};

use super::{AuthContext, Deadline, MatchingEngine};

/// Coordinator request for a proposal that bypasses scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualProposalRequest {
    /// Shift to offer
    pub open_shift_id: OpenShiftId,
    /// Caregiver to offer it to
    pub caregiver_id: CaregiverId,
    /// Hand the offer to the notification sink immediately
    pub send_notification: bool,
    /// Requested notification channel
    pub notification_method: Option<NotificationMethod>,
}

/// A caregiver's answer to a proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResponse {
    /// Accept or decline
    pub accept: bool,
    /// Channel the response arrived through
    pub response_method: ResponseMethod,
    /// Free-form rejection reason
    pub rejection_reason: Option<String>,
    /// Coded rejection category
    pub rejection_category: Option<RejectionCategory>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl MatchingEngine {
    /// Build, persist, and optionally send one proposal from a scored
    /// candidate snapshot
    pub(crate) async fn emit_proposal(
        &self,
        auth: &AuthContext,
        shift: &OpenShift,
        candidate: &MatchCandidate,
        method: ProposalMethod,
        send_notification: bool,
        notification_method: Option<NotificationMethod>,
    ) -> MatchingResult<AssignmentProposal> {
        let now = self.now();
        let proposal = AssignmentProposal {
            id: ProposalId::new(),
            open_shift_id: shift.id,
            visit_id: shift.visit_id,
            caregiver_id: candidate.caregiver_id,
            organization_id: shift.organization_id,
            branch_id: shift.branch_id,
            match_score: candidate.overall_score,
            match_quality: candidate.match_quality,
            match_reasons: candidate.match_reasons.clone(),
            status: ProposalStatus::Pending,
            proposed_at: now,
            sent_at: None,
            viewed_at: None,
            responded_at: None,
            accepted_at: None,
            rejected_at: None,
            expired_at: None,
            proposal_method: method,
            sent_to_caregiver: false,
            notification_method,
            urgency_flag: shift.is_urgent,
            response_method: None,
            rejection_reason: None,
            rejection_category: None,
            notes: None,
            accepted_by: None,
            created_at: now,
            created_by: Some(auth.user_id),
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
            version: 1,
        };

        let mut proposal = self.store().insert_proposal(proposal).await?;

        if send_notification {
            let notice = ProposalNotice {
                proposal_id: proposal.id,
                caregiver_id: proposal.caregiver_id,
                scheduled_date: shift.scheduled_date,
                start_time: shift.start_time,
                method: notification_method,
                urgent: shift.is_urgent,
            };
            match self.notifier().notify_proposal(&notice).await {
                Ok(()) => {
                    proposal.mark_sent(notification_method, self.now())?;
                    proposal = self.store().update_proposal(proposal).await?;
                }
                Err(err) => {
                    // Best-effort sink: the proposal stays PENDING
                    tracing::warn!(
                        proposal_id = %proposal.id,
                        error = %err,
                        "proposal notification failed"
                    );
                }
            }
        }

        Ok(proposal)
    }

    /// Create a coordinator proposal that bypasses scoring and gates
    pub async fn create_manual_proposal(
        &self,
        auth: &AuthContext,
        request: ManualProposalRequest,
    ) -> MatchingResult<AssignmentProposal> {
        self.require_coordinator(auth)?;
        let now = self.now();

        let shift = self
            .store()
            .get_shift(request.open_shift_id)
            .await?
            .ok_or_else(|| {
                MatchingError::NotFound(format!("open shift {}", request.open_shift_id))
            })?;
        self.ensure_same_org(auth, shift.organization_id)?;
        if shift.matching_status.is_terminal() {
            return Err(MatchingError::Conflict(format!(
                "shift {} is already assigned",
                shift.id
            )));
        }
        if shift.matching_status == MatchingStatus::Matching {
            return Err(MatchingError::Concurrency(shift.id.to_string()));
        }

        let caregiver = self
            .data()
            .get_caregiver(request.caregiver_id)
            .await?
            .ok_or_else(|| {
                MatchingError::NotFound(format!("caregiver {}", request.caregiver_id))
            })?;

        // The scoring toggle lives on the scope's configuration; without a
        // configuration the flat-100 snapshot applies
        let config = self.resolve_config(&shift, None).await.ok();
        let candidate = match &config {
            Some(cfg) if cfg.score_manual_proposals => {
                let ctx = self.loader().load_one(&shift, caregiver, now).await?;
                self.scorer().score(&shift, &ctx, cfg, now)
            }
            _ => manual_candidate(&shift, &caregiver.id, &caregiver.display_name, now),
        };

        let proposal = self
            .emit_proposal(
                auth,
                &shift,
                &candidate,
                ProposalMethod::Manual,
                request.send_notification,
                request.notification_method,
            )
            .await?;

        if shift.matching_status != MatchingStatus::Proposed {
            self.store()
                .transition_shift(shift.id, MatchingStatus::Proposed, self.now())
                .await?;
        }

        self.record_history(
            MatchHistory::for_attempt(
                shift.id,
                shift.visit_id,
                shift.organization_id,
                HistoryOutcome::Proposed,
                shift.match_attempts,
                self.now(),
            )
            .with_proposal(
                proposal.id,
                proposal.caregiver_id,
                proposal.match_score,
                proposal.match_quality,
            )
            .with_note("manual proposal"),
        )
        .await;

        Ok(proposal)
    }

    /// Record a caregiver's accept or reject of a proposal
    pub async fn respond_to_proposal(
        &self,
        auth: &AuthContext,
        proposal_id: ProposalId,
        response: ProposalResponse,
        deadline: Option<Deadline>,
    ) -> MatchingResult<AssignmentProposal> {
        let proposal = self
            .store()
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(format!("proposal {}", proposal_id)))?;
        self.ensure_same_org(auth, proposal.organization_id)?;

        if !proposal.status.is_open() {
            return Err(MatchingError::Validation(format!(
                "proposal {} is not in a respondable state ({})",
                proposal_id,
                proposal.status.as_str()
            )));
        }

        // Last cancellation point: the accept sequence runs as one
        // transaction once it starts
        self.check_deadline(deadline)?;

        if response.accept {
            self.accept_proposal(proposal, response).await
        } else {
            if response.rejection_reason.is_none() && response.rejection_category.is_none() {
                return Err(MatchingError::Validation(
                    "a rejection reason or category is required".to_string(),
                ));
            }
            self.reject_proposal(proposal, response).await
        }
    }

    async fn accept_proposal(
        &self,
        snapshot: AssignmentProposal,
        response: ProposalResponse,
    ) -> MatchingResult<AssignmentProposal> {
        let now = self.now();
        let prior_shift_status = self
            .store()
            .get_shift(snapshot.open_shift_id)
            .await?
            .map(|shift| shift.matching_status);

        let accepted = self
            .store()
            .mark_proposal_accepted(snapshot.id, response.response_method, response.notes, now)
            .await?;

        if let Err(err) = self
            .data()
            .assign_visit(accepted.visit_id, accepted.caregiver_id, now)
            .await
        {
            self.unwind_accept(&snapshot, false, None).await;
            return Err(err);
        }

        if let Err(err) = self
            .store()
            .transition_shift(accepted.open_shift_id, MatchingStatus::Assigned, self.now())
            .await
        {
            self.unwind_accept(&snapshot, true, None).await;
            return Err(err);
        }

        let superseded = match self
            .store()
            .supersede_open_siblings(accepted.open_shift_id, accepted.id, self.now())
            .await
        {
            Ok(superseded) => superseded,
            Err(err) => {
                self.unwind_accept(&snapshot, true, prior_shift_status).await;
                return Err(err);
            }
        };
        tracing::info!(
            proposal_id = %accepted.id,
            shift_id = %accepted.open_shift_id,
            superseded = superseded.len(),
            "proposal accepted"
        );

        let mut row = MatchHistory::for_attempt(
            accepted.open_shift_id,
            accepted.visit_id,
            accepted.organization_id,
            HistoryOutcome::Accepted,
            self.shift_attempts(accepted.open_shift_id).await,
            self.now(),
        )
        .with_proposal(
            accepted.id,
            accepted.caregiver_id,
            accepted.match_score,
            accepted.match_quality,
        );
        row.assigned_successfully = true;
        row.response_time_minutes = accepted.response_time_minutes();
        self.record_history(row).await;

        Ok(accepted)
    }

    /// Undo a partially applied accept sequence in reverse order: revert
    /// the shift when it already reached `ASSIGNED`, clear the visit
    /// assignment when it already landed, and restore the proposal
    /// snapshot. Each compensating write is attempted even when an
    /// earlier one fails; compensation failures are logged so the caller
    /// still sees the original error.
    async fn unwind_accept(
        &self,
        snapshot: &AssignmentProposal,
        undo_visit: bool,
        revert_shift_to: Option<MatchingStatus>,
    ) {
        if let Some(prior) = revert_shift_to {
            if let Err(err) = self
                .store()
                .revert_shift(snapshot.open_shift_id, prior, self.now())
                .await
            {
                tracing::error!(
                    shift_id = %snapshot.open_shift_id,
                    error = %err,
                    "shift revert failed while unwinding an accept"
                );
            }
        }
        if undo_visit {
            if let Err(err) = self
                .data()
                .unassign_visit(snapshot.visit_id, self.now())
                .await
            {
                tracing::error!(
                    visit_id = %snapshot.visit_id,
                    error = %err,
                    "visit unassign failed while unwinding an accept"
                );
            }
        }
        if let Err(err) = self.store().restore_proposal(snapshot.clone()).await {
            tracing::error!(
                proposal_id = %snapshot.id,
                error = %err,
                "proposal restore failed while unwinding an accept"
            );
        }
    }

    async fn reject_proposal(
        &self,
        snapshot: AssignmentProposal,
        response: ProposalResponse,
    ) -> MatchingResult<AssignmentProposal> {
        let now = self.now();
        let mut proposal = snapshot;
        proposal.reject(
            response.response_method,
            response.rejection_reason,
            response.rejection_category,
            response.notes,
            now,
        )?;
        let proposal = self.store().update_proposal(proposal).await?;

        let mut row = MatchHistory::for_attempt(
            proposal.open_shift_id,
            proposal.visit_id,
            proposal.organization_id,
            HistoryOutcome::Rejected,
            self.shift_attempts(proposal.open_shift_id).await,
            now,
        )
        .with_proposal(
            proposal.id,
            proposal.caregiver_id,
            proposal.match_score,
            proposal.match_quality,
        );
        row.response_time_minutes = proposal.response_time_minutes();
        if let Some(category) = proposal.rejection_category {
            row = row.with_note(format!("rejected: {:?}", category));
        }
        self.record_history(row).await;

        // With no offers left in flight the shift reopens for re-matching
        let open_siblings = self
            .store()
            .proposals_for_shift(proposal.open_shift_id)
            .await?
            .into_iter()
            .filter(|p| p.status.is_open())
            .count();
        if open_siblings == 0 {
            if let Some(shift) = self.store().get_shift(proposal.open_shift_id).await? {
                if shift.matching_status == MatchingStatus::Proposed {
                    self.store()
                        .transition_shift(shift.id, MatchingStatus::Matched, self.now())
                        .await?;
                }
            }
        }

        Ok(proposal)
    }

    pub(crate) async fn shift_attempts(&self, shift_id: OpenShiftId) -> u32 {
        match self.store().get_shift(shift_id).await {
            Ok(Some(shift)) => shift.match_attempts,
            _ => 0,
        }
    }
}

/// Candidate snapshot for a manual proposal: flat 100, excellent, one
/// system-optimized reason
pub(crate) fn manual_candidate(
    shift: &OpenShift,
    caregiver_id: &CaregiverId,
    caregiver_name: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> MatchCandidate {
    MatchCandidate {
        caregiver_id: *caregiver_id,
        open_shift_id: shift.id,
        caregiver_name: caregiver_name.to_string(),
        scores: crate::candidate::DimensionScores::default(),
        overall_score: 100,
        match_quality: MatchQuality::Excellent,
        is_eligible: true,
        eligibility_issues: Vec::new(),
        warnings: Vec::new(),
        distance_from_shift: None,
        estimated_travel_time_minutes: None,
        has_conflict: false,
        available_hours: 0.0,
        match_reasons: vec![MatchReason {
            category: "SYSTEM_OPTIMIZED".to_string(),
            description: "Coordinator-selected assignment".to_string(),
            impact: ReasonImpact::Positive,
            weight: 1.0,
        }],
        computed_at: now,
    }
}
