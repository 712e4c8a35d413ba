//! Caregiver self-select
//!
//! Caregivers browse open shifts in their branch over the next seven
//! days, see only shifts they would clear the proposal threshold for, and
//! claim one directly. A claim re-scores at claim time; when the
//! caregiver's profile opts into auto-assignment and the score clears the
//! auto-assign threshold, the claim drives straight through the accept
//! path.

use chrono::Duration;

use crate::candidate::MatchCandidate;
use crate::error::{MatchingError, MatchingResult};
use crate::history::{MatchHistory, MatchOutcome as HistoryOutcome};
use crate::ids::{CaregiverId, OpenShiftId};
use crate::proposal::{AssignmentProposal, ProposalMethod, ResponseMethod};
use crate::scorer;
use crate::shift::MatchingStatus;

use super::{AuthContext, Deadline, MatchingEngine, ProposalResponse};

/// Shift statuses a caregiver may browse and claim from
const BROWSABLE: [MatchingStatus; 4] = [
    MatchingStatus::New,
    MatchingStatus::Matching,
    MatchingStatus::Matched,
    MatchingStatus::Proposed,
];

/// Days ahead (inclusive) shown on the open-shift board
const BROWSE_WINDOW_DAYS: i64 = 7;

/// Auto-assign floor applied when the configuration does not set one
const DEFAULT_AUTO_ASSIGN_THRESHOLD: u8 = 85;

impl MatchingEngine {
    /// Ranked shifts the caregiver could claim over the next seven days
    pub async fn available_shifts_for_caregiver(
        &self,
        auth: &AuthContext,
        caregiver_id: CaregiverId,
    ) -> MatchingResult<Vec<MatchCandidate>> {
        let caregiver = self
            .data()
            .get_caregiver(caregiver_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(format!("caregiver {}", caregiver_id)))?;
        self.ensure_same_org(auth, caregiver.organization_id)?;

        let now = self.now();
        let today = now.date_naive();
        let shifts = self
            .store()
            .shifts_in_window(
                caregiver.primary_branch_id,
                today,
                today + Duration::days(BROWSE_WINDOW_DAYS),
                &BROWSABLE,
            )
            .await?;

        let mut candidates = Vec::new();
        for shift in shifts {
            if shift.blocked_caregivers.contains(&caregiver_id) {
                continue;
            }
            let config = match self.resolve_config(&shift, None).await {
                Ok(config) => config,
                Err(MatchingError::Validation(_)) => continue,
                Err(err) => return Err(err),
            };
            let ctx = self
                .loader()
                .load_one(&shift, caregiver.clone(), now)
                .await?;
            let candidate = self.scorer().score(&shift, &ctx, &config, now);
            if candidate.clears(config.min_score_for_proposal) {
                candidates.push(candidate);
            }
        }

        scorer::rank(&mut candidates);
        Ok(candidates)
    }

    /// Claim one open shift as a caregiver
    pub async fn claim_shift(
        &self,
        auth: &AuthContext,
        caregiver_id: CaregiverId,
        open_shift_id: OpenShiftId,
        deadline: Option<Deadline>,
    ) -> MatchingResult<AssignmentProposal> {
        let now = self.now();
        self.check_deadline(deadline)?;
        let shift = self
            .store()
            .get_shift(open_shift_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", open_shift_id)))?;
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
            .get_caregiver(caregiver_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(format!("caregiver {}", caregiver_id)))?;

        // Eligibility and threshold must hold at claim time
        let config = self.resolve_config(&shift, None).await?;
        let ctx = self.loader().load_one(&shift, caregiver, now).await?;
        let candidate = self.scorer().score(&shift, &ctx, &config, now);

        if !candidate.is_eligible {
            let blocking: Vec<String> = candidate
                .eligibility_issues
                .iter()
                .filter(|i| i.severity == crate::candidate::IssueSeverity::Blocking)
                .map(|i| i.message.clone())
                .collect();
            return Err(MatchingError::Validation(format!(
                "caregiver is not eligible for this shift: {}",
                blocking.join("; ")
            )));
        }
        if candidate.overall_score < config.min_score_for_proposal {
            return Err(MatchingError::ScoreBelowThreshold {
                score: candidate.overall_score,
                minimum_required: config.min_score_for_proposal,
            });
        }

        // Last cancellation point before state-changing writes
        self.check_deadline(deadline)?;

        let proposal = self
            .emit_proposal(
                auth,
                &shift,
                &candidate,
                ProposalMethod::CaregiverSelfSelect,
                false,
                None,
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
            .with_note("caregiver self-select"),
        )
        .await;

        // Profile-gated immediate acceptance
        let auto_assign = self
            .store()
            .get_preference_profile(caregiver_id)
            .await?
            .map(|profile| profile.accept_auto_assignment)
            .unwrap_or(false);
        let threshold = config
            .auto_assign_threshold
            .unwrap_or(DEFAULT_AUTO_ASSIGN_THRESHOLD);

        if auto_assign && candidate.overall_score >= threshold {
            tracing::info!(
                proposal_id = %proposal.id,
                caregiver_id = %caregiver_id,
                score = candidate.overall_score,
                "auto-accepting self-selected shift"
            );
            return self
                .respond_to_proposal(
                    auth,
                    proposal.id,
                    ProposalResponse {
                        accept: true,
                        response_method: ResponseMethod::MobileApp,
                        rejection_reason: None,
                        rejection_category: None,
                        notes: None,
                    },
                    deadline,
                )
                .await;
        }

        Ok(proposal)
    }
}
