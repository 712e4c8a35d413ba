//! Scheduler-initiated matching
//!
//! One match attempt drives a shift through: CAS to `MATCHING` → resolve
//! configuration → load candidate contexts → score → rank → partition →
//! bound → optional proposal fan-out → history row. A failure after the
//! CAS lands the shift in `NO_MATCH` and propagates; a cancelled deadline
//! rolls the shift back to the status it held before the attempt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::candidate::MatchCandidate;
use crate::config::MatchingConfiguration;
use crate::error::{MatchingError, MatchingResult};
use crate::history::{MatchHistory, MatchOutcome as HistoryOutcome};
use crate::ids::{ConfigurationId, OpenShiftId};
use crate::proposal::{AssignmentProposal, ProposalMethod};
use crate::scorer;
use crate::shift::{MatchingStatus, OpenShift};

use super::{AuthContext, Deadline, MatchingEngine};

/// Parameters of one match attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchShiftRequest {
    /// Shift to match
    pub open_shift_id: OpenShiftId,
    /// Explicit configuration override; the scope default applies otherwise
    pub configuration_id: Option<ConfigurationId>,
    /// Cap on selected candidates, below the configured fan-out
    pub max_candidates: Option<usize>,
    /// Emit proposals for the selected candidates immediately
    pub auto_propose: bool,
}

/// Result of one match attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Shift after the attempt
    pub shift: OpenShift,
    /// Every scored candidate, ranked
    pub candidates: Vec<MatchCandidate>,
    /// Proposals emitted when auto-propose was on
    pub created_proposals: Vec<AssignmentProposal>,
    /// Candidates that cleared eligibility and the score threshold
    pub eligible_count: usize,
    /// Candidates that did not
    pub ineligible_count: usize,
}

impl MatchingEngine {
    /// Run one match attempt for a shift
    pub async fn match_shift(
        &self,
        auth: &AuthContext,
        request: MatchShiftRequest,
        deadline: Option<Deadline>,
    ) -> MatchingResult<MatchOutcome> {
        let shift_id = request.open_shift_id;
        let now = self.now();

        let shift = self
            .store()
            .get_shift(shift_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(format!("open shift {}", shift_id)))?;
        self.ensure_same_org(auth, shift.organization_id)?;

        let prior_status = shift.matching_status;
        let held = self.store().begin_matching(shift_id, now).await?;
        tracing::info!(
            shift_id = %shift_id,
            attempt = held.match_attempts,
            "match attempt started"
        );

        let budget = Duration::from_millis(self.settings().matcher_per_shift_budget_ms);
        let attempt = tokio::time::timeout(
            budget,
            self.run_attempt(auth, &held, &request, deadline),
        )
        .await;

        match attempt {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(MatchingError::DeadlineExceeded)) => {
                // Cancelled before any state-changing write: restore the
                // status the shift held before the attempt
                self.store()
                    .revert_shift(shift_id, prior_status, self.now())
                    .await?;
                Err(MatchingError::DeadlineExceeded)
            }
            Ok(Err(err)) => {
                tracing::warn!(shift_id = %shift_id, error = %err, "match attempt failed");
                self.store()
                    .revert_shift(shift_id, MatchingStatus::NoMatch, self.now())
                    .await?;
                Err(err)
            }
            Err(_elapsed) => {
                let now = self.now();
                let shift = self
                    .store()
                    .revert_shift(shift_id, MatchingStatus::NoMatch, now)
                    .await?;
                self.record_history(
                    MatchHistory::for_attempt(
                        shift.id,
                        shift.visit_id,
                        shift.organization_id,
                        HistoryOutcome::NoCandidates,
                        shift.match_attempts,
                        now,
                    )
                    .with_note(format!(
                        "attempt aborted after exceeding the {} ms budget",
                        self.settings().matcher_per_shift_budget_ms
                    )),
                )
                .await;
                Ok(MatchOutcome {
                    shift,
                    candidates: Vec::new(),
                    created_proposals: Vec::new(),
                    eligible_count: 0,
                    ineligible_count: 0,
                })
            }
        }
    }

    async fn run_attempt(
        &self,
        auth: &AuthContext,
        held: &OpenShift,
        request: &MatchShiftRequest,
        deadline: Option<Deadline>,
    ) -> MatchingResult<MatchOutcome> {
        let config = self.resolve_config(held, request.configuration_id).await?;
        self.check_deadline(deadline)?;

        let contexts = self.loader().load(held, self.now()).await?;
        self.check_deadline(deadline)?;

        let scored_at = self.now();
        let mut candidates: Vec<MatchCandidate> = contexts
            .iter()
            .map(|ctx| self.scorer().score(held, ctx, &config, scored_at))
            .collect();
        scorer::rank(&mut candidates);

        let min_score = config.min_score_for_proposal;
        let eligible_count = candidates.iter().filter(|c| c.clears(min_score)).count();
        let ineligible_count = candidates.len() - eligible_count;

        let cap = request
            .max_candidates
            .unwrap_or(config.max_proposals_per_shift)
            .min(eligible_count);
        let selected: Vec<MatchCandidate> = candidates
            .iter()
            .filter(|c| c.clears(min_score))
            .take(cap)
            .cloned()
            .collect();

        // Last cancellation point before state-changing writes
        self.check_deadline(deadline)?;

        let now = self.now();
        let mut shift = if selected.is_empty() {
            self.store()
                .transition_shift(held.id, MatchingStatus::NoMatch, now)
                .await?
        } else {
            self.store()
                .transition_shift(held.id, MatchingStatus::Matched, now)
                .await?
        };

        let mut created_proposals = Vec::new();
        if request.auto_propose && !selected.is_empty() {
            for candidate in &selected {
                let proposal = self
                    .emit_proposal(auth, &shift, candidate, ProposalMethod::Automatic, true, None)
                    .await?;
                created_proposals.push(proposal);
            }
            shift = self
                .store()
                .transition_shift(shift.id, MatchingStatus::Proposed, self.now())
                .await?;
        }

        self.write_attempt_history(&shift, &config, &created_proposals, eligible_count, candidates.len())
            .await;

        tracing::info!(
            shift_id = %shift.id,
            eligible = eligible_count,
            scored = candidates.len(),
            proposals = created_proposals.len(),
            status = shift.matching_status.as_str(),
            "match attempt finished"
        );

        Ok(MatchOutcome {
            shift,
            candidates,
            created_proposals,
            eligible_count,
            ineligible_count,
        })
    }

    async fn write_attempt_history(
        &self,
        shift: &OpenShift,
        config: &MatchingConfiguration,
        created: &[AssignmentProposal],
        eligible: usize,
        scored: usize,
    ) {
        let outcome = if eligible == 0 {
            HistoryOutcome::NoCandidates
        } else {
            HistoryOutcome::Proposed
        };
        let mut row = MatchHistory::for_attempt(
            shift.id,
            shift.visit_id,
            shift.organization_id,
            outcome,
            shift.match_attempts,
            self.now(),
        )
        .with_note(format!("{} eligible of {} scored", eligible, scored));
        row.configuration_snapshot = serde_json::to_value(config).ok();
        if let Some(best) = created.first() {
            row = row.with_proposal(best.id, best.caregiver_id, best.match_score, best.match_quality);
        }
        self.record_history(row).await;
    }

    pub(crate) fn check_deadline(&self, deadline: Option<Deadline>) -> MatchingResult<()> {
        match deadline {
            Some(deadline) if deadline.expired(self.now()) => {
                Err(MatchingError::DeadlineExceeded)
            }
            _ => Ok(()),
        }
    }
}
