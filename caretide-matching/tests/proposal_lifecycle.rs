//! Proposal lifecycle scenarios
//!
//! Accept/supersede, reject/reopen, self-select claims, manual proposals,
//! and TTL expiry, all on the in-memory store with a manual clock.

mod common;

use std::sync::Arc;

use chrono::Duration;

use caretide_config::RuntimeSettings;
use caretide_matching::engine::{
    ManualProposalRequest, MatchShiftRequest, MatchingEngine, ProposalResponse,
};
use caretide_matching::history::MatchOutcome as HistoryOutcome;
use caretide_matching::ports::{DataPort, VisitStatus};
use caretide_matching::proposal::{ProposalMethod, RejectionCategory, ResponseMethod};
use caretide_matching::{
    Deadline, MatchQuality, MatchingError, MatchingStatus, ProposalStatus, ProposalStore,
};

use common::{FailingStore, Harness};

async fn matched_with_two_proposals(
    harness: &Harness,
) -> (
    caretide_matching::OpenShift,
    caretide_matching::AssignmentProposal,
    caretide_matching::AssignmentProposal,
) {
    let near = harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;
    harness.caregiver("Riley Chen", 40.0, 80);

    let outcome = harness
        .engine
        .match_shift(
            &harness.auth(),
            MatchShiftRequest {
                open_shift_id: shift.id,
                configuration_id: None,
                max_candidates: None,
                auto_propose: true,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.created_proposals.len(), 2);

    let first = outcome
        .created_proposals
        .iter()
        .find(|p| p.caregiver_id == near)
        .unwrap()
        .clone();
    let second = outcome
        .created_proposals
        .iter()
        .find(|p| p.caregiver_id != near)
        .unwrap()
        .clone();
    (outcome.shift, first, second)
}

fn accept() -> ProposalResponse {
    ProposalResponse {
        accept: true,
        response_method: ResponseMethod::MobileApp,
        rejection_reason: None,
        rejection_category: None,
        notes: None,
    }
}

fn reject(category: RejectionCategory) -> ProposalResponse {
    ProposalResponse {
        accept: false,
        response_method: ResponseMethod::MobileApp,
        rejection_reason: Some("declined".to_string()),
        rejection_category: Some(category),
        notes: None,
    }
}

#[tokio::test]
async fn test_accept_supersedes_siblings_and_assigns_visit() {
    let harness = Harness::new().await;
    let (shift, winner, loser) = matched_with_two_proposals(&harness).await;

    harness.clock.advance(Duration::minutes(12));
    let accepted = harness
        .engine
        .respond_to_proposal(&harness.caregiver_auth(), winner.id, accept(), None)
        .await
        .unwrap();

    assert_eq!(accepted.status, ProposalStatus::Accepted);
    assert_eq!(accepted.response_time_minutes(), Some(12));

    let superseded = harness
        .store
        .get_proposal(loser.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(superseded.status, ProposalStatus::Superseded);

    let stored_shift = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored_shift.matching_status, MatchingStatus::Assigned);

    let visit = harness
        .port
        .get_visit(shift.visit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visit.assigned_caregiver_id, Some(winner.caregiver_id));
    assert_eq!(visit.status, VisitStatus::Scheduled);

    // Exactly one ACCEPTED history row, preceded by the PROPOSED row
    let history = harness.store.history_for_shift(shift.id).await.unwrap();
    let accepted_rows: Vec<_> = history
        .iter()
        .filter(|r| r.outcome == HistoryOutcome::Accepted)
        .collect();
    assert_eq!(accepted_rows.len(), 1);
    assert!(accepted_rows[0].assigned_successfully);
    assert_eq!(accepted_rows[0].response_time_minutes, Some(12));
    let proposed_index = history
        .iter()
        .position(|r| r.outcome == HistoryOutcome::Proposed)
        .unwrap();
    let accepted_index = history
        .iter()
        .position(|r| r.outcome == HistoryOutcome::Accepted)
        .unwrap();
    assert!(proposed_index < accepted_index);
}

#[tokio::test]
async fn test_second_accept_is_rejected() {
    let harness = Harness::new().await;
    let (_shift, winner, loser) = matched_with_two_proposals(&harness).await;

    harness
        .engine
        .respond_to_proposal(&harness.caregiver_auth(), winner.id, accept(), None)
        .await
        .unwrap();

    // The sibling is already SUPERSEDED: no longer respondable
    let err = harness
        .engine
        .respond_to_proposal(&harness.caregiver_auth(), loser.id, accept(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::Validation(_)));
}

#[tokio::test]
async fn test_reject_reopens_the_shift() {
    let harness = Harness::new().await;
    let near = harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;

    let outcome = harness
        .engine
        .match_shift(
            &harness.auth(),
            MatchShiftRequest {
                open_shift_id: shift.id,
                configuration_id: None,
                max_candidates: None,
                auto_propose: true,
            },
            None,
        )
        .await
        .unwrap();
    let proposal = outcome.created_proposals[0].clone();
    assert_eq!(proposal.caregiver_id, near);

    let rejected = harness
        .engine
        .respond_to_proposal(
            &harness.caregiver_auth(),
            proposal.id,
            reject(RejectionCategory::TooFar),
            None,
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, ProposalStatus::Rejected);
    assert_eq!(rejected.rejection_category, Some(RejectionCategory::TooFar));

    // No open siblings left: the shift reopens for re-matching
    let stored_shift = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored_shift.matching_status, MatchingStatus::Matched);

    let history = harness.store.history_for_shift(shift.id).await.unwrap();
    let rejection = history
        .iter()
        .find(|r| r.outcome == HistoryOutcome::Rejected)
        .unwrap();
    assert!(rejection.note.as_deref().unwrap_or("").contains("TooFar"));
}

#[tokio::test]
async fn test_rejection_requires_a_reason() {
    let harness = Harness::new().await;
    let (_shift, winner, _loser) = matched_with_two_proposals(&harness).await;

    let err = harness
        .engine
        .respond_to_proposal(
            &harness.caregiver_auth(),
            winner.id,
            ProposalResponse {
                accept: false,
                response_method: ResponseMethod::MobileApp,
                rejection_reason: None,
                rejection_category: None,
                notes: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::Validation(_)));
}

#[tokio::test]
async fn test_self_select_below_threshold_is_rejected() {
    let harness = Harness::with_config(|c| c.require_exact_skill_match = false).await;
    let weak = harness.weak_caregiver("Sam Okafor");
    let shift = harness.open_shift(harness.visit()).await;

    let err = harness
        .engine
        .claim_shift(&harness.caregiver_auth(), weak, shift.id, None)
        .await
        .unwrap_err();
    match err {
        MatchingError::ScoreBelowThreshold {
            score,
            minimum_required,
        } => {
            assert!(score < 60);
            assert_eq!(minimum_required, 60);
        }
        other => panic!("expected score threshold error, got {:?}", other),
    }

    // No proposal was created and the shift did not move
    assert!(harness
        .store
        .proposals_for_shift(shift.id)
        .await
        .unwrap()
        .is_empty());
    let stored = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored.matching_status, MatchingStatus::New);
}

#[tokio::test]
async fn test_self_select_claim_creates_proposal() {
    let harness = Harness::new().await;
    let strong = harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;

    let proposal = harness
        .engine
        .claim_shift(&harness.caregiver_auth(), strong, shift.id, None)
        .await
        .unwrap();

    assert_eq!(proposal.proposal_method, ProposalMethod::CaregiverSelfSelect);
    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert!(!proposal.sent_to_caregiver);

    let stored = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored.matching_status, MatchingStatus::Proposed);
}

#[tokio::test]
async fn test_self_select_auto_assignment() {
    let harness = Harness::new().await;
    let strong = harness.caregiver("Casey Morgan", 10.0, 90);
    harness.with_experience(strong, 10, Some(5.0));
    let shift = harness.open_shift(harness.visit()).await;

    // Opt the caregiver into auto-assignment
    let profile = {
        let mut profile = caretide_matching::preferences::CaregiverPreferenceProfile::new(
            strong,
            common::start_instant(),
        );
        profile.accept_auto_assignment = true;
        profile
    };
    harness
        .store
        .upsert_preference_profile(profile)
        .await
        .unwrap();

    let proposal = harness
        .engine
        .claim_shift(&harness.caregiver_auth(), strong, shift.id, None)
        .await
        .unwrap();

    assert_eq!(proposal.status, ProposalStatus::Accepted);
    let stored = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored.matching_status, MatchingStatus::Assigned);
    let visit = harness
        .port
        .get_visit(shift.visit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visit.assigned_caregiver_id, Some(strong));
}

#[tokio::test]
async fn test_claim_on_assigned_shift_conflicts() {
    let harness = Harness::new().await;
    let (shift, winner, _loser) = matched_with_two_proposals(&harness).await;
    harness
        .engine
        .respond_to_proposal(&harness.caregiver_auth(), winner.id, accept(), None)
        .await
        .unwrap();

    let late = harness.caregiver("Avery Quinn", 12.0, 85);
    let err = harness
        .engine
        .claim_shift(&harness.caregiver_auth(), late, shift.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::Conflict(_)));
}

#[tokio::test]
async fn test_available_shifts_are_ranked_and_filtered() {
    let harness = Harness::new().await;
    let caregiver = harness.caregiver("Casey Morgan", 10.0, 90);

    let shift_a = harness.open_shift(harness.visit()).await;
    let mut blocked_visit = harness.visit();
    blocked_visit.blocked_caregivers.insert(caregiver);
    let shift_b = harness.open_shift(blocked_visit).await;

    let board = harness
        .engine
        .available_shifts_for_caregiver(&harness.caregiver_auth(), caregiver)
        .await
        .unwrap();

    assert!(board.iter().any(|c| c.open_shift_id == shift_a.id));
    assert!(board.iter().all(|c| c.open_shift_id != shift_b.id));
    // Ranked best-first
    for pair in board.windows(2) {
        assert!(pair[0].overall_score >= pair[1].overall_score);
    }
}

#[tokio::test]
async fn test_manual_proposal_bypasses_scoring() {
    let harness = Harness::new().await;
    // Unskilled and distant; an automatic match would never offer this
    let caregiver = harness.weak_caregiver("Sam Okafor");
    let shift = harness.open_shift(harness.visit()).await;

    let proposal = harness
        .engine
        .create_manual_proposal(
            &harness.auth(),
            ManualProposalRequest {
                open_shift_id: shift.id,
                caregiver_id: caregiver,
                send_notification: true,
                notification_method: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(proposal.proposal_method, ProposalMethod::Manual);
    assert_eq!(proposal.match_score, 100);
    assert_eq!(proposal.match_quality, MatchQuality::Excellent);
    assert_eq!(proposal.match_reasons.len(), 1);
    assert_eq!(proposal.match_reasons[0].category, "SYSTEM_OPTIMIZED");
    assert_eq!(proposal.status, ProposalStatus::Sent);

    let stored = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored.matching_status, MatchingStatus::Proposed);
}

#[tokio::test]
async fn test_manual_proposal_requires_coordinator() {
    let harness = Harness::new().await;
    let caregiver = harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;

    let err = harness
        .engine
        .create_manual_proposal(
            &harness.caregiver_auth(),
            ManualProposalRequest {
                open_shift_id: shift.id,
                caregiver_id: caregiver,
                send_notification: false,
                notification_method: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::Permission(_)));
}

#[tokio::test]
async fn test_expiry_after_ttl_and_idempotent_rerun() {
    let harness = Harness::new().await;
    harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;

    let outcome = harness
        .engine
        .match_shift(
            &harness.auth(),
            MatchShiftRequest {
                open_shift_id: shift.id,
                configuration_id: None,
                max_candidates: None,
                auto_propose: true,
            },
            None,
        )
        .await
        .unwrap();
    let proposal = outcome.created_proposals[0].clone();

    // One minute short of the 120 minute TTL: nothing expires
    harness.clock.advance(Duration::minutes(119));
    assert_eq!(harness.engine.expire_stale_proposals(None).await.unwrap(), 0);

    // Past the TTL: exactly one transition
    harness.clock.advance(Duration::minutes(2));
    assert_eq!(harness.engine.expire_stale_proposals(None).await.unwrap(), 1);

    let stored = harness
        .store
        .get_proposal(proposal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ProposalStatus::Expired);
    assert!(stored.expired_at.is_some());

    let history = harness.store.history_for_shift(shift.id).await.unwrap();
    assert_eq!(
        history
            .iter()
            .filter(|r| r.outcome == HistoryOutcome::Expired)
            .count(),
        1
    );

    // Re-running a minute later is a no-op
    harness.clock.advance(Duration::minutes(1));
    assert_eq!(harness.engine.expire_stale_proposals(None).await.unwrap(), 0);
    let history = harness.store.history_for_shift(shift.id).await.unwrap();
    assert_eq!(
        history
            .iter()
            .filter(|r| r.outcome == HistoryOutcome::Expired)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_expired_proposal_is_not_respondable() {
    let harness = Harness::new().await;
    harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;

    let outcome = harness
        .engine
        .match_shift(
            &harness.auth(),
            MatchShiftRequest {
                open_shift_id: shift.id,
                configuration_id: None,
                max_candidates: None,
                auto_propose: true,
            },
            None,
        )
        .await
        .unwrap();
    let proposal = outcome.created_proposals[0].clone();

    harness.clock.advance(Duration::minutes(121));
    harness.engine.expire_stale_proposals(None).await.unwrap();

    let err = harness
        .engine
        .respond_to_proposal(&harness.caregiver_auth(), proposal.id, accept(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::Validation(_)));
}

#[tokio::test]
async fn test_supersede_failure_unwinds_the_accept() {
    let harness = Harness::new().await;
    let (shift, winner, loser) = matched_with_two_proposals(&harness).await;

    // Same rows, but a store whose sibling supersede fails
    let failing = Arc::new(FailingStore::new(harness.store.clone()));
    let engine = MatchingEngine::new(
        harness.port.clone(),
        failing.clone(),
        harness.store.clone(),
        RuntimeSettings::default(),
    )
    .with_clock(Arc::new(harness.clock.clone()));

    failing.set_fail_supersede(true);
    let err = engine
        .respond_to_proposal(&harness.caregiver_auth(), winner.id, accept(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::Store(_)));

    // All four writes are one transaction: the proposal is back in its
    // prior state and the visit and shift writes were undone with it
    let restored = harness
        .store
        .get_proposal(winner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.status, ProposalStatus::Sent);
    assert!(restored.accepted_at.is_none());
    assert!(restored.responded_at.is_none());
    assert_eq!(restored.version, winner.version);

    let sibling = harness.store.get_proposal(loser.id).await.unwrap().unwrap();
    assert_eq!(sibling.status, ProposalStatus::Sent);

    let stored_shift = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored_shift.matching_status, MatchingStatus::Proposed);

    let visit = harness
        .port
        .get_visit(shift.visit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visit.assigned_caregiver_id, None);
    assert_eq!(visit.status, VisitStatus::Pending);

    // With the fault cleared the same response goes through
    failing.set_fail_supersede(false);
    let accepted = engine
        .respond_to_proposal(&harness.caregiver_auth(), winner.id, accept(), None)
        .await
        .unwrap();
    assert_eq!(accepted.status, ProposalStatus::Accepted);
    let sibling = harness.store.get_proposal(loser.id).await.unwrap().unwrap();
    assert_eq!(sibling.status, ProposalStatus::Superseded);
}

#[tokio::test]
async fn test_claim_with_expired_deadline_makes_no_writes() {
    let harness = Harness::new().await;
    let strong = harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;

    let err = harness
        .engine
        .claim_shift(
            &harness.caregiver_auth(),
            strong,
            shift.id,
            Some(Deadline(common::start_instant() - Duration::seconds(1))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::DeadlineExceeded));

    assert!(harness
        .store
        .proposals_for_shift(shift.id)
        .await
        .unwrap()
        .is_empty());
    let stored = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored.matching_status, MatchingStatus::New);
}

#[tokio::test]
async fn test_respond_with_expired_deadline_leaves_proposal_open() {
    let harness = Harness::new().await;
    let (shift, winner, _loser) = matched_with_two_proposals(&harness).await;

    let err = harness
        .engine
        .respond_to_proposal(
            &harness.caregiver_auth(),
            winner.id,
            accept(),
            Some(Deadline(common::start_instant() - Duration::seconds(1))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::DeadlineExceeded));

    let stored = harness
        .store
        .get_proposal(winner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ProposalStatus::Sent);
    let stored_shift = harness.store.get_shift(shift.id).await.unwrap().unwrap();
    assert_eq!(stored_shift.matching_status, MatchingStatus::Proposed);
    let visit = harness
        .port
        .get_visit(shift.visit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visit.assigned_caregiver_id, None);
}

#[tokio::test]
async fn test_expiry_sweep_honors_its_deadline() {
    let harness = Harness::new().await;
    harness.caregiver("Casey Morgan", 10.0, 90);
    let shift = harness.open_shift(harness.visit()).await;

    let outcome = harness
        .engine
        .match_shift(
            &harness.auth(),
            MatchShiftRequest {
                open_shift_id: shift.id,
                configuration_id: None,
                max_candidates: None,
                auto_propose: true,
            },
            None,
        )
        .await
        .unwrap();
    let proposal = outcome.created_proposals[0].clone();

    // Past the TTL, but the sweep's deadline already elapsed
    harness.clock.advance(Duration::minutes(121));
    let err = harness
        .engine
        .expire_stale_proposals(Some(Deadline(
            common::start_instant() - Duration::seconds(1),
        )))
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::DeadlineExceeded));

    let stored = harness
        .store
        .get_proposal(proposal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ProposalStatus::Sent);

    // An unconstrained sweep finishes the job
    assert_eq!(harness.engine.expire_stale_proposals(None).await.unwrap(), 1);
}
