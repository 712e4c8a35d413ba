//! Proposal expiry
//!
//! A periodic sweep over open proposals: anything unanswered past its
//! scope's TTL transitions to `EXPIRED` with an audit row. The store
//! transition is conditional on the row still being open, so sweeps are
//! idempotent and safe beside live matcher activity.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::MatchingResult;
use crate::history::{MatchHistory, MatchOutcome as HistoryOutcome};
use crate::ids::{BranchId, OrganizationId};

use super::{Deadline, MatchingEngine};

impl MatchingEngine {
    /// Expire every open proposal past its TTL; returns how many rows
    /// transitioned
    ///
    /// The deadline is checked between rows: each expiry is a complete,
    /// idempotent transition, so a cancelled sweep leaves already-expired
    /// rows standing and the next sweep picks up the rest.
    pub async fn expire_stale_proposals(
        &self,
        deadline: Option<Deadline>,
    ) -> MatchingResult<usize> {
        let now = self.now();
        let open = self.store().list_open_proposals().await?;

        // TTL per (organization, branch) scope, resolved once per sweep
        let mut ttl_cache: HashMap<(OrganizationId, BranchId), i64> = HashMap::new();
        let mut expired = 0usize;

        for proposal in open {
            self.check_deadline(deadline)?;

            let scope = (proposal.organization_id, proposal.branch_id);
            let ttl_minutes = match ttl_cache.get(&scope) {
                Some(ttl) => *ttl,
                None => {
                    let ttl = self
                        .config_store()
                        .resolve_default(proposal.organization_id, Some(proposal.branch_id))
                        .await?
                        .map(|c| c.proposal_expiration_minutes)
                        .unwrap_or(self.settings().proposal_default_ttl_minutes);
                    ttl_cache.insert(scope, ttl);
                    ttl
                }
            };

            let offered_at = proposal.sent_at.unwrap_or(proposal.proposed_at);
            if offered_at + Duration::minutes(ttl_minutes) >= now {
                continue;
            }

            // Conditional: a response or sibling accept that lands first wins
            let Some(expired_row) = self.store().expire_proposal(proposal.id, now).await? else {
                continue;
            };
            expired += 1;

            let attempts = self.shift_attempts(expired_row.open_shift_id).await;
            let mut row = MatchHistory::for_attempt(
                expired_row.open_shift_id,
                expired_row.visit_id,
                expired_row.organization_id,
                HistoryOutcome::Expired,
                attempts,
                now,
            )
            .with_proposal(
                expired_row.id,
                expired_row.caregiver_id,
                expired_row.match_score,
                expired_row.match_quality,
            );
            row.note = Some(format!("expired after {} minutes", ttl_minutes));
            self.record_history(row).await;
        }

        if expired > 0 {
            tracing::info!(expired, "stale proposals expired");
        }
        Ok(expired)
    }
}

/// Periodic expiry task over a shared engine
pub struct Expirer {
    engine: Arc<MatchingEngine>,
}

impl Expirer {
    /// Expirer over an engine
    pub fn new(engine: Arc<MatchingEngine>) -> Self {
        Self { engine }
    }

    /// Spawn the sweep loop on the configured interval; flip the returned
    /// sender to `true` to stop it
    pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval_seconds = self.engine.settings().expirer_interval_seconds;

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.engine.expire_stale_proposals(None).await {
                            tracing::warn!(error = %err, "expiry sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("expirer shutting down");
                            break;
                        }
                    }
                }
            }
        });

        (handle, shutdown_tx)
    }
}
