//! Candidate loading
//!
//! For one shift, assemble a `CaregiverContext` for every active caregiver
//! in the shift's branch. All fan-out reads are batched, one call per
//! concern, and run concurrently; any failed batch fails the whole
//! attempt so the scorer never sees partial data. Caregivers on the
//! client's block list are dropped before any context is fetched.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::candidate::CaregiverContext;
use crate::caregiver::TimeInterval;
use crate::ids::CaregiverId;
use crate::ports::DataPort;
use crate::shift::OpenShift;

/// Days of rejection history considered by the scorer
const REJECTION_WINDOW_DAYS: i64 = 30;

/// Reliability assumed for caregivers without trailing stats
const DEFAULT_RELIABILITY: u8 = 70;

/// Batched context assembly over the data port
pub struct CandidateLoader {
    data: Arc<dyn DataPort>,
}

impl CandidateLoader {
    /// Loader over a data port
    pub fn new(data: Arc<dyn DataPort>) -> Self {
        Self { data }
    }

    /// The shift's occupancy interval; overnight shifts end on the next day
    pub fn shift_interval(shift: &OpenShift) -> TimeInterval {
        let start = shift.scheduled_date.and_time(shift.start_time).and_utc();
        let mut end = shift.scheduled_date.and_time(shift.end_time).and_utc();
        if end <= start {
            end += Duration::days(1);
        }
        TimeInterval { start, end }
    }

    /// Load the context of a single caregiver against one shift, reusing
    /// the batched reads with a one-element id set
    pub async fn load_one(
        &self,
        shift: &OpenShift,
        caregiver: crate::caregiver::CaregiverRecord,
        now: DateTime<Utc>,
    ) -> crate::error::MatchingResult<CaregiverContext> {
        let ids = [caregiver.id];
        let interval = Self::shift_interval(shift);
        let rejection_window = now - Duration::days(REJECTION_WINDOW_DAYS);

        let (mut week_hours, mut conflicts, mut experience, mut reliability, mut rejections) =
            tokio::try_join!(
                self.data.week_hours_for(&ids, shift.scheduled_date),
                self.data.conflicts_for(&ids, interval),
                self.data.client_experience_for(&ids, shift.client_id),
                self.data.reliability_for(&ids),
                self.data.rejection_counts_for(&ids, rejection_window),
            )?;

        let mut distances = match (shift.latitude, shift.longitude) {
            (Some(lat), Some(lon)) => self.data.distances_to(&ids, lat, lon).await?,
            _ => Default::default(),
        };

        let id = caregiver.id;
        let history = experience.remove(&id).unwrap_or_default();
        Ok(CaregiverContext {
            caregiver,
            current_week_hours: week_hours.remove(&id).unwrap_or(0.0),
            conflicting_visits: conflicts.remove(&id).unwrap_or_default(),
            previous_visits_with_client: history.previous_visits,
            client_rating: history.average_rating,
            reliability_score: reliability.remove(&id).unwrap_or(DEFAULT_RELIABILITY),
            recent_rejection_count: rejections.remove(&id).unwrap_or(0),
            distance_from_shift: distances.remove(&id),
        })
    }

    /// Load contexts for every eligible-to-consider caregiver of the
    /// shift's branch
    pub async fn load(
        &self,
        shift: &OpenShift,
        now: DateTime<Utc>,
    ) -> crate::error::MatchingResult<Vec<CaregiverContext>> {
        let caregivers: Vec<_> = self
            .data
            .active_caregivers_for_branch(shift.branch_id)
            .await?
            .into_iter()
            .filter(|c| !shift.blocked_caregivers.contains(&c.id))
            .collect();

        if caregivers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<CaregiverId> = caregivers.iter().map(|c| c.id).collect();
        let interval = Self::shift_interval(shift);
        let rejection_window = now - Duration::days(REJECTION_WINDOW_DAYS);

        let (mut week_hours, mut conflicts, mut experience, mut reliability, mut rejections) =
            tokio::try_join!(
                self.data.week_hours_for(&ids, shift.scheduled_date),
                self.data.conflicts_for(&ids, interval),
                self.data.client_experience_for(&ids, shift.client_id),
                self.data.reliability_for(&ids),
                self.data.rejection_counts_for(&ids, rejection_window),
            )?;

        let mut distances = match (shift.latitude, shift.longitude) {
            (Some(lat), Some(lon)) => self.data.distances_to(&ids, lat, lon).await?,
            _ => Default::default(),
        };

        tracing::debug!(
            shift_id = %shift.id,
            branch_id = %shift.branch_id,
            caregivers = caregivers.len(),
            "candidate contexts loaded"
        );

        Ok(caregivers
            .into_iter()
            .map(|caregiver| {
                let id = caregiver.id;
                let history = experience.remove(&id).unwrap_or_default();
                CaregiverContext {
                    caregiver,
                    current_week_hours: week_hours.remove(&id).unwrap_or(0.0),
                    conflicting_visits: conflicts.remove(&id).unwrap_or_default(),
                    previous_visits_with_client: history.previous_visits,
                    client_rating: history.average_rating,
                    reliability_score: reliability.remove(&id).unwrap_or(DEFAULT_RELIABILITY),
                    recent_rejection_count: rejections.remove(&id).unwrap_or(0),
                    distance_from_shift: distances.remove(&id),
                }
            })
            .collect())
    }
}
