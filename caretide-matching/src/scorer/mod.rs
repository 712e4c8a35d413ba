//! Caregiver scoring
//!
//! `score_candidate` is a pure function from `(shift, context,
//! configuration)` to a fully populated `MatchCandidate`: ordered
//! eligibility gates, eight dimension scores, a weight-normalized
//! aggregate, quality banding, and deterministic match reasons. The
//! engine layers ranking and the optional ML blend on top.

mod dimensions;
mod gates;
mod hybrid;

pub use hybrid::{MlScorer, Scorer};

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::candidate::{
    CaregiverContext, DimensionScores, IssueSeverity, MatchCandidate, MatchQuality, MatchReason,
    ReasonImpact, ScoreDimension,
};
use crate::config::{MatchingConfiguration, ScoreWeights};
use crate::shift::OpenShift;

/// Average assumed driving speed of 30 mph, expressed as minutes per mile
const TRAVEL_MINUTES_PER_MILE: f64 = 2.0;

/// Estimated drive minutes for a straight-line distance
pub(crate) fn travel_minutes(distance_miles: f64) -> u32 {
    (distance_miles * TRAVEL_MINUTES_PER_MILE).round() as u32
}

/// Score one caregiver against one shift under a configuration
///
/// Always returns a populated candidate; a blocking gate finding sets
/// `is_eligible = false` without suppressing dimension scores or reasons.
pub fn score_candidate(
    shift: &OpenShift,
    ctx: &CaregiverContext,
    config: &MatchingConfiguration,
    now: DateTime<Utc>,
) -> MatchCandidate {
    let issues = gates::evaluate(shift, ctx, config);
    let is_eligible = !issues
        .iter()
        .any(|i| i.severity == IssueSeverity::Blocking);

    let scores = dimensions::compute(shift, ctx, config);
    let weights = normalize_weights(&config.effective_weights());
    let overall_score = aggregate(&scores, &weights);

    let warnings = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Warning)
        .map(|i| i.message.clone())
        .collect();

    MatchCandidate {
        caregiver_id: ctx.caregiver.id,
        open_shift_id: shift.id,
        caregiver_name: ctx.caregiver.display_name.clone(),
        scores,
        overall_score,
        match_quality: MatchQuality::from_score(overall_score),
        is_eligible,
        eligibility_issues: issues,
        warnings,
        distance_from_shift: ctx.distance_from_shift,
        estimated_travel_time_minutes: ctx.distance_from_shift.map(travel_minutes),
        has_conflict: !ctx.conflicting_visits.is_empty(),
        available_hours: ctx.available_hours(),
        match_reasons: derive_reasons(&scores, &weights),
        computed_at: now,
    }
}

/// Normalize a weight table to sum to 1; an all-zero table falls back to
/// equal weights
pub(crate) fn normalize_weights(weights: &ScoreWeights) -> [(ScoreDimension, f64); 8] {
    let total = weights.total();
    let mut normalized = [(ScoreDimension::Skill, 0.0); 8];
    for (slot, dimension) in normalized.iter_mut().zip(ScoreDimension::ALL) {
        let share = if total == 0 {
            1.0 / ScoreDimension::ALL.len() as f64
        } else {
            f64::from(weights.get(dimension)) / total as f64
        };
        *slot = (dimension, share);
    }
    normalized
}

/// Weighted average of the dimension scores, rounded into `[0, 100]`
pub(crate) fn aggregate(scores: &DimensionScores, weights: &[(ScoreDimension, f64); 8]) -> u8 {
    let sum: f64 = weights
        .iter()
        .map(|(dimension, weight)| weight * f64::from(scores.get(*dimension)))
        .sum();
    sum.round().clamp(0.0, 100.0) as u8
}

/// Deterministic reasons: the three strongest dimensions read as positive
/// (when they clear 50), every dimension under 50 reads as negative
fn derive_reasons(
    scores: &DimensionScores,
    weights: &[(ScoreDimension, f64); 8],
) -> Vec<MatchReason> {
    let weight_of = |dimension: ScoreDimension| {
        weights
            .iter()
            .find(|(d, _)| *d == dimension)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    };

    let mut by_score: Vec<(ScoreDimension, u8)> = scores.iter().collect();
    // Stable sort keeps rubric order among equal scores
    by_score.sort_by(|a, b| b.1.cmp(&a.1));

    let top: Vec<ScoreDimension> = by_score.iter().take(3).map(|(d, _)| *d).collect();

    let mut reasons = Vec::new();
    for dimension in &top {
        let score = scores.get(*dimension);
        if score >= 50 {
            reasons.push(MatchReason {
                category: dimension.as_str().to_string(),
                description: format!("Strong {} score ({})", dimension.as_str(), score),
                impact: ReasonImpact::Positive,
                weight: weight_of(*dimension),
            });
        }
    }
    for (dimension, score) in scores.iter() {
        if score < 50 {
            reasons.push(MatchReason {
                category: dimension.as_str().to_string(),
                description: format!("Low {} score ({})", dimension.as_str(), score),
                impact: ReasonImpact::Negative,
                weight: weight_of(dimension),
            });
        }
    }
    reasons
}

/// Total order for ranking: overall score, then reliability, then
/// distance (unknown last), then caregiver id for stability
pub fn compare_candidates(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.overall_score
        .cmp(&a.overall_score)
        .then_with(|| b.scores.reliability.cmp(&a.scores.reliability))
        .then_with(|| match (a.distance_from_shift, b.distance_from_shift) {
            (Some(da), Some(db)) => da.partial_cmp(&db).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.caregiver_id.cmp(&b.caregiver_id))
}

/// Rank candidates best-first under the tie-break order
pub fn rank(candidates: &mut [MatchCandidate]) {
    candidates.sort_by(compare_candidates);
}
