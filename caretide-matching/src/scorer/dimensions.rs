//! Dimension score formulas
//!
//! Each formula maps one rubric dimension into `[0, 100]` from the shift,
//! the caregiver context, and the configuration. All arithmetic is
//! saturating; no formula can leave the band.

use crate::candidate::{CaregiverContext, DimensionScores};
use crate::caregiver::ComplianceStatus;
use crate::config::MatchingConfiguration;
use crate::shift::OpenShift;

/// Compute all eight dimension scores
pub(crate) fn compute(
    shift: &OpenShift,
    ctx: &CaregiverContext,
    config: &MatchingConfiguration,
) -> DimensionScores {
    DimensionScores {
        skill: skill(shift, ctx),
        availability: availability(shift, ctx),
        proximity: proximity(ctx, config),
        preference: preference(shift, ctx, config),
        experience: experience(ctx),
        reliability: reliability(ctx, config),
        compliance: compliance(ctx),
        capacity: capacity(shift, ctx),
    }
}

fn clamp(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Matched required skills over total required; 100 when none required
fn skill(shift: &OpenShift, ctx: &CaregiverContext) -> u8 {
    let required = shift.required_skills.len();
    if required == 0 {
        return 100;
    }
    let matched = shift
        .required_skills
        .intersection(&ctx.caregiver.skills)
        .count();
    clamp(matched as f64 / required as f64 * 100.0)
}

/// 100 when conflict-free with room for the whole shift; scaled down when
/// the remaining hours fall short; 0 on any conflict
fn availability(shift: &OpenShift, ctx: &CaregiverContext) -> u8 {
    if !ctx.conflicting_visits.is_empty() {
        return 0;
    }
    let needed = shift.duration_hours();
    if needed <= 0.0 {
        return 100;
    }
    let available = ctx.available_hours();
    if available >= needed {
        100
    } else {
        clamp(available / needed * 100.0)
    }
}

/// Linear decay from 100 at zero miles to 0 at the travel cap; a missing
/// distance scores a neutral 60
fn proximity(ctx: &CaregiverContext, config: &MatchingConfiguration) -> u8 {
    match ctx.distance_from_shift {
        None => 60,
        Some(distance) => {
            let decay_at = config.proximity_decay_miles();
            if decay_at <= 0.0 || distance >= decay_at {
                0
            } else {
                clamp((1.0 - distance / decay_at) * 100.0)
            }
        }
    }
}

/// 100 for preferred caregivers, neutral 50 otherwise; gender/language
/// adjustments apply only when the respective gate is enabled
fn preference(shift: &OpenShift, ctx: &CaregiverContext, config: &MatchingConfiguration) -> u8 {
    let mut score: f64 = if shift.preferred_caregivers.contains(&ctx.caregiver.id) {
        100.0
    } else {
        50.0
    };

    if config.respect_gender_preference {
        if let Some(wanted) = shift.gender_preference {
            if ctx.caregiver.gender == Some(wanted) {
                score += 20.0;
            } else {
                score -= 30.0;
            }
        }
    }
    if config.respect_language_preference {
        if let Some(language) = &shift.language_preference {
            if ctx.caregiver.languages.contains(language) {
                score += 20.0;
            } else {
                score -= 30.0;
            }
        }
    }

    clamp(score)
}

/// 50 base, +5 per prior visit with this client up to 10 visits, plus a
/// client-rating adjustment of (rating − 3) × 10 when a rating exists
fn experience(ctx: &CaregiverContext) -> u8 {
    let visits = ctx.previous_visits_with_client.min(10) as f64;
    let mut score = 50.0 + visits * 5.0;
    if let Some(rating) = ctx.client_rating {
        score += (rating - 3.0) * 10.0;
    }
    clamp(score)
}

/// Reliability score as reported, with the configured rejection penalty
/// and reliable-performer boost
fn reliability(ctx: &CaregiverContext, config: &MatchingConfiguration) -> u8 {
    let mut score = f64::from(ctx.reliability_score);
    if config.penalize_frequent_rejections {
        score -= 5.0 * f64::from(ctx.recent_rejection_count);
    }
    if config.boost_reliable_performers && ctx.reliability_score >= 90 {
        score += 5.0;
    }
    clamp(score)
}

/// 100 when fully compliant, else 0 (also a blocking gate)
fn compliance(ctx: &CaregiverContext) -> u8 {
    if ctx.caregiver.compliance_status == ComplianceStatus::Compliant {
        100
    } else {
        0
    }
}

/// Remaining weekly headroom after this shift, as a share of the cap
fn capacity(shift: &OpenShift, ctx: &CaregiverContext) -> u8 {
    let cap = ctx.caregiver.max_hours_per_week;
    if cap <= 0.0 {
        return 0;
    }
    let remaining = cap - ctx.current_week_hours - shift.duration_hours();
    clamp(remaining / cap * 100.0)
}
