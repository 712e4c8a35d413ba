//! Hybrid rule/ML scoring
//!
//! The rule-based scorer is always authoritative for eligibility. When a
//! configuration sets a non-zero `ml_blend_weight` and an ML scorer is
//! wired in, the aggregate becomes `(1 − w)·rule + w·ml`. Feature
//! extraction, model storage, and training live outside the core.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::candidate::{CaregiverContext, MatchCandidate, MatchQuality};
use crate::config::MatchingConfiguration;
use crate::shift::OpenShift;

use super::score_candidate;

/// Pluggable model-backed scorer
///
/// Returns a predicted overall score in `[0, 100]`, or `None` when the
/// model cannot score the pair (missing features, cold start); the blend
/// falls back to the rule score in that case.
pub trait MlScorer: Send + Sync {
    /// Predict an overall score for one (shift, caregiver) pair
    fn predict(&self, shift: &OpenShift, ctx: &CaregiverContext) -> Option<f64>;
}

/// Scorer facade the engine calls: rule-based with an optional ML blend
#[derive(Clone, Default)]
pub struct Scorer {
    ml: Option<Arc<dyn MlScorer>>,
}

impl Scorer {
    /// Rule-only scorer
    pub fn rule_based() -> Self {
        Self { ml: None }
    }

    /// Scorer with an ML hook for configurations that blend
    pub fn with_ml(ml: Arc<dyn MlScorer>) -> Self {
        Self { ml: Some(ml) }
    }

    /// Score one pair, blending when configured
    pub fn score(
        &self,
        shift: &OpenShift,
        ctx: &CaregiverContext,
        config: &MatchingConfiguration,
        now: DateTime<Utc>,
    ) -> MatchCandidate {
        let mut candidate = score_candidate(shift, ctx, config, now);

        let w = config.ml_blend_weight.clamp(0.0, 1.0);
        if w > 0.0 {
            if let Some(ml) = &self.ml {
                if let Some(predicted) = ml.predict(shift, ctx) {
                    let predicted = predicted.clamp(0.0, 100.0);
                    let blended =
                        (1.0 - w) * f64::from(candidate.overall_score) + w * predicted;
                    candidate.overall_score = blended.round().clamp(0.0, 100.0) as u8;
                    candidate.match_quality = MatchQuality::from_score(candidate.overall_score);
                }
            }
        }

        candidate
    }
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field("ml", &self.ml.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OrganizationId;
    use crate::scorer::test_fixtures::{context, shift_fixture};

    struct FixedModel(Option<f64>);

    impl MlScorer for FixedModel {
        fn predict(&self, _shift: &OpenShift, _ctx: &CaregiverContext) -> Option<f64> {
            self.0
        }
    }

    fn config() -> MatchingConfiguration {
        MatchingConfiguration::new_default(OrganizationId::new(), None, Utc::now())
    }

    #[test]
    fn test_zero_weight_ignores_model() {
        let shift = shift_fixture();
        let ctx = context(&shift);
        let cfg = config();

        let rule_only = Scorer::rule_based().score(&shift, &ctx, &cfg, Utc::now());
        let with_model =
            Scorer::with_ml(Arc::new(FixedModel(Some(0.0)))).score(&shift, &ctx, &cfg, Utc::now());
        assert_eq!(rule_only.overall_score, with_model.overall_score);
    }

    #[test]
    fn test_blend_moves_toward_model() {
        let shift = shift_fixture();
        let ctx = context(&shift);
        let mut cfg = config();
        cfg.ml_blend_weight = 0.5;

        let rule = Scorer::rule_based().score(&shift, &ctx, &cfg, Utc::now());
        let blended =
            Scorer::with_ml(Arc::new(FixedModel(Some(100.0)))).score(&shift, &ctx, &cfg, Utc::now());

        let expected = (0.5 * f64::from(rule.overall_score) + 0.5 * 100.0).round() as u8;
        assert_eq!(blended.overall_score, expected);
        assert!(blended.overall_score >= rule.overall_score);
    }

    #[test]
    fn test_model_abstention_falls_back_to_rule() {
        let shift = shift_fixture();
        let ctx = context(&shift);
        let mut cfg = config();
        cfg.ml_blend_weight = 0.9;

        let rule = Scorer::rule_based().score(&shift, &ctx, &cfg, Utc::now());
        let abstained =
            Scorer::with_ml(Arc::new(FixedModel(None))).score(&shift, &ctx, &cfg, Utc::now());
        assert_eq!(rule.overall_score, abstained.overall_score);
    }

    #[test]
    fn test_blend_never_flips_eligibility() {
        let mut shift = shift_fixture();
        let ctx = context(&shift);
        shift.blocked_caregivers.insert(ctx.caregiver.id);
        let mut cfg = config();
        cfg.ml_blend_weight = 1.0;

        let candidate =
            Scorer::with_ml(Arc::new(FixedModel(Some(100.0)))).score(&shift, &ctx, &cfg, Utc::now());
        assert!(!candidate.is_eligible);
        assert_eq!(candidate.overall_score, 100);
    }
}
