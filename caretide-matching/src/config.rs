//! Matching configurations
//!
//! A configuration is the per-(organization, branch) matching policy:
//! dimension weights, eligibility gates, output shaping, and strategy
//! flags. Branch-level configurations shadow organization-level ones; at
//! most one `(is_default, is_active)` configuration exists per scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::ScoreDimension;
use crate::ids::{BranchId, ConfigurationId, OrganizationId, UserId};

/// What the matcher optimizes proposals for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizeFor {
    /// Highest-scoring caregiver wins
    BestMatch,
    /// Weight availability and proximity so offers land fast
    FastestFill,
    /// Spread hours across the branch
    BalancedWorkload,
    /// Keep the same caregiver with the same client
    ContinuityOfCare,
}

impl Default for OptimizeFor {
    fn default() -> Self {
        OptimizeFor::BestMatch
    }
}

/// Non-negative integer weight per scoring dimension
///
/// The scorer normalizes the weights to sum to 1; an all-zero table falls
/// back to equal weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub skill: u32,
    pub availability: u32,
    pub proximity: u32,
    pub preference: u32,
    pub experience: u32,
    pub reliability: u32,
    pub compliance: u32,
    pub capacity: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::preset(OptimizeFor::BestMatch)
    }
}

impl ScoreWeights {
    /// Weight profile for an optimization strategy
    pub fn preset(optimize_for: OptimizeFor) -> Self {
        match optimize_for {
            OptimizeFor::BestMatch => Self {
                skill: 20,
                availability: 20,
                proximity: 15,
                preference: 10,
                experience: 10,
                reliability: 10,
                compliance: 10,
                capacity: 5,
            },
            OptimizeFor::FastestFill => Self {
                skill: 15,
                availability: 30,
                proximity: 25,
                preference: 5,
                experience: 5,
                reliability: 5,
                compliance: 10,
                capacity: 5,
            },
            OptimizeFor::BalancedWorkload => Self {
                skill: 15,
                availability: 15,
                proximity: 10,
                preference: 5,
                experience: 10,
                reliability: 10,
                compliance: 10,
                capacity: 25,
            },
            OptimizeFor::ContinuityOfCare => Self {
                skill: 15,
                availability: 15,
                proximity: 10,
                preference: 20,
                experience: 25,
                reliability: 5,
                compliance: 5,
                capacity: 5,
            },
        }
    }

    /// Weight for one dimension
    pub fn get(&self, dimension: ScoreDimension) -> u32 {
        match dimension {
            ScoreDimension::Skill => self.skill,
            ScoreDimension::Availability => self.availability,
            ScoreDimension::Proximity => self.proximity,
            ScoreDimension::Preference => self.preference,
            ScoreDimension::Experience => self.experience,
            ScoreDimension::Reliability => self.reliability,
            ScoreDimension::Compliance => self.compliance,
            ScoreDimension::Capacity => self.capacity,
        }
    }

    /// Sum of all weights
    pub fn total(&self) -> u64 {
        ScoreDimension::ALL
            .into_iter()
            .map(|d| u64::from(self.get(d)))
            .sum()
    }
}

/// Per-(organization, branch) matching policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfiguration {
    /// Unique configuration identifier
    pub id: ConfigurationId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Owning branch; `None` for an organization-wide configuration
    pub branch_id: Option<BranchId>,
    /// Display name
    pub name: String,

    /// Dimension weights
    pub weights: ScoreWeights,

    /// Missing required skills block instead of warning
    pub require_exact_skill_match: bool,
    /// Required certifications must be held with `ACTIVE` status
    pub require_active_certifications: bool,
    /// Score gender preference mismatches
    pub respect_gender_preference: bool,
    /// Score language preference mismatches
    pub respect_language_preference: bool,
    /// Hard cap on straight-line miles, when set
    pub max_travel_distance: Option<f64>,
    /// Hard cap on estimated travel minutes, when set
    pub max_travel_time_minutes: Option<u32>,

    /// Minimum overall score for proposal emission
    pub min_score_for_proposal: u8,
    /// Self-select claims at or above this score auto-accept
    pub auto_assign_threshold: Option<u8>,
    /// Proposal fan-out cap per match attempt
    pub max_proposals_per_shift: usize,
    /// Proposal TTL in minutes
    pub proposal_expiration_minutes: i64,

    /// Optimization strategy
    pub optimize_for: OptimizeFor,
    /// Double the experience weight during normalization
    pub prioritize_continuity_of_care: bool,
    /// Prefer the prior caregiver on recurring visits
    pub prefer_same_caregiver_for_recurring: bool,
    /// Subtract 5 reliability points per recent rejection
    pub penalize_frequent_rejections: bool,
    /// Add 5 reliability points at 90+ reliability
    pub boost_reliable_performers: bool,

    /// ML blend weight `w` in `(1 − w)·rule + w·ml`; 0 disables the blend
    pub ml_blend_weight: f64,
    /// Score manual proposals instead of recording a flat 100
    pub score_manual_proposals: bool,

    /// Default configuration for its scope
    pub is_default: bool,
    /// Inactive configurations are never resolved
    pub is_active: bool,

    /// Creation stamp
    pub created_at: DateTime<Utc>,
    /// Creating user
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

impl MatchingConfiguration {
    /// A default-active configuration for an organization scope
    pub fn new_default(
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConfigurationId::new(),
            organization_id,
            branch_id,
            name: "Default matching policy".to_string(),
            weights: ScoreWeights::default(),
            require_exact_skill_match: true,
            require_active_certifications: true,
            respect_gender_preference: false,
            respect_language_preference: false,
            max_travel_distance: None,
            max_travel_time_minutes: None,
            min_score_for_proposal: 50,
            auto_assign_threshold: None,
            max_proposals_per_shift: 5,
            proposal_expiration_minutes: 120,
            optimize_for: OptimizeFor::BestMatch,
            prioritize_continuity_of_care: false,
            prefer_same_caregiver_for_recurring: false,
            penalize_frequent_rejections: true,
            boost_reliable_performers: true,
            ml_blend_weight: 0.0,
            score_manual_proposals: false,
            is_default: true,
            is_active: true,
            created_at: now,
            created_by: None,
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
            version: 1,
        }
    }

    /// A default configuration seeded from runtime settings
    pub fn from_settings(
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
        settings: &caretide_config::RuntimeSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let mut config = Self::new_default(organization_id, branch_id, now);
        config.min_score_for_proposal = settings.match_default_min_score;
        config.max_proposals_per_shift = settings.match_default_max_proposals;
        config.proposal_expiration_minutes = settings.proposal_default_ttl_minutes;
        config
    }

    /// Whether the row is visible to queries
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Weights with strategy adjustments applied
    pub fn effective_weights(&self) -> ScoreWeights {
        let mut weights = self.weights;
        if self.prioritize_continuity_of_care {
            weights.experience = weights.experience.saturating_mul(2);
        }
        weights
    }

    /// Straight-line mileage cap used by the proximity decay, defaulting
    /// to 50 miles when unset
    pub fn proximity_decay_miles(&self) -> f64 {
        self.max_travel_distance.unwrap_or(50.0)
    }
}
