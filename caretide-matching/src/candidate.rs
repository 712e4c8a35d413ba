//! Scorer input and output model
//!
//! `CaregiverContext` is the fully materialized per-(caregiver, shift)
//! evaluation input assembled by the candidate loader; `MatchCandidate` is
//! the scorer's verdict on one caregiver for one shift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::caregiver::{CaregiverRecord, TimeInterval};
use crate::ids::{CaregiverId, OpenShiftId};

/// Scoring dimensions of the matching rubric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDimension {
    Skill,
    Availability,
    Proximity,
    Preference,
    Experience,
    Reliability,
    Compliance,
    Capacity,
}

impl ScoreDimension {
    /// All dimensions in rubric order
    pub const ALL: [ScoreDimension; 8] = [
        ScoreDimension::Skill,
        ScoreDimension::Availability,
        ScoreDimension::Proximity,
        ScoreDimension::Preference,
        ScoreDimension::Experience,
        ScoreDimension::Reliability,
        ScoreDimension::Compliance,
        ScoreDimension::Capacity,
    ];

    /// Label used in reasons and weight maps
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreDimension::Skill => "skill",
            ScoreDimension::Availability => "availability",
            ScoreDimension::Proximity => "proximity",
            ScoreDimension::Preference => "preference",
            ScoreDimension::Experience => "experience",
            ScoreDimension::Reliability => "reliability",
            ScoreDimension::Compliance => "compliance",
            ScoreDimension::Capacity => "capacity",
        }
    }
}

/// Per-dimension scores, each in `[0, 100]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub skill: u8,
    pub availability: u8,
    pub proximity: u8,
    pub preference: u8,
    pub experience: u8,
    pub reliability: u8,
    pub compliance: u8,
    pub capacity: u8,
}

impl DimensionScores {
    /// Score for one dimension
    pub fn get(&self, dimension: ScoreDimension) -> u8 {
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

    /// Iterate dimensions with their scores in rubric order
    pub fn iter(&self) -> impl Iterator<Item = (ScoreDimension, u8)> + '_ {
        ScoreDimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }
}

/// Discretization of the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl MatchQuality {
    /// Band an overall score: `EXCELLENT ≥ 85`, `GOOD ≥ 70`, `FAIR ≥ 55`
    pub fn from_score(overall_score: u8) -> Self {
        match overall_score {
            85..=u8::MAX => MatchQuality::Excellent,
            70..=84 => MatchQuality::Good,
            55..=69 => MatchQuality::Fair,
            _ => MatchQuality::Poor,
        }
    }
}

/// Severity of an eligibility finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    /// Makes the candidate ineligible regardless of score
    Blocking,
    /// Recorded and scored, but does not gate
    Warning,
}

/// Category of an eligibility finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    BlockedByClient,
    MissingCertification,
    MissingSkill,
    TimeConflict,
    OverCapacity,
    NonCompliant,
    GenderMismatch,
    LanguageMismatch,
    TooFar,
    DistanceUnknown,
}

/// One eligibility finding on a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityIssue {
    /// What was found
    pub kind: IssueKind,
    /// Whether it gates the candidate
    pub severity: IssueSeverity,
    /// Human-readable detail
    pub message: String,
}

impl EligibilityIssue {
    pub fn blocking(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: IssueSeverity::Blocking,
            message: message.into(),
        }
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

/// Direction of a match reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonImpact {
    Positive,
    Negative,
    Neutral,
}

/// One explanation attached to a candidate or frozen into a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReason {
    /// Dimension label, or a synthetic category like `SYSTEM_OPTIMIZED`
    pub category: String,
    /// Human-readable explanation
    pub description: String,
    /// Whether the reason helped or hurt
    pub impact: ReasonImpact,
    /// Normalized weight of the dimension behind the reason
    pub weight: f64,
}

/// Fully materialized evaluation input for one (caregiver, shift) pair
///
/// Assembled by the candidate loader from batched reads; the scorer never
/// touches the data port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverContext {
    /// Caregiver row projection
    pub caregiver: CaregiverRecord,
    /// Hours already scheduled in the shift's week
    pub current_week_hours: f64,
    /// Visits overlapping the shift interval on the shift's day
    pub conflicting_visits: Vec<TimeInterval>,
    /// Completed visits with this client
    pub previous_visits_with_client: u32,
    /// Average rating this client has given the caregiver, 1.0..=5.0
    pub client_rating: Option<f64>,
    /// Trailing-90-day reliability score, 0..=100
    pub reliability_score: u8,
    /// Proposals rejected in the trailing 30 days
    pub recent_rejection_count: u32,
    /// Straight-line miles to the shift; `None` when either side lacks
    /// coordinates
    pub distance_from_shift: Option<f64>,
}

impl CaregiverContext {
    /// Hours the caregiver can still take this week
    pub fn available_hours(&self) -> f64 {
        (self.caregiver.max_hours_per_week - self.current_week_hours).max(0.0)
    }
}

/// The scorer's verdict on one caregiver for one shift
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Scored caregiver
    pub caregiver_id: CaregiverId,
    /// Shift scored against
    pub open_shift_id: OpenShiftId,
    /// Denormalized caregiver display name
    pub caregiver_name: String,
    /// Per-dimension scores
    pub scores: DimensionScores,
    /// Weighted, rounded aggregate in `[0, 100]`
    pub overall_score: u8,
    /// Banded aggregate
    pub match_quality: MatchQuality,
    /// False when any blocking issue is present
    pub is_eligible: bool,
    /// All findings, blocking and warning
    pub eligibility_issues: Vec<EligibilityIssue>,
    /// Warning messages duplicated for display surfaces
    pub warnings: Vec<String>,
    /// Straight-line miles to the shift
    pub distance_from_shift: Option<f64>,
    /// Estimated drive minutes, derived from distance
    pub estimated_travel_time_minutes: Option<u32>,
    /// Whether any same-day visit overlaps the shift
    pub has_conflict: bool,
    /// Hours the caregiver can still take this week
    pub available_hours: f64,
    /// Deterministic explanations for ranking surfaces
    pub match_reasons: Vec<MatchReason>,
    /// When the candidate was computed, for staleness audit
    pub computed_at: DateTime<Utc>,
}

impl MatchCandidate {
    /// Whether the candidate clears a proposal threshold
    pub fn clears(&self, min_score: u8) -> bool {
        self.is_eligible && self.overall_score >= min_score
    }
}
