//! Caregiver preference profiles
//!
//! One profile per caregiver: working-time preferences, willingness flags,
//! and notification settings. The self-select path reads
//! `accept_auto_assignment` when deciding whether to drive a claim straight
//! through acceptance.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::ids::CaregiverId;
use crate::proposal::NotificationMethod;

/// A preferred working window within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Window start
    pub start: NaiveTime,
    /// Window end
    pub end: NaiveTime,
}

/// Do-not-disturb window for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    /// Quiet window start
    pub start: NaiveTime,
    /// Quiet window end
    pub end: NaiveTime,
}

/// Per-caregiver matching and notification preferences; unique by caregiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverPreferenceProfile {
    /// Owning caregiver; one profile each
    pub caregiver_id: CaregiverId,
    /// Days the caregiver prefers to work
    pub preferred_days: Vec<Weekday>,
    /// Working windows the caregiver prefers
    pub preferred_time_ranges: Vec<TimeRange>,
    /// Self-imposed weekly hour cap, below the employment cap
    pub max_hours_per_week: Option<f64>,
    /// Willing to take weekend shifts
    pub willing_weekends: bool,
    /// Willing to take holiday shifts
    pub willing_holidays: bool,
    /// Willing to take urgent shifts
    pub willing_urgent: bool,
    /// High-scoring self-select claims may be accepted automatically
    pub accept_auto_assignment: bool,
    /// Channels the caregiver wants offers through
    pub notification_methods: Vec<NotificationMethod>,
    /// Do-not-disturb window
    pub quiet_hours: Option<QuietHours>,
    /// Creation stamp
    pub created_at: DateTime<Utc>,
    /// Last update stamp
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl CaregiverPreferenceProfile {
    /// Conservative default profile for a caregiver
    pub fn new(caregiver_id: CaregiverId, now: DateTime<Utc>) -> Self {
        Self {
            caregiver_id,
            preferred_days: Vec::new(),
            preferred_time_ranges: Vec::new(),
            max_hours_per_week: None,
            willing_weekends: false,
            willing_holidays: false,
            willing_urgent: true,
            accept_auto_assignment: false,
            notification_methods: vec![NotificationMethod::Push],
            quiet_hours: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}
