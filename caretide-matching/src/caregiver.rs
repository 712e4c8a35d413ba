//! Caregiver records as read by the matching core
//!
//! These are the data-port projections of caregiver rows: enough to gate
//! and score a caregiver against one shift, nothing more.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::{BranchId, CaregiverId, OrganizationId};
use crate::shift::Gender;

/// Employment relationship of a caregiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    PerDiem,
    Contractor,
}

/// Lifecycle status of a single credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatus {
    Active,
    Pending,
    Expired,
    Revoked,
}

/// A named certification held by a caregiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Certification name, e.g. "CNA"
    pub name: String,
    /// Current status; only `ACTIVE` satisfies shift requirements
    pub status: CredentialStatus,
    /// Expiry date when known
    pub expires_at: Option<DateTime<Utc>>,
}

/// Aggregate compliance standing of a caregiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    PendingReview,
    NonCompliant,
}

/// Caregiver row projection used for matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverRecord {
    /// Unique caregiver identifier
    pub id: CaregiverId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Primary branch; matching fans out per branch
    pub primary_branch_id: BranchId,
    /// Display name
    pub display_name: String,
    /// Employment relationship
    pub employment_type: EmploymentType,
    /// Whether the caregiver can currently take shifts
    pub is_active: bool,
    /// Skills the caregiver brings
    pub skills: BTreeSet<String>,
    /// Certifications with status
    pub credentials: Vec<Credential>,
    /// Aggregate compliance standing
    pub compliance_status: ComplianceStatus,
    /// Gender, used only when the client states a preference
    pub gender: Option<Gender>,
    /// Languages spoken
    pub languages: BTreeSet<String>,
    /// Weekly hour cap
    pub max_hours_per_week: f64,
    /// Home latitude, when geocoded
    pub latitude: Option<f64>,
    /// Home longitude, when geocoded
    pub longitude: Option<f64>,
}

impl CaregiverRecord {
    /// Whether the caregiver holds the named certification with `ACTIVE` status
    pub fn has_active_credential(&self, name: &str) -> bool {
        self.credentials
            .iter()
            .any(|c| c.name == name && c.status == CredentialStatus::Active)
    }
}

/// A half-open time interval occupied by another visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    /// Interval start
    pub start: DateTime<Utc>,
    /// Interval end
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Whether two intervals overlap
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_credential_lookup() {
        let record = CaregiverRecord {
            id: CaregiverId::new(),
            organization_id: OrganizationId::new(),
            primary_branch_id: BranchId::new(),
            display_name: "Avery Quinn".to_string(),
            employment_type: EmploymentType::FullTime,
            is_active: true,
            skills: BTreeSet::new(),
            credentials: vec![
                Credential {
                    name: "CNA".to_string(),
                    status: CredentialStatus::Active,
                    expires_at: None,
                },
                Credential {
                    name: "CPR".to_string(),
                    status: CredentialStatus::Expired,
                    expires_at: None,
                },
            ],
            compliance_status: ComplianceStatus::Compliant,
            gender: None,
            languages: BTreeSet::new(),
            max_hours_per_week: 40.0,
            latitude: None,
            longitude: None,
        };

        assert!(record.has_active_credential("CNA"));
        assert!(!record.has_active_credential("CPR"));
        assert!(!record.has_active_credential("RN"));
    }

    #[test]
    fn test_interval_overlap() {
        use chrono::TimeZone;
        let t = |h| Utc.with_ymd_and_hms(2025, 6, 3, h, 0, 0).unwrap();
        let a = TimeInterval { start: t(9), end: t(12) };
        let b = TimeInterval { start: t(11), end: t(13) };
        let c = TimeInterval { start: t(12), end: t(14) };

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
