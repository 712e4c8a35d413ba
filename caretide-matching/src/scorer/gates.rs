//! Eligibility gates
//!
//! Gates run in a fixed order and accumulate every finding; a blocking
//! finding makes the candidate ineligible but never short-circuits the
//! rest of the evaluation, so the returned candidate always carries the
//! full issue list.

use crate::candidate::{CaregiverContext, EligibilityIssue, IssueKind};
use crate::config::MatchingConfiguration;
use crate::shift::OpenShift;

use super::travel_minutes;

/// Evaluate every gate for one (shift, caregiver) pair
pub(crate) fn evaluate(
    shift: &OpenShift,
    ctx: &CaregiverContext,
    config: &MatchingConfiguration,
) -> Vec<EligibilityIssue> {
    let mut issues = Vec::new();
    let caregiver = &ctx.caregiver;

    // 1. Client block list
    if shift.blocked_caregivers.contains(&caregiver.id) {
        issues.push(EligibilityIssue::blocking(
            IssueKind::BlockedByClient,
            format!("Caregiver {} is blocked by the client", caregiver.id),
        ));
    }

    // 2. Active certifications
    if config.require_active_certifications {
        for cert in &shift.required_certifications {
            if !caregiver.has_active_credential(cert) {
                issues.push(EligibilityIssue::blocking(
                    IssueKind::MissingCertification,
                    format!("Missing active certification: {}", cert),
                ));
            }
        }
    }

    // 3. Skills: blocking under exact match, warning otherwise
    for skill in shift.required_skills.difference(&caregiver.skills) {
        if config.require_exact_skill_match {
            issues.push(EligibilityIssue::blocking(
                IssueKind::MissingSkill,
                format!("Missing required skill: {}", skill),
            ));
        } else {
            issues.push(EligibilityIssue::warning(
                IssueKind::MissingSkill,
                format!("Missing skill: {}", skill),
            ));
        }
    }

    // 4. Scheduling conflicts
    if !ctx.conflicting_visits.is_empty() {
        issues.push(EligibilityIssue::blocking(
            IssueKind::TimeConflict,
            format!(
                "{} conflicting visit(s) on the shift day",
                ctx.conflicting_visits.len()
            ),
        ));
    }

    // 5. Weekly capacity
    let projected = ctx.current_week_hours + shift.duration_hours();
    if projected > caregiver.max_hours_per_week {
        issues.push(EligibilityIssue::blocking(
            IssueKind::OverCapacity,
            format!(
                "Would reach {:.1}h of a {:.1}h weekly cap",
                projected, caregiver.max_hours_per_week
            ),
        ));
    }

    // 6. Compliance standing
    if caregiver.compliance_status != crate::caregiver::ComplianceStatus::Compliant {
        issues.push(EligibilityIssue::blocking(
            IssueKind::NonCompliant,
            format!("Compliance status is {:?}", caregiver.compliance_status),
        ));
    }

    // 7. Gender / language preferences: warnings only
    if config.respect_gender_preference {
        if let Some(wanted) = shift.gender_preference {
            if caregiver.gender != Some(wanted) {
                issues.push(EligibilityIssue::warning(
                    IssueKind::GenderMismatch,
                    "Client gender preference not met".to_string(),
                ));
            }
        }
    }
    if config.respect_language_preference {
        if let Some(language) = &shift.language_preference {
            if !caregiver.languages.contains(language) {
                issues.push(EligibilityIssue::warning(
                    IssueKind::LanguageMismatch,
                    format!("Client language preference not met: {}", language),
                ));
            }
        }
    }

    // 8. Travel limits
    match ctx.distance_from_shift {
        Some(distance) => {
            if let Some(max_distance) = config.max_travel_distance {
                if distance > max_distance {
                    issues.push(EligibilityIssue::blocking(
                        IssueKind::TooFar,
                        format!("{:.1} miles exceeds the {:.1} mile cap", distance, max_distance),
                    ));
                }
            }
            if let Some(max_minutes) = config.max_travel_time_minutes {
                if travel_minutes(distance) > max_minutes {
                    issues.push(EligibilityIssue::blocking(
                        IssueKind::TooFar,
                        format!(
                            "Estimated {} min of travel exceeds the {} min cap",
                            travel_minutes(distance),
                            max_minutes
                        ),
                    ));
                }
            }
        }
        None => {
            issues.push(EligibilityIssue::warning(
                IssueKind::DistanceUnknown,
                "Distance to shift is unknown".to_string(),
            ));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::IssueSeverity;
    use crate::scorer::test_fixtures::{context, shift_fixture};
    use crate::shift::Gender;

    fn config() -> MatchingConfiguration {
        MatchingConfiguration::new_default(
            crate::ids::OrganizationId::new(),
            None,
            chrono::Utc::now(),
        )
    }

    #[test]
    fn test_clean_candidate_has_no_blocking_issues() {
        let shift = shift_fixture();
        let ctx = context(&shift);
        let issues = evaluate(&shift, &ctx, &config());
        assert!(issues
            .iter()
            .all(|i| i.severity != IssueSeverity::Blocking));
    }

    #[test]
    fn test_blocked_caregiver_is_blocking() {
        let mut shift = shift_fixture();
        let ctx = context(&shift);
        shift.blocked_caregivers.insert(ctx.caregiver.id);

        let issues = evaluate(&shift, &ctx, &config());
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::BlockedByClient
                && i.severity == IssueSeverity::Blocking));
    }

    #[test]
    fn test_missing_certification_blocks() {
        let mut shift = shift_fixture();
        shift.required_certifications.insert("RN".to_string());
        let ctx = context(&shift);

        let issues = evaluate(&shift, &ctx, &config());
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::MissingCertification));
    }

    #[test]
    fn test_missing_skill_downgrades_to_warning_without_exact_match() {
        let mut shift = shift_fixture();
        shift.required_skills.insert("Wound Care".to_string());
        let ctx = context(&shift);

        let mut cfg = config();
        cfg.require_exact_skill_match = false;
        let issues = evaluate(&shift, &ctx, &cfg);
        let finding = issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingSkill)
            .unwrap();
        assert_eq!(finding.severity, IssueSeverity::Warning);

        cfg.require_exact_skill_match = true;
        let issues = evaluate(&shift, &ctx, &cfg);
        let finding = issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingSkill)
            .unwrap();
        assert_eq!(finding.severity, IssueSeverity::Blocking);
    }

    #[test]
    fn test_conflict_and_capacity_block() {
        let shift = shift_fixture();
        let mut ctx = context(&shift);
        ctx.conflicting_visits.push(crate::caregiver::TimeInterval {
            start: chrono::Utc::now(),
            end: chrono::Utc::now() + chrono::Duration::hours(2),
        });
        ctx.current_week_hours = ctx.caregiver.max_hours_per_week;

        let issues = evaluate(&shift, &ctx, &config());
        assert!(issues.iter().any(|i| i.kind == IssueKind::TimeConflict));
        assert!(issues.iter().any(|i| i.kind == IssueKind::OverCapacity));
    }

    #[test]
    fn test_gender_mismatch_warns_only_when_respected() {
        let mut shift = shift_fixture();
        shift.gender_preference = Some(Gender::Female);
        let ctx = context(&shift);

        let issues = evaluate(&shift, &ctx, &config());
        assert!(!issues.iter().any(|i| i.kind == IssueKind::GenderMismatch));

        let mut cfg = config();
        cfg.respect_gender_preference = true;
        let issues = evaluate(&shift, &ctx, &cfg);
        let finding = issues
            .iter()
            .find(|i| i.kind == IssueKind::GenderMismatch)
            .unwrap();
        assert_eq!(finding.severity, IssueSeverity::Warning);
    }

    #[test]
    fn test_distance_cap_blocks_and_unknown_warns() {
        let shift = shift_fixture();
        let mut ctx = context(&shift);
        ctx.distance_from_shift = Some(60.0);

        let mut cfg = config();
        cfg.max_travel_distance = Some(40.0);
        let issues = evaluate(&shift, &ctx, &cfg);
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::TooFar && i.severity == IssueSeverity::Blocking));

        ctx.distance_from_shift = None;
        let issues = evaluate(&shift, &ctx, &cfg);
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::DistanceUnknown
                && i.severity == IssueSeverity::Warning));
    }
}
