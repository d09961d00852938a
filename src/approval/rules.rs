use tracing::trace;

use crate::models::{
    ApprovalStatus, ApprovalVerdict, LicenseExpr, LicenseId, Package, VulnerabilityFinding,
};

/// Reason attached to an approved package with nothing missing.
pub const NO_ISSUES: &str = "no issues found";

/// Number of missing critical fields that blocks approval.
pub const PENDING_THRESHOLD: usize = 2;

/// Everything a rule may look at for one package.
pub struct Subject<'a> {
    pub package: &'a Package,
    pub findings: &'a [VulnerabilityFinding],
    /// Display names of direct dependencies already rejected.
    pub rejected_dependencies: &'a [String],
}

/// A predicate that, when it fires, rejects the package with the returned reason.
pub struct RejectionRule {
    pub name: &'static str,
    pub check: fn(&Subject<'_>) -> Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    Critical,
    Secondary,
}

/// A piece of information whose absence is reported, and possibly blocks approval.
pub struct GapRule {
    pub attribute: &'static str,
    pub kind: GapKind,
    pub missing: fn(&Package) -> bool,
}

/// Evaluated in order; every rule that fires contributes one reason.
pub static REJECTION_RULES: &[RejectionRule] = &[
    RejectionRule {
        name: "vulnerabilities",
        check: vulnerabilities,
    },
    RejectionRule {
        name: "license",
        check: rejected_license,
    },
    RejectionRule {
        name: "maintenance",
        check: unmaintained,
    },
    RejectionRule {
        name: "dependencies",
        check: rejected_dependencies,
    },
];

pub static GAP_RULES: &[GapRule] = &[
    GapRule {
        attribute: "license",
        kind: GapKind::Critical,
        missing: |p| p.license.is_none(),
    },
    GapRule {
        attribute: "maintenance information",
        kind: GapKind::Critical,
        missing: Package::maintenance_undetermined,
    },
    GapRule {
        attribute: "project URL",
        kind: GapKind::Secondary,
        missing: |p| !p.has_project_url(),
    },
    GapRule {
        attribute: "publication date",
        kind: GapKind::Secondary,
        missing: |p| p.upload_time.is_none(),
    },
];

fn vulnerabilities(subject: &Subject<'_>) -> Option<String> {
    let total: usize = subject.findings.iter().map(|f| f.count).sum();
    if total == 0 {
        return None;
    }
    let noun = if total == 1 {
        "vulnerability"
    } else {
        "vulnerabilities"
    };
    let breakdown = subject
        .findings
        .iter()
        .map(|f| format!("{} {}", f.count, f.severity))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{total} known {noun} ({breakdown})"))
}

fn rejected_license(subject: &Subject<'_>) -> Option<String> {
    let license = subject.package.license.as_ref().filter(|l| l.is_rejected())?;
    let named = match license.canonical() {
        LicenseExpr::Single(LicenseId::Unknown) if !license.raw_text().is_empty() => {
            license.raw_text().to_string()
        }
        canonical => canonical.to_string(),
    };
    Some(format!("license rejected ({named})"))
}

fn unmaintained(subject: &Subject<'_>) -> Option<String> {
    let package = subject.package;
    (package.is_maintained == Some(false) && !package.has_identity())
        .then(|| "unmaintained package with no documented author or maintainer".to_string())
}

fn rejected_dependencies(subject: &Subject<'_>) -> Option<String> {
    if subject.rejected_dependencies.is_empty() {
        return None;
    }
    Some(format!(
        "rejected direct dependencies: {}",
        subject.rejected_dependencies.join(", ")
    ))
}

/// Run the rule tables against one package.
pub fn judge(subject: &Subject<'_>) -> ApprovalVerdict {
    let triggers: Vec<String> = REJECTION_RULES
        .iter()
        .filter_map(|rule| {
            let reason = (rule.check)(subject)?;
            trace!(rule = rule.name, package = %subject.package.id, "rejection rule fired");
            Some(reason)
        })
        .collect();
    if !triggers.is_empty() {
        return ApprovalVerdict::new(ApprovalStatus::Rejected, triggers);
    }

    let gaps: Vec<&GapRule> = GAP_RULES
        .iter()
        .filter(|rule| (rule.missing)(subject.package))
        .collect();
    if gaps.is_empty() {
        return ApprovalVerdict::new(ApprovalStatus::Approved, vec![NO_ISSUES.to_string()]);
    }

    let (critical, secondary): (Vec<&GapRule>, Vec<&GapRule>) =
        gaps.iter().copied().partition(|rule| rule.kind == GapKind::Critical);

    if critical.len() >= PENDING_THRESHOLD {
        let missing = critical
            .iter()
            .map(|rule| format!("missing {}", rule.attribute))
            .collect::<Vec<_>>()
            .join(", ");
        let mut reasons = vec![format!("incomplete critical data: {missing}")];
        reasons.extend(secondary.iter().map(|rule| format!("missing {}", rule.attribute)));
        return ApprovalVerdict::new(ApprovalStatus::Pending, reasons);
    }

    let warnings = gaps
        .iter()
        .map(|rule| format!("warning: missing {}", rule.attribute))
        .collect();
    ApprovalVerdict::new(ApprovalStatus::Approved, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{License, LicenseSource, PackageIdentifier, Severity};
    use chrono::{TimeZone, Utc};

    fn complete_package() -> Package {
        let mut pkg = Package::new(PackageIdentifier::new("attrs", "23.1.0").unwrap(), "attrs");
        pkg.license = Some(License::new(
            "MIT",
            LicenseExpr::Single(LicenseId::Mit),
            LicenseSource::Declared,
        ));
        pkg.is_maintained = Some(true);
        pkg.home_page = Some("https://www.attrs.org/".into());
        pkg.upload_time = Some(Utc.with_ymd_and_hms(2023, 4, 16, 0, 0, 0).unwrap());
        pkg
    }

    fn judge_package(pkg: &Package) -> ApprovalVerdict {
        judge(&Subject {
            package: pkg,
            findings: &[],
            rejected_dependencies: &[],
        })
    }

    #[test]
    fn test_complete_package_has_no_issues() {
        let verdict = judge_package(&complete_package());
        assert_eq!(verdict.status(), ApprovalStatus::Approved);
        assert_eq!(verdict.reasons(), &[NO_ISSUES.to_string()]);
    }

    #[test]
    fn test_rejection_reasons_keep_fixed_order() {
        let mut pkg = complete_package();
        pkg.license = pkg.license.take().map(License::rejected);
        pkg.is_maintained = Some(false);
        let findings = vec![
            VulnerabilityFinding {
                affected: pkg.id.clone(),
                severity: Severity::High,
                count: 2,
            },
            VulnerabilityFinding {
                affected: pkg.id.clone(),
                severity: Severity::Low,
                count: 1,
            },
        ];
        let deps = vec!["idna".to_string(), "urllib3".to_string()];
        let verdict = judge(&Subject {
            package: &pkg,
            findings: &findings,
            rejected_dependencies: &deps,
        });

        assert_eq!(verdict.status(), ApprovalStatus::Rejected);
        assert_eq!(
            verdict.reasons(),
            &[
                "3 known vulnerabilities (2 high, 1 low)".to_string(),
                "license rejected (MIT)".to_string(),
                "unmaintained package with no documented author or maintainer".to_string(),
                "rejected direct dependencies: idna, urllib3".to_string(),
            ]
        );
    }

    #[test]
    fn test_unmaintained_with_author_is_not_rejected() {
        let mut pkg = complete_package();
        pkg.is_maintained = Some(false);
        pkg.author = Some("Hynek".into());
        assert_eq!(judge_package(&pkg).status(), ApprovalStatus::Approved);
    }

    #[test]
    fn test_single_critical_gap_is_a_warning() {
        let mut pkg = complete_package();
        pkg.license = None;
        let verdict = judge_package(&pkg);
        assert_eq!(verdict.status(), ApprovalStatus::Approved);
        assert_eq!(verdict.reasons(), &["warning: missing license".to_string()]);
    }

    #[test]
    fn test_two_critical_gaps_are_pending() {
        let mut pkg = complete_package();
        pkg.license = None;
        pkg.is_maintained = None;
        pkg.home_page = None;
        let verdict = judge_package(&pkg);
        assert_eq!(verdict.status(), ApprovalStatus::Pending);
        assert_eq!(
            verdict.reasons(),
            &[
                "incomplete critical data: missing license, missing maintenance information"
                    .to_string(),
                "missing project URL".to_string(),
            ]
        );
    }

    #[test]
    fn test_secondary_gaps_each_named() {
        let mut pkg = complete_package();
        pkg.home_page = None;
        pkg.upload_time = None;
        let verdict = judge_package(&pkg);
        assert_eq!(verdict.status(), ApprovalStatus::Approved);
        assert_eq!(
            verdict.reasons(),
            &[
                "warning: missing project URL".to_string(),
                "warning: missing publication date".to_string(),
            ]
        );
    }

    #[test]
    fn test_repository_link_counts_as_project_url() {
        let mut pkg = complete_package();
        pkg.home_page = None;
        pkg.repository_url = Some("https://github.com/python-attrs/attrs".into());
        let verdict = judge_package(&pkg);
        assert_eq!(verdict.status(), ApprovalStatus::Approved);
        assert_eq!(verdict.reasons(), &[NO_ISSUES.to_string()]);
    }

    #[test]
    fn test_scanner_rejection_names_reported_text() {
        let mut pkg = complete_package();
        pkg.license = Some(
            License::new(
                "Custom EULA",
                LicenseExpr::Single(LicenseId::Unknown),
                LicenseSource::Scanner,
            )
            .rejected(),
        );
        assert_eq!(
            judge_package(&pkg).reasons(),
            &["license rejected (Custom EULA)".to_string()]
        );
    }
}
