//! Fills graph nodes with what the collaborators know: resolved license,
//! rejection flags, maintenance and identity, and aggregated scanner findings.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::{license_verdict, Config};
use crate::graph::DependencyGraph;
use crate::input::{canonical_name, non_blank, MetadataSource, RawVulnerability, ScanSource};
use crate::license::resolver::resolve;
use crate::models::{
    License, LicenseExpr, LicenseId, LicenseSource, PackageIdentifier, PolicyVerdict, Severity,
    VulnerabilityFinding,
};

/// Findings per package, each list sorted from most to least severe.
pub type Findings = HashMap<PackageIdentifier, Vec<VulnerabilityFinding>>;

/// Attach metadata and license verdicts to every node. `now` anchors the
/// maintenance window.
pub fn enrich(
    graph: &mut DependencyGraph,
    metadata: &dyn MetadataSource,
    scans: &dyn ScanSource,
    config: &Config,
    now: DateTime<Utc>,
) {
    // Too long to represent: every release falls inside it.
    let window = Duration::try_days(365 * i64::from(config.policy.maintained_years));
    if window.is_none() {
        warn!(
            years = config.policy.maintained_years,
            "maintenance window out of range, treating every release as recent"
        );
    }

    for package in graph.packages_mut() {
        let fragment = metadata.metadata(&package.id);
        if fragment.is_none() {
            debug!(package = %package.id, "no metadata available");
        }

        let mut license = fragment.and_then(|f| resolve(&f.license_sources()));

        if let Some(current) = license.take() {
            license = Some(match license_verdict(config, &current) {
                PolicyVerdict::Error => {
                    debug!(package = %package.id, license = %current.canonical(), "license rejected by policy");
                    current.rejected()
                }
                _ => current,
            });
        }

        if let Some(rejection) = scans.license_rejection(&package.id) {
            let flagged = license.take().unwrap_or_else(|| {
                License::new(
                    non_blank(rejection.license.as_deref()).unwrap_or_default(),
                    LicenseExpr::Single(LicenseId::Unknown),
                    LicenseSource::Scanner,
                )
            });
            debug!(package = %package.id, "license rejected by scanner");
            license = Some(flagged.rejected());
        }

        package.license = license;

        if let Some(fragment) = fragment {
            package.author = owned(fragment.author.as_deref());
            package.maintainer = owned(fragment.maintainer.as_deref());
            package.home_page = owned(fragment.home_page.as_deref());
            package.repository_url = owned(fragment.repository_url.as_deref());
            let upload_time = fragment.parsed_upload_time();
            package.upload_time = upload_time;
            package.is_maintained = fragment
                .is_maintained
                .or_else(|| released_within(upload_time, now, window));

            let optional = fragment.optional_requirements();
            package.optional_dependencies = package
                .direct_dependencies
                .iter()
                .filter(|dep| optional.contains(&canonical_name(dep.name())))
                .cloned()
                .collect();
        }
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}

fn released_within(
    upload_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Option<Duration>,
) -> Option<bool> {
    let cutoff = window.and_then(|w| now.checked_sub_signed(w));
    upload_time.map(|released| cutoff.map_or(true, |cutoff| released >= cutoff))
}

/// Group raw scanner entries into one finding per package and severity,
/// dropping entries below `min_severity` or without a usable identifier.
pub fn aggregate_findings(raw: &[RawVulnerability], min_severity: Severity) -> Findings {
    let mut counts: BTreeMap<(PackageIdentifier, Severity), usize> = BTreeMap::new();

    for entry in raw {
        let Some(id) = entry.package.identifier() else {
            warn!(package = %entry.package.describe(), "skipping vulnerability without name or version");
            continue;
        };
        let severity = entry
            .severity
            .as_deref()
            .map(Severity::parse)
            .unwrap_or_default();
        if severity < min_severity {
            continue;
        }
        *counts.entry((id, severity)).or_default() += 1;
    }

    let mut findings = Findings::new();
    for ((affected, severity), count) in counts.into_iter().rev() {
        findings
            .entry(affected.clone())
            .or_default()
            .push(VulnerabilityFinding {
                affected,
                severity,
                count,
            });
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyAction;
    use crate::graph::{build, RawEdge, RawPackageRef};
    use crate::input::{AnalysisInput, LicenseRejection, MetadataFragment};
    use crate::models::Package;
    use chrono::TimeZone;

    fn id(key: &str) -> PackageIdentifier {
        PackageIdentifier::parse(key).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn single_package_input() -> AnalysisInput {
        AnalysisInput::new(vec![RawPackageRef::new("pkg", "1.0")], Vec::new())
    }

    fn enriched(input: &AnalysisInput, config: &Config) -> Package {
        let mut graph = build(input.edges(), input.roots());
        enrich(&mut graph, input, input, config, now());
        graph.package(&id("pkg@1.0")).unwrap().clone()
    }

    #[test]
    fn test_license_and_identity_copied() {
        let input = single_package_input().with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                primary_license: Some("MIT".into()),
                author: Some("Ada".into()),
                maintainer: Some("  ".into()),
                home_page: Some("https://example.org".into()),
                is_maintained: Some(true),
                ..Default::default()
            },
        );
        let pkg = enriched(&input, &Config::default());
        let license = pkg.license.unwrap();
        assert_eq!(license.canonical(), &LicenseExpr::Single(LicenseId::Mit));
        assert!(!license.is_rejected());
        assert_eq!(pkg.author.as_deref(), Some("Ada"));
        assert_eq!(pkg.maintainer, None);
        assert_eq!(pkg.is_maintained, Some(true));
    }

    #[test]
    fn test_policy_error_rejects_license() {
        let input = single_package_input().with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                primary_license: Some("GNU General Public License v3".into()),
                ..Default::default()
            },
        );
        let mut config = Config::default();
        config
            .policy
            .licenses
            .insert("GPL-3.0".to_string(), PolicyAction::Error);
        let license = enriched(&input, &config).license.unwrap();
        assert_eq!(license.canonical(), &LicenseExpr::Single(LicenseId::Gpl3));
        assert!(license.is_rejected());
    }

    #[test]
    fn test_default_policy_does_not_reject() {
        let input = single_package_input().with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                primary_license: Some("AGPLv3".into()),
                ..Default::default()
            },
        );
        let license = enriched(&input, &Config::default()).license.unwrap();
        assert_eq!(license.canonical(), &LicenseExpr::Single(LicenseId::Agpl3));
        assert!(!license.is_rejected());
    }

    #[test]
    fn test_huge_maintenance_window_keeps_every_release() {
        let input = single_package_input().with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                upload_time: Some("2020-01-01".into()),
                ..Default::default()
            },
        );
        for years in [1_000_000, u32::MAX] {
            let mut config = Config::default();
            config.policy.maintained_years = years;
            assert_eq!(enriched(&input, &config).is_maintained, Some(true), "{years}");
        }
    }

    #[test]
    fn test_repository_url_and_optional_dependencies() {
        let input = AnalysisInput::new(
            vec![RawPackageRef::new("pkg", "1.0")],
            vec![
                RawEdge::new(RawPackageRef::new("pkg", "1.0"), RawPackageRef::new("idna", "3.6")),
                RawEdge::new(
                    RawPackageRef::new("pkg", "1.0"),
                    RawPackageRef::new("PySocks", "1.7.1"),
                ),
            ],
        )
        .with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                repository_url: Some("https://github.com/example/pkg".into()),
                requires_dist: vec![
                    "idna<4,>=2.5".into(),
                    "PySocks!=1.5.7,>=1.5.6; extra == \"socks\"".into(),
                ],
                ..Default::default()
            },
        );
        let pkg = enriched(&input, &Config::default());
        assert_eq!(pkg.repository_url.as_deref(), Some("https://github.com/example/pkg"));
        assert!(pkg.has_project_url());
        assert_eq!(
            pkg.optional_dependencies.into_iter().collect::<Vec<_>>(),
            vec![id("pysocks@1.7.1")]
        );
    }

    #[test]
    fn test_scanner_rejection_without_resolved_license() {
        let input = single_package_input().with_license_rejection(LicenseRejection {
            package: RawPackageRef::new("pkg", "1.0"),
            license: Some("Custom EULA".into()),
        });
        let license = enriched(&input, &Config::default()).license.unwrap();
        assert!(license.is_rejected());
        assert_eq!(license.source(), LicenseSource::Scanner);
        assert_eq!(license.raw_text(), "Custom EULA");
        assert_eq!(license.canonical(), &LicenseExpr::Single(LicenseId::Unknown));
    }

    #[test]
    fn test_scanner_rejection_keeps_resolved_license() {
        let input = single_package_input()
            .with_metadata(
                id("pkg@1.0"),
                MetadataFragment {
                    primary_license: Some("MIT".into()),
                    ..Default::default()
                },
            )
            .with_license_rejection(LicenseRejection {
                package: RawPackageRef::new("pkg", "1.0"),
                license: None,
            });
        let license = enriched(&input, &Config::default()).license.unwrap();
        assert!(license.is_rejected());
        assert_eq!(license.source(), LicenseSource::Declared);
        assert_eq!(license.canonical(), &LicenseExpr::Single(LicenseId::Mit));
    }

    #[test]
    fn test_maintenance_derived_from_upload_time() {
        let recent = single_package_input().with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                upload_time: Some("2023-11-02T10:00:00".into()),
                ..Default::default()
            },
        );
        assert_eq!(enriched(&recent, &Config::default()).is_maintained, Some(true));

        let stale = single_package_input().with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                upload_time: Some("2019-01-15T08:30:00Z".into()),
                ..Default::default()
            },
        );
        assert_eq!(enriched(&stale, &Config::default()).is_maintained, Some(false));

        let explicit = single_package_input().with_metadata(
            id("pkg@1.0"),
            MetadataFragment {
                is_maintained: Some(true),
                upload_time: Some("2019-01-15T08:30:00Z".into()),
                ..Default::default()
            },
        );
        assert_eq!(enriched(&explicit, &Config::default()).is_maintained, Some(true));
    }

    #[test]
    fn test_no_metadata_leaves_node_undetermined() {
        let pkg = enriched(&single_package_input(), &Config::default());
        assert!(pkg.license.is_none());
        assert!(pkg.maintenance_undetermined());
        assert!(pkg.upload_time.is_none());
    }

    fn vuln(key: &str, severity: &str) -> RawVulnerability {
        let (name, version) = key.rsplit_once('@').unwrap();
        RawVulnerability {
            package: RawPackageRef::new(name, version),
            id: None,
            severity: Some(severity.into()),
        }
    }

    #[test]
    fn test_aggregate_findings_groups_by_severity() {
        let raw = vec![
            vuln("urllib3@1.26.0", "high"),
            vuln("urllib3@1.26.0", "low"),
            vuln("URLLIB3@1.26.0", "high"),
            vuln("idna@3.6", "medium"),
        ];
        let findings = aggregate_findings(&raw, Severity::None);

        let urllib3 = &findings[&id("urllib3@1.26.0")];
        assert_eq!(urllib3.len(), 2);
        assert_eq!(urllib3[0].severity, Severity::High);
        assert_eq!(urllib3[0].count, 2);
        assert_eq!(urllib3[1].severity, Severity::Low);
        assert_eq!(findings[&id("idna@3.6")][0].count, 1);
    }

    #[test]
    fn test_aggregate_findings_applies_floor() {
        let raw = vec![vuln("idna@3.6", "low"), vuln("idna@3.6", "critical")];
        let findings = aggregate_findings(&raw, Severity::High);
        let idna = &findings[&id("idna@3.6")];
        assert_eq!(idna.len(), 1);
        assert_eq!(idna[0].severity, Severity::Critical);

        assert!(aggregate_findings(&[vuln("idna@3.6", "low")], Severity::Medium).is_empty());
    }

    #[test]
    fn test_unusable_vulnerability_is_skipped() {
        let raw = vec![RawVulnerability {
            package: RawPackageRef {
                name: Some("idna".into()),
                version: None,
            },
            id: Some("CVE-2024-3651".into()),
            severity: Some("high".into()),
        }];
        assert!(aggregate_findings(&raw, Severity::None).is_empty());
    }
}
