//! Inputs supplied by the collaborators around the core: resolver output,
//! per-package metadata fragments and scanner results.
//!
//! The core only reads these through [`MetadataSource`] and [`ScanSource`];
//! [`AnalysisInput`] is the JSON bundle the CLI feeds it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::graph::{flatten_tree, RawEdge, RawPackageRef, ResolvedNode};
use crate::license::resolver::LicenseSources;
use crate::models::PackageIdentifier;

/// Everything the metadata collaborator knows about one package.
/// Every field is optional; a blank string counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetadataFragment {
    #[serde(default, alias = "license")]
    pub primary_license: Option<String>,
    #[serde(default)]
    pub license_expression: Option<String>,
    #[serde(default)]
    pub classifiers: Vec<String>,
    #[serde(default, alias = "github_license")]
    pub repository_license: Option<String>,
    #[serde(default)]
    pub is_maintained: Option<bool>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub home_page: Option<String>,
    #[serde(default, alias = "github_url")]
    pub repository_url: Option<String>,
    /// PEP 508 requirement strings, e.g. `pytest>=7; extra == "test"`.
    #[serde(default)]
    pub requires_dist: Vec<String>,
    /// ISO-8601 timestamp, with or without offset (UTC assumed when absent).
    #[serde(default)]
    pub upload_time: Option<String>,
}

static REQUIREMENT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").expect("valid requirement pattern")
});

static EXTRA_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bextra\s*==").expect("valid marker pattern"));

impl MetadataFragment {
    pub fn license_sources(&self) -> LicenseSources<'_> {
        LicenseSources {
            primary: self.primary_license.as_deref(),
            expression: self.license_expression.as_deref(),
            classifiers: &self.classifiers,
            repository: self.repository_license.as_deref(),
        }
    }

    pub fn parsed_upload_time(&self) -> Option<DateTime<Utc>> {
        let raw = non_blank(self.upload_time.as_deref())?;
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            warn!(upload_time = raw, "ignoring unparseable upload time");
        }
        parsed
    }

    /// Names of requirements that only apply through an extra. A name also
    /// required unconditionally is not optional.
    pub fn optional_requirements(&self) -> BTreeSet<String> {
        let mut optional = BTreeSet::new();
        let mut required = BTreeSet::new();
        for requirement in &self.requires_dist {
            let Some(captures) = REQUIREMENT_NAME.captures(requirement) else {
                continue;
            };
            let name = canonical_name(&captures[1]);
            let is_extra = requirement
                .split_once(';')
                .is_some_and(|(_, marker)| EXTRA_MARKER.is_match(marker));
            if is_extra {
                optional.insert(name);
            } else {
                required.insert(name);
            }
        }
        optional.retain(|name| !required.contains(name));
        optional
    }
}

/// Lowercased with runs of `-`, `_` and `.` folded to `-`.
pub(crate) fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// One vulnerability as reported by the scanner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawVulnerability {
    pub package: RawPackageRef,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// A scanner license-policy violation for one package.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LicenseRejection {
    pub package: RawPackageRef,
    /// License text the scanner objected to, if it reported one.
    #[serde(default)]
    pub license: Option<String>,
}

/// Pre-fetched package metadata, looked up by identifier.
pub trait MetadataSource {
    fn metadata(&self, id: &PackageIdentifier) -> Option<&MetadataFragment>;
}

/// Pre-computed vulnerability scanner results.
pub trait ScanSource {
    fn vulnerabilities(&self) -> &[RawVulnerability];
    fn license_rejection(&self, id: &PackageIdentifier) -> Option<&LicenseRejection>;
}

impl MetadataSource for HashMap<PackageIdentifier, MetadataFragment> {
    fn metadata(&self, id: &PackageIdentifier) -> Option<&MetadataFragment> {
        self.get(id)
    }
}

#[derive(Debug, Deserialize)]
struct InputFile {
    #[serde(default)]
    roots: Vec<RawPackageRef>,
    #[serde(default)]
    edges: Vec<RawEdge>,
    #[serde(default)]
    tree: Vec<ResolvedNode>,
    #[serde(default)]
    metadata: BTreeMap<String, MetadataFragment>,
    #[serde(default)]
    vulnerabilities: Vec<RawVulnerability>,
    #[serde(default)]
    license_rejections: Vec<LicenseRejection>,
}

/// Complete, already-fetched input of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    roots: Vec<RawPackageRef>,
    edges: Vec<RawEdge>,
    metadata: HashMap<PackageIdentifier, MetadataFragment>,
    vulnerabilities: Vec<RawVulnerability>,
    rejections: HashMap<PackageIdentifier, LicenseRejection>,
}

impl AnalysisInput {
    pub fn new(roots: Vec<RawPackageRef>, edges: Vec<RawEdge>) -> Self {
        Self {
            roots,
            edges,
            ..Default::default()
        }
    }

    /// Read a JSON input bundle from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("invalid input {}", path.display()))
    }

    /// Parse a JSON input bundle. Resolver output may be given as `edges`, as a
    /// nested `tree`, or both; explicit `roots` take precedence over the tree's.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: InputFile = serde_json::from_str(content)?;

        let mut roots = file.roots;
        let mut edges = file.edges;
        if !file.tree.is_empty() {
            let (tree_roots, tree_edges) = flatten_tree(&file.tree);
            if roots.is_empty() {
                roots = tree_roots;
            }
            edges.extend(tree_edges);
        }

        let mut input = Self::new(roots, edges);
        for (key, fragment) in file.metadata {
            match PackageIdentifier::parse(&key) {
                Some(id) => {
                    input.metadata.entry(id).or_insert(fragment);
                }
                None => warn!(key = %key, "skipping metadata with malformed package key"),
            }
        }
        for vulnerability in file.vulnerabilities {
            input = input.with_vulnerability(vulnerability);
        }
        for rejection in file.license_rejections {
            input = input.with_license_rejection(rejection);
        }
        Ok(input)
    }

    pub fn with_metadata(mut self, id: PackageIdentifier, fragment: MetadataFragment) -> Self {
        self.metadata.entry(id).or_insert(fragment);
        self
    }

    pub fn with_vulnerability(mut self, vulnerability: RawVulnerability) -> Self {
        self.vulnerabilities.push(vulnerability);
        self
    }

    pub fn with_license_rejection(mut self, rejection: LicenseRejection) -> Self {
        match rejection.package.identifier() {
            Some(id) => {
                self.rejections.entry(id).or_insert(rejection);
            }
            None => warn!(?rejection, "skipping license rejection without name or version"),
        }
        self
    }

    pub fn roots(&self) -> &[RawPackageRef] {
        &self.roots
    }

    pub fn edges(&self) -> &[RawEdge] {
        &self.edges
    }
}

impl MetadataSource for AnalysisInput {
    fn metadata(&self, id: &PackageIdentifier) -> Option<&MetadataFragment> {
        self.metadata.get(id)
    }
}

impl ScanSource for AnalysisInput {
    fn vulnerabilities(&self) -> &[RawVulnerability] {
        &self.vulnerabilities
    }

    fn license_rejection(&self, id: &PackageIdentifier) -> Option<&LicenseRejection> {
        self.rejections.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamps() {
        let expected = Utc.with_ymd_and_hms(2023, 5, 22, 15, 12, 42).unwrap();
        assert_eq!(parse_timestamp("2023-05-22T15:12:42"), Some(expected));
        assert_eq!(
            parse_timestamp("2023-05-22T15:12:42.123456Z").map(|d| d.date_naive()),
            Some(expected.date_naive())
        );
        assert_eq!(parse_timestamp("2023-05-22T17:12:42+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2023-05-22"),
            Some(Utc.with_ymd_and_hms(2023, 5, 22, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("last tuesday"), None);
    }

    #[test]
    fn test_from_json_bundle() {
        let input = AnalysisInput::from_json(
            r#"{
                "roots": ["requests@2.31.0"],
                "edges": [{"parent": "requests@2.31.0", "child": {"name": "idna", "version": "3.6"}}],
                "metadata": {
                    "Requests@2.31.0": {"license": "Apache 2.0", "is_maintained": true},
                    "not-a-key": {}
                },
                "vulnerabilities": [{"package": "idna@3.6", "id": "CVE-2024-3651", "severity": "medium"}],
                "license_rejections": [{"package": "idna@3.6", "license": "GPL-3.0"}]
            }"#,
        )
        .unwrap();

        let requests = PackageIdentifier::parse("requests@2.31.0").unwrap();
        let idna = PackageIdentifier::parse("idna@3.6").unwrap();
        assert_eq!(input.roots().len(), 1);
        assert_eq!(input.edges().len(), 1);
        let fragment = input.metadata(&requests).unwrap();
        assert_eq!(fragment.primary_license.as_deref(), Some("Apache 2.0"));
        assert_eq!(fragment.is_maintained, Some(true));
        assert_eq!(input.vulnerabilities().len(), 1);
        assert!(input.license_rejection(&idna).is_some());
        assert!(input.license_rejection(&requests).is_none());
    }

    #[test]
    fn test_from_json_tree() {
        let input = AnalysisInput::from_json(
            r#"{"tree": [{"name": "flask", "version": "3.0.0", "dependencies": [
                {"name": "werkzeug", "version": "3.0.1"}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(input.roots(), &[RawPackageRef::new("flask", "3.0.0")]);
        assert_eq!(input.edges().len(), 1);
    }

    #[test]
    fn test_optional_requirements_use_extra_markers() {
        let fragment = MetadataFragment {
            requires_dist: vec![
                "charset_normalizer<4,>=2".into(),
                "PySocks!=1.5.7,>=1.5.6; extra == \"socks\"".into(),
                "chardet<6,>=3.0.2; extra == 'use-chardet-on-py3'".into(),
                "typing-extensions>=4; python_version < \"3.8\"".into(),
                "idna; extra == 'idna2008'".into(),
                "idna<4,>=2.5".into(),
            ],
            ..Default::default()
        };
        let optional = fragment.optional_requirements();
        assert_eq!(
            optional.into_iter().collect::<Vec<_>>(),
            vec!["chardet".to_string(), "pysocks".to_string()]
        );
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("Charset_Normalizer"), "charset-normalizer");
        assert_eq!(canonical_name("zope.interface"), "zope-interface");
        assert_eq!(canonical_name("a__-b"), "a-b");
    }

    #[test]
    fn test_github_url_alias() {
        let fragment: MetadataFragment =
            serde_json::from_str(r#"{"github_url": "https://github.com/kjd/idna"}"#).unwrap();
        assert_eq!(fragment.repository_url.as_deref(), Some("https://github.com/kjd/idna"));
        assert!(fragment.requires_dist.is_empty());
    }

    #[test]
    fn test_blank_upload_time_is_absent() {
        let fragment = MetadataFragment {
            upload_time: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(fragment.parsed_upload_time(), None);
    }
}
