use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(name, version)` pair keying a package everywhere in the pipeline.
///
/// The name is trimmed and lowercased on construction, so `Requests@2.31.0` and
/// `requests@2.31.0` are the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentifier {
    name: String,
    version: String,
}

impl PackageIdentifier {
    /// Returns `None` when either side is blank.
    pub fn new(name: &str, version: &str) -> Option<Self> {
        let name = name.trim();
        let version = version.trim();
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_lowercase(),
            version: version.to_string(),
        })
    }

    /// Parse a `name@version` key. The last `@` separates the version so scoped
    /// names such as `@scope/pkg@1.0.0` survive.
    pub fn parse(key: &str) -> Option<Self> {
        let (name, version) = key.trim().rsplit_once('@')?;
        Self::new(name, version)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Canonical license identifiers the resolver can produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LicenseId {
    Mit,
    Apache2,
    Bsd2Clause,
    Bsd3Clause,
    Isc,
    Unlicense,
    Psf2,
    Zlib,
    Cc0,
    Mpl2,
    Lgpl21,
    Lgpl3,
    Epl2,
    Gpl2,
    Gpl3,
    Agpl3,
    Proprietary,
    /// A well-formed SPDX identifier outside the enumerated set.
    Other(String),
    /// Present but undetermined, e.g. a scanner flagged a license we could not name.
    Unknown,
}

impl LicenseId {
    pub fn as_spdx(&self) -> &str {
        match self {
            LicenseId::Mit => "MIT",
            LicenseId::Apache2 => "Apache-2.0",
            LicenseId::Bsd2Clause => "BSD-2-Clause",
            LicenseId::Bsd3Clause => "BSD-3-Clause",
            LicenseId::Isc => "ISC",
            LicenseId::Unlicense => "Unlicense",
            LicenseId::Psf2 => "PSF-2.0",
            LicenseId::Zlib => "Zlib",
            LicenseId::Cc0 => "CC0-1.0",
            LicenseId::Mpl2 => "MPL-2.0",
            LicenseId::Lgpl21 => "LGPL-2.1",
            LicenseId::Lgpl3 => "LGPL-3.0",
            LicenseId::Epl2 => "EPL-2.0",
            LicenseId::Gpl2 => "GPL-2.0",
            LicenseId::Gpl3 => "GPL-3.0",
            LicenseId::Agpl3 => "AGPL-3.0",
            LicenseId::Proprietary => "Proprietary",
            LicenseId::Other(id) => id,
            LicenseId::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LicenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_spdx())
    }
}

/// A single canonical license, or the full set of a multi-licensed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseExpr {
    Single(LicenseId),
    Composite(BTreeSet<LicenseId>),
}

impl LicenseExpr {
    pub fn ids(&self) -> Vec<&LicenseId> {
        match self {
            LicenseExpr::Single(id) => vec![id],
            LicenseExpr::Composite(ids) => ids.iter().collect(),
        }
    }

    /// SPDX expression form; a composite reads as an `OR` of its members.
    pub fn to_expression(&self) -> String {
        self.ids()
            .iter()
            .map(|id| id.as_spdx())
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, LicenseExpr::Composite(_))
    }
}

impl fmt::Display for LicenseExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_expression())
    }
}

/// Which cascade tier produced a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseSource {
    Declared,
    Expression,
    Classifier,
    Repository,
    Scanner,
}

impl fmt::Display for LicenseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseSource::Declared => write!(f, "declared"),
            LicenseSource::Expression => write!(f, "expression"),
            LicenseSource::Classifier => write!(f, "classifier"),
            LicenseSource::Repository => write!(f, "repository"),
            LicenseSource::Scanner => write!(f, "scanner"),
        }
    }
}

/// Resolved license of a package. Immutable: rejection produces a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    raw_text: String,
    canonical: LicenseExpr,
    source: LicenseSource,
    is_rejected: bool,
}

impl License {
    pub fn new(raw_text: impl Into<String>, canonical: LicenseExpr, source: LicenseSource) -> Self {
        Self {
            raw_text: raw_text.into(),
            canonical,
            source,
            is_rejected: false,
        }
    }

    /// Same license, flagged as rejected. The canonical value is untouched.
    pub fn rejected(self) -> Self {
        Self {
            is_rejected: true,
            ..self
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn canonical(&self) -> &LicenseExpr {
        &self.canonical
    }

    pub fn source(&self) -> LicenseSource {
        self.source
    }

    pub fn is_rejected(&self) -> bool {
        self.is_rejected
    }
}

/// One node of the dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub id: PackageIdentifier,
    /// Name as first seen in the resolver output (identifiers are lowercased).
    pub display_name: String,
    pub license: Option<License>,
    pub is_maintained: Option<bool>,
    pub author: Option<String>,
    pub maintainer: Option<String>,
    pub home_page: Option<String>,
    /// Source repository link, e.g. a GitHub URL.
    pub repository_url: Option<String>,
    pub upload_time: Option<DateTime<Utc>>,
    pub direct_dependencies: BTreeSet<PackageIdentifier>,
    /// Direct dependencies only required through an extra (dev, docs, tests).
    pub optional_dependencies: BTreeSet<PackageIdentifier>,
    pub transitive_dependencies: BTreeSet<PackageIdentifier>,
}

impl Package {
    pub fn new(id: PackageIdentifier, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            license: None,
            is_maintained: None,
            author: None,
            maintainer: None,
            home_page: None,
            repository_url: None,
            upload_time: None,
            direct_dependencies: BTreeSet::new(),
            optional_dependencies: BTreeSet::new(),
            transitive_dependencies: BTreeSet::new(),
        }
    }

    /// Either a home page or a repository link is known.
    pub fn has_project_url(&self) -> bool {
        self.home_page.is_some() || self.repository_url.is_some()
    }

    pub fn has_identity(&self) -> bool {
        self.author.is_some() || self.maintainer.is_some()
    }

    /// Nothing at all is known about upkeep: no maintenance flag and nobody named.
    pub fn maintenance_undetermined(&self) -> bool {
        self.is_maintained.is_none() && !self.has_identity()
    }
}

/// Severity level reported by the vulnerability scanner.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Unrecognized strings map to [`Severity::None`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" | "moderate" => Self::Medium,
            "low" => Self::Low,
            _ => Self::None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Scanner findings for one package at one severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnerabilityFinding {
    pub affected: PackageIdentifier,
    pub severity: Severity,
    pub count: usize,
}

/// How a package relates to the requested roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Root,
    Direct,
    Transitive,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Root => write!(f, "root"),
            Relation::Direct => write!(f, "direct"),
            Relation::Transitive => write!(f, "transitive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    Pending,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Approved => write!(f, "Approved"),
            ApprovalStatus::Rejected => write!(f, "Rejected"),
            ApprovalStatus::Pending => write!(f, "Pending"),
        }
    }
}

/// Outcome of evaluating one package. Built once, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalVerdict {
    status: ApprovalStatus,
    reasons: Vec<String>,
}

impl ApprovalVerdict {
    pub fn new(status: ApprovalStatus, reasons: Vec<String>) -> Self {
        debug_assert!(!reasons.is_empty(), "a verdict always carries a reason");
        Self { status, reasons }
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn is_rejected(&self) -> bool {
        self.status == ApprovalStatus::Rejected
    }

    /// Reasons joined for single-cell renderers.
    pub fn reason(&self) -> String {
        self.reasons.join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseRisk {
    Permissive,
    WeakCopyleft,
    StrongCopyleft,
    Proprietary,
    Unknown,
}

impl fmt::Display for LicenseRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseRisk::Permissive => write!(f, "Permissive"),
            LicenseRisk::WeakCopyleft => write!(f, "Weak Copyleft"),
            LicenseRisk::StrongCopyleft => write!(f, "Strong Copyleft"),
            LicenseRisk::Proprietary => write!(f, "Proprietary"),
            LicenseRisk::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Outcome of the local license policy, ordered from most to least permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PolicyVerdict {
    Pass,
    Warn,
    Error,
}

impl fmt::Display for PolicyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyVerdict::Pass => write!(f, "pass"),
            PolicyVerdict::Warn => write!(f, "warn"),
            PolicyVerdict::Error => write!(f, "error"),
        }
    }
}
