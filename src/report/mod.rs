//! Report assembly and rendering.
//!
//! [`assemble`] reshapes the graph and its verdicts into the [`ReportTree`]
//! every sink consumes; [`terminal`] renders it as colored tables. The JSON
//! sink is the tree serialized as is.

pub mod terminal;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::approval::Verdicts;
use crate::error::{CoreError, Result};
use crate::graph::DependencyGraph;
use crate::license::classifier::classify;
use crate::models::{
    ApprovalStatus, LicenseExpr, LicenseRisk, LicenseSource, Package, PackageIdentifier, Relation,
};

/// License as emitted: one identifier, or every identifier of a multi-licensed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LicenseField {
    Single(String),
    Composite(Vec<String>),
}

impl LicenseField {
    fn from_expr(expr: &LicenseExpr) -> Self {
        match expr {
            LicenseExpr::Single(id) => LicenseField::Single(id.to_string()),
            LicenseExpr::Composite(ids) => {
                LicenseField::Composite(ids.iter().map(ToString::to_string).collect())
            }
        }
    }

    pub fn display(&self) -> String {
        match self {
            LicenseField::Single(id) => id.clone(),
            LicenseField::Composite(ids) => ids.join(" OR "),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    pub name: String,
    pub version: String,
    pub license: Option<LicenseField>,
    pub license_source: Option<LicenseSource>,
    pub license_rejected: bool,
    pub risk: LicenseRisk,
    pub upload_time: Option<DateTime<Utc>>,
    pub relation: Relation,
    pub approval_status: ApprovalStatus,
    /// Reasons joined into one line.
    pub reason: String,
    pub reasons: Vec<String>,
    pub direct_dependencies: Vec<String>,
    /// Direct dependencies required unconditionally.
    pub production_dependencies: Vec<String>,
    /// Direct dependencies only pulled in through an extra.
    pub optional_dependencies: Vec<String>,
    pub transitive_dependencies: Vec<String>,
    pub rejected_dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTree {
    pub packages: Vec<ReportRecord>,
    pub summary: Summary,
}

impl ReportTree {
    pub fn has_rejections(&self) -> bool {
        self.summary.rejected > 0
    }

    pub fn records_with(&self, status: ApprovalStatus) -> impl Iterator<Item = &ReportRecord> {
        self.packages
            .iter()
            .filter(move |r| r.approval_status == status)
    }
}

/// One record per package: roots first in input order, then the rest in
/// discovery order. Fails if a package would be emitted twice or has no verdict.
pub fn assemble(graph: &DependencyGraph, verdicts: &Verdicts) -> Result<ReportTree> {
    let roots: HashSet<&PackageIdentifier> = graph.roots().iter().collect();
    let emission = graph
        .roots()
        .iter()
        .chain(graph.discovery_order().iter().filter(|id| !roots.contains(id)));

    let mut emitted: HashSet<&PackageIdentifier> = HashSet::with_capacity(graph.len());
    let mut packages = Vec::with_capacity(graph.len());
    let mut summary = Summary::default();

    for id in emission {
        if !emitted.insert(id) {
            return Err(CoreError::DuplicateNode(id.key()));
        }
        let Some(package) = graph.package(id) else {
            continue;
        };
        let verdict = verdicts
            .get(id)
            .ok_or_else(|| CoreError::MissingVerdict(id.key()))?;

        summary.total += 1;
        match verdict.status() {
            ApprovalStatus::Approved => summary.approved += 1,
            ApprovalStatus::Rejected => summary.rejected += 1,
            ApprovalStatus::Pending => summary.pending += 1,
        }

        let rejected_dependencies = package
            .direct_dependencies
            .iter()
            .filter(|dep| verdicts.get(*dep).is_some_and(|v| v.is_rejected()))
            .map(|dep| display_name(graph, dep))
            .collect();

        let direct: Vec<String> = package
            .direct_dependencies
            .iter()
            .map(|dep| display_name(graph, dep))
            .collect();
        let (optional, production): (Vec<&PackageIdentifier>, Vec<&PackageIdentifier>) = package
            .direct_dependencies
            .iter()
            .partition(|dep| package.optional_dependencies.contains(*dep));
        let transitive: Vec<String> = package
            .transitive_dependencies
            .iter()
            .filter(|dep| !package.direct_dependencies.contains(*dep))
            .map(|dep| display_name(graph, dep))
            .collect();

        packages.push(ReportRecord {
            name: package.display_name.clone(),
            version: id.version().to_string(),
            license: package
                .license
                .as_ref()
                .map(|l| LicenseField::from_expr(l.canonical())),
            license_source: package.license.as_ref().map(|l| l.source()),
            license_rejected: package.license.as_ref().is_some_and(|l| l.is_rejected()),
            risk: risk_of(package),
            upload_time: package.upload_time,
            relation: graph.relation(id).unwrap_or(Relation::Transitive),
            approval_status: verdict.status(),
            reason: verdict.reason(),
            reasons: verdict.reasons().to_vec(),
            direct_dependencies: direct,
            production_dependencies: names(graph, &production),
            optional_dependencies: names(graph, &optional),
            transitive_dependencies: transitive,
            rejected_dependencies,
        });
    }

    Ok(ReportTree { packages, summary })
}

fn risk_of(package: &Package) -> LicenseRisk {
    classify(package.license.as_ref().map(|l| l.canonical()))
}

fn names(graph: &DependencyGraph, ids: &[&PackageIdentifier]) -> Vec<String> {
    ids.iter().map(|dep| display_name(graph, dep)).collect()
}

fn display_name(graph: &DependencyGraph, id: &PackageIdentifier) -> String {
    graph
        .package(id)
        .map_or_else(|| id.name().to_string(), |p| p.display_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::evaluate;
    use crate::enrich::Findings;
    use crate::graph::{build, RawEdge, RawPackageRef};

    fn r(key: &str) -> RawPackageRef {
        let (name, version) = key.rsplit_once('@').unwrap();
        RawPackageRef::new(name, version)
    }

    fn e(parent: &str, child: &str) -> RawEdge {
        RawEdge::new(r(parent), r(child))
    }

    #[test]
    fn test_roots_lead_in_input_order() {
        let graph = build(
            &[e("b@1", "shared@1"), e("a@1", "shared@1"), e("shared@1", "deep@1")],
            &[r("b@1"), r("a@1")],
        );
        let verdicts = evaluate(&graph, &Findings::new()).unwrap();
        let tree = assemble(&graph, &verdicts).unwrap();

        let names: Vec<&str> = tree.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "shared", "deep"]);
        assert_eq!(tree.packages[0].relation, Relation::Root);
        assert_eq!(tree.packages[2].relation, Relation::Direct);
        assert_eq!(tree.packages[3].relation, Relation::Transitive);
        assert_eq!(tree.packages[0].direct_dependencies, vec!["shared"]);
        assert_eq!(tree.packages[0].production_dependencies, vec!["shared"]);
        assert!(tree.packages[0].optional_dependencies.is_empty());
        assert_eq!(tree.packages[0].transitive_dependencies, vec!["deep"]);
        assert_eq!(tree.summary.total, 4);
        assert_eq!(tree.summary.pending, 4);
    }

    #[test]
    fn test_missing_verdict_is_fatal() {
        let graph = build(&[e("a@1", "b@1")], &[r("a@1")]);
        let mut verdicts = evaluate(&graph, &Findings::new()).unwrap();
        verdicts.remove(&PackageIdentifier::parse("b@1").unwrap());

        let err = assemble(&graph, &verdicts).unwrap_err();
        assert_eq!(err, CoreError::MissingVerdict("b@1".to_string()));
    }

    #[test]
    fn test_undetermined_license_serializes_as_null() {
        let graph = build(&[], &[r("solo@0.1")]);
        let verdicts = evaluate(&graph, &Findings::new()).unwrap();
        let tree = assemble(&graph, &verdicts).unwrap();

        let json = serde_json::to_value(&tree).unwrap();
        let record = &json["packages"][0];
        assert!(record["license"].is_null());
        assert_eq!(record["approval_status"], "Pending");
        assert_eq!(record["relation"], "root");
        assert_eq!(record["risk"], "Unknown");
        assert!(!record["reason"].as_str().unwrap().is_empty());
        assert_eq!(json["summary"]["pending"], 1);
    }

    #[test]
    fn test_composite_license_serializes_as_list() {
        let field = LicenseField::from_expr(&LicenseExpr::Composite(
            [
                crate::models::LicenseId::Apache2,
                crate::models::LicenseId::Mit,
            ]
            .into_iter()
            .collect(),
        ));
        assert_eq!(
            serde_json::to_value(&field).unwrap(),
            serde_json::json!(["MIT", "Apache-2.0"])
        );
        assert_eq!(field.display(), "MIT OR Apache-2.0");
    }
}
