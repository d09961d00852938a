//! `dep-checkr`: build a deduplicated dependency graph, resolve each
//! package's license, and classify every package as Approved, Rejected or
//! Pending with itemized reasons.
//!
//! # Flow
//! 1. Build the graph from resolver output ([`graph::build`]).
//! 2. Enrich nodes from pre-fetched metadata and scanner results ([`enrich`]).
//! 3. Evaluate verdicts leaves-first ([`approval::evaluate`]).
//! 4. Reshape into the report every sink consumes ([`report::assemble`]).
//!
//! The core is synchronous and does no I/O; everything it needs arrives through
//! [`input::MetadataSource`] and [`input::ScanSource`].

pub mod approval;
pub mod config;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod input;
pub mod license;
pub mod models;
pub mod report;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::graph::{RawEdge, RawPackageRef};
use crate::input::{AnalysisInput, MetadataSource, ScanSource};
use crate::report::ReportTree;

/// Run the whole pipeline over an input bundle.
pub fn analyze(input: &AnalysisInput, config: &Config, now: DateTime<Utc>) -> Result<ReportTree> {
    analyze_with(input.roots(), input.edges(), input, input, config, now)
}

/// Run the whole pipeline with separate collaborators.
pub fn analyze_with(
    roots: &[RawPackageRef],
    edges: &[RawEdge],
    metadata: &dyn MetadataSource,
    scans: &dyn ScanSource,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<ReportTree> {
    let mut graph = graph::build(edges, roots);
    info!(
        packages = graph.len(),
        roots = graph.roots().len(),
        warnings = graph.warnings().len(),
        "dependency graph built"
    );

    enrich::enrich(&mut graph, metadata, scans, config, now);
    let findings = enrich::aggregate_findings(scans.vulnerabilities(), config.policy.min_severity);

    let verdicts = approval::evaluate(&graph, &findings)?;
    report::assemble(&graph, &verdicts)
}
