use std::collections::HashMap;
use std::path::Path;

use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{ApprovalStatus, LicenseRisk};
use crate::report::{ReportRecord, ReportTree};

/// Render a colored terminal report.
pub fn render(tree: &ReportTree, input: &Path, verbose: bool, quiet: bool) {
    let summary = tree.summary;

    if quiet {
        println!(
            "Total: {}  Approved: {}  Pending: {}  Rejected: {}",
            summary.total,
            summary.approved.to_string().green(),
            summary.pending.to_string().yellow(),
            summary.rejected.to_string().red(),
        );
        return;
    }

    println!("\n {} v{}", "dep-checkr".bold(), env!("CARGO_PKG_VERSION"));
    println!(" Input: {}\n", input.display());

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Total packages  : {}", summary.total));
    for (status, count) in [
        (ApprovalStatus::Approved, summary.approved),
        (ApprovalStatus::Pending, summary.pending),
        (ApprovalStatus::Rejected, summary.rejected),
    ] {
        let (mark, _) = status_style(status);
        println!(
            " │  {:<48} │",
            format!(
                "{}  {:<13}: {:>4}  {}",
                mark,
                status.to_string(),
                count,
                top_licenses(tree, status)
            )
        );
    }
    println!(" └────────────────────────────────────────────────────┘\n");

    if summary.rejected > 0 {
        println!(" {} Packages that cannot be approved:\n", "[REJECTED]".red().bold());
        render_table(tree, ApprovalStatus::Rejected);
        println!();
    }

    if summary.pending > 0 {
        println!(" {} Packages missing critical data:\n", "[PENDING]".yellow().bold());
        render_table(tree, ApprovalStatus::Pending);
        println!();
    }

    if verbose && summary.approved > 0 {
        println!(" {} Approved packages:\n", "[APPROVED]".green().bold());
        render_table(tree, ApprovalStatus::Approved);
        println!();
    }
}

fn status_style(status: ApprovalStatus) -> (ColoredString, Color) {
    match status {
        ApprovalStatus::Approved => ("✓".green(), Color::Green),
        ApprovalStatus::Pending => ("?".yellow(), Color::Yellow),
        ApprovalStatus::Rejected => ("✗".red(), Color::Red),
    }
}

fn render_table(tree: &ReportTree, status: ApprovalStatus) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Name", "Version", "License", "Risk", "Relation", "Status", "Reasons"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    let (_, status_color) = status_style(status);
    for record in tree.records_with(status) {
        table.add_row(vec![
            Cell::new(&record.name),
            Cell::new(&record.version),
            Cell::new(license_label(record)),
            Cell::new(record.risk.to_string()).fg(risk_color(record.risk)),
            Cell::new(record.relation.to_string()),
            Cell::new(record.approval_status.to_string())
                .fg(status_color)
                .set_alignment(CellAlignment::Center),
            Cell::new(record.reasons.join("\n")),
        ]);
    }

    println!("{}", table);
}

fn risk_color(risk: LicenseRisk) -> Color {
    match risk {
        LicenseRisk::Permissive => Color::Green,
        LicenseRisk::WeakCopyleft => Color::Yellow,
        LicenseRisk::StrongCopyleft => Color::Red,
        LicenseRisk::Proprietary => Color::Magenta,
        LicenseRisk::Unknown => Color::DarkGrey,
    }
}

fn license_label(record: &ReportRecord) -> String {
    record
        .license
        .as_ref()
        .map_or_else(|| "unknown".to_string(), |l| l.display())
}

/// The three most common licenses among packages with `status`, e.g. `[MIT (4), Apache-2.0 (2)]`.
fn top_licenses(tree: &ReportTree, status: ApprovalStatus) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in tree.records_with(status) {
        *counts.entry(license_label(record)).or_insert(0) += 1;
    }

    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let summary: Vec<String> = pairs
        .iter()
        .take(3)
        .map(|(license, count)| format!("{} ({})", license, count))
        .collect();

    if summary.is_empty() {
        String::new()
    } else {
        format!("[{}]", summary.join(", "))
    }
}
