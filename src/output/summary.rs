use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::providers::cloud::EnvironmentSettings;
use crate::reconcile::ReconcileReport;
use crate::report::BatchReport;

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{create_table, disposition_cell, outcome_cell};

/// Prints a human-readable summary of a lifecycle batch to stdout.
pub fn print_batch_summary(report: &BatchReport) {
    println!("{}", render_batch_summary(report));
}

/// Prints a human-readable reconciliation report to stdout.
pub fn print_reconcile_summary(report: &ReconcileReport) {
    println!("{}", render_reconcile_summary(report));
}

/// Prints one environment's configuration variables: green environment
/// header, `KEY=VALUE` lines below.
///
/// When `requested` is non-empty only those keys print, with an empty
/// value for keys the environment does not define.
pub fn print_settings(env_name: &str, settings: &EnvironmentSettings, requested: &[String]) {
    println!("{}", bright_green(format!("{env_name}:")));

    if requested.is_empty() {
        for (key, value) in settings {
            println!("{key}={value}");
        }
    } else {
        for key in requested {
            let value = settings.get(key).map_or("", String::as_str);
            println!("{key}={value}");
        }
    }
}

// Helper functions

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_batch_summary(report: &BatchReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🧹", &format!("Environment {}", report.action));

    let _ = writeln!(
        output,
        "  {} {}   {} {}   {} {}\n",
        dim("Applied:"),
        bright_green(report.applied_count()),
        dim("Skipped:"),
        bright_yellow(report.skipped_count()),
        dim("Failed:"),
        bright_red(report.failed_count()),
    );

    if report.items.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No environments matched."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Environment", "Outcome"]));
    for item in &report.items {
        table.add_row(vec![Cell::new(&item.name), outcome_cell(&item.outcome)]);
    }
    let _ = writeln!(output, "{table}");

    output
}

fn render_reconcile_summary(report: &ReconcileReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🔎", "Issue / merge-request reconciliation");

    let stale = report.merged_but_open().count();
    let _ = writeln!(
        output,
        "  {} {}   {} {}   {} {}\n",
        dim("Issues checked:"),
        bright_yellow(report.issues.len()),
        dim("Merged but open:"),
        if stale > 0 {
            bright_red(stale)
        } else {
            bright_green(stale)
        },
        dim("Checked at:"),
        dim(report.generated_at.format("%Y-%m-%d %H:%M UTC")),
    );

    if report.issues.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No issues matched the filter."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Issue",
        "Status",
        "Assignee",
        "Disposition",
        "Merge requests",
        "Pipelines",
    ]));
    for issue in &report.issues {
        table.add_row(vec![
            Cell::new(format!("{}\n{}", issue.key, issue.url)),
            Cell::new(&issue.status),
            Cell::new(issue.assignee.as_deref().unwrap_or("—")),
            disposition_cell(issue.disposition),
            Cell::new(format_merge_requests(issue)),
            Cell::new(format_pipelines(issue)),
        ]);
    }
    let _ = writeln!(output, "{table}");

    for issue in report.merged_but_open() {
        let _ = writeln!(
            output,
            "  {} {} — {}",
            bright_red("stale:"),
            cyan(&issue.key),
            issue.summary,
        );
    }

    if let Some(flags) = &report.flags {
        let _ = writeln!(output);
        output.push_str(&render_batch_summary(flags));
    }

    output
}

fn format_merge_requests(issue: &crate::reconcile::ReconciledIssue) -> String {
    if issue.merge_requests.is_empty() {
        return "—".to_string();
    }
    issue
        .merge_requests
        .iter()
        .map(|mr| format!("{} ({})", mr.url, mr.branch))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_pipelines(issue: &crate::reconcile::ReconciledIssue) -> String {
    if issue.pipelines.is_empty() {
        return "—".to_string();
    }
    issue
        .pipelines
        .iter()
        .map(|run| match &run.url {
            Some(url) => format!("{} ({})", url, run.branch),
            None => format!("#{} ({})", run.build_number, run.branch),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
