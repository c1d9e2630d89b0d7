//! Snapshot serialization and console summaries.
//!
//! Snapshots are canonical pretty JSON. The Markdown renderings are what the
//! binary prints after each job.

use crate::classification::pipeline::{BatchReport, ItemOutcome};
use crate::models::{Period, Tally, WindowSummary};
use anyhow::Result;

/// Serialize a summary into its snapshot form.
pub fn generate_json_snapshot(summary: &WindowSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).map_err(Into::into)
}

/// Generate a Markdown rendering of a window summary.
pub fn generate_markdown_summary(summary: &WindowSummary, path: Option<&str>) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&generate_title(&summary.period));

    // Metadata
    output.push_str(&format!(
        "- **Generated:** {}\n",
        summary.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(path) = path {
        output.push_str(&format!("- **Snapshot:** `{}`\n", path));
    }
    output.push_str(&format!("- **Total Reports:** {}\n", summary.total_reports));
    output.push_str(&format!(
        "- **Critical Reports:** {}\n\n",
        summary.critical_reports
    ));

    if let Some(ref message) = summary.message {
        output.push_str(&format!("{}\n\n", message));
        return output;
    }

    output.push_str(&generate_tally_section("By Category", "Category", &summary.by_category));
    output.push_str(&generate_tally_section("By Urgency", "Urgency", &summary.by_urgency));
    output.push_str(&generate_tally_section("By Status", "Status", &summary.by_status));

    // Weekly trends
    if let Some(ref trends) = summary.trends {
        output.push_str("## Trends\n\n");
        if let Some(ref day) = trends.busiest_day {
            output.push_str(&format!(
                "- **Busiest Day:** {} ({} reports)\n",
                day.date, day.total
            ));
        }
        if let Some(ref category) = trends.most_common_category {
            output.push_str(&format!("- **Most Common Category:** {}\n", category));
        }
        if let Some(ref urgency) = trends.most_common_urgency {
            output.push_str(&format!("- **Most Common Urgency:** {}\n", urgency));
        }
        output.push('\n');
    }

    output
}

fn generate_title(period: &Period) -> String {
    match period {
        Period::Day { date } => format!("# Daily Incident Summary: {}\n\n", date),
        Period::Week { period } => format!(
            "# Weekly Incident Summary: {} to {}\n\n",
            period.start.date(),
            period.end.date()
        ),
    }
}

/// Generate a count table, largest first. Equal counts keep scan order.
fn generate_tally_section(title: &str, column: &str, counts: &Tally) -> String {
    if counts.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str(&format!("## {}\n\n", title));
    section.push_str(&format!("| {} | Count |\n", column));
    section.push_str("|:---|:---:|\n");

    let mut rows: Vec<_> = counts.iter().collect();
    rows.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

    for (key, count) in rows {
        section.push_str(&format!("| {} | {} |\n", key, count));
    }
    section.push('\n');

    section
}

/// Generate a Markdown rendering of a classification batch.
pub fn generate_batch_summary(batch: &BatchReport) -> String {
    let mut output = String::new();

    output.push_str("# Classification Run\n\n");
    output.push_str(&format!("- **Candidates:** {}\n", batch.candidates));
    output.push_str(&format!("- **Processed:** {}\n", batch.processed()));
    output.push_str(&format!("- **Skipped:** {}\n", batch.skipped()));
    output.push_str(&format!("- **Failed:** {}\n\n", batch.failed()));

    let problems: Vec<String> = batch
        .outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            ItemOutcome::Processed { .. } => None,
            ItemOutcome::Skipped { report_id, reason } => Some(format!(
                "| {} | skipped | {} |",
                report_id.as_deref().unwrap_or("unknown"),
                reason
            )),
            ItemOutcome::Failed {
                report_id,
                stage,
                error,
            } => Some(format!(
                "| {} | {} failed | {} |",
                report_id,
                stage,
                error.replace('|', "\\|")
            )),
        })
        .collect();

    if !problems.is_empty() {
        output.push_str("| Report | Outcome | Detail |\n");
        output.push_str("|:---|:---|:---|\n");
        for row in problems {
            output.push_str(&row);
            output.push('\n');
        }
        output.push('\n');
    }

    output
}
