use std::io::Write;
use std::path::{Path, PathBuf};

use opentelemetry::KeyValue;

use crate::error::AppResult;
use crate::supabase::{SelectQuery, TableSource};
use crate::telemetry::metrics::{SUMMARIES_RENDERED, SUMMARIES_SKIPPED};

use super::aggregate::{self, AggregateFn, Aggregation, SortKey, SortOrder};
use super::render::save_table_image;
use super::report::{write_preview, write_summary};
use super::retrieve::retrieve;

pub const TABLE: &str = "ticket_orders";
pub const PREVIEW_LIMIT: usize = 5;

/// One grouped summary: what to fetch, how to aggregate it, where it goes.
#[derive(Debug, Clone, Copy)]
pub struct SummarySpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub aggregation: Aggregation<'static>,
    pub heading: &'static str,
    pub file_name: &'static str,
    pub title: &'static str,
}

pub const SUMMARIES: [SummarySpec; 2] = [
    SummarySpec {
        name: "avg_price_by_tier",
        columns: &["fan_tier", "price"],
        aggregation: Aggregation {
            group_by: &["fan_tier"],
            value_field: "price",
            function: AggregateFn::Mean,
            output_column: "avg_price",
            sort: &[SortKey::Value(SortOrder::Descending)],
        },
        heading: "Average price by fan_tier:",
        file_name: "avg_price_by_tier.png",
        title: "Average Ticket Price by Fan Tier",
    },
    SummarySpec {
        name: "total_revenue_event_channel",
        columns: &["event", "purchase_channel", "price"],
        aggregation: Aggregation {
            group_by: &["event", "purchase_channel"],
            value_field: "price",
            function: AggregateFn::Sum,
            output_column: "total_revenue",
            sort: &[
                SortKey::Group(0, SortOrder::Ascending),
                SortKey::Value(SortOrder::Descending),
            ],
        },
        heading: "Total revenue by event & purchase_channel:",
        file_name: "total_revenue_event_channel.png",
        title: "Revenue by Event & Purchase Channel",
    },
];

#[derive(Debug, Default, PartialEq)]
pub struct RunOutcome {
    pub preview_rows: usize,
    pub rendered: Vec<PathBuf>,
    pub skipped: Vec<&'static str>,
}

#[tracing::instrument(
    name = "pipeline report",
    skip(source, output_dir, out),
    fields(
        report.output_dir = %output_dir.display(),
        report.rendered,
        report.skipped,
    )
)]
pub async fn run(
    source: &dyn TableSource,
    output_dir: &Path,
    out: &mut dyn Write,
) -> AppResult<RunOutcome> {
    let mut outcome = RunOutcome::default();

    // Stage 1: Preview
    let preview = retrieve(source, &SelectQuery::all(TABLE).limit(PREVIEW_LIMIT)).await?;
    write_preview(out, PREVIEW_LIMIT, &preview)?;
    outcome.preview_rows = preview.len();

    // Stage 2: One fetch, aggregate, print and render per summary
    for summary in &SUMMARIES {
        let rows = retrieve(source, &SelectQuery::columns(TABLE, summary.columns)).await?;
        let summary_kv = KeyValue::new("report.summary", summary.name);

        if rows.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "No data returned for {}. Check RLS or table contents.",
                summary.name
            )?;
            tracing::info!(summary = summary.name, "No rows returned, skipping summary");
            SUMMARIES_SKIPPED.add(1, &[summary_kv]);
            outcome.skipped.push(summary.name);
            continue;
        }

        let table = aggregate::aggregate(&rows, &summary.aggregation)?;
        tracing::debug!(summary = summary.name, groups = table.len(), "Summary aggregated");
        write_summary(out, summary.heading, &table)?;

        let path = output_dir.join(summary.file_name);
        save_table_image(&table, &path, Some(summary.title))?;
        SUMMARIES_RENDERED.add(1, &[summary_kv]);
        outcome.rendered.push(path);
    }

    out.flush()?;

    let span = tracing::Span::current();
    span.record("report.rendered", outcome.rendered.len());
    span.record("report.skipped", outcome.skipped.len());

    Ok(outcome)
}
