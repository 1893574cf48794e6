use opentelemetry::KeyValue;

use crate::error::AppResult;
use crate::supabase::{Record, SelectQuery, TableSource};
use crate::telemetry::metrics::ROWS_FETCHED;

#[tracing::instrument(
    name = "pipeline_stage retrieve",
    skip(source, query),
    fields(
        pipeline.stage = "retrieve",
        db.table = %query.table,
        db.select = %query.select_param(),
        report.rows,
    )
)]
pub async fn retrieve(source: &dyn TableSource, query: &SelectQuery) -> AppResult<Vec<Record>> {
    let rows = source.select(query).await?;

    tracing::Span::current().record("report.rows", rows.len());
    ROWS_FETCHED.record(
        rows.len() as u64,
        &[
            KeyValue::new("db.table", query.table.clone()),
            KeyValue::new("db.select", query.select_param()),
        ],
    );

    Ok(rows)
}
