use std::io::Write;

use crate::error::AppResult;
use crate::supabase::Record;

use super::aggregate::{MISSING, SummaryTable, ValueKind};

const MAX_DECIMALS: usize = 6;

/// Smallest decimal count (1..=6) that prints every value without loss.
fn column_decimals(values: &[f64]) -> usize {
    (1..=MAX_DECIMALS)
        .find(|&decimals| {
            values.iter().all(|&v| {
                let printed: f64 = format!("{v:.decimals$}").parse().unwrap_or(f64::NAN);
                (printed - v).abs() <= 1e-9 * v.abs().max(1.0)
            })
        })
        .unwrap_or(MAX_DECIMALS)
}

/// Formatted aggregate column, one entry per row.
pub fn value_cells(table: &SummaryTable) -> AppResult<Vec<String>> {
    let values = table.values()?;
    let decimals = match table.value_kind {
        ValueKind::Integer => 0,
        ValueKind::Float => {
            let present: Vec<f64> = values.iter().flatten().copied().collect();
            column_decimals(&present)
        }
    };
    Ok(values
        .into_iter()
        .map(|v| match v {
            Some(v) => format!("{v:.decimals$}"),
            None => MISSING.to_string(),
        })
        .collect())
}

/// Cell text for every row: grouping keys followed by the aggregate.
pub fn cell_rows(table: &SummaryTable) -> AppResult<Vec<Vec<String>>> {
    Ok(table
        .key_rows()?
        .into_iter()
        .zip(value_cells(table)?)
        .map(|(mut row, value)| {
            row.push(value);
            row
        })
        .collect())
}

/// Aligned text dump: a blank-headed index column, then every column
/// right-aligned and separated by two spaces.
pub fn format_table(table: &SummaryTable) -> AppResult<String> {
    let headers = table.columns();
    let cells = cell_rows(table)?;
    let index: Vec<String> = table
        .index_labels()?
        .iter()
        .map(ToString::to_string)
        .collect();

    let index_width = index.iter().map(String::len).max().unwrap_or(0);
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            cells
                .iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(cells.len() + 1);

    let mut header_line = " ".repeat(index_width);
    for (header, width) in headers.iter().zip(widths.iter().copied()) {
        header_line.push_str(&format!("  {header:>width$}"));
    }
    lines.push(header_line);

    for (label, row) in index.iter().zip(&cells) {
        let mut line = format!("{label:<index_width$}");
        for (cell, width) in row.iter().zip(widths.iter().copied()) {
            line.push_str(&format!("  {cell:>width$}"));
        }
        lines.push(line);
    }

    Ok(lines.join("\n"))
}

pub fn write_summary(out: &mut dyn Write, heading: &str, table: &SummaryTable) -> AppResult<()> {
    writeln!(out)?;
    writeln!(out, "{heading}")?;
    writeln!(out, "{}", format_table(table)?)?;
    Ok(())
}

pub fn write_preview(out: &mut dyn Write, limit: usize, rows: &[Record]) -> AppResult<()> {
    writeln!(out, "First {limit} rows:")?;
    for row in rows {
        writeln!(out, "{}", serde_json::to_string(row)?)?;
    }
    Ok(())
}
