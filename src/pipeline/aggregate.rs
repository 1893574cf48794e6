use polars::prelude::*;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::supabase::Record;

/// Display text for a missing key or an undefined aggregate.
pub const MISSING: &str = "NaN";

/// Row ordinal of each group in ascending key order, carried through sorting.
const INDEX_COLUMN: &str = "index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Mean,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Position within the grouping columns.
    Group(usize, SortOrder),
    Value(SortOrder),
}

#[derive(Debug, Clone, Copy)]
pub struct Aggregation<'a> {
    pub group_by: &'a [&'a str],
    pub value_field: &'a str,
    pub function: AggregateFn,
    pub output_column: &'a str,
    pub sort: &'a [SortKey],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
}

/// Aggregated groups in display order. The frame holds the index column,
/// the grouping columns and the aggregate column.
#[derive(Debug, Clone)]
pub struct SummaryTable {
    pub key_columns: Vec<String>,
    pub value_column: String,
    pub value_kind: ValueKind,
    pub frame: DataFrame,
}

impl SummaryTable {
    pub fn columns(&self) -> Vec<&str> {
        self.key_columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.value_column.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn index_labels(&self) -> AppResult<Vec<usize>> {
        let index = self
            .frame
            .column(INDEX_COLUMN)?
            .as_materialized_series()
            .cast(&DataType::UInt64)?;
        Ok(index.u64()?.into_no_null_iter().map(|i| i as usize).collect())
    }

    pub fn values(&self) -> AppResult<Vec<Option<f64>>> {
        let values = self
            .frame
            .column(&self.value_column)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        Ok(values.f64()?.into_iter().collect())
    }

    /// Grouping key text per row, `NaN` for the missing group.
    pub fn key_rows(&self) -> AppResult<Vec<Vec<String>>> {
        let columns = self
            .key_columns
            .iter()
            .map(|name| key_text(self.frame.column(name)?.as_materialized_series()))
            .collect::<AppResult<Vec<_>>>()?;

        Ok((0..self.len())
            .map(|row| columns.iter().map(|column| column[row].clone()).collect())
            .collect())
    }
}

fn missing() -> String {
    MISSING.to_string()
}

fn key_text(series: &Series) -> AppResult<Vec<String>> {
    let text = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.map_or_else(missing, str::to_string))
            .collect(),
        dtype if dtype.is_integer() => {
            let ints = series.cast(&DataType::Int64)?;
            ints.i64()?
                .into_iter()
                .map(|v| v.map_or_else(missing, |v| v.to_string()))
                .collect()
        }
        _ => {
            let floats = series.cast(&DataType::Float64)?;
            floats
                .f64()?
                .into_iter()
                .map(|v| v.map_or_else(missing, |v| format!("{v:?}")))
                .collect()
        }
    };
    Ok(text)
}

/// Grouping column. Integers stay integers and other numbers become floats,
/// so numeric keys order numerically. Anything else is grouped by its text.
/// Null and absent fields become nulls, which polars keeps as their own group.
fn key_column(records: &[Record], field: &str) -> Column {
    let values: Vec<Option<&Value>> = records
        .iter()
        .map(|r| r.get(field).filter(|v| !v.is_null()))
        .collect();
    let present = || values.iter().flatten();

    if present().all(|v| v.is_i64()) {
        let ints: Vec<Option<i64>> = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
        Column::new(field.into(), ints)
    } else if present().all(|v| v.is_number()) {
        let floats: Vec<Option<f64>> = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
        Column::new(field.into(), floats)
    } else {
        let text: Vec<Option<String>> = values
            .iter()
            .map(|v| {
                v.map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            })
            .collect();
        Column::new(field.into(), text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Price {
    Integer(i64),
    Float(f64),
}

impl Price {
    fn as_f64(self) -> f64 {
        match self {
            Price::Integer(v) => v as f64,
            Price::Float(v) => v,
        }
    }
}

/// Reads a numeric field; `None` when the field is null or absent.
fn numeric_value(record: &Record, field: &str) -> AppResult<Option<Price>> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(v), _) => Ok(Some(Price::Integer(v))),
            (None, Some(v)) => Ok(Some(Price::Float(v))),
            _ => Err(AppError::Aggregate(format!(
                "{field} value {n} is out of range"
            ))),
        },
        // PostgREST may serialize `numeric` columns as strings
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(Price::Float(value))),
            _ => Err(AppError::Aggregate(format!(
                "{field} value {s:?} is not numeric"
            ))),
        },
        Some(other) => Err(AppError::Aggregate(format!(
            "{field} value {other} is not numeric"
        ))),
    }
}

/// Aggregated column. Integer only when every value is a present integer;
/// a single null or fractional value makes the whole column float.
fn value_column(records: &[Record], field: &str) -> AppResult<Column> {
    let prices = records
        .iter()
        .map(|r| numeric_value(r, field))
        .collect::<AppResult<Vec<_>>>()?;

    let ints: Option<Vec<i64>> = prices
        .iter()
        .map(|p| match p {
            Some(Price::Integer(v)) => Some(*v),
            _ => None,
        })
        .collect();

    Ok(match ints {
        Some(ints) => Column::new(field.into(), ints),
        None => {
            let floats: Vec<Option<f64>> = prices.iter().map(|p| p.map(Price::as_f64)).collect();
            Column::new(field.into(), floats)
        }
    })
}

fn validate(aggregation: &Aggregation<'_>) -> AppResult<()> {
    if aggregation.group_by.is_empty() {
        return Err(AppError::Aggregate(
            "at least one grouping column is required".into(),
        ));
    }
    for key in aggregation.sort {
        if let SortKey::Group(i, _) = key
            && *i >= aggregation.group_by.len()
        {
            return Err(AppError::Aggregate(format!(
                "sort refers to grouping column {i}, but only {} are grouped",
                aggregation.group_by.len()
            )));
        }
    }
    Ok(())
}

#[tracing::instrument(
    name = "pipeline_stage aggregate",
    skip(records, aggregation),
    fields(
        pipeline.stage = "aggregate",
        aggregate.column = aggregation.output_column,
        aggregate.records = records.len(),
        aggregate.groups,
    )
)]
pub fn aggregate(records: &[Record], aggregation: &Aggregation<'_>) -> AppResult<SummaryTable> {
    validate(aggregation)?;

    let mut columns: Vec<Column> = aggregation
        .group_by
        .iter()
        .map(|field| key_column(records, field))
        .collect();
    columns.push(value_column(records, aggregation.value_field)?);
    let frame = DataFrame::new(columns)?;

    let keys: Vec<Expr> = aggregation.group_by.iter().map(|c| col(*c)).collect();
    let value = match aggregation.function {
        AggregateFn::Mean => col(aggregation.value_field).mean(),
        AggregateFn::Sum => col(aggregation.value_field).sum(),
    }
    .alias(aggregation.output_column);

    let (sort_by, descending): (Vec<Expr>, Vec<bool>) = aggregation
        .sort
        .iter()
        .map(|key| match *key {
            SortKey::Group(i, order) => (
                col(aggregation.group_by[i]),
                order == SortOrder::Descending,
            ),
            SortKey::Value(order) => (
                col(aggregation.output_column),
                order == SortOrder::Descending,
            ),
        })
        .unzip();

    // Null keys stay as their own group; both sorts put them last
    let frame = frame
        .lazy()
        .group_by(keys.clone())
        .agg([value])
        .sort_by_exprs(keys, SortMultipleOptions::default().with_nulls_last(true))
        .with_row_index(INDEX_COLUMN, None)
        .sort_by_exprs(
            sort_by,
            SortMultipleOptions::default()
                .with_order_descending_multi(descending)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?;

    let value_kind = if frame.column(aggregation.output_column)?.dtype().is_integer() {
        ValueKind::Integer
    } else {
        ValueKind::Float
    };

    tracing::Span::current().record("aggregate.groups", frame.height());

    Ok(SummaryTable {
        key_columns: aggregation.group_by.iter().map(|c| c.to_string()).collect(),
        value_column: aggregation.output_column.to_string(),
        value_kind,
        frame,
    })
}
