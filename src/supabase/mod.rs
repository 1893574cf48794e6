pub mod client;

pub use client::SupabaseClient;

use crate::error::AppResult;

/// One row as returned by PostgREST: column name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    pub columns: Columns,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn all(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Columns::All,
            limit: None,
        }
    }

    pub fn columns(table: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            columns: Columns::Named(columns.iter().map(|c| c.to_string()).collect()),
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The `select` parameter value, e.g. `*` or `fan_tier,price`.
    pub fn select_param(&self) -> String {
        match &self.columns {
            Columns::All => "*".to_string(),
            Columns::Named(names) => names.join(","),
        }
    }
}

#[async_trait::async_trait]
pub trait TableSource: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> AppResult<Vec<Record>>;
}
