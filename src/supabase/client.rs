use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue};
use serde::Deserialize;

use super::{Record, SelectQuery, TableSource};
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Read-only PostgREST client for a Supabase project.
pub struct SupabaseClient {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct PostgrestError {
    message: String,
    code: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.supabase_url.trim_end_matches('/')),
            api_key: config.supabase_key.clone(),
        })
    }

    fn headers(&self) -> AppResult<HeaderMap> {
        let invalid_key = |e: InvalidHeaderValue| {
            AppError::Config(format!("SUPABASE_KEY is not a valid header: {e}"))
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key).map_err(invalid_key)?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(invalid_key)?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub(crate) fn build_request(&self, query: &SelectQuery) -> AppResult<reqwest::Request> {
        let mut params = vec![("select", query.select_param())];
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }

        let request = self
            .client
            .get(format!("{}/{}", self.rest_url, query.table))
            .headers(self.headers()?)
            .query(&params)
            .build()?;

        Ok(request)
    }
}

#[async_trait::async_trait]
impl TableSource for SupabaseClient {
    #[tracing::instrument(
        name = "supabase.select",
        skip(self),
        fields(
            db.table = %query.table,
            db.select = %query.select_param(),
            http.response.status_code = tracing::field::Empty,
            rows = tracing::field::Empty,
        )
    )]
    async fn select(&self, query: &SelectQuery) -> AppResult<Vec<Record>> {
        let request = self.build_request(query)?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        let span = tracing::Span::current();
        span.record("http.response.status_code", status.as_u16());

        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let rows: Vec<Record> = serde_json::from_str(&body)?;
        span.record("rows", rows.len());

        Ok(rows)
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(err) => {
            let mut message = err.message;
            if let Some(code) = err.code {
                message.push_str(&format!(" [{code}]"));
            }
            if let Some(details) = err.details.filter(|d| !d.is_empty()) {
                message.push_str(&format!("; details: {details}"));
            }
            if let Some(hint) = err.hint.filter(|h| !h.is_empty()) {
                message.push_str(&format!("; hint: {hint}"));
            }
            message
        }
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.to_string(),
    }
}
