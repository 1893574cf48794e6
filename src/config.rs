use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_key: String,
    pub environment: String,
    pub request_timeout: Duration,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let supabase_url = var("SUPABASE_URL")
            .ok_or_else(|| AppError::Config("SUPABASE_URL must be set".into()))?;
        let supabase_key = var("SUPABASE_KEY")
            .ok_or_else(|| AppError::Config("SUPABASE_KEY must be set".into()))?;

        let request_timeout_secs: u64 = match var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| {
                AppError::Config(format!("REQUEST_TIMEOUT_SECS must be a number, got {raw:?}"))
            })?,
            None => 30,
        };
        if request_timeout_secs == 0 {
            return Err(AppError::Config(
                "REQUEST_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            supabase_url,
            supabase_key,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            otel_service_name: var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "ticket-order-report".to_string()),
            otel_exporter_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("request_timeout", &self.request_timeout)
            .field("otel_service_name", &self.otel_service_name)
            .field("otel_exporter_endpoint", &self.otel_exporter_endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_required_values_only() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_KEY", "anon-key"),
        ]))
        .unwrap();

        assert_eq!(config.supabase_url, "https://abc.supabase.co");
        assert_eq!(config.supabase_key, "anon-key");
        assert_eq!(config.environment, "development");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.otel_service_name, "ticket-order-report");
        assert!(config.otel_exporter_endpoint.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_url() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_KEY", "anon-key")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: SUPABASE_URL must be set");
    }

    #[test]
    fn test_missing_key() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_URL", "https://abc.supabase.co")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: SUPABASE_KEY must be set");
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_optional_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_KEY", "anon-key"),
            ("ENVIRONMENT", "production"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("OTEL_SERVICE_NAME", "reports"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
        ]))
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.otel_service_name, "reports");
        assert_eq!(
            config.otel_exporter_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }

    #[test]
    fn test_invalid_timeout() {
        for raw in ["soon", "0", "-1"] {
            let err = Config::from_lookup(lookup(&[
                ("SUPABASE_URL", "https://abc.supabase.co"),
                ("SUPABASE_KEY", "anon-key"),
                ("REQUEST_TIMEOUT_SECS", raw),
            ]))
            .unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "accepted {raw}");
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_KEY", "super-secret"),
        ]))
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
