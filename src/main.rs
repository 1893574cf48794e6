use std::path::Path;

mod config;
mod error;
mod pipeline;
mod supabase;
mod telemetry;

use config::Config;
use error::AppResult;
use pipeline::RunOutcome;
use supabase::SupabaseClient;
use telemetry::init_telemetry;

async fn generate(config: &Config) -> AppResult<RunOutcome> {
    let client = SupabaseClient::new(config)?;
    let mut stdout = std::io::stdout();
    pipeline::run(&client, Path::new("."), &mut stdout).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Fails before any network access when SUPABASE_URL or SUPABASE_KEY is absent
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        environment = %config.environment,
        supabase_url = %config.supabase_url,
        "Starting ticket-order-report"
    );

    let result = generate(&config).await;

    match &result {
        Ok(outcome) => tracing::info!(
            preview_rows = outcome.preview_rows,
            rendered = outcome.rendered.len(),
            skipped = outcome.skipped.len(),
            "Report complete"
        ),
        Err(e) => tracing::error!(error = %e, error.kind = e.kind(), "Report failed"),
    }

    telemetry_guard.shutdown();

    result?;
    Ok(())
}
