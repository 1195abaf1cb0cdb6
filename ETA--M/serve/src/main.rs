use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use eta_pipeline::{PipelineConfig, PipelineTelemetry, Predictor};
use eta_serve::{router, AppState};
use serde_json::json;
use shared_logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "eta-serve", about = "Ticket resolution-time prediction server")]
struct Args {
    /// Pipeline configuration (TOML).
    #[arg(long, default_value = "eta.toml")]
    config: PathBuf,
    /// Overrides `[serve] bind`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = PipelineConfig::load(&args.config)?;
    let telemetry = PipelineTelemetry::builder("serve")
        .settings(&config.logging)?
        .build()?;
    let predictor = Predictor::load_with_policy(&config.artifacts.dir, config.encoding.unknown)
        .with_context(|| {
            format!(
                "loading artifacts from {}; run `trn train` first",
                config.artifacts.dir.display()
            )
        })?;
    let bind = args.bind.unwrap_or_else(|| config.serve.bind.clone());
    telemetry.log(
        LogLevel::Info,
        "serve.starting",
        json!({
            "bind": bind,
            "run_id": predictor.run_id(),
            "model": predictor.model_name(),
        }),
    )?;

    let app = router(Arc::new(AppState {
        predictor,
        telemetry: telemetry.clone(),
    }));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    println!("eta-serve listening on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    telemetry.log(LogLevel::Info, "serve.stopped", json!({}))?;
    Ok(())
}
