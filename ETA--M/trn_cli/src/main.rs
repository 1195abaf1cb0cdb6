mod manifest;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use chrono::{Datelike, Local, Utc};
use clap::{Parser, Subcommand};
use eta_pipeline::{
    synthetic_tickets, write_tickets_csv, ArtifactStore, PipelineConfig, PipelineTelemetry,
    Predictor, RawTicket, TrainingPipeline,
};
use manifest::{append_manifest, read_manifest, update_entry, RunManifestEntry, RunStatus};
use serde_json::{json, Value};
use shared_logging::LogLevel;

const DEFAULT_MANIFEST: &str = "logs/runs/index.jsonl";

#[derive(Parser, Debug)]
#[command(name = "trn", version, about = "Ticket resolution-time training CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains on the configured CSV and writes the artifacts.
    Train(TrainArgs),
    /// Predicts resolution hours for a ticket JSON file (object or array).
    Predict {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        ticket: PathBuf,
    },
    /// Prints the trained schema and model identity.
    Inspect {
        #[arg(long)]
        config: PathBuf,
    },
    /// Writes a synthetic ticket CSV.
    Synth {
        #[arg(long, default_value_t = 500)]
        rows: usize,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Queries the run manifest.
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RunsCommand {
    /// Lists most recent runs.
    List {
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Shows one run by job id or artifact run id.
    Status {
        run_id: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct TrainArgs {
    #[arg(long)]
    config: PathBuf,
    /// Overrides `[data] source`.
    #[arg(long)]
    data: Option<PathBuf>,
    /// Overrides `[artifacts] dir`.
    #[arg(long)]
    artifacts: Option<PathBuf>,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_MANIFEST)]
    manifest: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Train(args) => handle_train(args),
        Commands::Predict { config, ticket } => handle_predict(&config, &ticket),
        Commands::Inspect { config } => handle_inspect(&config),
        Commands::Synth { rows, out, seed } => {
            ensure!(rows > 0, "--rows must be positive");
            write_tickets_csv(&out, &synthetic_tickets(rows, seed))?;
            println!("wrote {rows} tickets to {}", out.display());
            Ok(())
        }
        Commands::Runs {
            command: RunsCommand::List { limit, manifest },
        } => {
            let entries = read_manifest(&manifest)?;
            for entry in entries.into_iter().rev().take(limit) {
                let rmse = entry
                    .evaluation
                    .map_or_else(|| "-".to_string(), |e| format!("{:.2}", e.rmse));
                println!(
                    "{} | {} | {} | {} | rmse={}",
                    entry.job_id,
                    entry.status,
                    entry.submitted_at,
                    entry.model.as_deref().unwrap_or("-"),
                    rmse
                );
            }
            Ok(())
        }
        Commands::Runs {
            command: RunsCommand::Status { run_id, manifest },
        } => {
            let entries = read_manifest(&manifest)?;
            if let Some(entry) = entries.into_iter().find(|e| e.matches(&run_id)) {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("run {run_id} not found");
            }
            Ok(())
        }
    }
}

fn handle_train(args: TrainArgs) -> Result<()> {
    ensure!(
        args.config.exists(),
        "config file {} not found",
        args.config.display()
    );
    let mut config = PipelineConfig::load(&args.config)?;
    if let Some(data) = args.data {
        config.data.source = data;
    }
    if let Some(artifacts) = args.artifacts {
        config.artifacts.dir = artifacts;
    }
    let log_path = match &config.logging.path {
        Some(path) => path.clone(),
        None => compute_log_path(&args.log_dir)?,
    };

    let entry = RunManifestEntry::new(
        args.config.clone(),
        config.data.source.clone(),
        config.artifacts.dir.clone(),
        log_path.clone(),
    );
    append_manifest(&args.manifest, &entry)?;

    let telemetry = PipelineTelemetry::builder("trn")
        .settings(&config.logging)?
        .log_path(&log_path)
        .build()?;
    telemetry.log(
        LogLevel::Info,
        "run.queued",
        json!({ "job_id": entry.job_id, "config": entry.config, "data": entry.data }),
    )?;

    update_entry(&args.manifest, &entry.job_id, |e| e.status = RunStatus::Running)?;
    telemetry.log(LogLevel::Info, "run.started", json!({ "job_id": entry.job_id }))?;

    let outcome = TrainingPipeline::new(config, telemetry.clone())
        .run()
        .context("training failed");
    match outcome {
        Ok(report) => {
            update_entry(&args.manifest, &entry.job_id, |e| e.complete(&report))?;
            telemetry.log(
                LogLevel::Info,
                "run.completed",
                json!({ "job_id": entry.job_id, "run_id": report.run_id }),
            )?;
            println!("{}", report.summary());
            println!("job {} completed; log {}", entry.job_id, log_path.display());
            Ok(())
        }
        Err(err) => {
            update_entry(&args.manifest, &entry.job_id, |e| e.fail(&err))?;
            telemetry.log(
                LogLevel::Error,
                "run.failed",
                json!({ "job_id": entry.job_id, "error": format!("{err:#}") }),
            )?;
            Err(err)
        }
    }
}

fn handle_predict(config: &Path, ticket: &Path) -> Result<()> {
    let config = PipelineConfig::load(config)?;
    let predictor = Predictor::load_with_policy(&config.artifacts.dir, config.encoding.unknown)
        .with_context(|| format!("loading artifacts from {}", config.artifacts.dir.display()))?;
    let raw = fs::read_to_string(ticket)
        .with_context(|| format!("reading ticket {}", ticket.display()))?;
    let tickets = parse_tickets(&raw)?;
    let mut responses = Vec::with_capacity(tickets.len());
    for ticket in &tickets {
        let prediction = predictor.predict(ticket)?;
        responses.push(json!({
            "Ticket ID": ticket.ticket_id,
            "predicted_resolution_time_hours": prediction.hours,
        }));
    }
    let output = match responses.as_slice() {
        [single] => single.clone(),
        _ => Value::Array(responses),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_tickets(raw: &str) -> Result<Vec<RawTicket>> {
    let value: Value = serde_json::from_str(raw).context("ticket file is not valid JSON")?;
    let tickets = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<RawTicket>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    ensure!(!tickets.is_empty(), "ticket file holds no tickets");
    Ok(tickets)
}

fn handle_inspect(config: &Path) -> Result<()> {
    let config = PipelineConfig::load(config)?;
    let bundle = ArtifactStore::new(&config.artifacts.dir).load_bundle()?;
    let schema = &bundle.schema;
    let terms: Vec<&str> = bundle.vectorizer.terms().collect();
    let summary = json!({
        "run_id": schema.run_id,
        "schema_version": schema.schema_version,
        "trained_at": schema.trained_at,
        "model": bundle.model.name(),
        "training_rows": schema.training_rows,
        "outlier_quantile": schema.outlier_quantile,
        "outlier_cutoff_hours": schema.outlier_cutoff_hours,
        "engineered_columns": schema.engineered_columns,
        "vocabulary": terms,
        "encoding": schema.encoding,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn compute_log_path(base: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!(
        "train-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}
