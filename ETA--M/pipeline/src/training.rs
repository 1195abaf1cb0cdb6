//! End-to-end training run: clean, engineer, vectorize, assemble, fit, evaluate, persist.

use std::fmt::Write as _;

use chrono::Utc;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    artifacts::{ArtifactBundle, ArtifactPaths, ArtifactStore},
    assembler::Assembler,
    cleaner::{CleanReport, CleanedTicket},
    config::PipelineConfig,
    error::{PipelineError, PipelineResult},
    features::{EngineeredFeatures, FeatureEngineer},
    model::{
        train_test_split, Evaluation, GradientBoostingModel, LinearRegressionModel, ModelChoice,
        Regressor, Split, TrainedModel,
    },
    record::RawTicket,
    schema::{EncodingTables, TrainedSchema, ENGINEERED_COLUMNS, SCHEMA_VERSION},
    source::load_tickets_csv,
    telemetry::PipelineTelemetry,
};

/// Training and held-out scores of one fitted candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateReport {
    /// Model name.
    pub model: String,
    /// Mean squared error on the training split.
    pub train_mse: f64,
    /// Scores on the held-out split.
    pub evaluation: Evaluation,
}

/// Report describing one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Identifier stamped on every artifact of the run.
    pub run_id: Uuid,
    /// Cleaning accounting.
    pub cleaning: CleanReport,
    /// Rows dropped because a categorical value could not be encoded.
    pub dropped_encoding: usize,
    /// Rows that reached the assembler.
    pub training_rows: usize,
    /// Held-out rows.
    pub test_rows: usize,
    /// Learned vocabulary size.
    pub vocabulary_size: usize,
    /// Total feature columns.
    pub feature_count: usize,
    /// Every fitted candidate.
    pub candidates: Vec<CandidateReport>,
    /// Name of the persisted model.
    pub selected: String,
    /// Written artifacts, when the run was persisted.
    pub artifacts: Option<ArtifactPaths>,
}

impl TrainingReport {
    /// Scores of the persisted model.
    #[must_use]
    pub fn selected_candidate(&self) -> Option<&CandidateReport> {
        self.candidates.iter().find(|c| c.model == self.selected)
    }

    /// Renders a concise multi-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "[train] run={} rows_read={} malformed={} kept={} cutoff={:.2}h vocabulary={} features={}",
            self.run_id,
            self.cleaning.rows_read,
            self.cleaning.dropped_malformed,
            self.training_rows,
            self.cleaning.outlier_cutoff_hours,
            self.vocabulary_size,
            self.feature_count
        );
        for candidate in &self.candidates {
            let marker = if candidate.model == self.selected { "*" } else { " " };
            let _ = write!(
                out,
                "\n{marker} model={} mae={:.2}h rmse={:.2}h r2={:.2}",
                candidate.model,
                candidate.evaluation.mae,
                candidate.evaluation.rmse,
                candidate.evaluation.r2
            );
        }
        out
    }
}

/// Fitted artifacts and the report of a run that has not been persisted.
#[derive(Debug, Clone)]
pub struct TrainedRun {
    /// Schema, vectorizer and model.
    pub bundle: ArtifactBundle,
    /// Run report; `artifacts` is unset.
    pub report: TrainingReport,
}

/// Training orchestrator driven by a [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: PipelineConfig,
    telemetry: PipelineTelemetry,
}

impl TrainingPipeline {
    /// Creates the orchestrator.
    #[must_use]
    pub const fn new(config: PipelineConfig, telemetry: PipelineTelemetry) -> Self {
        Self { config, telemetry }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loads the configured CSV, trains and persists the artifacts.
    pub fn run(&self) -> PipelineResult<TrainingReport> {
        let source = &self.config.data.source;
        let batch = load_tickets_csv(source)?;
        self.telemetry.record(
            if batch.malformed > 0 { LogLevel::Warn } else { LogLevel::Info },
            "train.loaded",
            json!({
                "source": source.display().to_string(),
                "rows": batch.rows.len(),
                "malformed": batch.malformed,
            }),
        );
        let mut trained = self.fit(batch.rows)?;
        trained.report.cleaning.dropped_malformed = batch.malformed;
        self.persist(trained)
    }

    /// Trains on `rows` and persists the artifacts.
    pub fn run_on(&self, rows: Vec<RawTicket>) -> PipelineResult<TrainingReport> {
        self.persist(self.fit(rows)?)
    }

    fn persist(&self, trained: TrainedRun) -> PipelineResult<TrainingReport> {
        let TrainedRun { bundle, mut report } = trained;
        let store = ArtifactStore::new(&self.config.artifacts.dir);
        let paths = store.save_bundle(&bundle)?;
        self.telemetry.record(
            LogLevel::Info,
            "train.persisted",
            json!({
                "run_id": report.run_id,
                "dir": store.dir().display().to_string(),
                "model": report.selected,
            }),
        );
        report.artifacts = Some(paths);
        Ok(report)
    }

    /// Trains on `rows` without touching the artifact directory.
    pub fn fit(&self, rows: Vec<RawTicket>) -> PipelineResult<TrainedRun> {
        let run_id = Uuid::new_v4();
        let (cleaned, cleaning) = self.config.cleaner().clean(rows)?;
        self.telemetry.record(
            LogLevel::Info,
            "clean.completed",
            serde_json::to_value(&cleaning).unwrap_or_default(),
        );

        let engineer = FeatureEngineer::new(EncodingTables::standard(), self.config.encoding.unknown);
        let (engineered, dropped_encoding) = self.engineer_rows(&engineer, &cleaned)?;

        let vectorizer = self
            .config
            .vectorizer
            .fit(engineered.iter().map(|(ticket, _)| ticket.raw.description_text()))?;
        let matrix = Assembler::new(&vectorizer).assemble(
            engineered
                .iter()
                .map(|(ticket, features)| (*features, ticket.raw.description.as_deref())),
        )?;
        let targets: Array1<f64> = engineered
            .iter()
            .map(|(ticket, _)| ticket.resolution_hours)
            .collect();
        self.telemetry.record(
            LogLevel::Info,
            "assemble.completed",
            json!({
                "rows": matrix.nrows(),
                "columns": matrix.columns().len(),
                "vocabulary": vectorizer.len(),
                "filled_cells": matrix.filled_cells(),
            }),
        );

        let settings = &self.config.model;
        let split = train_test_split(matrix.values(), targets.view(), settings.test_ratio, settings.seed);
        let mut linear = LinearRegressionModel::new(settings.linear);
        let mut boosted = GradientBoostingModel::new(settings.gradient_boosting);
        let linear_report = self.evaluate(&mut linear, &split)?;
        let boosted_report = self.evaluate(&mut boosted, &split)?;

        let pick_linear = match settings.kind {
            ModelChoice::Linear => true,
            ModelChoice::GradientBoosting => false,
            ModelChoice::Best => linear_report.evaluation.rmse < boosted_report.evaluation.rmse,
        };
        let model = if pick_linear {
            TrainedModel::Linear(linear)
        } else {
            TrainedModel::GradientBoosting(boosted)
        };

        let schema = TrainedSchema {
            schema_version: SCHEMA_VERSION,
            run_id,
            trained_at: Utc::now(),
            encoding: engineer.tables().clone(),
            engineered_columns: ENGINEERED_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            vocabulary_columns: vectorizer.columns(),
            outlier_quantile: self.config.cleaner().quantile(),
            outlier_cutoff_hours: cleaning.outlier_cutoff_hours,
            training_rows: matrix.nrows(),
        };
        schema.verify_columns(matrix.columns())?;

        let report = TrainingReport {
            run_id,
            cleaning,
            dropped_encoding,
            training_rows: matrix.nrows(),
            test_rows: split.y_test.len(),
            vocabulary_size: vectorizer.len(),
            feature_count: matrix.columns().len(),
            candidates: vec![linear_report, boosted_report],
            selected: model.name().to_string(),
            artifacts: None,
        };
        self.telemetry.record(
            LogLevel::Info,
            "train.completed",
            json!({
                "run_id": run_id,
                "selected": report.selected,
                "evaluation": report.selected_candidate().map(|c| c.evaluation),
            }),
        );
        Ok(TrainedRun {
            bundle: ArtifactBundle {
                schema,
                vectorizer,
                model,
            },
            report,
        })
    }

    fn engineer_rows<'c>(
        &self,
        engineer: &FeatureEngineer,
        cleaned: &'c [CleanedTicket],
    ) -> PipelineResult<(Vec<(&'c CleanedTicket, EngineeredFeatures)>, usize)> {
        let mut engineered = Vec::with_capacity(cleaned.len());
        let mut dropped = 0;
        for ticket in cleaned {
            match engineer.engineer_cleaned(ticket) {
                Ok(features) => engineered.push((ticket, features)),
                Err(err @ (PipelineError::Encoding { .. } | PipelineError::Timestamp { .. })) => {
                    dropped += 1;
                    self.telemetry.record(
                        LogLevel::Debug,
                        "engineer.row_dropped",
                        json!({ "ticket": ticket.raw.ticket_id, "reason": err.to_string() }),
                    );
                }
                Err(err) => return Err(err),
            }
        }
        if engineered.len() < 2 {
            return Err(PipelineError::Data(format!(
                "{} rows survived cleaning and encoding; at least 2 are needed to train",
                engineered.len()
            )));
        }
        Ok((engineered, dropped))
    }

    fn evaluate(
        &self,
        model: &mut dyn Regressor,
        split: &Split,
    ) -> PipelineResult<CandidateReport> {
        let train_mse = model.fit(split.x_train.view(), split.y_train.view())?;
        let predictions = model
            .predict(split.x_test.view())
            .mapv(|hours| hours.max(0.0));
        let evaluation = Evaluation::score(predictions.view(), split.y_test.view());
        self.telemetry.record(
            LogLevel::Info,
            "model.evaluated",
            json!({
                "model": model.name(),
                "train_mse": train_mse,
                "mae": evaluation.mae,
                "rmse": evaluation.rmse,
                "r2": evaluation.r2,
            }),
        );
        Ok(CandidateReport {
            model: model.name().to_string(),
            train_mse,
            evaluation,
        })
    }
}
