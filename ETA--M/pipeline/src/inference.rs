//! Serve-time prediction over a loaded, consistency-checked artifact bundle.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    artifacts::{ArtifactBundle, ArtifactStore},
    assembler::Assembler,
    error::{PipelineError, PipelineResult},
    features::FeatureEngineer,
    record::RawTicket,
    schema::{CategoricalField, TrainedSchema, UnknownCategoryPolicy, SENTINEL_CODE},
};

/// One prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    /// Predicted resolution time in hours, rounded to two decimals, never negative.
    pub hours: f64,
    /// Unrounded model output after clamping.
    pub raw_hours: f64,
    /// Engineered cells filled because the request lacked a creation time.
    pub filled_cells: usize,
    /// Categorical fields encoded as the sentinel.
    pub unknown_fields: Vec<String>,
}

/// Immutable predictor; share it behind an `Arc` across request handlers.
#[derive(Debug, Clone)]
pub struct Predictor {
    bundle: ArtifactBundle,
    engineer: FeatureEngineer,
}

impl Predictor {
    /// Loads the artifacts in `dir`, encoding unknown categories as the sentinel.
    pub fn load(dir: impl AsRef<Path>) -> PipelineResult<Self> {
        Self::load_with_policy(dir, UnknownCategoryPolicy::Sentinel)
    }

    /// Loads the artifacts in `dir` with an explicit unknown-category policy.
    pub fn load_with_policy(
        dir: impl AsRef<Path>,
        unknown: UnknownCategoryPolicy,
    ) -> PipelineResult<Self> {
        let bundle = ArtifactStore::new(dir.as_ref()).load_bundle()?;
        Self::from_bundle(bundle, unknown)
    }

    /// Wraps an in-memory bundle after checking that its parts agree.
    pub fn from_bundle(bundle: ArtifactBundle, unknown: UnknownCategoryPolicy) -> PipelineResult<Self> {
        bundle.schema.verify_compatible()?;
        bundle.vectorizer.validate()?;
        let assembled = Assembler::new(&bundle.vectorizer).columns();
        bundle.schema.verify_columns(&assembled)?;
        if bundle.model.n_features() != assembled.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "model expects {} features, layout has {}",
                bundle.model.n_features(),
                assembled.len()
            )));
        }
        let engineer = FeatureEngineer::new(bundle.schema.encoding.clone(), unknown);
        Ok(Self { bundle, engineer })
    }

    /// Trained layout.
    #[must_use]
    pub const fn schema(&self) -> &TrainedSchema {
        &self.bundle.schema
    }

    /// Run that produced the artifacts.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.bundle.schema.run_id
    }

    /// Persisted model name.
    #[must_use]
    pub fn model_name(&self) -> &'static str {
        self.bundle.model.name()
    }

    /// Vocabulary size.
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.bundle.vectorizer.len()
    }

    /// Predicts one ticket. `Resolved Time` and `Ticket ID` are ignored.
    pub fn predict(&self, ticket: &RawTicket) -> PipelineResult<Prediction> {
        let features = self.engineer.engineer(ticket)?;
        let matrix = Assembler::new(&self.bundle.vectorizer)
            .assemble_checked([(features, ticket.description.as_deref())], &self.bundle.schema)?;
        let raw_hours = self
            .bundle
            .model
            .predict_hours(matrix.values())?
            .first()
            .copied()
            .ok_or_else(|| PipelineError::Data("model returned no prediction".into()))?;
        let unknown_fields = CategoricalField::ALL
            .iter()
            .zip([features.priority, features.category, features.department])
            .filter(|(_, code)| *code == SENTINEL_CODE)
            .map(|(field, _)| field.source_name().to_string())
            .collect();
        Ok(Prediction {
            hours: round_hours(raw_hours),
            raw_hours,
            filled_cells: matrix.filled_cells(),
            unknown_fields,
        })
    }

    /// Predicts each ticket, failing on the first invalid one.
    pub fn predict_batch(&self, tickets: &[RawTicket]) -> PipelineResult<Vec<Prediction>> {
        tickets.iter().map(|ticket| self.predict(ticket)).collect()
    }
}

fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::ArtifactKind,
        config::PipelineConfig,
        model::BoostingParams,
        schema::ENGINEERED_COLUMNS,
        synthetic::synthetic_tickets,
        telemetry::PipelineTelemetry,
        training::{TrainedRun, TrainingPipeline},
    };
    use std::{fs, sync::OnceLock};
    use tempfile::{tempdir, TempDir};

    struct Trained {
        _dir: TempDir,
        store: ArtifactStore,
        run: TrainedRun,
    }

    fn trained() -> &'static Trained {
        static TRAINED: OnceLock<Trained> = OnceLock::new();
        TRAINED.get_or_init(|| {
            let dir = tempdir().unwrap();
            let mut config = PipelineConfig::default();
            config.artifacts.dir = dir.path().join("models");
            config.model.gradient_boosting = BoostingParams {
                rounds: 40,
                ..BoostingParams::default()
            };
            let run = TrainingPipeline::new(config.clone(), PipelineTelemetry::disabled("t"))
                .fit(synthetic_tickets(100, 42))
                .unwrap();
            let store = ArtifactStore::new(&config.artifacts.dir);
            store.save_bundle(&run.bundle).unwrap();
            Trained {
                _dir: dir,
                store,
                run,
            }
        })
    }

    fn ticket(category: &str, created: Option<&str>, description: Option<&str>) -> RawTicket {
        RawTicket {
            priority: Some("High".into()),
            category: Some(category.into()),
            department: Some("IT".into()),
            created_time: created.map(Into::into),
            description: description.map(Into::into),
            ..RawTicket::default()
        }
    }

    #[test]
    fn predicts_a_known_ticket() {
        let predictor = Predictor::load(trained().store.dir()).unwrap();
        let prediction = predictor
            .predict(&ticket(
                "Software",
                Some("2024-01-15T09:30:00"),
                Some("Outlook not working"),
            ))
            .unwrap();
        assert!(prediction.hours >= 0.0 && prediction.hours <= 500.0);
        assert!((prediction.hours * 100.0 - (prediction.hours * 100.0).round()).abs() < 1e-6);
        assert_eq!(prediction.filled_cells, 0);
        assert!(prediction.unknown_fields.is_empty());
        assert_eq!(predictor.run_id(), trained().run.report.run_id);
    }

    #[test]
    fn unknown_category_uses_the_sentinel() {
        let predictor = Predictor::load(trained().store.dir()).unwrap();
        let prediction = predictor
            .predict(&ticket(
                "Facilities",
                Some("2024-01-15T09:30:00"),
                Some("Outlook not working"),
            ))
            .unwrap();
        assert!(prediction.hours >= 0.0);
        assert_eq!(prediction.unknown_fields, vec!["Category".to_string()]);

        let strict =
            Predictor::load_with_policy(trained().store.dir(), UnknownCategoryPolicy::Reject)
                .unwrap();
        let err = strict
            .predict(&ticket("Facilities", None, Some("vpn")))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Encoding { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn empty_description_and_missing_time_are_filled() {
        let predictor = Predictor::load(trained().store.dir()).unwrap();
        let empty = predictor
            .predict(&ticket("Network", Some("2024-01-15 09:30"), Some("")))
            .unwrap();
        let missing = predictor
            .predict(&ticket("Network", Some("2024-01-15 09:30"), None))
            .unwrap();
        assert_eq!(empty, missing);

        let untimed = predictor
            .predict(&ticket("Network", None, Some("VPN client fails to connect")))
            .unwrap();
        assert_eq!(untimed.filled_cells, 2);

        let err = predictor
            .predict(&ticket("Network", Some("next tuesday"), None))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timestamp { .. }));
    }

    #[test]
    fn persisted_artifacts_predict_like_memory() {
        let trained = trained();
        let memory = Predictor::from_bundle(trained.run.bundle.clone(), UnknownCategoryPolicy::Sentinel)
            .unwrap();
        let loaded = Predictor::load(trained.store.dir()).unwrap();
        let tickets = synthetic_tickets(10, 99);
        assert_eq!(
            memory.predict_batch(&tickets).unwrap(),
            loaded.predict_batch(&tickets).unwrap()
        );
        assert_eq!(
            loaded.schema().columns().len(),
            ENGINEERED_COLUMNS.len() + loaded.vocabulary_size()
        );
    }

    #[test]
    fn reordered_vocabulary_is_rejected() {
        let mut bundle = trained().run.bundle.clone();
        bundle.schema.vocabulary_columns.reverse();
        let err = Predictor::from_bundle(bundle, UnknownCategoryPolicy::Sentinel).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));

        let mut bundle = trained().run.bundle.clone();
        bundle.schema.vocabulary_columns.pop();
        let err = Predictor::from_bundle(bundle, UnknownCategoryPolicy::Sentinel).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }

    #[test]
    fn artifacts_from_different_runs_are_rejected() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let bundle = &trained().run.bundle;
        store.save_bundle(bundle).unwrap();
        store
            .save(ArtifactKind::Model, Uuid::new_v4(), &bundle.model)
            .unwrap();
        assert!(matches!(
            Predictor::load(dir.path()),
            Err(PipelineError::SchemaMismatch(_))
        ));

        fs::remove_file(store.path(ArtifactKind::Model)).unwrap();
        assert!(matches!(
            Predictor::load(dir.path()),
            Err(PipelineError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn predictor_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Predictor>();
    }
}
