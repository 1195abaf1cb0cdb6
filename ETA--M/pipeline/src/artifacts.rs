//! Versioned, atomically written training artifacts.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{PipelineError, PipelineResult},
    model::TrainedModel,
    schema::{TrainedSchema, SCHEMA_VERSION},
    vectorizer::TfidfVectorizer,
};

/// The three artifacts a training run produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Column layout, encoding tables and cutoff.
    Schema,
    /// Fitted TF-IDF state.
    Vectorizer,
    /// Fitted regressor.
    Model,
}

impl ArtifactKind {
    /// Short name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Vectorizer => "vectorizer",
            Self::Model => "model",
        }
    }

    /// File name inside the artifact directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Schema => "schema.json",
            Self::Vectorizer => "vectorizer.json",
            Self::Model => "model.json",
        }
    }
}

/// Envelope wrapping every persisted payload with its identity tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope<T> {
    /// Payload kind.
    pub kind: ArtifactKind,
    /// Layout version of the producing build.
    pub schema_version: u32,
    /// Training run that produced the payload.
    pub run_id: Uuid,
    /// Write time.
    pub created_at: DateTime<Utc>,
    /// The payload itself.
    pub payload: T,
}

/// A mutually consistent schema, vectorizer and model.
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    /// Trained layout.
    pub schema: TrainedSchema,
    /// Fitted vectorizer.
    pub vectorizer: TfidfVectorizer,
    /// Fitted model.
    pub model: TrainedModel,
}

/// Paths written by [`ArtifactStore::save_bundle`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Schema artifact.
    pub schema: PathBuf,
    /// Vectorizer artifact.
    pub vectorizer: PathBuf,
    /// Model artifact.
    pub model: PathBuf,
}

/// Directory-backed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `dir`; nothing is touched until the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of an artifact.
    #[must_use]
    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Writes one artifact: a unique temp file in the same directory is fully
    /// written and synced, then renamed over the target.
    pub fn save<T: Serialize>(
        &self,
        kind: ArtifactKind,
        run_id: Uuid,
        payload: &T,
    ) -> PipelineResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path(kind);
        let temp = self
            .dir
            .join(format!(".{}.{}.tmp", kind.file_name(), Uuid::new_v4()));
        let envelope = ArtifactEnvelope {
            kind,
            schema_version: SCHEMA_VERSION,
            run_id,
            created_at: Utc::now(),
            payload,
        };
        let written = (|| -> PipelineResult<()> {
            let mut writer = BufWriter::new(File::create(&temp)?);
            serde_json::to_writer(&mut writer, &envelope)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();
        if let Err(err) = written.and_then(|()| fs::rename(&temp, &target).map_err(Into::into)) {
            let _ = fs::remove_file(&temp);
            return Err(err);
        }
        Ok(target)
    }

    /// Reads one artifact, checking its kind and layout version.
    pub fn load<T: DeserializeOwned>(
        &self,
        kind: ArtifactKind,
    ) -> PipelineResult<ArtifactEnvelope<T>> {
        let path = self.path(kind);
        let file = File::open(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => PipelineError::ArtifactNotFound {
                kind: kind.as_str().into(),
                path: path.clone(),
            },
            _ => PipelineError::Io(err),
        })?;
        let envelope: ArtifactEnvelope<T> = serde_json::from_reader(BufReader::new(file))?;
        if envelope.kind != kind {
            return Err(PipelineError::SchemaMismatch(format!(
                "{} holds a {} artifact",
                path.display(),
                envelope.kind.as_str()
            )));
        }
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(PipelineError::SchemaMismatch(format!(
                "{} has schema version {} but this build uses {SCHEMA_VERSION}",
                path.display(),
                envelope.schema_version
            )));
        }
        Ok(envelope)
    }

    /// Persists a run's artifacts. The schema is written last so a reader never
    /// pairs a new schema with stale model files; partial runs surface as a
    /// run-id mismatch in [`Self::load_bundle`].
    pub fn save_bundle(&self, bundle: &ArtifactBundle) -> PipelineResult<ArtifactPaths> {
        let run_id = bundle.schema.run_id;
        let model = self.save(ArtifactKind::Model, run_id, &bundle.model)?;
        let vectorizer = self.save(ArtifactKind::Vectorizer, run_id, &bundle.vectorizer)?;
        let schema = self.save(ArtifactKind::Schema, run_id, &bundle.schema)?;
        Ok(ArtifactPaths {
            schema,
            vectorizer,
            model,
        })
    }

    /// Loads and cross-checks all three artifacts.
    pub fn load_bundle(&self) -> PipelineResult<ArtifactBundle> {
        let schema = self.load::<TrainedSchema>(ArtifactKind::Schema)?;
        let vectorizer = self.load::<TfidfVectorizer>(ArtifactKind::Vectorizer)?;
        let model = self.load::<TrainedModel>(ArtifactKind::Model)?;

        for (kind, run_id) in [
            (ArtifactKind::Vectorizer, vectorizer.run_id),
            (ArtifactKind::Model, model.run_id),
        ] {
            if run_id != schema.run_id {
                return Err(PipelineError::SchemaMismatch(format!(
                    "{} artifact belongs to run {run_id}, schema to run {}",
                    kind.as_str(),
                    schema.run_id
                )));
            }
        }
        let schema = schema.payload;
        schema.verify_compatible()?;
        let vectorizer = vectorizer.payload;
        vectorizer.validate()?;
        if vectorizer.columns() != schema.vocabulary_columns {
            return Err(PipelineError::SchemaMismatch(
                "vectorizer vocabulary differs from the recorded vocabulary columns".into(),
            ));
        }
        let model = model.payload;
        let width = schema.columns().len();
        if model.n_features() != width {
            return Err(PipelineError::SchemaMismatch(format!(
                "model fitted on {} features, schema records {width}",
                model.n_features()
            )));
        }
        Ok(ArtifactBundle {
            schema,
            vectorizer,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorizer::TfidfConfig;
    use tempfile::tempdir;

    #[test]
    fn missing_artifact_is_reported_by_kind() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        let err = store
            .load::<TfidfVectorizer>(ArtifactKind::Vectorizer)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ArtifactNotFound { ref kind, .. } if kind == "vectorizer"
        ));
        assert!(matches!(
            store.load_bundle(),
            Err(PipelineError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn save_is_atomic_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vectorizer = TfidfConfig::default().fit(["vpn outage", "outlook"]).unwrap();
        let run_id = Uuid::new_v4();
        store.save(ArtifactKind::Vectorizer, run_id, &vectorizer).unwrap();
        store.save(ArtifactKind::Vectorizer, run_id, &vectorizer).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["vectorizer.json".to_string()]);

        let loaded = store.load::<TfidfVectorizer>(ArtifactKind::Vectorizer).unwrap();
        assert_eq!(loaded.run_id, run_id);
        assert_eq!(loaded.payload, vectorizer);
    }

    #[test]
    fn wrong_kind_is_a_schema_mismatch() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vectorizer = TfidfConfig::default().fit(["vpn outage"]).unwrap();
        store
            .save(ArtifactKind::Vectorizer, Uuid::new_v4(), &vectorizer)
            .unwrap();
        fs::rename(
            store.path(ArtifactKind::Vectorizer),
            store.path(ArtifactKind::Model),
        )
        .unwrap();
        let err = store.load::<serde_json::Value>(ArtifactKind::Model).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }
}
