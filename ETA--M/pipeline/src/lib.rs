#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Ticket resolution-time pipeline: cleaning, categorical encoding, TF-IDF, feature
//! assembly, regressor training and consistent serve-time inference.

/// Persisted schema, vectorizer and model artifacts.
pub mod artifacts;
/// Fixed-order concatenation of engineered and text features.
pub mod assembler;
/// Training-time row hygiene.
pub mod cleaner;
/// TOML configuration.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Engineered features and categorical encoding.
pub mod features;
/// Serve-time prediction.
pub mod inference;
/// Regressors and evaluation.
pub mod model;
/// Raw ticket records and timestamp parsing.
pub mod record;
/// Encoding tables and the trained column layout.
pub mod schema;
/// CSV data source.
pub mod source;
/// Seeded synthetic tickets.
pub mod synthetic;
/// Telemetry helpers for structured logging.
pub mod telemetry;
/// Training orchestration.
pub mod training;
/// TF-IDF text vectorizer.
pub mod vectorizer;

pub use artifacts::{ArtifactBundle, ArtifactKind, ArtifactStore};
pub use assembler::{Assembler, FeatureMatrix, FILL_VALUE};
pub use cleaner::{CleanReport, CleanedTicket, Cleaner, NegativeDurationPolicy};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use features::{EngineeredFeatures, FeatureEngineer};
pub use inference::{Prediction, Predictor};
pub use model::{ModelChoice, Regressor, TrainedModel};
pub use record::RawTicket;
pub use schema::{
    CategoricalField, EncodingTables, TrainedSchema, UnknownCategoryPolicy, SCHEMA_VERSION,
    SENTINEL_CODE,
};
pub use source::{load_tickets_csv, write_tickets_csv, TicketBatch};
pub use synthetic::synthetic_tickets;
pub use telemetry::PipelineTelemetry;
pub use training::{TrainingPipeline, TrainingReport};
pub use vectorizer::{TfidfConfig, TfidfVectorizer};
