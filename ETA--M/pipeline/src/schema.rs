//! Encoding tables and the column layout shared by training and every serving front.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

/// Version of the feature layout produced by this crate. Bump on any change to the
/// engineered columns, the encoding tables or the tokenizer.
pub const SCHEMA_VERSION: u32 = 1;

/// Code assigned to missing or unknown categorical values. Never a real code.
pub const SENTINEL_CODE: i32 = -1;

/// Prefix applied to vectorizer vocabulary terms to form column names.
pub const TFIDF_PREFIX: &str = "tfidf:";

/// Engineered columns, in model order. Vocabulary columns follow.
pub const ENGINEERED_COLUMNS: [&str; 6] = [
    "priority",
    "category",
    "department",
    "description_length",
    "created_hour",
    "created_day_of_week",
];

/// Builds the column name for a vocabulary term.
#[must_use]
pub fn tfidf_column(term: &str) -> String {
    format!("{TFIDF_PREFIX}{term}")
}

/// Categorical ticket fields with a fixed encoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalField {
    /// Ticket priority.
    Priority,
    /// Ticket category.
    Category,
    /// Owning department.
    Department,
}

impl CategoricalField {
    /// Every categorical field in column order.
    pub const ALL: [Self; 3] = [Self::Priority, Self::Category, Self::Department];

    /// Column header used by the data source and the inference request.
    #[must_use]
    pub const fn source_name(self) -> &'static str {
        match self {
            Self::Priority => "Priority",
            Self::Category => "Category",
            Self::Department => "Department",
        }
    }
}

/// Behaviour for categorical values outside the encoding table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCategoryPolicy {
    /// Encode as [`SENTINEL_CODE`].
    #[default]
    Sentinel,
    /// Fail with [`PipelineError::Encoding`].
    Reject,
}

/// Fixed string-to-code map for one categorical field. A value's code is its index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncodingTable {
    field: CategoricalField,
    values: Vec<String>,
}

impl EncodingTable {
    fn new(field: CategoricalField, values: &[&str]) -> Self {
        Self {
            field,
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Field this table encodes.
    #[must_use]
    pub const fn field(&self) -> CategoricalField {
        self.field
    }

    /// Known values in code order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Looks up a value; matching ignores surrounding whitespace and ASCII case.
    #[must_use]
    pub fn code(&self, value: &str) -> Option<i32> {
        let needle = value.trim();
        self.values
            .iter()
            .position(|known| known.eq_ignore_ascii_case(needle))
            .and_then(|idx| i32::try_from(idx).ok())
    }
}

/// The complete set of encoding tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncodingTables {
    /// Priority table.
    pub priority: EncodingTable,
    /// Category table.
    pub category: EncodingTable,
    /// Department table.
    pub department: EncodingTable,
}

impl EncodingTables {
    /// The tables compiled into this build.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            priority: EncodingTable::new(
                CategoricalField::Priority,
                &["Low", "Medium", "High", "Urgent"],
            ),
            category: EncodingTable::new(
                CategoricalField::Category,
                &[
                    "Hardware",
                    "Software",
                    "Network",
                    "Access Request",
                    "Bug Report",
                ],
            ),
            department: EncodingTable::new(
                CategoricalField::Department,
                &["IT", "HR", "Finance", "Engineering", "Support"],
            ),
        }
    }

    /// Returns the table for a field.
    #[must_use]
    pub const fn table(&self, field: CategoricalField) -> &EncodingTable {
        match field {
            CategoricalField::Priority => &self.priority,
            CategoricalField::Category => &self.category,
            CategoricalField::Department => &self.department,
        }
    }

    /// Encodes a possibly-missing value. Missing and blank values always take the
    /// sentinel; unknown values follow `policy`.
    pub fn encode(
        &self,
        field: CategoricalField,
        value: Option<&str>,
        policy: UnknownCategoryPolicy,
    ) -> PipelineResult<i32> {
        let Some(raw) = value.filter(|v| !v.trim().is_empty()) else {
            return Ok(SENTINEL_CODE);
        };
        match (self.table(field).code(raw), policy) {
            (Some(code), _) => Ok(code),
            (None, UnknownCategoryPolicy::Sentinel) => Ok(SENTINEL_CODE),
            (None, UnknownCategoryPolicy::Reject) => Err(PipelineError::Encoding {
                field: field.source_name(),
                value: raw.to_string(),
            }),
        }
    }
}

/// Layout and statistics recorded by a training run and required by every server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainedSchema {
    /// Layout version the run was produced with.
    pub schema_version: u32,
    /// Training run identifier shared by all artifacts of the run.
    pub run_id: Uuid,
    /// Completion time of the run.
    pub trained_at: DateTime<Utc>,
    /// Encoding tables used during training.
    pub encoding: EncodingTables,
    /// Engineered columns, in order.
    pub engineered_columns: Vec<String>,
    /// Vocabulary columns, in order.
    pub vocabulary_columns: Vec<String>,
    /// Quantile used for the outlier cutoff.
    pub outlier_quantile: f64,
    /// Resolution-time cutoff computed on the training batch, in hours.
    pub outlier_cutoff_hours: f64,
    /// Rows that reached the assembler.
    pub training_rows: usize,
}

impl TrainedSchema {
    /// Full column list in model order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.engineered_columns
            .iter()
            .chain(&self.vocabulary_columns)
            .cloned()
            .collect()
    }

    /// Fails unless `columns` equals the trained layout exactly (names, order, count).
    pub fn verify_columns(&self, columns: &[String]) -> PipelineResult<()> {
        let expected = self.columns();
        if expected.len() != columns.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "expected {} columns, assembled {}",
                expected.len(),
                columns.len()
            )));
        }
        if let Some((idx, (want, got))) = expected
            .iter()
            .zip(columns)
            .enumerate()
            .find(|(_, (want, got))| want != got)
        {
            return Err(PipelineError::SchemaMismatch(format!(
                "column {idx}: expected {want:?}, assembled {got:?}"
            )));
        }
        Ok(())
    }

    /// Fails when the schema was produced by an incompatible build.
    pub fn verify_compatible(&self) -> PipelineResult<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(PipelineError::SchemaMismatch(format!(
                "artifact schema version {} but this build uses {SCHEMA_VERSION}",
                self.schema_version
            )));
        }
        if self.encoding != EncodingTables::standard() {
            return Err(PipelineError::SchemaMismatch(
                "encoding tables differ from the tables compiled into this build".into(),
            ));
        }
        if self.engineered_columns != ENGINEERED_COLUMNS {
            return Err(PipelineError::SchemaMismatch(format!(
                "engineered columns {:?} differ from {ENGINEERED_COLUMNS:?}",
                self.engineered_columns
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TrainedSchema {
        TrainedSchema {
            schema_version: SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            encoding: EncodingTables::standard(),
            engineered_columns: ENGINEERED_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            vocabulary_columns: vec![tfidf_column("outlook"), tfidf_column("vpn")],
            outlier_quantile: 0.95,
            outlier_cutoff_hours: 48.0,
            training_rows: 10,
        }
    }

    #[test]
    fn codes_follow_table_order() {
        let tables = EncodingTables::standard();
        let policy = UnknownCategoryPolicy::Sentinel;
        let encode = |field, value| tables.encode(field, Some(value), policy).unwrap();
        assert_eq!(encode(CategoricalField::Priority, "Urgent"), 3);
        assert_eq!(encode(CategoricalField::Category, "Hardware"), 0);
        assert_eq!(encode(CategoricalField::Category, " bug report "), 4);
        assert_eq!(encode(CategoricalField::Department, "IT"), 0);
    }

    #[test]
    fn unknown_and_missing_take_sentinel() {
        let tables = EncodingTables::standard();
        let policy = UnknownCategoryPolicy::Sentinel;
        let unknown = tables
            .encode(CategoricalField::Category, Some("Unknown Category"), policy)
            .unwrap();
        let missing = tables
            .encode(CategoricalField::Category, None, policy)
            .unwrap();
        let blank = tables
            .encode(CategoricalField::Category, Some("  "), policy)
            .unwrap();
        assert_eq!(unknown, SENTINEL_CODE);
        assert_eq!(missing, SENTINEL_CODE);
        assert_eq!(blank, SENTINEL_CODE);
        assert_ne!(unknown, tables.category.code("Hardware").unwrap());
    }

    #[test]
    fn reject_policy_raises_encoding_error() {
        let err = EncodingTables::standard()
            .encode(
                CategoricalField::Department,
                Some("Legal"),
                UnknownCategoryPolicy::Reject,
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Encoding { field: "Department", .. }));
    }

    #[test]
    fn verify_columns_accepts_exact_layout() {
        let schema = schema();
        schema.verify_columns(&schema.columns()).unwrap();
    }

    #[test]
    fn verify_columns_rejects_shuffled_and_missing() {
        let schema = schema();
        let mut shuffled = schema.columns();
        shuffled.swap(0, 1);
        assert!(matches!(
            schema.verify_columns(&shuffled),
            Err(PipelineError::SchemaMismatch(_))
        ));
        let mut missing = schema.columns();
        missing.pop();
        assert!(matches!(
            schema.verify_columns(&missing),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn incompatible_versions_fail_fast() {
        let mut schema = schema();
        schema.verify_compatible().unwrap();
        schema.schema_version += 1;
        assert!(schema.verify_compatible().is_err());
    }
}
