//! Final matrix assembly: engineered columns followed by vocabulary columns.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{
    error::{PipelineError, PipelineResult},
    features::EngineeredFeatures,
    schema::{TrainedSchema, ENGINEERED_COLUMNS},
    vectorizer::TfidfVectorizer,
};

/// Value written into absent engineered cells.
///
/// This is the fill policy of the pipeline: an absent cell (for example the hour
/// of a request without a creation time) is indistinguishable from a genuine zero
/// once assembled. Categorical fields never reach this path because missing
/// categories are encoded as the sentinel upstream.
pub const FILL_VALUE: f64 = 0.0;

/// Numeric model input with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
    filled_cells: usize,
}

impl FeatureMatrix {
    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row-major values, one row per ticket.
    #[must_use]
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// One row.
    #[must_use]
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    /// Number of rows.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Cells filled with [`FILL_VALUE`] during assembly.
    #[must_use]
    pub const fn filled_cells(&self) -> usize {
        self.filled_cells
    }

    /// Consumes the matrix, returning the raw values.
    #[must_use]
    pub fn into_values(self) -> Array2<f64> {
        self.values
    }
}

/// Concatenates engineered features with TF-IDF weights in the fixed column order.
/// Identifiers, raw text, raw timestamps and the target never become columns.
#[derive(Debug, Clone, Copy)]
pub struct Assembler<'a> {
    vectorizer: &'a TfidfVectorizer,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler over a fitted vectorizer.
    #[must_use]
    pub const fn new(vectorizer: &'a TfidfVectorizer) -> Self {
        Self { vectorizer }
    }

    /// Column names this assembler produces.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        ENGINEERED_COLUMNS
            .iter()
            .map(|c| (*c).to_string())
            .chain(self.vectorizer.columns())
            .collect()
    }

    /// Assembles rows of engineered features and their description text. Fails with
    /// [`crate::PipelineError::SchemaMismatch`] if the cells do not fill the layout.
    pub fn assemble<'t>(
        &self,
        rows: impl IntoIterator<Item = (EngineeredFeatures, Option<&'t str>)>,
    ) -> PipelineResult<FeatureMatrix> {
        let columns = self.columns();
        let width = columns.len();
        let mut flat = Vec::new();
        let mut filled_cells = 0;
        let mut nrows = 0;
        for (features, description) in rows {
            nrows += 1;
            for cell in features.values() {
                flat.push(cell.unwrap_or_else(|| {
                    filled_cells += 1;
                    FILL_VALUE
                }));
            }
            flat.extend(self.vectorizer.transform_optional(description));
        }
        let values = Array2::from_shape_vec((nrows, width), flat).map_err(|err| {
            PipelineError::SchemaMismatch(format!(
                "assembled cells do not fill {nrows} rows of {width} columns: {err}"
            ))
        })?;
        Ok(FeatureMatrix {
            columns,
            values,
            filled_cells,
        })
    }

    /// Assembles rows and fails with [`crate::PipelineError::SchemaMismatch`] unless
    /// the columns equal the trained layout.
    pub fn assemble_checked<'t>(
        &self,
        rows: impl IntoIterator<Item = (EngineeredFeatures, Option<&'t str>)>,
        schema: &TrainedSchema,
    ) -> PipelineResult<FeatureMatrix> {
        let matrix = self.assemble(rows)?;
        schema.verify_columns(matrix.columns())?;
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::{EncodingTables, SCHEMA_VERSION},
        vectorizer::TfidfConfig,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn vectorizer() -> TfidfVectorizer {
        TfidfConfig { max_features: 10 }
            .fit(["outlook crash", "vpn outage", "outlook vpn"])
            .unwrap()
    }

    fn features(hour: Option<u32>) -> EngineeredFeatures {
        EngineeredFeatures {
            priority: 2,
            category: -1,
            department: 0,
            description_length: 13,
            created_hour: hour,
            created_day_of_week: hour.map(|_| 4),
        }
    }

    fn schema_for(columns: &[String]) -> TrainedSchema {
        TrainedSchema {
            schema_version: SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            encoding: EncodingTables::standard(),
            engineered_columns: columns[..ENGINEERED_COLUMNS.len()].to_vec(),
            vocabulary_columns: columns[ENGINEERED_COLUMNS.len()..].to_vec(),
            outlier_quantile: 0.95,
            outlier_cutoff_hours: 10.0,
            training_rows: 3,
        }
    }

    #[test]
    fn columns_are_engineered_then_vocabulary() {
        let vectorizer = vectorizer();
        let columns = Assembler::new(&vectorizer).columns();
        assert_eq!(columns[0], "priority");
        assert_eq!(columns[5], "created_day_of_week");
        assert_eq!(
            &columns[6..],
            ["tfidf:crash", "tfidf:outage", "tfidf:outlook", "tfidf:vpn"]
        );
        assert!(!columns.iter().any(|c| c.contains("Ticket") || c.contains("Resolved")));
    }

    #[test]
    fn assembles_values_in_order() {
        let vectorizer = vectorizer();
        let matrix = Assembler::new(&vectorizer).assemble([(features(Some(9)), Some("outlook"))])
            .unwrap();
        assert_eq!(matrix.nrows(), 1);
        let row = matrix.row(0);
        assert_eq!(row[0], 2.0);
        assert_eq!(row[1], -1.0);
        assert_eq!(row[3], 13.0);
        assert_eq!(row[4], 9.0);
        assert_eq!(row[5], 4.0);
        assert!((row[8] - 1.0).abs() < 1e-12);
        assert_eq!(matrix.filled_cells(), 0);
    }

    #[test]
    fn absent_cells_are_filled_with_zero_and_counted() {
        let vectorizer = vectorizer();
        let matrix = Assembler::new(&vectorizer).assemble([(features(None), None)])
            .unwrap();
        let row = matrix.row(0);
        assert_eq!(row[4], FILL_VALUE);
        assert_eq!(row[5], FILL_VALUE);
        assert_eq!(matrix.filled_cells(), 2);
        assert!(row.iter().skip(6).all(|v| *v == 0.0));
    }

    #[test]
    fn row_count_follows_input() {
        let vectorizer = vectorizer();
        let assembler = Assembler::new(&vectorizer);
        let empty = assembler.assemble(std::iter::empty()).unwrap();
        assert_eq!(empty.nrows(), 0);
        assert_eq!(empty.values().ncols(), assembler.columns().len());

        let three = assembler
            .assemble([
                (features(Some(1)), Some("vpn")),
                (features(None), None),
                (features(Some(23)), Some("outlook crash")),
            ])
            .unwrap();
        assert_eq!(three.nrows(), 3);
        assert_eq!(three.filled_cells(), 2);
        assert_eq!(three.row(2)[4], 23.0);
    }

    #[test]
    fn checked_assembly_rejects_foreign_layout() {
        let vectorizer = vectorizer();
        let assembler = Assembler::new(&vectorizer);
        let mut columns = assembler.columns();
        assembler
            .assemble_checked([(features(Some(1)), Some("vpn"))], &schema_for(&columns))
            .unwrap();

        columns.swap(6, 7);
        let err = assembler
            .assemble_checked([(features(Some(1)), Some("vpn"))], &schema_for(&columns))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }
}
