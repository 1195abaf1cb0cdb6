//! Derived ticket features and categorical encoding.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
    cleaner::CleanedTicket,
    error::PipelineResult,
    record::RawTicket,
    schema::{CategoricalField, EncodingTables, UnknownCategoryPolicy, ENGINEERED_COLUMNS},
};

/// Engineered, non-text features of one ticket.
///
/// Hour and weekday are `None` when a serve request carries no creation time; the
/// assembler decides how absent cells are filled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineeredFeatures {
    /// Priority code or the sentinel.
    pub priority: i32,
    /// Category code or the sentinel.
    pub category: i32,
    /// Department code or the sentinel.
    pub department: i32,
    /// Character count of the description, 0 when missing.
    pub description_length: usize,
    /// Creation hour, 0-23.
    pub created_hour: Option<u32>,
    /// Creation weekday, 0 = Monday ... 6 = Sunday.
    pub created_day_of_week: Option<u32>,
}

impl EngineeredFeatures {
    /// Values in [`ENGINEERED_COLUMNS`] order.
    #[must_use]
    pub fn values(&self) -> [Option<f64>; ENGINEERED_COLUMNS.len()] {
        [
            Some(f64::from(self.priority)),
            Some(f64::from(self.category)),
            Some(f64::from(self.department)),
            Some(self.description_length as f64),
            self.created_hour.map(f64::from),
            self.created_day_of_week.map(f64::from),
        ]
    }
}

/// Applies the shared encoding tables and derives length/time features.
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    tables: EncodingTables,
    unknown: UnknownCategoryPolicy,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(EncodingTables::standard(), UnknownCategoryPolicy::default())
    }
}

impl FeatureEngineer {
    /// Creates an engineer over the given tables.
    #[must_use]
    pub const fn new(tables: EncodingTables, unknown: UnknownCategoryPolicy) -> Self {
        Self { tables, unknown }
    }

    /// Encoding tables in use.
    #[must_use]
    pub const fn tables(&self) -> &EncodingTables {
        &self.tables
    }

    /// Engineers a serve-time request. A malformed creation time is a
    /// [`crate::PipelineError::Timestamp`]; a missing one leaves the time cells absent.
    pub fn engineer(&self, ticket: &RawTicket) -> PipelineResult<EngineeredFeatures> {
        let created_at = ticket.created_at()?.map(|at| at.naive_local());
        self.engineer_at(ticket, created_at)
    }

    /// Engineers a cleaned training row, reusing its parsed creation time.
    pub fn engineer_cleaned(&self, ticket: &CleanedTicket) -> PipelineResult<EngineeredFeatures> {
        self.engineer_at(&ticket.raw, Some(ticket.created_at))
    }

    fn engineer_at(
        &self,
        ticket: &RawTicket,
        created_at: Option<NaiveDateTime>,
    ) -> PipelineResult<EngineeredFeatures> {
        let encode = |field, value: &Option<String>| {
            self.tables.encode(field, value.as_deref(), self.unknown)
        };
        Ok(EngineeredFeatures {
            priority: encode(CategoricalField::Priority, &ticket.priority)?,
            category: encode(CategoricalField::Category, &ticket.category)?,
            department: encode(CategoricalField::Department, &ticket.department)?,
            description_length: ticket.description_text().chars().count(),
            created_hour: created_at.map(|at| at.hour()),
            created_day_of_week: created_at.map(|at| at.weekday().num_days_from_monday()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::PipelineError, schema::SENTINEL_CODE};

    fn request(category: &str, description: Option<&str>) -> RawTicket {
        RawTicket {
            priority: Some("High".into()),
            category: Some(category.into()),
            department: Some("IT".into()),
            created_time: Some("2024-01-15T09:30:00".into()),
            description: description.map(Into::into),
            ..RawTicket::default()
        }
    }

    #[test]
    fn derives_time_and_length_features() {
        let features = FeatureEngineer::default()
            .engineer(&request("Software", Some("Outlook not working")))
            .unwrap();
        assert_eq!(features.priority, 2);
        assert_eq!(features.category, 1);
        assert_eq!(features.department, 0);
        assert_eq!(features.description_length, 19);
        assert_eq!(features.created_hour, Some(9));
        // 2024-01-15 is a Monday.
        assert_eq!(features.created_day_of_week, Some(0));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let features = FeatureEngineer::default()
            .engineer(&request("Network", Some("café wifi")))
            .unwrap();
        assert_eq!(features.description_length, 9);
    }

    #[test]
    fn empty_description_has_zero_length() {
        let engineer = FeatureEngineer::default();
        assert_eq!(
            engineer.engineer(&request("Network", None)).unwrap().description_length,
            0
        );
        assert_eq!(
            engineer.engineer(&request("Network", Some(""))).unwrap().description_length,
            0
        );
    }

    #[test]
    fn unknown_category_uses_sentinel() {
        let features = FeatureEngineer::default()
            .engineer(&request("Unknown Category Not In Training", Some("x")))
            .unwrap();
        assert_eq!(features.category, SENTINEL_CODE);
        assert_eq!(features.values()[1], Some(-1.0));
    }

    #[test]
    fn reject_policy_propagates_encoding_error() {
        let engineer =
            FeatureEngineer::new(EncodingTables::standard(), UnknownCategoryPolicy::Reject);
        let err = engineer
            .engineer(&request("Printers", Some("jam")))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Encoding { field: "Category", .. }));
    }

    #[test]
    fn missing_created_time_leaves_cells_absent() {
        let mut ticket = request("Software", Some("x"));
        ticket.created_time = None;
        let features = FeatureEngineer::default().engineer(&ticket).unwrap();
        assert_eq!(features.values()[4], None);
        assert_eq!(features.values()[5], None);
    }

    #[test]
    fn malformed_created_time_is_categorized() {
        let mut ticket = request("Software", Some("x"));
        ticket.created_time = Some("15/01/2024 nine-ish".into());
        let err = FeatureEngineer::default().engineer(&ticket).unwrap_err();
        assert_eq!(err.kind(), "timestamp_error");
    }
}
