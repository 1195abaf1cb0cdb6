//! Raw ticket rows as produced by the data source or received by a serving front.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::error::{PipelineError, PipelineResult};

/// Header of the creation timestamp column.
pub const CREATED_TIME: &str = "Created Time";
/// Header of the resolution timestamp column.
pub const RESOLVED_TIME: &str = "Resolved Time";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// One raw ticket. Every field is optional; the cleaner and the feature engineer
/// decide what is required. The inference request uses the same shape, with
/// `resolved_time` ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTicket {
    /// Informational identifier. Numeric ids are accepted and kept as text.
    #[serde(rename = "Ticket ID", default, deserialize_with = "lenient_id")]
    pub ticket_id: Option<String>,
    /// Creation timestamp, unparsed.
    #[serde(rename = "Created Time", default)]
    pub created_time: Option<String>,
    /// Resolution timestamp, unparsed. Training only.
    #[serde(rename = "Resolved Time", default)]
    pub resolved_time: Option<String>,
    /// Priority label.
    #[serde(rename = "Priority", default)]
    pub priority: Option<String>,
    /// Category label.
    #[serde(rename = "Category", default)]
    pub category: Option<String>,
    /// Department label.
    #[serde(rename = "Department", default)]
    pub department: Option<String>,
    /// Free-text description.
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
}

impl RawTicket {
    /// Description text, with a missing value read as the empty string.
    #[must_use]
    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Parses the creation timestamp, `None` when absent or blank.
    pub fn created_at(&self) -> PipelineResult<Option<DateTime<FixedOffset>>> {
        non_blank(self.created_time.as_deref())
            .map(|raw| parse_timestamp(CREATED_TIME, raw))
            .transpose()
    }

    /// Parses the resolution timestamp, `None` when absent or blank.
    pub fn resolved_at(&self) -> PipelineResult<Option<DateTime<FixedOffset>>> {
        non_blank(self.resolved_time.as_deref())
            .map(|raw| parse_timestamp(RESOLVED_TIME, raw))
            .transpose()
    }
}

/// Returns the value when it holds something other than whitespace.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses RFC 3339, ISO-like naive timestamps with `T` or space separators and
/// optional seconds/fractions, or a bare date. Naive values are read as UTC.
/// `naive_local()` on the result gives the wall-clock time as written.
pub fn parse_timestamp(field: &'static str, raw: &str) -> PipelineResult<DateTime<FixedOffset>> {
    let value = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| PipelineError::Timestamp {
            field,
            value: raw.to_string(),
        })
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or numeric ticket id")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, inner: D) -> Result<Self::Value, D::Error> {
            inner.deserialize_any(self)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }
    }

    deserializer.deserialize_option(IdVisitor)
}
