//! Training-time row hygiene: completeness, target computation and outlier removal.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    error::{PipelineError, PipelineResult},
    record::{non_blank, RawTicket},
};

/// Behaviour when a row resolves before it was created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NegativeDurationPolicy {
    /// Fail the batch with [`PipelineError::Data`].
    #[default]
    Reject,
    /// Drop the row and count it.
    Drop,
}

/// A complete training row with its target.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTicket {
    /// The original row.
    pub raw: RawTicket,
    /// Creation wall-clock time as written, offset dropped.
    pub created_at: NaiveDateTime,
    /// Resolution time in hours, never negative.
    pub resolution_hours: f64,
}

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanReport {
    /// Rows received.
    pub rows_read: usize,
    /// Source records that could not be decoded into a row.
    #[serde(default)]
    pub dropped_malformed: usize,
    /// Rows missing a required field.
    pub dropped_incomplete: usize,
    /// Rows whose timestamps failed to parse.
    pub dropped_unparseable: usize,
    /// Rows resolved before creation (only under [`NegativeDurationPolicy::Drop`]).
    pub dropped_negative: usize,
    /// Rows above the outlier cutoff.
    pub dropped_outliers: usize,
    /// Rows returned.
    pub kept: usize,
    /// Cutoff computed on this batch, in hours.
    pub outlier_cutoff_hours: f64,
}

/// Drops incomplete rows, computes targets and removes outliers from a training batch.
/// Never applied to serve-time requests.
#[derive(Debug, Clone, Copy)]
pub struct Cleaner {
    quantile: f64,
    negative: NegativeDurationPolicy,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new(0.95, NegativeDurationPolicy::default())
    }
}

impl Cleaner {
    /// Creates a cleaner with the outlier quantile in `(0, 1]`.
    #[must_use]
    pub const fn new(quantile: f64, negative: NegativeDurationPolicy) -> Self {
        Self { quantile, negative }
    }

    /// Outlier quantile.
    #[must_use]
    pub const fn quantile(&self) -> f64 {
        self.quantile
    }

    /// Cleans a batch. Incomplete and unparseable rows are dropped and counted;
    /// a negative duration fails the batch unless the policy drops it.
    pub fn clean(&self, rows: Vec<RawTicket>) -> PipelineResult<(Vec<CleanedTicket>, CleanReport)> {
        let mut report = CleanReport {
            rows_read: rows.len(),
            ..CleanReport::default()
        };
        let mut complete = Vec::with_capacity(rows.len());
        for row in rows {
            if !is_complete(&row) {
                report.dropped_incomplete += 1;
                continue;
            }
            let (Ok(Some(created_at)), Ok(Some(resolved_at))) = (row.created_at(), row.resolved_at())
            else {
                report.dropped_unparseable += 1;
                continue;
            };
            let resolution_hours = match resolution_hours(created_at, resolved_at) {
                Some(hours) => hours,
                None if self.negative == NegativeDurationPolicy::Drop => {
                    report.dropped_negative += 1;
                    continue;
                }
                None => {
                    return Err(PipelineError::Data(format!(
                        "ticket {}: resolved at {resolved_at} before created at {created_at}",
                        row.ticket_id.as_deref().unwrap_or("<no id>")
                    )))
                }
            };
            complete.push(CleanedTicket {
                raw: row,
                created_at: created_at.naive_local(),
                resolution_hours,
            });
        }

        let targets: Vec<f64> = complete.iter().map(|t| t.resolution_hours).collect();
        let cutoff = quantile(&targets, self.quantile).ok_or_else(|| {
            PipelineError::Data(format!(
                "no complete rows among {} read",
                report.rows_read
            ))
        })?;
        let before = complete.len();
        complete.retain(|ticket| ticket.resolution_hours <= cutoff);
        report.dropped_outliers = before - complete.len();
        report.kept = complete.len();
        report.outlier_cutoff_hours = cutoff;
        Ok((complete, report))
    }
}

fn is_complete(row: &RawTicket) -> bool {
    [
        &row.created_time,
        &row.resolved_time,
        &row.priority,
        &row.category,
        &row.department,
        &row.description,
    ]
    .into_iter()
    .all(|field| non_blank(field.as_deref()).is_some())
}

/// Hours between the creation and resolution instants; `None` when resolution
/// precedes creation.
#[must_use]
pub fn resolution_hours(
    created: DateTime<FixedOffset>,
    resolved: DateTime<FixedOffset>,
) -> Option<f64> {
    let elapsed = resolved - created;
    (elapsed >= chrono::Duration::zero()).then(|| elapsed.num_milliseconds() as f64 / 3_600_000.0)
}

/// Quantile with linear interpolation between order statistics; `None` for an
/// empty slice.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}
