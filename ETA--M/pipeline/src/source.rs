//! CSV data source for training runs.

use std::{fs::File, io::Read, path::Path};

use crate::{
    error::{PipelineError, PipelineResult},
    record::RawTicket,
};

/// Rows decoded from a ticket CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketBatch {
    /// Decoded rows, in file order.
    pub rows: Vec<RawTicket>,
    /// Records skipped because a cell was not valid UTF-8 or did not decode.
    pub malformed: usize,
}

/// Reads every row of a ticket CSV. Extra columns are ignored and empty cells
/// become `None`.
pub fn load_tickets_csv(path: impl AsRef<Path>) -> PipelineResult<TicketBatch> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        PipelineError::Data(format!("opening data source {}: {err}", path.display()))
    })?;
    read_tickets(file)
}

/// Reads ticket rows from any CSV reader with a header line. A record that fails
/// to decode is skipped and counted; I/O failures abort the read.
pub fn read_tickets(reader: impl Read) -> PipelineResult<TicketBatch> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);
    let headers = csv.byte_headers()?.clone();
    let mut batch = TicketBatch::default();
    for record in csv.byte_records() {
        let decoded = record.and_then(|record| record.deserialize::<RawTicket>(Some(&headers)));
        match decoded {
            Ok(row) => batch.rows.push(row),
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(_) => batch.malformed += 1,
        }
    }
    Ok(batch)
}

/// Writes ticket rows with the standard header.
pub fn write_tickets_csv(path: impl AsRef<Path>, tickets: &[RawTicket]) -> PipelineResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    for ticket in tickets {
        writer.serialize(ticket)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
Ticket ID,Created Time,Resolved Time,Priority,Category,Department,Description,Agent
TCKT0001,2024-01-01 08:00:00,2024-01-01 12:30:00,High,Software,IT,Outlook crashes,ana
TCKT0002,2024-01-02 10:00:00,,Low,Hardware,HR,,bo
";

    #[test]
    fn reads_rows_and_maps_empty_cells_to_none() {
        let rows = read_tickets(SAMPLE.as_bytes()).unwrap().rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticket_id.as_deref(), Some("TCKT0001"));
        assert_eq!(rows[0].description.as_deref(), Some("Outlook crashes"));
        assert_eq!(rows[1].resolved_time, None);
        assert_eq!(rows[1].description, None);
    }

    #[test]
    fn written_csv_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data/tickets.csv");
        let rows = read_tickets(SAMPLE.as_bytes()).unwrap().rows;
        write_tickets_csv(&path, &rows).unwrap();
        let batch = load_tickets_csv(&path).unwrap();
        assert_eq!(batch.rows, rows);
        assert_eq!(batch.malformed, 0);
    }

    #[test]
    fn undecodable_records_are_skipped_and_counted() {
        let mut raw = b"Ticket ID,Created Time,Resolved Time,Priority,Category,Department,Description\n\
TCKT0001,2024-01-01 08:00:00,2024-01-01 09:00:00,High,Software,IT,broken "
            .to_vec();
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(
            b"\nTCKT0002,2024-01-02 08:00:00,2024-01-02 10:00:00,Low,Hardware,HR,Mouse stuck\n",
        );
        let batch = read_tickets(raw.as_slice()).unwrap();
        assert_eq!(batch.malformed, 1);
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].ticket_id.as_deref(), Some("TCKT0002"));
        assert_eq!(batch.rows[0].description.as_deref(), Some("Mouse stuck"));
    }

    #[test]
    fn missing_file_is_a_data_error() {
        let err = load_tickets_csv("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }
}
