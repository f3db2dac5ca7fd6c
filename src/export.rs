//! Tabular export of flat records
//!
//! Two shapes are offered to downstream consumers: CSV bytes, and a [`Table`]
//! of stringified rows for sinks that want named columns without parsing CSV.
//! Both treat an empty record set as [`FeedError::NoData`].

use crate::error::{FeedError, Result};
use crate::types::{ExportConfig, FlatRecord, LineEnding};
use serde::Serialize;
use std::io::Write;

/// Header plus rows, every cell already rendered as text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Incremental CSV writer for [`FlatRecord`]s.
///
/// The header row is emitted together with the first record, so a writer
/// that never receives a record leaves the sink untouched.
pub struct CsvRecordWriter<W: Write> {
    writer: csv::Writer<W>,
    written: u64,
}

impl<W: Write> CsvRecordWriter<W> {
    pub fn new(sink: W, config: &ExportConfig) -> Self {
        let terminator = match config.line_ending {
            LineEnding::Crlf => csv::Terminator::CRLF,
            LineEnding::Lf => csv::Terminator::Any(b'\n'),
        };

        let writer = csv::WriterBuilder::new()
            .has_headers(true)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(terminator)
            .from_writer(sink);

        CsvRecordWriter { writer, written: 0 }
    }

    pub fn write(&mut self, record: &FlatRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the sink. Fails with `NoData` if nothing was written.
    pub fn finish(mut self) -> Result<W> {
        if self.written == 0 {
            return Err(FeedError::NoData);
        }

        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| FeedError::Io(std::io::Error::new(e.error().kind(), e.to_string())))
    }
}

/// Write records as CSV with a single header row
pub fn write_csv<W: Write>(records: &[FlatRecord], sink: W, config: &ExportConfig) -> Result<()> {
    if records.is_empty() {
        return Err(FeedError::NoData);
    }

    let mut writer = CsvRecordWriter::new(sink, config);
    for record in records {
        writer.write(record)?;
    }
    writer.finish()?;
    Ok(())
}

pub fn to_csv_bytes(records: &[FlatRecord], config: &ExportConfig) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_csv(records, &mut buffer, config)?;
    Ok(buffer)
}

/// Render records as named columns and text rows
pub fn to_table(records: &[FlatRecord]) -> Result<Table> {
    if records.is_empty() {
        return Err(FeedError::NoData);
    }

    Ok(Table {
        columns: FlatRecord::FIELD_NAMES.iter().map(|c| c.to_string()).collect(),
        rows: records.iter().map(FlatRecord::to_row).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;
    use crate::types::{MeltConfig, TimestampZone};
    use serde_json::json;

    const HEADER: &str = "timestamp,timestamp_ms,event_id,event_name,race_name,market_id,runner_id,horse_name,market_time,market_type,country,ltp,back_price,lay_price,back_volume,lay_volume,total_matched";

    fn records(line: &str) -> Vec<FlatRecord> {
        Normalizer::new(&MeltConfig {
            zone: TimestampZone::Utc,
            ..MeltConfig::default()
        })
        .normalize(line)
    }

    fn example() -> Vec<FlatRecord> {
        records(
            &json!({
                "op": "mcm",
                "pt": 1700000000000i64,
                "mc": [{
                    "id": "1.23",
                    "marketDefinition": {
                        "eventId": "E1",
                        "eventName": "Race Meeting",
                        "name": "R1",
                        "marketTime": "2023-11-14T12:00:00Z",
                        "marketType": "WIN",
                        "countryCode": "GB",
                        "runners": [{"id": 1, "name": "Horse A"}]
                    },
                    "rc": [
                        {"id": 1, "ltp": 2.5, "bp": 2.4, "lp": 2.6, "bv": 100, "lv": 50, "tv": 1000},
                        {"id": 2, "ltp": 7.0}
                    ]
                }]
            })
            .to_string(),
        )
    }

    #[test]
    fn test_csv_bytes() {
        let csv = String::from_utf8(to_csv_bytes(&example(), &ExportConfig::default()).unwrap()).unwrap();
        let expected = format!(
            "{}\r\n{}\r\n{}\r\n",
            HEADER,
            "2023-11-14T22:13:20,1700000000000,E1,Race Meeting,R1,1.23,1,Horse A,2023-11-14T12:00:00Z,WIN,GB,2.5,2.4,2.6,100,50,1000",
            "2023-11-14T22:13:20,1700000000000,E1,Race Meeting,R1,1.23,2,runner_2,2023-11-14T12:00:00Z,WIN,GB,7.0,,,,,"
        );
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_lf_line_ending() {
        let config = ExportConfig {
            line_ending: LineEnding::Lf,
        };
        let csv = String::from_utf8(to_csv_bytes(&example(), &config).unwrap()).unwrap();
        assert!(csv.starts_with(&format!("{}\n", HEADER)));
        assert!(!csv.contains('\r'));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_header_round_trip() {
        let bytes = to_csv_bytes(&example(), &ExportConfig::default()).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, FlatRecord::FIELD_NAMES.to_vec());
        assert_eq!(reader.records().count(), 2);
    }

    #[test]
    fn test_quotes_special_characters() {
        let line = json!({
            "op": "mcm", "pt": 0,
            "mc": [{
                "id": "1.1",
                "marketDefinition": {
                    "eventName": "Ascot, Day 1",
                    "runners": [{"id": 9, "name": "The \"Flyer\""}]
                },
                "rc": [{"id": 9}]
            }]
        })
        .to_string();

        let csv = String::from_utf8(to_csv_bytes(&records(&line), &ExportConfig::default()).unwrap()).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains(",\"Ascot, Day 1\","));
        assert!(row.contains(",\"The \"\"Flyer\"\"\","));
    }

    #[test]
    fn test_empty_input_is_no_data() {
        assert!(matches!(
            to_csv_bytes(&[], &ExportConfig::default()),
            Err(FeedError::NoData)
        ));
        assert!(to_table(&[]).unwrap_err().is_no_data());
    }

    #[test]
    fn test_streaming_writer() {
        let recs = example();
        let mut writer = CsvRecordWriter::new(Vec::new(), &ExportConfig::default());
        for r in &recs {
            writer.write(r).unwrap();
        }
        assert_eq!(writer.records_written(), 2);

        let streamed = writer.finish().unwrap();
        assert_eq!(streamed, to_csv_bytes(&recs, &ExportConfig::default()).unwrap());
    }

    #[test]
    fn test_unused_writer_leaves_sink_empty() {
        let mut sink = Vec::new();
        let writer = CsvRecordWriter::new(&mut sink, &ExportConfig::default());
        assert!(writer.finish().unwrap_err().is_no_data());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_number_and_text_cells() {
        let line = r#"{"op":"mcm","pt":0,"mc":[{"id":"1.1","rc":[{"id":"sel-9","ltp":1e20,"bp":0.00000015,"tv":"n/a","bv":true}]}]}"#;
        let table = to_table(&records(line)).unwrap();
        let row = &table.rows[0];

        assert_eq!(row[6], "sel-9");
        assert_eq!(row[7], "runner_sel-9");
        assert_eq!(row[11], "1e+20");
        assert_eq!(row[12], "1.5e-07");
        assert_eq!(row[14], "True");
        assert_eq!(row[16], "n/a");
    }

    #[test]
    fn test_table() {
        let table = to_table(&example()).unwrap();
        assert_eq!(table.columns, FlatRecord::FIELD_NAMES.to_vec());
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][7], "Horse A");
        assert_eq!(table.rows[1][11], "7.0");
        assert_eq!(table.rows[1][12], "");
    }
}
