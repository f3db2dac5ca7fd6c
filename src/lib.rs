//! # Chimera - Market Change Feed Melting
//!
//! Converts bzip2-compressed, newline-delimited Market Change Message dumps
//! into flat tabular records, one per runner update.
//!
//! ## Modules
//!
//! - **reader**: streaming bzip2 decompression into text lines
//! - **message**: the subset of the stream protocol that gets read
//! - **normalizer**: one line in, zero or more flat records out
//! - **export**: CSV and named-column table output
//! - **naming**: upload file name checks and CSV name derivation
//!
//! ## Quick Start
//!
//! ```rust
//! use chimera::{normalize, FlatRecord};
//!
//! let line = r#"{"op":"mcm","pt":1700000000000,"mc":[{"id":"1.23","rc":[{"id":1,"ltp":2.5}]}]}"#;
//! let records: Vec<FlatRecord> = normalize(line);
//!
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].horse_name, "runner_1");
//!
//! // Noise never fails the run
//! assert!(normalize("not json").is_empty());
//! ```
//!
//! Whole files go through [`melt_feed`] (accumulate) or [`convert_feed`]
//! (stream straight to CSV).

use std::io::{Read, Write};
use tracing::{debug, info};

pub mod error;
pub mod export;
pub mod message;
pub mod naming;
pub mod normalizer;
pub mod reader;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{FeedError, Result};
pub use export::{to_csv_bytes, to_table, write_csv, CsvRecordWriter, Table};
pub use normalizer::{normalize, LineOutcome, Normalizer};
pub use reader::FeedLines;
pub use types::{
    ExportConfig, FlatRecord, JsonBackend, LineEnding, MeltConfig, MeltStats, RunnerId, Scalar,
    TimestampZone,
};

/// Records accumulated from a whole feed
#[derive(Debug, Clone)]
pub struct MeltOutput {
    pub records: Vec<FlatRecord>,
    pub stats: MeltStats,
}

/// Main entry point: decompress a feed and collect every flat record.
///
/// Fails with [`FeedError::NoData`] when the feed decodes but holds no
/// market change records.
pub fn melt_feed<R: Read>(source: R, config: &MeltConfig) -> Result<MeltOutput> {
    let mut records = Vec::new();
    let stats = drive(source, config, |batch| {
        records.extend(batch);
        Ok(())
    })?;

    if records.is_empty() {
        return Err(FeedError::NoData);
    }
    Ok(MeltOutput { records, stats })
}

/// Stream a feed straight into CSV without holding the records.
///
/// Nothing is written when the feed holds no records. If a fatal error
/// occurs midway the sink may contain a partial CSV and should be discarded.
pub fn convert_feed<R: Read, W: Write>(source: R, sink: W, config: &MeltConfig) -> Result<MeltStats> {
    let mut writer = CsvRecordWriter::new(sink, &config.export);
    let stats = drive(source, config, |batch| {
        for record in &batch {
            writer.write(record)?;
        }
        Ok(())
    })?;

    writer.finish()?;
    Ok(stats)
}

/// Pull every line through the normalizer, handing each batch of records on
fn drive<R, F>(source: R, config: &MeltConfig, mut emit: F) -> Result<MeltStats>
where
    R: Read,
    F: FnMut(Vec<FlatRecord>) -> Result<()>,
{
    let normalizer = Normalizer::new(config);
    let mut stats = MeltStats::default();

    for line in FeedLines::new(source) {
        let line = line?;
        stats.lines += 1;

        match normalizer.classify(&line) {
            LineOutcome::Blank => stats.blank += 1,
            LineOutcome::Malformed => {
                debug!("line {}: malformed, skipped", stats.lines);
                stats.malformed += 1;
            }
            LineOutcome::Ignored => stats.ignored += 1,
            LineOutcome::Records(batch) => {
                stats.messages += 1;
                stats.records += batch.len() as u64;
                emit(batch)?;
            }
        }
    }

    info!(
        lines = stats.lines,
        messages = stats.messages,
        records = stats.records,
        malformed = stats.malformed,
        ignored = stats.ignored,
        "feed melted"
    );
    Ok(stats)
}
