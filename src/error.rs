/// Errors surfaced to callers of the feed pipeline.
///
/// Only container-level problems and export failures show up here. Line
/// noise (blank lines, broken JSON, non market-change messages) is absorbed
/// by the normalizer and counted in [`crate::MeltStats`] instead.
///
/// ```text
///   FeedError
///   ├── Decompress(io::Error)   ← truncated, corrupt or non-bzip2 input
///   ├── InvalidUtf8             ← decompressed line is not UTF-8
///   ├── Csv(csv::Error)         ← CSV serialization failed
///   ├── Io(io::Error)           ← writing to the sink failed
///   └── NoData                  ← the run produced zero records
/// ```
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The bzip2 container could not be decoded. No further lines can be
    /// trusted after this point.
    #[error("failed to decompress feed: {0}")]
    Decompress(#[source] std::io::Error),

    /// A decompressed line contained bytes that are not valid UTF-8.
    #[error("line {line} is not valid UTF-8")]
    InvalidUtf8 { line: u64 },

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The feed decoded cleanly but yielded no market-change records.
    #[error("no valid data found in feed")]
    NoData,
}

impl FeedError {
    /// True for the "nothing usable" outcome, as opposed to a broken input.
    pub fn is_no_data(&self) -> bool {
        matches!(self, FeedError::NoData)
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
