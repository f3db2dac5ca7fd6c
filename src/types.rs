use serde::{Serialize, Serializer};
use serde_json::Number;
use std::fmt;

/// A price or volume value as sent on the wire.
///
/// Numbers keep their integer/float distinction. Anything else the feed puts
/// in a numeric slot is carried through as text rather than dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(Number),
    Text(String),
}

impl Scalar {
    pub fn from_f64(v: f64) -> Option<Scalar> {
        Number::from_f64(v).map(Scalar::Number)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Number(Number::from(v))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => match n.as_f64() {
                Some(v) if n.is_f64() => f.write_str(&float_text(v)),
                _ => write!(f, "{}", n),
            },
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Shortest round-trip text for a float, in the layout dynamic-language CSV
/// writers use: `100.0`, `0.0001`, `1e-05`, `1e+16`.
///
/// Scientific form is used when the decimal point sits more than 16 digits
/// right of the first digit, or 4 or more places left of it.
pub fn float_text(v: f64) -> String {
    let sci = format!("{:e}", v.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let decpt = exp + 1;

    let body = if decpt > 16 || decpt <= -4 {
        let (first, rest) = digits.split_at(1);
        let mantissa = if rest.is_empty() {
            first.to_string()
        } else {
            format!("{}.{}", first, rest)
        };
        format!("{}e{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
    } else if decpt <= 0 {
        format!("0.{}{}", "0".repeat(decpt.unsigned_abs() as usize), digits)
    } else {
        let decpt = decpt as usize;
        if decpt >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(decpt - digits.len()))
        } else {
            format!("{}.{}", &digits[..decpt], &digits[decpt..])
        }
    };

    if v.is_sign_negative() {
        format!("-{}", body)
    } else {
        body
    }
}

/// A runner (selection) identifier as sent on the wire.
///
/// Integer and string identifiers never match each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunnerId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerId::Number(n) => write!(f, "{}", n),
            RunnerId::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for RunnerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RunnerId::Number(n) => serializer.serialize_i64(*n),
            RunnerId::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// One denormalized row: a single runner update joined with its market and
/// message context.
///
/// Field order is the CSV column order. `None` means the source did not carry
/// the value and is exported as an empty cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRecord {
    /// Message publish time, ISO-8601 without offset
    pub timestamp: String,
    pub timestamp_ms: i64,
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub race_name: Option<String>,
    pub market_id: Option<String>,
    pub runner_id: Option<RunnerId>,
    pub horse_name: String,
    pub market_time: Option<String>,
    pub market_type: Option<String>,
    pub country: Option<String>,
    pub ltp: Option<Scalar>,
    pub back_price: Option<Scalar>,
    pub lay_price: Option<Scalar>,
    pub back_volume: Option<Scalar>,
    pub lay_volume: Option<Scalar>,
    pub total_matched: Option<Scalar>,
}

impl FlatRecord {
    /// Column names, in export order
    pub const FIELD_NAMES: [&'static str; 17] = [
        "timestamp",
        "timestamp_ms",
        "event_id",
        "event_name",
        "race_name",
        "market_id",
        "runner_id",
        "horse_name",
        "market_time",
        "market_type",
        "country",
        "ltp",
        "back_price",
        "lay_price",
        "back_volume",
        "lay_volume",
        "total_matched",
    ];

    /// Stringify every field in column order, with absent values as `""`
    pub fn to_row(&self) -> Vec<String> {
        fn cell<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(T::to_string).unwrap_or_default()
        }

        vec![
            self.timestamp.clone(),
            self.timestamp_ms.to_string(),
            cell(&self.event_id),
            cell(&self.event_name),
            cell(&self.race_name),
            cell(&self.market_id),
            cell(&self.runner_id),
            self.horse_name.clone(),
            cell(&self.market_time),
            cell(&self.market_type),
            cell(&self.country),
            cell(&self.ltp),
            cell(&self.back_price),
            cell(&self.lay_price),
            cell(&self.back_volume),
            cell(&self.lay_volume),
            cell(&self.total_matched),
        ]
    }
}

/// Time zone used when rendering the human-readable timestamp column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampZone {
    /// Host local time
    #[default]
    Local,
    Utc,
}

/// JSON decoder used for each feed line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonBackend {
    #[default]
    Serde,
    /// SIMD-accelerated parsing via simd-json
    Simd,
}

/// CSV row terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// `\r\n`, what spreadsheet tools and most CSV writers emit
    #[default]
    Crlf,
    Lf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
        }
    }
}

/// Configuration for CSV export
#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    pub line_ending: LineEnding,
}

/// Configuration for a full feed conversion
#[derive(Debug, Clone, Default)]
pub struct MeltConfig {
    pub zone: TimestampZone,

    pub backend: JsonBackend,

    pub export: ExportConfig,
}

/// Counters describing what happened to each line of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeltStats {
    /// Lines read from the decompressed stream
    pub lines: u64,
    pub blank: u64,
    /// Lines that were not JSON objects or had an unreadable shape
    pub malformed: u64,
    /// Well-formed messages other than market changes
    pub ignored: u64,
    /// Market change messages normalized
    pub messages: u64,
    pub records: u64,
}
