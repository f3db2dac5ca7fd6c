//! Market change normalization
//!
//! Turns one feed line into zero or more [`FlatRecord`]s. Each line is
//! handled on its own: the runner-name lookup lives only as long as the
//! market change it was built from, and nothing is carried between calls.

use crate::message::{op_of, MarketChangeMessage, MARKET_CHANGE_OP};
use crate::types::{FlatRecord, JsonBackend, MeltConfig, RunnerId, TimestampZone};
use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// What a single line turned into
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Empty or whitespace only
    Blank,
    /// Not a JSON object, or a market change whose shape could not be read
    Malformed,
    /// A JSON object that is not a market change message
    Ignored,
    /// A market change message, possibly with no runner changes
    Records(Vec<FlatRecord>),
}

/// Stateless line normalizer
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    zone: TimestampZone,
    backend: JsonBackend,
}

impl Normalizer {
    pub fn new(config: &MeltConfig) -> Self {
        Normalizer {
            zone: config.zone,
            backend: config.backend,
        }
    }

    /// Normalize a line, discarding the reason when it yields nothing
    pub fn normalize(&self, line: &str) -> Vec<FlatRecord> {
        match self.classify(line) {
            LineOutcome::Records(records) => records,
            _ => Vec::new(),
        }
    }

    /// Normalize a line and report how it was handled
    pub fn classify(&self, line: &str) -> LineOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineOutcome::Blank;
        }

        let value = match self.decode(trimmed) {
            Some(value @ Value::Object(_)) => value,
            Some(_) => {
                debug!("skipping line: top-level JSON value is not an object");
                return LineOutcome::Malformed;
            }
            None => return LineOutcome::Malformed,
        };

        if op_of(&value) != Some(MARKET_CHANGE_OP) {
            return LineOutcome::Ignored;
        }

        match serde_json::from_value::<MarketChangeMessage>(value) {
            Ok(message) => LineOutcome::Records(self.flatten(message)),
            Err(e) => {
                debug!("skipping market change with unreadable shape: {}", e);
                LineOutcome::Malformed
            }
        }
    }

    fn decode(&self, line: &str) -> Option<Value> {
        let decoded = match self.backend {
            JsonBackend::Serde => serde_json::from_str::<Value>(line).map_err(|e| e.to_string()),
            JsonBackend::Simd => {
                // simd-json parses in place
                let mut bytes = line.as_bytes().to_vec();
                simd_json::serde::from_slice::<Value>(&mut bytes).map_err(|e| e.to_string())
            }
        };

        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("skipping undecodable line: {}", e);
                None
            }
        }
    }

    /// Expand a market change message into one record per runner change
    fn flatten(&self, message: MarketChangeMessage) -> Vec<FlatRecord> {
        let (timestamp_ms, timestamp) = match message.publish_millis() {
            Some(ms) => (ms, self.render_timestamp(ms)),
            None => {
                warn!("publish time {:?} is not a number, using current time instead", message.pt);
                (0, self.now())
            }
        };

        let mut records = Vec::new();

        for market in message.markets {
            let definition = market.definition.unwrap_or_default();

            let names: HashMap<&RunnerId, &str> = definition
                .runners
                .iter()
                .filter_map(|r| Some((r.id.as_ref()?, r.name.as_deref()?)))
                .collect();

            for change in market.runners {
                let horse_name = match &change.id {
                    Some(id) => names
                        .get(&id)
                        .map(|name| name.to_string())
                        .unwrap_or_else(|| format!("runner_{}", id)),
                    None => "runner_unknown".to_string(),
                };

                records.push(FlatRecord {
                    timestamp: timestamp.clone(),
                    timestamp_ms,
                    event_id: definition.event_id.clone(),
                    event_name: definition.event_name.clone(),
                    race_name: definition.name.clone(),
                    market_id: market.id.clone(),
                    runner_id: change.id,
                    horse_name,
                    market_time: definition.market_time.clone(),
                    market_type: definition.market_type.clone(),
                    country: definition.country_code.clone(),
                    ltp: change.ltp,
                    back_price: change.back_price,
                    lay_price: change.lay_price,
                    back_volume: change.back_volume,
                    lay_volume: change.lay_volume,
                    total_matched: change.total_matched,
                });
            }
        }

        records
    }

    /// Render the publish time, falling back to the current time when the
    /// value cannot be represented as a calendar date.
    fn render_timestamp(&self, timestamp_ms: i64) -> String {
        if let Some(text) = format_timestamp(timestamp_ms, self.zone) {
            return text;
        }

        // The fabricated time is not derived from the feed.
        warn!(
            "timestamp {} ms is out of range, using current time instead",
            timestamp_ms
        );
        self.now()
    }

    fn now(&self) -> String {
        let now = match self.zone {
            TimestampZone::Local => Local::now().naive_local(),
            TimestampZone::Utc => Utc::now().naive_utc(),
        };
        isoformat(&now)
    }
}

/// Normalize a line with the default configuration
pub fn normalize(line: &str) -> Vec<FlatRecord> {
    Normalizer::default().normalize(line)
}

/// Convert epoch milliseconds to ISO-8601 text in the given zone.
///
/// Returns `None` outside years 1..=9999.
pub fn format_timestamp(timestamp_ms: i64, zone: TimestampZone) -> Option<String> {
    let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)?;
    let naive = match zone {
        TimestampZone::Local => utc.with_timezone(&Local).naive_local(),
        TimestampZone::Utc => utc.naive_utc(),
    };

    if !(1..=9999).contains(&naive.year()) {
        return None;
    }
    Some(isoformat(&naive))
}

/// `YYYY-MM-DDTHH:MM:SS`, with `.ffffff` appended only for sub-second times
fn isoformat(t: &NaiveDateTime) -> String {
    if t.nanosecond() / 1_000 == 0 {
        t.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}
