//! Wire types for Market Change Messages
//!
//! Only the subset of the exchange stream protocol the normalizer reads is
//! modelled here. Every field is optional: real dumps routinely omit the
//! market definition, runner lists and individual prices.

use crate::types::{RunnerId, Scalar};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Discriminator carried by market change messages in the `op` field
pub const MARKET_CHANGE_OP: &str = "mcm";

/// One market change message (`"op": "mcm"`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketChangeMessage {
    /// Publish time as sent; read through [`MarketChangeMessage::publish_millis`]
    #[serde(default)]
    pub pt: Option<Value>,

    #[serde(default, rename = "mc")]
    pub markets: Vec<MarketChange>,
}

impl MarketChangeMessage {
    /// Publish time in whole milliseconds since the Unix epoch.
    ///
    /// An absent `pt` reads as `0`. Floats are truncated to the millisecond.
    /// `None` means `pt` is present but not a usable number.
    pub fn publish_millis(&self) -> Option<i64> {
        match &self.pt {
            None | Some(Value::Null) => Some(0),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(ms) => Some(ms),
                None if n.is_f64() => n
                    .as_f64()
                    .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
                    .map(|v| v.trunc() as i64),
                None => None,
            },
            Some(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketChange {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,

    #[serde(default, rename = "marketDefinition")]
    pub definition: Option<MarketDefinition>,

    #[serde(default, rename = "rc")]
    pub runners: Vec<RunnerChange>,
}

/// Market metadata, usually only present on the first update for a market
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDefinition {
    #[serde(default, deserialize_with = "lenient_text")]
    pub event_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub event_name: Option<String>,

    /// Race name
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub market_time: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub market_type: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub country_code: Option<String>,

    #[serde(default)]
    pub runners: Vec<RunnerDescriptor>,
}

/// A runner entry inside a market definition
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerDescriptor {
    #[serde(default, deserialize_with = "lenient_runner_id")]
    pub id: Option<RunnerId>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
}

/// Price and volume update for a single runner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerChange {
    #[serde(default, deserialize_with = "lenient_runner_id")]
    pub id: Option<RunnerId>,

    /// Last traded price
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub ltp: Option<Scalar>,

    #[serde(default, rename = "bp", deserialize_with = "lenient_scalar")]
    pub back_price: Option<Scalar>,

    #[serde(default, rename = "lp", deserialize_with = "lenient_scalar")]
    pub lay_price: Option<Scalar>,

    #[serde(default, rename = "bv", deserialize_with = "lenient_scalar")]
    pub back_volume: Option<Scalar>,

    #[serde(default, rename = "lv", deserialize_with = "lenient_scalar")]
    pub lay_volume: Option<Scalar>,

    /// Total matched volume
    #[serde(default, rename = "tv", deserialize_with = "lenient_scalar")]
    pub total_matched: Option<Scalar>,
}

/// Text for a JSON scalar the way a dynamic-language `str()` would print it
fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => Scalar::Number(n).to_string(),
        other => other.to_string(),
    }
}

/// Accept any JSON value for a text field; only `null` is absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(value) => Some(value_text(value)),
    })
}

/// Integers stay numeric, anything else becomes a textual identifier.
fn lenient_runner_id<'de, D>(deserializer: D) -> Result<Option<RunnerId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) if n.as_i64().is_some() => n.as_i64().map(RunnerId::Number),
        Some(value) => Some(RunnerId::Text(value_text(value))),
    })
}

/// Numbers pass through as numbers, anything else as its text.
fn lenient_scalar<'de, D>(deserializer: D) -> Result<Option<Scalar>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(Scalar::Number(n)),
        Some(value) => Some(Scalar::Text(value_text(value))),
    })
}

/// Read the `op` discriminator of a decoded line, if any
pub fn op_of(value: &Value) -> Option<&str> {
    value.get("op").and_then(Value::as_str)
}
