use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;


/// Marker key that distinguishes a temporal attribute object from a scalar
pub const TIME_MARKER: &str = "time";

/// A node attribute: either a plain scalar or a time-indexed series
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    /// Static value, independent of time
    Scalar(Value),

    /// Sparse series keyed by time index (e.g. simulated day)
    Temporal(TemporalSeries),
}

/// Time-indexed values of a temporal attribute.
///
/// Keys need not be contiguous. Stored sorted so lookups and nearest-key
/// scans are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemporalSeries {
    points: BTreeMap<i64, Value>,
}

impl TemporalSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from a JSON object of the shape
    /// `{"time": true, "<t0>": v0, "<t1>": v1, ...}`.
    ///
    /// Keys that do not parse as integers (the marker included) are ignored.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let points = object
            .iter()
            .filter(|(key, _)| key.as_str() != TIME_MARKER)
            .filter_map(|(key, value)| parse_time_key(key).map(|t| (t, value.clone())))
            .collect();

        Self { points }
    }

    pub fn insert(&mut self, time: i64, value: Value) {
        self.points.insert(time, value);
    }

    pub fn get(&self, time: i64) -> Option<&Value> {
        self.points.get(&time)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Available time keys in ascending order
    pub fn times(&self) -> impl Iterator<Item = i64> + '_ {
        self.points.keys().copied()
    }

    /// Value at the key nearest to `time`; ties go to the smaller key.
    pub fn closest(&self, time: i64) -> Option<&Value> {
        let lower = self.points.range(..=time).next_back();
        let upper = self.points.range(time..).next();

        match (lower, upper) {
            (Some((lt, lv)), Some((ut, uv))) => {
                if time.abs_diff(*ut) < time.abs_diff(*lt) {
                    Some(uv)
                } else {
                    Some(lv)
                }
            }
            (Some((_, v)), None) | (None, Some((_, v))) => Some(v),
            (None, None) => None,
        }
    }

    /// Value at the greatest key that is `<= time`
    pub fn closest_lower(&self, time: i64) -> Option<&Value> {
        self.points.range(..=time).next_back().map(|(_, v)| v)
    }
}

impl Attribute {
    /// Classify a raw JSON field. Objects carrying `"time": true` are temporal.
    pub fn from_value(value: Value) -> Self {
        match &value {
            Value::Object(object) if is_temporal_object(object) => {
                Attribute::Temporal(TemporalSeries::from_object(object))
            }
            _ => Attribute::Scalar(value),
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Attribute::Temporal(_))
    }
}

impl From<Value> for Attribute {
    fn from(value: Value) -> Self {
        Attribute::from_value(value)
    }
}

impl<'de> Deserialize<'de> for Attribute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Attribute::from_value)
    }
}

fn is_temporal_object(object: &Map<String, Value>) -> bool {
    matches!(object.get(TIME_MARKER), Some(Value::Bool(true)))
}

/// Integer conversion of a time key. Fractional keys truncate toward zero.
fn parse_time_key(key: &str) -> Option<i64> {
    let key = key.trim();
    if let Ok(t) = key.parse::<i64>() {
        return Some(t);
    }
    match key.parse::<f64>() {
        Ok(t) if t.is_finite() => Some(t.trunc() as i64),
        _ => None,
    }
}

/// Strategy for a temporal attribute that has no value at the requested time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillPolicy {
    /// Report "no data" (serialized as `false`)
    NoFill,

    /// Value at the nearest available time
    #[default]
    ClosestTime,

    /// Value at the nearest available time not after the requested one
    ClosestTimeLower,

    /// Always `0.0`, regardless of proximity
    Default,
}

impl FillPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillPolicy::NoFill => "none",
            FillPolicy::ClosestTime => "closest_time",
            FillPolicy::ClosestTimeLower => "closest_time_lower",
            FillPolicy::Default => "default",
        }
    }
}

/// Unknown fill policy name
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownFillPolicy(pub String);

impl fmt::Display for UnknownFillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown fill policy '{}': expected false, closest_time, closest_time_lower or default",
            self.0
        )
    }
}

impl std::error::Error for UnknownFillPolicy {}

impl FromStr for FillPolicy {
    type Err = UnknownFillPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "false" => Ok(FillPolicy::NoFill),
            "closest_time" => Ok(FillPolicy::ClosestTime),
            "closest_time_lower" => Ok(FillPolicy::ClosestTimeLower),
            "default" | "zero" => Ok(FillPolicy::Default),
            other => Err(UnknownFillPolicy(other.to_string())),
        }
    }
}

impl Serialize for FillPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FillPolicy::NoFill => serializer.serialize_bool(false),
            other => serializer.serialize_str(other.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for FillPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(false) => Ok(FillPolicy::NoFill),
            Raw::Flag(true) => Err(de::Error::custom(
                "fill policy must be false or a policy name",
            )),
            Raw::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

/// Resolve an attribute at `time`.
///
/// Scalars pass through unchanged. Temporal attributes return the exact
/// value when present, otherwise whatever `policy` produces. `None` is the
/// "no data" sentinel and is distinct from a numeric zero.
pub fn resolve(attr: &Attribute, time: i64, policy: FillPolicy) -> Option<Value> {
    let series = match attr {
        Attribute::Scalar(value) => return Some(value.clone()),
        Attribute::Temporal(series) => series,
    };

    if let Some(value) = series.get(time) {
        return Some(value.clone());
    }

    match policy {
        FillPolicy::NoFill => None,
        FillPolicy::Default => Some(Value::from(0.0)),
        FillPolicy::ClosestTime => series.closest(time).cloned(),
        FillPolicy::ClosestTimeLower => series.closest_lower(time).cloned(),
    }
}

/// Numeric view of [`resolve`]. Non-numeric values count as no data.
pub fn resolve_f64(attr: &Attribute, time: i64, policy: FillPolicy) -> Option<f64> {
    resolve(attr, time, policy).and_then(|v| as_number(&v))
}

/// Same resolver under the name the widgets historically call it by.
pub fn fill_missing_values(attr: &Attribute, time: i64, policy: FillPolicy) -> Option<Value> {
    resolve(attr, time, policy)
}

/// Numbers, numeric strings and booleans as `f64`
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Truthiness used for event attributes (a zero count is "no event")
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |x| x != 0.0 && !x.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
