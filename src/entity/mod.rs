use crate::temporal::Attribute;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;


/// Record fields with fixed meaning in gazetteer/node files
pub const NODE_LABEL: &str = "NodeLabel";
pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";

/// A geographic simulation unit (a "node")
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Unique node label (e.g. "80202_5")
    pub label: String,

    pub latitude: f64,

    pub longitude: f64,

    /// Every other record field, classified as scalar or temporal
    pub attributes: HashMap<String, Attribute>,

    /// The raw record, used when binding fields into messages
    pub record: Map<String, Value>,
}

/// Node record errors
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Record is not a JSON object
    NotAnObject,
    /// Required field is missing
    MissingField(&'static str),
    /// Field present but of the wrong type
    InvalidField { field: &'static str, reason: String },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::NotAnObject => write!(f, "node record must be a JSON object"),
            RecordError::MissingField(field) => write!(f, "node record is missing '{}'", field),
            RecordError::InvalidField { field, reason } => {
                write!(f, "invalid '{}' in node record: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for RecordError {}

impl Entity {
    /// Parse a node from a gazetteer record.
    ///
    /// `NodeLabel` may be a string or a number. `Latitude`/`Longitude` must
    /// be numeric (numeric strings are accepted).
    pub fn from_record(record: Value) -> Result<Self, RecordError> {
        let record = match record {
            Value::Object(map) => map,
            _ => return Err(RecordError::NotAnObject),
        };

        let label = match record.get(NODE_LABEL) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(RecordError::InvalidField {
                    field: NODE_LABEL,
                    reason: format!("expected string or number, got {}", other),
                })
            }
            None => return Err(RecordError::MissingField(NODE_LABEL)),
        };

        let latitude = coordinate(&record, LATITUDE)?;
        let longitude = coordinate(&record, LONGITUDE)?;

        let attributes = record
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), NODE_LABEL | LATITUDE | LONGITUDE))
            .map(|(key, value)| (key.clone(), Attribute::from_value(value.clone())))
            .collect();

        Ok(Self {
            label,
            latitude,
            longitude,
            attributes,
            record,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

fn coordinate(record: &Map<String, Value>, field: &'static str) -> Result<f64, RecordError> {
    let value = record.get(field).ok_or(RecordError::MissingField(field))?;
    crate::temporal::as_number(value)
        .filter(|x| x.is_finite())
        .ok_or_else(|| RecordError::InvalidField {
            field,
            reason: format!("expected a number, got {}", value),
        })
}

/// Element id of a node inside a given widget: `n_{label}_{widget_id}`
pub fn node_key(label: &str, widget_id: &str) -> String {
    format!("n_{}_{}", label, widget_id)
}

/// Bounding box of a set of nodes (what a map fits its view to)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    /// `None` for an empty node set
    pub fn of(entities: &[Entity]) -> Option<Self> {
        let first = entities.first()?;
        let init = GeoBounds {
            south: first.latitude,
            west: first.longitude,
            north: first.latitude,
            east: first.longitude,
        };

        Some(entities.iter().skip(1).fold(init, |b, e| GeoBounds {
            south: b.south.min(e.latitude),
            west: b.west.min(e.longitude),
            north: b.north.max(e.latitude),
            east: b.east.max(e.longitude),
        }))
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }
}
