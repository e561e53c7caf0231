mod builder;

pub use builder::{bind_attributes, parse_comm_msg};

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[cfg(test)]
mod tests;

/// Event dispatched when a message does not name one
pub const DEFAULT_EVENT: &str = "mouseover";

/// Message (comm_msg) dispatched through the bus.
///
/// Wire format:
/// ```json
/// {
///   "event": "click",
///   "selector": {"class": "n_80202_5"},
///   "attributes_req": ["NodeLabel"]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    /// Record fields copied into function params before dispatch, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes_req: Vec<String>,
}

impl Message {
    /// Message targeting the element with `id`
    pub fn to_id(id: impl Into<String>) -> Self {
        Self::with_selector(Selector::Id(id.into()))
    }

    /// Message targeting every element carrying `class`
    pub fn to_class(class: impl Into<String>) -> Self {
        Self::with_selector(Selector::Class(class.into()))
    }

    /// Message targeting every element whose attribute `name` equals `value`
    pub fn to_attr(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_selector(Selector::Attribute {
            name: name.into(),
            value: value.into(),
        })
    }

    /// Message invoking the registered command `command`
    pub fn call(command: impl Into<String>) -> Self {
        Self::with_selector(Selector::Function {
            command: command.into(),
            params: Map::new(),
        })
    }

    fn with_selector(selector: Selector) -> Self {
        Self {
            event: None,
            selector: Some(selector),
            attributes_req: Vec::new(),
        }
    }

    pub fn on(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set a function param. No effect on non-function selectors.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(Selector::Function { params, .. }) = &mut self.selector {
            params.insert(name.into(), value.into());
        }
        self
    }

    pub fn requiring<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes_req = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Copy of this message with `event` defaulted to "mouseover"
    pub fn with_default_event(&self) -> Self {
        let mut message = self.clone();
        if message.event.is_none() {
            message.event = Some(DEFAULT_EVENT.to_string());
        }
        message
    }

    /// Function params, when the selector is a function call
    pub fn params(&self) -> Option<&Map<String, Value>> {
        match &self.selector {
            Some(Selector::Function { params, .. }) => Some(params),
            _ => None,
        }
    }
}

/// Target of a message. Exactly one key on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `{"id": "<element id>"}`
    Id(String),

    /// `{"class": "<class>"}`
    Class(String),

    /// `{"<attr>": "<value>"}`: any key other than id/class/function
    Attribute { name: String, value: String },

    /// `{"function": {"func": "<command>", "params": {...}}}`
    Function {
        command: String,
        params: Map<String, Value>,
    },
}

/// Malformed selector
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorError {
    /// Selector is not a JSON object
    NotAnObject,
    /// Selector has no key
    Empty,
    /// Selector has more than one key
    MultipleKeys(Vec<String>),
    /// Function descriptor without a usable `func` name
    InvalidFunction(String),
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::NotAnObject => write!(f, "selector must be a JSON object"),
            SelectorError::Empty => write!(f, "selector must have exactly one key, got none"),
            SelectorError::MultipleKeys(keys) => write!(
                f,
                "selector must have exactly one key, got {}",
                keys.join(", ")
            ),
            SelectorError::InvalidFunction(reason) => {
                write!(f, "invalid function selector: {}", reason)
            }
        }
    }
}

impl std::error::Error for SelectorError {}

impl TryFrom<Value> for Selector {
    type Error = SelectorError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let object = match value {
            Value::Object(object) => object,
            _ => return Err(SelectorError::NotAnObject),
        };

        if object.len() > 1 {
            return Err(SelectorError::MultipleKeys(object.keys().cloned().collect()));
        }

        let (kind, value) = object.into_iter().next().ok_or(SelectorError::Empty)?;

        match kind.as_str() {
            "id" => Ok(Selector::Id(selector_text(&value))),
            "class" => Ok(Selector::Class(selector_text(&value))),
            "function" => parse_function(value),
            _ => Ok(Selector::Attribute {
                name: kind,
                value: selector_text(&value),
            }),
        }
    }
}

fn parse_function(value: Value) -> Result<Selector, SelectorError> {
    let mut descriptor = match value {
        Value::Object(descriptor) => descriptor,
        _ => {
            return Err(SelectorError::InvalidFunction(
                "descriptor must be an object".to_string(),
            ))
        }
    };

    let command = match descriptor.remove("func") {
        Some(Value::String(name)) if !name.is_empty() => name,
        Some(other) => {
            return Err(SelectorError::InvalidFunction(format!(
                "func must be a command name, got {}",
                other
            )))
        }
        None => return Err(SelectorError::InvalidFunction("missing func".to_string())),
    };

    let params = match descriptor.remove("params") {
        Some(Value::Object(params)) => params,
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            return Err(SelectorError::InvalidFunction(format!(
                "params must be an object, got {}",
                other
            )))
        }
    };

    Ok(Selector::Function { command, params })
}

/// Selector values are matched as strings; numbers match their decimal form
fn selector_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Selector::try_from(value).map_err(de::Error::custom)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Selector::Id(id) => map.serialize_entry("id", id)?,
            Selector::Class(class) => map.serialize_entry("class", class)?,
            Selector::Attribute { name, value } => map.serialize_entry(name, value)?,
            Selector::Function { command, params } => {
                let mut descriptor = Map::new();
                descriptor.insert("func".to_string(), Value::String(command.clone()));
                descriptor.insert("params".to_string(), Value::Object(params.clone()));
                map.serialize_entry("function", &descriptor)?;
            }
        }
        map.end()
    }
}
