//! Source graph element tree
//!
//! Responses from the source graph have no fixed shape. [`SourceElement`]
//! models them as a small tagged tree and exposes accessors that return
//! `None` for anything missing or of the wrong kind.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// One node of a source graph response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum SourceElement {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<SourceElement>),
    Object(IndexMap<String, SourceElement>),
}

impl SourceElement {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Named field of an object element
    pub fn field(&self, name: &str) -> Option<&SourceElement> {
        match self {
            SourceElement::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Named field, only if it is a string
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(SourceElement::as_str)
    }

    /// Named field, only if it is an array
    pub fn array_field(&self, name: &str) -> Option<&[SourceElement]> {
        self.field(name).and_then(SourceElement::as_array)
    }

    /// Named field, only if it is an object
    pub fn object_field(&self, name: &str) -> Option<&SourceElement> {
        self.field(name).filter(|f| f.is_object())
    }

    /// Iterate the fields of an object element (empty for other kinds)
    pub fn fields(&self) -> impl Iterator<Item = (&str, &SourceElement)> {
        let fields = match self {
            SourceElement::Object(fields) => Some(fields.iter()),
            _ => None,
        };
        fields
            .into_iter()
            .flatten()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Element id, as carried in the `id` field (string or number)
    pub fn id(&self) -> Option<String> {
        self.field("id").and_then(SourceElement::scalar_string)
    }

    /// Exact source type name (`exactType` field), if present and non-empty
    pub fn exact_type(&self) -> Option<&str> {
        self.str_field("exactType").filter(|s| !s.is_empty())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SourceElement::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SourceElement::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[SourceElement]> {
        match self {
            SourceElement::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SourceElement::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, SourceElement::Object(_))
    }

    /// String form of a scalar; `None` for null, arrays and objects
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            SourceElement::String(s) => Some(s.clone()),
            SourceElement::Number(n) => Some(n.to_string()),
            SourceElement::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Textual form used when a value is copied into a string property:
    /// strings are unquoted, everything else is compact JSON.
    pub fn to_value_string(&self) -> String {
        match self {
            SourceElement::String(s) => s.clone(),
            SourceElement::Null => String::new(),
            other => other.to_value().to_string(),
        }
    }

    /// Convert to a JSON value
    pub fn to_value(&self) -> Value {
        Value::from(self.clone())
    }

    /// Result elements of a response shaped `{ <query>: { <key>: [ ... ] } }`.
    ///
    /// With `result_key` set only arrays under that key are collected.
    /// Non-object items are skipped.
    pub fn result_elements(&self, result_key: Option<&str>) -> Vec<&SourceElement> {
        let mut elements = Vec::new();
        for (_, query) in self.fields() {
            for (key, result) in query.fields() {
                if result_key.map_or(false, |wanted| wanted != key) {
                    continue;
                }
                if let Some(items) = result.as_array() {
                    elements.extend(items.iter().filter(|i| i.is_object()));
                }
            }
        }
        elements
    }
}

impl From<Value> for SourceElement {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SourceElement::Null,
            Value::Bool(b) => SourceElement::Bool(b),
            Value::Number(n) => SourceElement::Number(n),
            Value::String(s) => SourceElement::String(s),
            Value::Array(items) => {
                SourceElement::Array(items.into_iter().map(SourceElement::from).collect())
            }
            Value::Object(fields) => SourceElement::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, SourceElement::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<SourceElement> for Value {
    fn from(element: SourceElement) -> Self {
        match element {
            SourceElement::Null => Value::Null,
            SourceElement::Bool(b) => Value::Bool(b),
            SourceElement::Number(n) => Value::Number(n),
            SourceElement::String(s) => Value::String(s),
            SourceElement::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            SourceElement::Object(fields) => {
                Value::Object(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
