//! Declared payload shapes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse JSON type a node accepts or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    #[default]
    Any,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl PayloadShape {
    /// Shape of a concrete value. Never returns `Any`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Whether a producer declaring `other` can feed a consumer declaring `self`.
    pub fn accepts(self, other: PayloadShape) -> bool {
        self == Self::Any || other == Self::Any || self == other
    }

    /// Whether `value` satisfies this shape.
    pub fn matches(self, value: &Value) -> bool {
        self.accepts(Self::of(value))
    }
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}
