//! Declared action inputs.
//!
//! Each action lists its inputs up front as plain data. The dispatcher
//! validates against that list before execution, and the CLI derives its
//! flags from it.

use serde::Serialize;
use serde_json::Value;

use crate::errors::GateError;
use crate::types::Params;

/// Type tag of one input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 text.
    String,
    /// Whole number.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// Anything.
    Any,
}

impl FieldKind {
    /// Lower-case name used in messages and listings.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }

    /// Turn a textual value into this kind, if it parses.
    ///
    /// Path, query, form and CLI inputs always arrive as strings.
    fn coerce(self, raw: &str) -> Option<Value> {
        match self {
            Self::Integer => raw.trim().parse::<i64>().ok().map(Value::from),
            Self::Number => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            Self::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
            Self::String | Self::Object | Self::Array | Self::Any => None,
        }
    }
}

/// One declared input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputField {
    /// Parameter key.
    pub name: String,
    /// Expected type.
    pub kind: FieldKind,
    /// Whether absence is an error.
    pub required: bool,
    /// Help text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InputField {
    /// Optional input of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: None,
        }
    }

    /// Optional string input.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Optional integer input.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Optional boolean input.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Mark as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach help text.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered list of declared inputs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InputSchema {
    fields: Vec<InputField>,
}

impl InputSchema {
    /// Schema with no declared inputs; every param passes through.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, field: InputField) -> Self {
        self.fields.push(field);
        self
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[InputField] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether no inputs are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check `params` against the declared fields.
    ///
    /// Coerces string values into numeric and boolean kinds where they parse.
    /// Undeclared keys are left untouched. Null counts as absent.
    pub fn validate(&self, mut params: Params) -> Result<Params, GateError> {
        for field in &self.fields {
            let Some(value) = params.get_mut(&field.name) else {
                if field.required {
                    return Err(GateError::ParamRequired {
                        key: field.name.clone(),
                    });
                }
                continue;
            };

            if value.is_null() {
                if field.required {
                    return Err(GateError::ParamRequired {
                        key: field.name.clone(),
                    });
                }
                continue;
            }

            if field.kind.accepts(value) {
                continue;
            }

            let coerced = value.as_str().and_then(|raw| field.kind.coerce(raw));
            match coerced {
                Some(v) => *value = v,
                None => {
                    return Err(GateError::ParamInvalid {
                        key: field.name.clone(),
                        message: format!("expected {}", field.kind.as_str()),
                    });
                }
            }
        }
        Ok(params)
    }
}
