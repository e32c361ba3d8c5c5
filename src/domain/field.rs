//! Declarative credential field schemas
//!
//! A [`FieldSchema`] describes which fields a provider's connection carries,
//! how they are rendered in a configuration form, and which of them must be
//! encrypted at rest. The same schema drives validation of stored connections.

use crate::error::{AppError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Bool,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Password,
    Select,
    Checkbox,
}

/// One entry of a provider's field schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub datatype: DataType,
    pub input_kind: InputKind,
    pub encrypt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Select options as (value, label) pairs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<(&'static str, &'static str)>,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub placeholder: &'static str,
}

impl FieldSpec {
    fn base(
        name: &'static str,
        label: &'static str,
        datatype: DataType,
        input_kind: InputKind,
    ) -> Self {
        Self {
            name,
            label,
            required: false,
            datatype,
            input_kind,
            encrypt: false,
            default: None,
            options: Vec::new(),
            placeholder: "",
        }
    }

    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::base(name, label, DataType::String, InputKind::Text)
    }

    pub fn password(name: &'static str, label: &'static str) -> Self {
        Self::base(name, label, DataType::String, InputKind::Password)
    }

    pub fn select(
        name: &'static str,
        label: &'static str,
        options: Vec<(&'static str, &'static str)>,
    ) -> Self {
        Self {
            options,
            ..Self::base(name, label, DataType::String, InputKind::Select)
        }
    }

    pub fn checkbox(name: &'static str, label: &'static str) -> Self {
        Self {
            default: Some(Value::Bool(false)),
            ..Self::base(name, label, DataType::Bool, InputKind::Checkbox)
        }
    }

    pub fn number(name: &'static str, label: &'static str) -> Self {
        Self::base(name, label, DataType::Number, InputKind::Text)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_placeholder(mut self, placeholder: &'static str) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Check a single value against this field, applying numeric coercion.
    fn check(&self, value: &Value) -> Result<Value> {
        match (self.datatype, value) {
            (DataType::String, Value::String(s)) => {
                if !self.options.is_empty() && !self.options.iter().any(|(v, _)| v == s) {
                    let allowed: Vec<&str> = self.options.iter().map(|(v, _)| *v).collect();
                    return Err(AppError::invalid_field(
                        self.name,
                        format!("must be one of: {}", allowed.join(", ")),
                    ));
                }
                Ok(value.clone())
            }
            (DataType::Bool, Value::Bool(_)) => Ok(value.clone()),
            (DataType::Number, Value::Number(_)) => Ok(value.clone()),
            (DataType::Number, Value::String(s)) => coerce_number(s.trim())
                .ok_or_else(|| AppError::invalid_field(self.name, "expected a number")),
            (DataType::String, _) => Err(AppError::invalid_field(self.name, "expected a string")),
            (DataType::Bool, _) => Err(AppError::invalid_field(self.name, "expected a boolean")),
            (DataType::Number, _) => Err(AppError::invalid_field(self.name, "expected a number")),
        }
    }
}

fn coerce_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Whether a field value counts as absent
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Ordered field schema of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        debug_assert!(
            {
                let mut seen = HashSet::new();
                fields.iter().all(|f| seen.insert(f.name))
            },
            "field names must be unique within a schema"
        );
        debug_assert!(
            fields
                .iter()
                .all(|f| !f.encrypt || f.datatype == DataType::String),
            "encrypted fields must be strings"
        );
        Self { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_encrypted(&self, name: &str) -> bool {
        self.get(name).map(|f| f.encrypt).unwrap_or(false)
    }

    pub fn encrypted_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.encrypt).map(|f| f.name)
    }

    /// Check that every required field is present and non-empty.
    pub fn check_required(&self, values: &HashMap<String, Value>) -> Result<()> {
        for field in self.fields.iter().filter(|f| f.required) {
            if is_blank(values.get(field.name)) {
                return Err(AppError::invalid_field(field.name, "is required"));
            }
        }
        Ok(())
    }

    /// Validate a field map, returning a normalized copy.
    ///
    /// Optional blank fields take their declared default. Numeric strings are
    /// coerced for `number` fields; no other type coercion happens. Keys the
    /// schema does not know about are kept untouched.
    pub fn validate(&self, values: &HashMap<String, Value>) -> Result<HashMap<String, Value>> {
        self.check_required(values)?;

        let mut normalized = values.clone();
        for field in &self.fields {
            match values.get(field.name) {
                value if is_blank(value) => {
                    if let Some(default) = &field.default {
                        normalized.insert(field.name.to_string(), default.clone());
                    }
                }
                Some(value) => {
                    normalized.insert(field.name.to_string(), field.check(value)?);
                }
                None => {}
            }
        }

        Ok(normalized)
    }
}
