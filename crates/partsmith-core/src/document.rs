//! # Configuration Documents
//!
//! Deep merge of JSON configuration documents and `{{ variable }}`
//! placeholder rendering.
//!
//! ## Rendering Rules
//!
//! - Placeholders are looked up by dotted path (`{{ motor.gain }}`)
//! - String values are inserted verbatim, any other value as JSON text
//! - Only string values are rendered; object keys are left untouched
//! - An unknown variable is an error, never an empty substitution

use crate::PartsmithError;
use serde_json::{Map, Value};

/// Deep-merge `overlay` into `base`.
///
/// Objects merge key by key; any other value in `overlay` replaces the one
/// in `base`.
pub fn merge_documents(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(inner)), Value::Object(patch)) => merge_documents(inner, patch),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

// =============================================================================
// TEMPLATE CONTEXT
// =============================================================================

/// Variables available to placeholder rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    variables: Map<String, Value>,
}

impl TemplateContext {
    #[must_use]
    pub fn new(variables: Map<String, Value>) -> Self {
        Self { variables }
    }

    #[must_use]
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Resolve a dotted path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.variables.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Render every placeholder of a string.
    pub fn render_str(&self, input: &str) -> Result<String, PartsmithError> {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| PartsmithError::Template(format!("unclosed placeholder in '{}'", input)))?;
            let path = after[..end].trim();
            if path.is_empty() {
                return Err(PartsmithError::Template(format!("empty placeholder in '{}'", input)));
            }
            match self.lookup(path) {
                Some(Value::String(s)) => output.push_str(s),
                Some(other) => output.push_str(&other.to_string()),
                None => return Err(PartsmithError::UnresolvedVariable(path.to_string())),
            }
            rest = &after[end + 2..];
        }
        output.push_str(rest);
        Ok(output)
    }

    pub fn render_value(&self, value: &Value) -> Result<Value, PartsmithError> {
        match value {
            Value::String(s) => Ok(Value::String(self.render_str(s)?)),
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => Ok(Value::Object(self.render_map(map)?)),
            other => Ok(other.clone()),
        }
    }

    pub fn render_map(&self, map: &Map<String, Value>) -> Result<Map<String, Value>, PartsmithError> {
        map.iter()
            .map(|(key, value)| Ok((key.clone(), self.render_value(value)?)))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
