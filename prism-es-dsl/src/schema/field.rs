//! Field descriptors, dynamic templates and bound fields

use super::Schema;
use crate::error::DslError;
use crate::types::FieldType;
use crate::Result;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Immutable field descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// Mapping options emitted next to `type` (analyzer, index, required ...)
    pub options: Map<String, Value>,
    /// Multi-fields, in declaration order
    pub fields: IndexMap<String, Field>,
    /// Synthesized from a dynamic template
    pub dynamic: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            options: Map::new(),
            fields: IndexMap::new(),
            dynamic: false,
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Mark the field as required for validated serialization
    pub fn required(self) -> Self {
        self.option("required", true)
    }

    /// Add a multi-field such as `title.raw`
    pub fn sub_field(mut self, field: Field) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn is_required(&self) -> bool {
        self.options.get("required").and_then(Value::as_bool) == Some(true)
    }
}

/// Wildcard pattern producing fields for undeclared names
#[derive(Debug, Clone)]
pub struct DynamicTemplate {
    pattern: String,
    template: Field,
    regex: Regex,
}

impl DynamicTemplate {
    pub fn new(pattern: impl Into<String>, field_type: FieldType) -> Result<Self> {
        let pattern = pattern.into();
        let regex = Regex::new(&glob_to_regex(&pattern)).map_err(|e| {
            DslError::InvalidExpression(format!("dynamic template '{}': {}", pattern, e))
        })?;
        Ok(Self {
            template: Field::new(pattern.clone(), field_type),
            pattern,
            regex,
        })
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template = self.template.option(key, value);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The field the template stands for, named after the pattern
    pub fn template(&self) -> &Field {
        &self.template
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub(crate) fn instantiate(&self, name: &str) -> Field {
        Field {
            name: name.to_string(),
            dynamic: true,
            ..self.template.clone()
        }
    }
}

/// Translate a shell-style glob into an anchored regex.
///
/// `*` and `?` match any run of characters and a single character,
/// `[seq]` and `[!seq]` match one character in or not in `seq`. An
/// unclosed `[` is a literal. Everything else matches itself.
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                while chars.get(i) == Some(&'*') {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => {
                let mut j = i;
                if chars.get(j) == Some(&'!') {
                    j += 1;
                }
                // a leading `]` is part of the set
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                    continue;
                }
                out.push_str(&char_class(&chars[i..j]));
                i = j + 1;
            }
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push('$');
    out
}

/// Regex class for the contents of a glob bracket expression
fn char_class(set: &[char]) -> String {
    let (negated, set) = match set.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, set),
    };
    let escape = |c: char| regex::escape(c.encode_utf8(&mut [0; 4]));

    let mut items = String::new();
    let mut k = 0;
    while k < set.len() {
        if k + 2 < set.len() && set[k + 1] == '-' {
            let (lo, hi) = (set[k], set[k + 2]);
            // reversed ranges match nothing
            if lo <= hi {
                items.push_str(&escape(lo));
                items.push('-');
                items.push_str(&escape(hi));
            }
            k += 3;
        } else {
            items.push_str(&escape(set[k]));
            k += 1;
        }
    }

    match (negated, items.is_empty()) {
        (false, true) => r"[^\x00-\x{10FFFF}]".to_string(),
        (true, true) => ".".to_string(),
        (false, false) => format!("[{}]", items),
        (true, false) => format!("[^{}]", items),
    }
}

/// A field attached to the schema it belongs to
#[derive(Clone)]
pub struct BoundField {
    schema: Arc<Schema>,
    field: Arc<Field>,
}

impl BoundField {
    pub(crate) fn new(schema: Arc<Schema>, field: Arc<Field>) -> Self {
        Self { schema, field }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field.field_type
    }
}

impl PartialEq for BoundField {
    fn eq(&self, other: &Self) -> bool {
        self.schema.doc_type() == other.schema.doc_type() && self.field == other.field
    }
}

impl fmt::Debug for BoundField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundField")
            .field("doc_type", &self.schema.doc_type())
            .field("field", &self.field)
            .finish()
    }
}
