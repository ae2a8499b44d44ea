//! Compiles a declarative field -> type map into validation rules.
//!
//! Two input shapes are accepted:
//! - shorthand: `{"name": "string", "owner": "id", "address": {"city": "string"}, "tags": ["string"]}`
//! - full form: `{"properties": {"name": {"type": "string", "required": true, "maxLength": 40}}}`
//!
//! In the shorthand every nested object is a sub-schema, even one with a `type` key.

use crate::error::ConfigError;
use regex::Regex;
use serde_json::{Map, Value};

/// Logical field type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// 24-hex object id, stored natively.
    Identifier,
    /// Date and time (`date-time`).
    DateTime,
    /// Calendar date only (`date`).
    Date,
    /// Untyped, or a type name this compiler does not know. Never rejected.
    Any(Option<String>),
}

impl FieldType {
    pub fn parse(name: &str) -> FieldType {
        match name {
            "string" => FieldType::String,
            "number" => FieldType::Number,
            "integer" => FieldType::Integer,
            "boolean" => FieldType::Boolean,
            "object" => FieldType::Object,
            "array" => FieldType::Array,
            "id" | "identifier" | "objectid" => FieldType::Identifier,
            "date-time" | "datetime" => FieldType::DateTime,
            "date" => FieldType::Date,
            "any" => FieldType::Any(None),
            other => FieldType::Any(Some(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Identifier => "id",
            FieldType::DateTime => "date-time",
            FieldType::Date => "date",
            FieldType::Any(Some(name)) => name,
            FieldType::Any(None) => "any",
        }
    }

    /// String-valued logical types that are converted to a store-native value.
    pub fn is_native(&self) -> bool {
        matches!(self, FieldType::Identifier | FieldType::DateTime | FieldType::Date)
    }
}

#[derive(Clone, Debug)]
pub struct FieldRule {
    pub field_type: FieldType,
    pub required: bool,
    pub format: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub allowed: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Nested properties for object fields.
    pub properties: Option<Schema>,
    /// Accepted element shapes for array fields; empty means any element.
    pub items: Vec<FieldRule>,
}

impl FieldRule {
    pub fn of(field_type: FieldType) -> Self {
        let format = match field_type {
            FieldType::DateTime => Some("date-time".to_string()),
            FieldType::Date => Some("date".to_string()),
            _ => None,
        };
        FieldRule {
            field_type,
            required: false,
            format,
            min_length: None,
            max_length: None,
            pattern: None,
            allowed: None,
            minimum: None,
            maximum: None,
            properties: None,
            items: Vec::new(),
        }
    }
}

/// Compiled schema: rules in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    pub properties: Vec<(String, FieldRule)>,
}

impl Schema {
    pub fn compile(descriptor: &Value) -> Result<Schema, ConfigError> {
        match descriptor {
            Value::Object(map) => match map.get("properties") {
                Some(Value::Object(props)) => compile_properties(props, true, ""),
                _ => compile_properties(map, false, ""),
            },
            other => Err(ConfigError::Schema {
                field: String::new(),
                message: format!("schema must be an object, got {}", json_kind(other)),
            }),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.properties.iter().find(|(name, _)| name == field).map(|(_, r)| r)
    }

    /// Rule for a dotted path, descending into nested object properties.
    pub fn rule_for_path(&self, path: &str) -> Option<&FieldRule> {
        let mut parts = path.split('.');
        let mut rule = self.get(parts.next()?)?;
        for part in parts {
            rule = rule.properties.as_ref()?.get(part)?;
        }
        Some(rule)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

fn compile_properties(map: &Map<String, Value>, full: bool, prefix: &str) -> Result<Schema, ConfigError> {
    let mut properties = Vec::with_capacity(map.len());
    for (name, descriptor) in map {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        properties.push((name.clone(), compile_field(descriptor, full, &path)?));
    }
    Ok(Schema { properties })
}

fn compile_field(descriptor: &Value, full: bool, path: &str) -> Result<FieldRule, ConfigError> {
    match descriptor {
        Value::String(type_name) => Ok(FieldRule::of(FieldType::parse(type_name))),
        Value::Array(entries) => {
            let mut rule = FieldRule::of(FieldType::Array);
            for entry in entries {
                rule.items.push(compile_field(entry, full, path)?);
            }
            Ok(rule)
        }
        Value::Object(map) => {
            if full {
                compile_rule(map, path)
            } else {
                let mut rule = FieldRule::of(FieldType::Object);
                rule.properties = Some(compile_properties(map, false, path)?);
                Ok(rule)
            }
        }
        other => Err(malformed(path, format!("type descriptor must be a string, list or object, got {}", json_kind(other)))),
    }
}

fn compile_rule(map: &Map<String, Value>, path: &str) -> Result<FieldRule, ConfigError> {
    let field_type = match map.get("type") {
        None => FieldType::Any(None),
        Some(Value::String(name)) => FieldType::parse(name),
        Some(other) => return Err(malformed(path, format!("`type` must be a string, got {}", json_kind(other)))),
    };
    let mut rule = FieldRule::of(field_type);
    rule.required = map.get("required").and_then(Value::as_bool).unwrap_or(false);
    if let Some(format) = map.get("format").and_then(Value::as_str) {
        rule.format = Some(format.to_string());
    }
    rule.min_length = map.get("minLength").and_then(Value::as_u64).map(|n| n as usize);
    rule.max_length = map.get("maxLength").and_then(Value::as_u64).map(|n| n as usize);
    rule.minimum = map.get("minimum").and_then(Value::as_f64);
    rule.maximum = map.get("maximum").and_then(Value::as_f64);
    if let Some(pattern) = map.get("pattern").and_then(Value::as_str) {
        let re = Regex::new(pattern).map_err(|e| malformed(path, format!("invalid pattern: {}", e)))?;
        rule.pattern = Some(re);
    }
    match map.get("enum") {
        None => {}
        Some(Value::Array(values)) => rule.allowed = Some(values.clone()),
        Some(other) => return Err(malformed(path, format!("`enum` must be a list, got {}", json_kind(other)))),
    }
    match map.get("properties") {
        None => {}
        Some(Value::Object(props)) => {
            if rule.field_type == FieldType::Any(None) {
                rule.field_type = FieldType::Object;
            }
            rule.properties = Some(compile_properties(props, true, path)?);
        }
        Some(other) => return Err(malformed(path, format!("`properties` must be an object, got {}", json_kind(other)))),
    }
    match map.get("items") {
        None => {}
        Some(Value::Array(entries)) => {
            for entry in entries {
                rule.items.push(compile_field(entry, true, path)?);
            }
        }
        Some(entry) => rule.items.push(compile_field(entry, true, path)?),
    }
    Ok(rule)
}

fn malformed(path: &str, message: String) -> ConfigError {
    ConfigError::Schema {
        field: path.to_string(),
        message,
    }
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_shorthand_map_in_order() {
        let schema = Schema::compile(&json!({
            "owner": "id",
            "name": "string",
            "born": "date",
            "seen": "date-time",
            "count": "integer"
        }))
        .unwrap();
        let names: Vec<_> = schema.properties.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["owner", "name", "born", "seen", "count"]);
        assert_eq!(schema.get("owner").unwrap().field_type, FieldType::Identifier);
        assert_eq!(schema.get("born").unwrap().format.as_deref(), Some("date"));
        assert_eq!(schema.get("seen").unwrap().format.as_deref(), Some("date-time"));
    }

    #[test]
    fn nested_objects_and_lists_recurse() {
        let schema = Schema::compile(&json!({
            "address": {"city": "string", "owner": "id"},
            "tags": ["string"],
            "parts": [{"ref": "id"}]
        }))
        .unwrap();
        let address = schema.get("address").unwrap();
        assert_eq!(address.field_type, FieldType::Object);
        assert_eq!(
            schema.rule_for_path("address.owner").unwrap().field_type,
            FieldType::Identifier
        );
        let parts = schema.get("parts").unwrap();
        assert_eq!(parts.field_type, FieldType::Array);
        assert_eq!(parts.items[0].field_type, FieldType::Object);
    }

    #[test]
    fn shorthand_field_named_type_is_nested() {
        let schema = Schema::compile(&json!({"contact": {"type": "string", "value": "string"}})).unwrap();
        let contact = schema.get("contact").unwrap();
        assert_eq!(contact.field_type, FieldType::Object);
        assert_eq!(
            schema.rule_for_path("contact.type").unwrap().field_type,
            FieldType::String
        );
        assert!(schema.rule_for_path("contact.value").is_some());
    }

    #[test]
    fn unknown_types_are_permissive() {
        let schema = Schema::compile(&json!({"blob": "binary"})).unwrap();
        assert_eq!(
            schema.get("blob").unwrap().field_type,
            FieldType::Any(Some("binary".into()))
        );
    }

    #[test]
    fn full_form_schema_is_read_as_rules() {
        let schema = Schema::compile(&json!({
            "properties": {
                "_id": {"type": "id"},
                "id": {"type": "integer", "required": true},
                "name": {"type": "string", "required": true, "maxLength": 10, "pattern": "^W"}
            }
        }))
        .unwrap();
        let id = schema.get("id").unwrap();
        assert!(id.required);
        assert_eq!(id.field_type, FieldType::Integer);
        assert_eq!(schema.get("_id").unwrap().field_type, FieldType::Identifier);
        assert_eq!(schema.get("name").unwrap().max_length, Some(10));
    }

    #[test]
    fn malformed_nested_specs_fail() {
        let err = Schema::compile(&json!({"address": {"zip": 5}})).unwrap_err();
        match err {
            ConfigError::Schema { field, .. } => assert_eq!(field, "address.zip"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(Schema::compile(&json!("string")).is_err());
        assert!(Schema::compile(&json!({"properties": {"a": {"type": "string", "pattern": "("}}})).is_err());
    }
}
