//! Compiles a read request (path + query string + resource defaults) into a store-agnostic plan.

use crate::config::{FieldType, ResourceDefinition, SortDirection};
use crate::document::{date_value, lookup, oid_value, parse_datetime, ObjectId};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Marker segment that introduces positional `field/value` pairs.
pub const POSITIONAL_MARKER: &str = "_";

/// What the path below the resource name addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathTarget {
    Collection,
    Item(String),
    /// `_/field/value(/field/value)*`, already percent-decoded.
    Filtered(Vec<(String, String)>),
}

impl PathTarget {
    /// `None` when the segments do not form a supported shape (e.g. `R/a/b`).
    pub fn from_segments(segments: &[String]) -> Option<PathTarget> {
        match segments {
            [] => Some(PathTarget::Collection),
            [marker, rest @ ..] if marker == POSITIONAL_MARKER => {
                let pairs = rest
                    .chunks(2)
                    .filter(|pair| pair.len() == 2 && !pair[0].is_empty() && !pair[1].is_empty())
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                Some(PathTarget::Filtered(pairs))
            }
            [id] if !id.is_empty() => Some(PathTarget::Item(id.clone())),
            _ => None,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            PathTarget::Item(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Equality against a store-native value.
    Equals(Value),
    /// Case-insensitive regular expression, anchored at both ends.
    Pattern(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub condition: Condition,
}

/// Conjunction of field terms and an optional phrase search.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub terms: Vec<FieldFilter>,
    pub text: Option<String>,
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Filter {
            terms: vec![FieldFilter {
                field: field.into(),
                condition: Condition::Equals(value),
            }],
            text: None,
        }
    }

    /// True when the filter matches every document.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.text.is_none()
    }
}

/// Inclusion projection. `_id` is only returned when listed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
}

impl Projection {
    /// Keep only the listed fields; dotted paths keep the nested value under its parents.
    pub fn apply(&self, doc: Value) -> Value {
        match self {
            Projection::Include(fields) if doc.is_object() => {
                let mut out = Map::new();
                for field in fields {
                    if let Some(v) = lookup(&doc, field) {
                        insert_path(&mut out, field, v.clone());
                    }
                }
                Value::Object(out)
            }
            _ => doc,
        }
    }
}

fn insert_path(out: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            out.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = out
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPlan {
    pub filter: Filter,
    pub projection: Projection,
    pub sort: Vec<(String, SortDirection)>,
    /// 0 means unbounded.
    pub limit: u64,
    pub skip: u64,
}

/// Build the plan for `GET base/R[/...]`.
pub fn compile(
    resource: &ResourceDefinition,
    target: &PathTarget,
    params: &HashMap<String, String>,
    text_param: &str,
) -> QueryPlan {
    let mut filter = Filter::default();
    match target {
        PathTarget::Collection => {}
        PathTarget::Filtered(pairs) => {
            filter.terms = pairs
                .iter()
                .map(|(field, value)| positional_term(resource, field, value))
                .collect();
        }
        PathTarget::Item(id) => {
            filter.terms.push(FieldFilter {
                field: resource.identifier_field.clone(),
                condition: Condition::Equals(coerce_identifier(resource, id)),
            });
        }
    }
    if let Some(text) = params.get(text_param).filter(|t| !t.is_empty()) {
        filter.text = Some(text.clone());
    }

    let plan = QueryPlan {
        filter,
        projection: parse_fields(params.get("fields").map(String::as_str)),
        sort: match params.get("sort").filter(|s| !s.is_empty()) {
            Some(raw) => parse_sort(raw),
            None => resource.default_sort.clone(),
        },
        limit: parse_limit(params.get("limit").map(String::as_str), resource.default_limit),
        skip: parse_offset(params.get("offset").map(String::as_str)),
    };
    tracing::debug!(resource = %resource.name, plan = ?plan, "compiled query plan");
    plan
}

fn parse_fields(raw: Option<&str>) -> Projection {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Projection::All;
    };
    let mut fields: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !fields.iter().any(|f| f == name) {
            fields.push(name.to_string());
        }
    }
    if fields.is_empty() {
        Projection::All
    } else {
        Projection::Include(fields)
    }
}

/// `field[:asc|desc]` tokens; a repeated field keeps its first position and takes the last direction.
fn parse_sort(raw: &str) -> Vec<(String, SortDirection)> {
    let mut sort: Vec<(String, SortDirection)> = Vec::new();
    for token in raw.split(',') {
        let mut parts = token.split(':');
        let field = parts.next().unwrap_or("").trim();
        if field.is_empty() {
            continue;
        }
        let dir = parts
            .next()
            .map(|d| SortDirection::from_token(d.trim()))
            .unwrap_or(SortDirection::Asc);
        match sort.iter_mut().find(|(f, _)| f == field) {
            Some(entry) => entry.1 = dir,
            None => sort.push((field.to_string(), dir)),
        }
    }
    sort
}

/// Leading-integer parse: optional sign then digits, trailing garbage ignored.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits.bytes().take_while(u8::is_ascii_digit).count();
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Numeric `limit` wins; anything non-numeric or negative falls back to the default.
fn parse_limit(raw: Option<&str>, default: u64) -> u64 {
    let Some(raw) = raw else { return default };
    let numeric = raw.trim().parse::<f64>().map(|f| f.is_finite()).unwrap_or(false);
    if !numeric {
        tracing::debug!(limit = %raw, "ignoring non-numeric limit");
        return default;
    }
    match parse_leading_int(raw) {
        Some(n) if n >= 0 => n as u64,
        _ => default,
    }
}

fn parse_offset(raw: Option<&str>) -> u64 {
    raw.and_then(parse_leading_int)
        .filter(|n| *n > 0)
        .map(|n| n as u64)
        .unwrap_or(0)
}

fn positional_term(resource: &ResourceDefinition, field: &str, value: &str) -> FieldFilter {
    FieldFilter {
        field: field.to_string(),
        condition: match native_value(resource, field, value) {
            Some(v) => Condition::Equals(v),
            None => Condition::Pattern(anchored_pattern(value)),
        },
    }
}

/// `^value$` as a regex fragment; a value that is not a valid regex is matched literally.
fn anchored_pattern(value: &str) -> String {
    let raw = format!("^{}$", value);
    if Regex::new(&raw).is_ok() {
        raw
    } else {
        tracing::debug!(value = %value, "positional value is not a regex; matching literally");
        format!("^{}$", regex::escape(value))
    }
}

/// Store-native form of a path value for `field`, per its declared type. An undeclared
/// `_id` holding a valid hex key is an object id. `None` leaves the raw string.
fn native_value(resource: &ResourceDefinition, field: &str, raw: &str) -> Option<Value> {
    match resource.field_type(field) {
        Some(FieldType::Identifier) => raw.parse::<ObjectId>().ok().map(|oid| oid_value(&oid)),
        Some(FieldType::Integer) => raw.trim().parse::<i64>().ok().map(Value::from),
        Some(FieldType::Number) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        Some(FieldType::DateTime) | Some(FieldType::Date) => parse_datetime(raw).map(|dt| date_value(&dt)),
        None if field == "_id" => raw.parse::<ObjectId>().ok().map(|oid| oid_value(&oid)),
        _ => None,
    }
}

/// Convert a path identifier per the identifier field's declared type; raw string otherwise.
pub fn coerce_identifier(resource: &ResourceDefinition, raw: &str) -> Value {
    native_value(resource, &resource.identifier_field, raw).unwrap_or_else(|| Value::String(raw.to_string()))
}
