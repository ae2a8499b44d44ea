//! Write payload validation and normalization.

use crate::config::{FieldRule, FieldType, ResourceDefinition, Schema};
use crate::document::{as_date, as_oid, date_value, oid_value, parse_date, parse_datetime, ObjectId};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const CREATED_FIELD: &str = "created";
pub const MODIFIED_FIELD: &str = "modified";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
}

/// Validated document with native values and timestamps in place.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPayload {
    pub document: Map<String, Value>,
}

pub struct RequestValidator;

impl RequestValidator {
    /// Check `body` against the schema; the first failing field aborts the write.
    pub fn validate(body: &Map<String, Value>, schema: &Schema) -> Result<(), AppError> {
        validate_object(body, schema, "")
    }

    /// Validate (when the resource has a schema), coerce native fields and stamp timestamps.
    pub fn normalize(
        body: Value,
        resource: &ResourceDefinition,
        kind: WriteKind,
        now: DateTime<Utc>,
    ) -> Result<NormalizedPayload, AppError> {
        let Value::Object(mut document) = body else {
            return Err(AppError::BadRequest("body must be a JSON object".into()));
        };
        if let Some(schema) = &resource.schema {
            Self::validate(&document, schema)?;
            coerce_object(&mut document, schema);
        }
        // An undeclared `_id` is a store key; a declared one was coerced by its rule.
        if resource.field_type("_id").is_none() {
            if let Some(Value::String(raw)) = document.get("_id") {
                if let Ok(oid) = raw.parse::<ObjectId>() {
                    document.insert("_id".into(), oid_value(&oid));
                }
            }
        }
        match kind {
            WriteKind::Create => {
                if !document.contains_key(CREATED_FIELD) {
                    document.insert(CREATED_FIELD.into(), date_value(&now));
                }
            }
            // the stored stamp is kept by the replace
            WriteKind::Update => {
                document.remove(CREATED_FIELD);
            }
        }
        document.insert(MODIFIED_FIELD.into(), date_value(&now));
        Ok(NormalizedPayload { document })
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn validate_object(body: &Map<String, Value>, schema: &Schema, prefix: &str) -> Result<(), AppError> {
    for (name, rule) in &schema.properties {
        let path = join(prefix, name);
        match body.get(name) {
            None | Some(Value::Null) => {
                if rule.required {
                    return Err(AppError::validation(path, "is required"));
                }
            }
            Some(v) => validate_field(&path, v, rule)?,
        }
    }
    Ok(())
}

fn validate_field(path: &str, v: &Value, rule: &FieldRule) -> Result<(), AppError> {
    if !type_matches(v, &rule.field_type) {
        return Err(AppError::validation(path, type_message(&rule.field_type)));
    }
    if let Some(format) = &rule.format {
        validate_format(path, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max {
                return Err(AppError::validation(path, format!("must be at most {} characters", max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min {
                return Err(AppError::validation(path, format!("must be at least {} characters", min)));
            }
        }
        if let Some(re) = &rule.pattern {
            if !re.is_match(s) {
                return Err(AppError::validation(path, "does not match required pattern"));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| crate::document::values_equal(v, a)) {
            return Err(AppError::validation(
                path,
                format!("must be one of: {:?}", allowed.iter().take(5).collect::<Vec<_>>()),
            ));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(AppError::validation(path, format!("must be at least {}", min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(AppError::validation(path, format!("must be at most {}", max)));
            }
        }
    }
    if let (Some(props), Value::Object(map)) = (&rule.properties, v) {
        validate_object(map, props, path)?;
    }
    if let (false, Value::Array(elements)) = (rule.items.is_empty(), v) {
        for (i, element) in elements.iter().enumerate() {
            let element_path = format!("{}[{}]", path, i);
            let mut first_err = None;
            let mut matched = false;
            for item in &rule.items {
                match validate_field(&element_path, element, item) {
                    Ok(()) => {
                        matched = true;
                        break;
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            if !matched {
                if let Some(e) = first_err {
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}

fn type_matches(v: &Value, t: &FieldType) -> bool {
    match t {
        FieldType::String => v.is_string(),
        FieldType::Number => v.is_number(),
        FieldType::Integer => v.is_i64() || v.is_u64() || v.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false),
        FieldType::Boolean => v.is_boolean(),
        FieldType::Object => v.is_object(),
        FieldType::Array => v.is_array(),
        FieldType::Identifier => match v {
            Value::String(s) => ObjectId::is_valid(s),
            other => as_oid(other).is_some(),
        },
        FieldType::DateTime | FieldType::Date => v.is_string() || as_date(v).is_some(),
        FieldType::Any(_) => true,
    }
}

fn type_message(t: &FieldType) -> String {
    match t {
        FieldType::Identifier => "must be a 24 character hex object id".into(),
        other => format!("must be of {} type", other.name()),
    }
}

fn validate_format(path: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    let ok = match format.to_lowercase().as_str() {
        "email" => s.contains('@') && s.len() >= 3,
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        "date-time" => parse_datetime(s).is_some(),
        "date" => parse_date(s).is_some(),
        "url" => s.starts_with("http://") || s.starts_with("https://"),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(AppError::validation(path, format!("is not a valid {}", format)))
    }
}

fn coerce_object(map: &mut Map<String, Value>, schema: &Schema) {
    for (name, rule) in &schema.properties {
        if let Some(v) = map.get_mut(name) {
            coerce_value(v, rule);
        }
    }
}

fn coerce_value(v: &mut Value, rule: &FieldRule) {
    let native = match (&rule.field_type, v.as_str()) {
        (FieldType::Identifier, Some(s)) => s.parse::<ObjectId>().ok().map(|oid| oid_value(&oid)),
        (FieldType::DateTime | FieldType::Date, Some(s)) => parse_datetime(s).map(|dt| date_value(&dt)),
        _ => None,
    };
    if let Some(native) = native {
        *v = native;
        return;
    }
    match v {
        Value::Object(map) => {
            if let Some(props) = &rule.properties {
                coerce_object(map, props);
            }
        }
        Value::Array(elements) => {
            for element in elements.iter_mut() {
                if let Some(item) = rule.items.iter().find(|item| shape_fits(element, item)) {
                    coerce_value(element, item);
                }
            }
        }
        _ => {}
    }
}

/// Which item rule an array element should be coerced with.
fn shape_fits(element: &Value, item: &FieldRule) -> bool {
    match element {
        Value::String(_) => item.field_type.is_native(),
        Value::Object(_) => item.properties.is_some(),
        Value::Array(_) => !item.items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResourceDeclaration, ResourceRegistry};
    use chrono::TimeZone;
    use serde_json::json;

    fn resource(decl: Value) -> ResourceDefinition {
        let decls: Vec<ResourceDeclaration> = serde_json::from_value(json!([decl])).unwrap();
        ResourceRegistry::build(&decls).unwrap().iter().next().unwrap().clone()
    }

    fn widgets() -> ResourceDefinition {
        resource(json!({
            "name": "widgets",
            "id": "id",
            "schema": {"properties": {
                "_id": {"type": "id"},
                "id": {"type": "integer", "required": true},
                "name": {"type": "string", "required": true},
                "description": {"type": "string", "required": true},
                "price": {"type": "number", "required": true}
            }}
        }))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn validation_of(err: AppError) -> (String, String) {
        match err {
            AppError::Validation { property, message } => (property, message),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn missing_required_field_is_reported_first() {
        let err = RequestValidator::normalize(
            json!({"id": 4, "name": "Widget #4", "price": 1.99}),
            &widgets(),
            WriteKind::Create,
            now(),
        )
        .unwrap_err();
        assert_eq!(validation_of(err), ("description".into(), "is required".into()));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = RequestValidator::normalize(
            json!({"id": "54a34", "name": "W", "description": "d", "price": 1.0}),
            &widgets(),
            WriteKind::Create,
            now(),
        )
        .unwrap_err();
        assert_eq!(validation_of(err).0, "id");

        let err = RequestValidator::normalize(
            json!({"id": 2, "name": 1234, "description": "d", "price": 1.0}),
            &widgets(),
            WriteKind::Update,
            now(),
        )
        .unwrap_err();
        assert_eq!(validation_of(err), ("name".into(), "must be of string type".into()));
    }

    #[test]
    fn create_stamps_both_timestamps() {
        let payload = RequestValidator::normalize(
            json!({"id": 4, "name": "W", "description": "d", "price": 1.0}),
            &widgets(),
            WriteKind::Create,
            now(),
        )
        .unwrap();
        assert_eq!(payload.document["created"], json!({"$date": "2024-01-02T03:04:05.000Z"}));
        assert_eq!(payload.document["modified"], json!({"$date": "2024-01-02T03:04:05.000Z"}));
    }

    #[test]
    fn created_is_kept_and_modified_overwritten() {
        let payload = RequestValidator::normalize(
            json!({"created": "keep-me", "modified": "old"}),
            &resource(json!("notes")),
            WriteKind::Create,
            now(),
        )
        .unwrap();
        assert_eq!(payload.document["created"], json!("keep-me"));
        assert_eq!(payload.document["modified"], json!({"$date": "2024-01-02T03:04:05.000Z"}));

        let update = RequestValidator::normalize(json!({"a": 1}), &resource(json!("notes")), WriteKind::Update, now())
            .unwrap();
        assert!(!update.document.contains_key("created"));
    }

    #[test]
    fn update_drops_client_created() {
        let update = RequestValidator::normalize(
            json!({"a": 1, "created": "forged"}),
            &resource(json!("notes")),
            WriteKind::Update,
            now(),
        )
        .unwrap();
        assert!(!update.document.contains_key("created"));
        assert!(update.document.contains_key("modified"));
    }

    #[test]
    fn store_key_follows_declared_type() {
        let oid = "507f1f77bcf86cd799439011";
        let bare = RequestValidator::normalize(json!({"_id": oid}), &resource(json!("notes")), WriteKind::Create, now())
            .unwrap();
        assert_eq!(bare.document["_id"], json!({"$oid": oid}));

        let codes = resource(json!({"name": "codes", "schema": {"_id": "string"}}));
        let declared = RequestValidator::normalize(json!({"_id": oid}), &codes, WriteKind::Create, now()).unwrap();
        assert_eq!(declared.document["_id"], json!(oid));
    }

    #[test]
    fn identifiers_are_coerced_throughout_declared_structures() {
        let r = resource(json!({
            "name": "orders",
            "schema": {
                "customer": "id",
                "placed": "date-time",
                "shipping": {"carrier": "id"},
                "lines": [{"product": "id", "qty": "integer"}],
                "refs": ["id"]
            }
        }));
        let oid = "507f1f77bcf86cd799439011";
        let payload = RequestValidator::normalize(
            json!({
                "customer": oid,
                "placed": "2024-02-03T04:05:06Z",
                "shipping": {"carrier": oid},
                "lines": [{"product": oid, "qty": 2}],
                "refs": [oid],
                "note": oid
            }),
            &r,
            WriteKind::Create,
            now(),
        )
        .unwrap();
        let d = &payload.document;
        assert_eq!(d["customer"], json!({"$oid": oid}));
        assert_eq!(d["placed"], json!({"$date": "2024-02-03T04:05:06.000Z"}));
        assert_eq!(d["shipping"]["carrier"], json!({"$oid": oid}));
        assert_eq!(d["lines"][0]["product"], json!({"$oid": oid}));
        assert_eq!(d["refs"][0], json!({"$oid": oid}));
        assert_eq!(d["note"], json!(oid));
    }

    #[test]
    fn nested_failures_name_the_full_path() {
        let r = resource(json!({"name": "o", "schema": {"lines": [{"qty": "integer"}], "addr": {"zip": "integer"}}}));
        let err = RequestValidator::normalize(json!({"addr": {"zip": "x"}}), &r, WriteKind::Create, now()).unwrap_err();
        assert_eq!(validation_of(err).0, "addr.zip");
        let err = RequestValidator::normalize(json!({"lines": [{"qty": 1}, {"qty": "two"}]}), &r, WriteKind::Create, now())
            .unwrap_err();
        assert_eq!(validation_of(err).0, "lines[1].qty");
    }

    #[test]
    fn schemaless_resources_accept_anything_but_objects_only() {
        let r = resource(json!("notes"));
        assert!(RequestValidator::normalize(json!({"anything": [1, "two"]}), &r, WriteKind::Create, now()).is_ok());
        assert!(matches!(
            RequestValidator::normalize(json!([1, 2]), &r, WriteKind::Create, now()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rule_constraints_apply() {
        let r = resource(json!({"name": "u", "schema": {"properties": {
            "email": {"type": "string", "format": "email"},
            "age": {"type": "integer", "minimum": 0, "maximum": 150},
            "role": {"type": "string", "enum": ["admin", "user"]},
            "born": {"type": "date"}
        }}}));
        let bad = [
            json!({"email": "nope"}),
            json!({"age": -1}),
            json!({"role": "root"}),
            json!({"born": "03/04/2020"}),
        ];
        for body in bad {
            assert!(RequestValidator::normalize(body, &r, WriteKind::Create, now()).is_err());
        }
        assert!(RequestValidator::normalize(
            json!({"email": "a@b.c", "age": 30, "role": "user", "born": "2020-04-03"}),
            &r,
            WriteKind::Create,
            now()
        )
        .is_ok());
    }
}
