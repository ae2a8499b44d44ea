//! Resource registry: declarations merged with defaults, keyed by path segment.

use crate::config::schema::{FieldType, Schema};
use crate::config::types::{ApiConfig, ResourceDeclaration, Verb};
use crate::error::ConfigError;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `desc` is descending; any other token is ascending.
    pub fn from_token(token: &str) -> Self {
        if token == "desc" {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Cross-origin policy resolved for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allow_origin: String,
    /// Resource-scoped policies only advertise the request's own method.
    pub resource_scoped: bool,
}

#[derive(Clone, Debug)]
pub struct ResourceDefinition {
    pub name: String,
    pub schema: Option<Schema>,
    pub verbs: Vec<Verb>,
    pub identifier_field: String,
    pub default_sort: Vec<(String, SortDirection)>,
    /// 0 means unbounded.
    pub default_limit: u64,
    pub max_age: Option<u64>,
    pub cross_domain: Option<bool>,
    pub cross_domain_allow_origin: Option<String>,
}

impl ResourceDefinition {
    pub fn from_declaration(decl: ResourceDeclaration) -> Result<Self, ConfigError> {
        let spec = decl.into_spec();
        let schema = match &spec.schema {
            Some(descriptor) => Some(Schema::compile(descriptor)?),
            None => None,
        };
        let default_sort = spec
            .sort
            .iter()
            .map(|(field, dir)| {
                let dir = dir.as_str().map(SortDirection::from_token).unwrap_or(SortDirection::Asc);
                (field.clone(), dir)
            })
            .collect();
        Ok(ResourceDefinition {
            name: spec.name,
            schema,
            verbs: spec.verbs,
            identifier_field: spec.id,
            default_sort,
            default_limit: spec.limit,
            max_age: spec.max_age,
            cross_domain: spec.cross_domain,
            cross_domain_allow_origin: spec.cross_domain_allow_origin,
        })
    }

    pub fn allows(&self, verb: Verb) -> bool {
        self.verbs.contains(&verb)
    }

    /// Declared type of a (possibly dotted) field, if the resource has a schema.
    pub fn field_type(&self, field: &str) -> Option<&FieldType> {
        self.schema
            .as_ref()
            .and_then(|s| s.rule_for_path(field))
            .map(|r| &r.field_type)
    }

    /// The global policy applies whenever it is on; a resource's own policy only when it is off.
    pub fn cors_policy(&self, config: &ApiConfig) -> Option<CorsPolicy> {
        if config.cross_domain {
            return Some(CorsPolicy {
                allow_origin: config.cross_domain_allow_origin.clone(),
                resource_scoped: false,
            });
        }
        match self.cross_domain {
            Some(true) => Some(CorsPolicy {
                allow_origin: self.cross_domain_allow_origin.clone().unwrap_or_else(|| "*".into()),
                resource_scoped: true,
            }),
            _ => None,
        }
    }

    /// Resource max-age, else the global one.
    pub fn effective_max_age(&self, config: &ApiConfig) -> Option<u64> {
        self.max_age.or(config.max_age).filter(|age| *age > 0)
    }

    /// JSON description used by the API index.
    pub fn describe(&self) -> Value {
        let fields: serde_json::Map<String, Value> = self
            .schema
            .iter()
            .flat_map(|s| s.properties.iter())
            .map(|(name, rule)| (name.clone(), Value::String(rule.field_type.name().to_string())))
            .collect();
        serde_json::json!({
            "name": self.name,
            "id": self.identifier_field,
            "verbs": self.verbs,
            "fields": fields,
        })
    }
}

/// Immutable after construction; later declarations with the same name replace earlier ones.
#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<ResourceDefinition>,
    by_name: HashMap<String, usize>,
}

impl ResourceRegistry {
    pub fn build(declarations: &[ResourceDeclaration]) -> Result<Self, ConfigError> {
        let mut registry = ResourceRegistry::default();
        for decl in declarations {
            let def = ResourceDefinition::from_declaration(decl.clone())?;
            match registry.by_name.get(&def.name) {
                Some(&i) => {
                    tracing::warn!(resource = %def.name, "duplicate resource declaration, later one wins");
                    registry.resources[i] = def;
                }
                None => {
                    registry.by_name.insert(def.name.clone(), registry.resources.len());
                    registry.resources.push(def);
                }
            }
        }
        tracing::info!(count = registry.resources.len(), "resource registry built");
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ResourceDefinition> {
        self.by_name.get(name).map(|&i| &self.resources[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decls(v: Value) -> Vec<ResourceDeclaration> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn bare_names_get_defaults() {
        let reg = ResourceRegistry::build(&decls(json!(["widgets"]))).unwrap();
        let w = reg.get("widgets").unwrap();
        assert_eq!(w.identifier_field, "_id");
        assert_eq!(w.default_limit, 0);
        assert!(w.schema.is_none());
        assert!(Verb::ALL.iter().all(|v| w.allows(*v)));
    }

    #[test]
    fn later_declaration_overwrites_earlier() {
        let reg = ResourceRegistry::build(&decls(json!([
            {"name": "widgets", "limit": 5},
            "gadgets",
            {"name": "widgets", "limit": 9, "verbs": ["read"]}
        ])))
        .unwrap();
        assert_eq!(reg.len(), 2);
        let w = reg.get("widgets").unwrap();
        assert_eq!(w.default_limit, 9);
        assert!(!w.allows(Verb::Delete));
        let names: Vec<_> = reg.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["widgets", "gadgets"]);
    }

    #[test]
    fn default_sort_keeps_order_and_direction() {
        let reg = ResourceRegistry::build(&decls(json!([
            {"name": "w", "sort": {"created": "desc", "name": "asc", "x": "sideways"}}
        ])))
        .unwrap();
        assert_eq!(
            reg.get("w").unwrap().default_sort,
            vec![
                ("created".to_string(), SortDirection::Desc),
                ("name".to_string(), SortDirection::Asc),
                ("x".to_string(), SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn lookup_is_exact() {
        let reg = ResourceRegistry::build(&decls(json!(["widgets"]))).unwrap();
        assert!(reg.get("Widgets").is_none());
        assert!(reg.get("widget").is_none());
    }

    #[test]
    fn global_cors_wins_while_enabled() {
        let reg = ResourceRegistry::build(&decls(json!([
            "open",
            {"name": "closed", "crossDomain": false},
            {"name": "scoped", "crossDomain": true, "crossDomainAllowOrigin": "https://a.example"}
        ])))
        .unwrap();
        let global = Some(CorsPolicy { allow_origin: "*".into(), resource_scoped: false });
        let config = ApiConfig::default();
        for name in ["open", "closed", "scoped"] {
            assert_eq!(reg.get(name).unwrap().cors_policy(&config), global);
        }
    }

    #[test]
    fn resource_cors_applies_when_global_is_off() {
        let config = ApiConfig {
            cross_domain: false,
            ..ApiConfig::default()
        };
        let reg = ResourceRegistry::build(&decls(json!([
            "open",
            {"name": "closed", "crossDomain": false},
            {"name": "scoped", "crossDomain": true, "crossDomainAllowOrigin": "https://a.example"},
            {"name": "any", "crossDomain": true}
        ])))
        .unwrap();
        assert_eq!(reg.get("open").unwrap().cors_policy(&config), None);
        assert_eq!(reg.get("closed").unwrap().cors_policy(&config), None);
        assert_eq!(
            reg.get("scoped").unwrap().cors_policy(&config),
            Some(CorsPolicy { allow_origin: "https://a.example".into(), resource_scoped: true })
        );
        assert_eq!(reg.get("any").unwrap().cors_policy(&config).unwrap().allow_origin, "*");
    }

    #[test]
    fn bad_schema_fails_construction() {
        let err = ResourceRegistry::build(&decls(json!([{"name": "w", "schema": {"a": 1}}])));
        assert!(err.is_err());
    }
}
