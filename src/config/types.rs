//! Raw config types as read from the JSON configuration file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Operation a resource can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verb {
    Read,
    ReadOne,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Read, Verb::ReadOne, Verb::Create, Verb::Update, Verb::Delete];

    pub fn http_method(&self) -> &'static str {
        match self {
            Verb::Read | Verb::ReadOne => "GET",
            Verb::Create => "POST",
            Verb::Update => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

fn all_verbs() -> Vec<Verb> {
    Verb::ALL.to_vec()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub name: String,
    /// Field used to address one document from the path. Defaults to the store key `_id`.
    #[serde(default = "default_identifier_field", alias = "identifierField")]
    pub id: String,
    /// Declarative field map, or a full `{ "properties": ... }` schema.
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default = "all_verbs")]
    pub verbs: Vec<Verb>,
    /// Ordered field -> "asc" | "desc".
    #[serde(default)]
    pub sort: Map<String, Value>,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub max_age: Option<u64>,
    #[serde(default)]
    pub cross_domain: Option<bool>,
    #[serde(default)]
    pub cross_domain_allow_origin: Option<String>,
}

fn default_identifier_field() -> String {
    "_id".into()
}

/// A resource is declared either by bare name or as a full object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceDeclaration {
    Name(String),
    Full(ResourceSpec),
}

impl ResourceDeclaration {
    /// Resolve to a full spec, filling defaults for a bare name.
    pub fn into_spec(self) -> ResourceSpec {
        match self {
            ResourceDeclaration::Name(name) => ResourceSpec {
                name,
                id: default_identifier_field(),
                schema: None,
                verbs: all_verbs(),
                sort: Map::new(),
                limit: 0,
                max_age: None,
                cross_domain: None,
                cross_domain_allow_origin: None,
            },
            ResourceDeclaration::Full(spec) => spec,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceDeclaration::Name(name) => name,
            ResourceDeclaration::Full(spec) => &spec.name,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Postgres URL. When absent the in-memory store is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_db_schema")]
    pub schema: String,
}

fn default_db_schema() -> String {
    "docrest".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: None,
            schema: default_db_schema(),
        }
    }
}

/// Top-level API configuration. Immutable once the app state is built.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    pub base: String,
    pub version: String,
    pub name: String,
    pub port: u16,
    /// Query parameter carrying free-text search.
    pub query_param: String,
    /// Wrap responses in a `callback` when the client asks for one.
    pub jsonp: bool,
    pub cross_domain: bool,
    pub cross_domain_allow_origin: String,
    pub max_age: Option<u64>,
    /// Serve a JSON description of the API at the base path.
    pub index: bool,
    pub max_body_bytes: usize,
    pub database: DatabaseConfig,
    pub resources: Vec<ResourceDeclaration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base: "/".into(),
            version: String::new(),
            name: "API".into(),
            port: 3000,
            query_param: "q".into(),
            jsonp: true,
            cross_domain: true,
            cross_domain_allow_origin: "*".into(),
            max_age: None,
            index: false,
            max_body_bytes: 1024 * 1024,
            database: DatabaseConfig::default(),
            resources: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Base path with leading and trailing slash; a non-empty version wins over `base`.
    pub fn effective_base(&self) -> String {
        let raw = if self.version.is_empty() {
            self.base.trim_matches('/').to_string()
        } else {
            self.version.trim_matches('/').to_string()
        };
        if raw.is_empty() {
            "/".into()
        } else {
            format!("/{}/", raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declarations_accept_bare_names_and_objects() {
        let decls: Vec<ResourceDeclaration> =
            serde_json::from_value(json!(["gadgets", {"name": "widgets", "id": "id", "limit": 20}])).unwrap();
        assert!(matches!(&decls[0], ResourceDeclaration::Name(n) if n == "gadgets"));
        let spec = decls[1].clone().into_spec();
        assert_eq!(spec.id, "id");
        assert_eq!(spec.limit, 20);
        assert_eq!(spec.verbs, Verb::ALL.to_vec());
    }

    #[test]
    fn version_overrides_base() {
        let cfg: ApiConfig = serde_json::from_value(json!({"base": "/api", "version": "v2"})).unwrap();
        assert_eq!(cfg.effective_base(), "/v2/");
        let cfg: ApiConfig = serde_json::from_value(json!({"base": "/api"})).unwrap();
        assert_eq!(cfg.effective_base(), "/api/");
        assert_eq!(ApiConfig::default().effective_base(), "/");
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg: ApiConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg.query_param, "q");
        assert!(cfg.jsonp);
        assert!(cfg.cross_domain);
        assert_eq!(cfg.cross_domain_allow_origin, "*");
    }
}
