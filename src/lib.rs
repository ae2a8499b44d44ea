//! Docrest: declarative multi-resource REST API over a document store.

pub mod config;
pub mod document;
pub mod error;
pub mod response;
pub mod sql;
pub mod state;
pub mod store;
pub mod service;
pub mod handlers;
pub mod routes;

pub use config::{load_from_path, from_env, ApiConfig, ResourceDeclaration, ResourceDefinition, ResourceRegistry, Schema};
pub use document::ObjectId;
pub use error::{AppError, ConfigError, StoreError};
pub use response::{ResponseEnvelope, ResponseIntent};
pub use state::AppState;
pub use store::{DocumentStore, MemoryStore, PgDocumentStore, ReadySignal};
pub use routes::{api_router, common_routes_with_ready};
pub use service::{CrudExecutor, QueryPlan};
