//! Request compilation, payload normalization and CRUD execution.

mod crud;
pub mod query;
mod validation;
pub use crud::CrudExecutor;
pub use query::{coerce_identifier, compile, Condition, FieldFilter, Filter, PathTarget, Projection, QueryPlan};
pub use validation::{NormalizedPayload, RequestValidator, WriteKind, CREATED_FIELD, MODIFIED_FIELD};
