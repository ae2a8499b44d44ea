pub mod api;
pub mod common;

pub use api::api_router;
pub use common::common_routes_with_ready;
