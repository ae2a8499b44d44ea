pub mod dispatch;
pub mod resource;

pub use dispatch::{dispatch, resolve_route, POWERED_BY, POWERED_BY_HEADER};
pub use resource::{execute, Operation, RequestContext};
