//! Safe SQL builder: identifiers from config only, values and field paths as parameters.

mod builder;
pub use builder::*;
