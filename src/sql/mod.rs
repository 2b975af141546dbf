//! Report SQL: parameter parsing into constraints, template assembly, bound values.

mod builder;
pub mod constraint;
pub mod params;
pub use builder::*;
pub use constraint::*;
pub use params::*;
