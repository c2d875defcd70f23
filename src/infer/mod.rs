mod bound;
mod bound_set;
mod constraint;
mod context;
mod incorporate;
mod reduce;
mod var;

pub mod cycle;
pub mod resolve;

pub use bound::*;
pub use bound_set::*;
pub use constraint::*;
pub use context::*;
pub use incorporate::IncorporationStats;
pub use reduce::{input_variables, non_wildcard_parameterization, output_variables};
pub use var::*;
