#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod macros;

pub mod errors;
pub mod expr;
pub mod infer;
pub mod logging;
pub mod options;
pub mod span;
pub mod typing;
pub mod utils;

pub use errors::{InferError, InferErrorKind, InferResult};
pub use infer::{Bindings, InferenceContext, InferenceState, Instantiation};
pub use options::InferenceOptions;
