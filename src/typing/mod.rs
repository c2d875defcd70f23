pub mod hierarchy;
pub mod oracle;
pub mod subst;
pub mod ty;

pub use hierarchy::{ClassDecl, ClassTable};
pub use oracle::{FunctionType, InvocationMode, TyParamDecl, TypeOracle};
pub use subst::{ApplySubst, Subst};
pub use ty::{CaptureId, ClassTy, InferVar, PrimTy, Ty, TyParam, WildcardTy};
