use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    infer::NullHints,
    typing::ty::{CaptureId, PrimTy, Ty, TyParam},
    utils::join,
};

/// Invocation modes, tried in this order during applicability inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InvocationMode {
    Strict,
    Loose,
    Varargs,
}

impl InvocationMode {
    pub fn allows_boxing(self) -> bool {
        self != InvocationMode::Strict
    }
}

impl fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationMode::Strict => write!(f, "strict"),
            InvocationMode::Loose => write!(f, "loose"),
            InvocationMode::Varargs => write!(f, "variable-arity"),
        }
    }
}

/// A type parameter declaration with its declared bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TyParamDecl {
    pub param: TyParam,
    pub bounds: Vec<Ty>,
    pub hints: NullHints,
}

impl TyParamDecl {
    pub fn new<O: Into<String>, N: Into<String>>(owner: O, name: N) -> TyParamDecl {
        TyParamDecl {
            param: TyParam::new(owner, name),
            bounds: vec![],
            hints: NullHints::empty(),
        }
    }

    pub fn bounded(mut self, bound: Ty) -> TyParamDecl {
        self.bounds.push(bound);
        self
    }

    pub fn with_hints(mut self, hints: NullHints) -> TyParamDecl {
        self.hints = hints;
        self
    }

    pub fn ty(&self) -> Ty {
        Ty::Param(self.param.clone())
    }
}

impl fmt::Display for TyParamDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bounds.is_empty() {
            write!(f, "{}", self.param)
        } else {
            write!(f, "{} extends {}", self.param, join(&self.bounds, " & "))
        }
    }
}

/// The signature of a functional interface's single abstract method,
/// after parameterization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionType {
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub thrown: Vec<Ty>,
}

impl FunctionType {
    pub fn is_void(&self) -> bool {
        self.ret == Ty::Void
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) -> {}", join(&self.params, ", "), self.ret)?;
        if !self.thrown.is_empty() {
            write!(f, " throws {}", join(&self.thrown, ", "))?;
        }
        Ok(())
    }
}

/// The host type system, as seen by the inference engine.
///
/// Unless noted otherwise the arguments are proper types. Captures are
/// created and bounded through `&self`, so implementations keep them
/// behind interior mutability.
pub trait TypeOracle {
    fn is_subtype(&self, sub: &Ty, sup: &Ty) -> bool;

    fn is_same(&self, a: &Ty, b: &Ty) -> bool {
        a == b
    }

    /// Compatibility in an invocation context of the given mode.
    fn is_compatible(&self, from: &Ty, to: &Ty, mode: InvocationMode) -> bool;

    fn lub(&self, tys: &[Ty]) -> Option<Ty>;

    /// Reduced components of the greatest lower bound, or `None` if the
    /// types admit no common subtype.
    fn glb(&self, tys: &[Ty]) -> Option<Vec<Ty>>;

    fn is_consistent_intersection(&self, tys: &[Ty]) -> bool;

    /// The parameterization of `class` among the supertypes of `ty`
    /// (including `ty` itself). Also used on improper types.
    fn as_super(&self, ty: &Ty, class: &str) -> Option<Ty>;

    /// Every class type among the supertypes of `ty`, `ty` included,
    /// nearest first. Also used on improper types.
    fn supertypes(&self, ty: &Ty) -> Vec<Ty>;

    fn type_params(&self, class: &str) -> Option<Vec<TyParamDecl>>;

    fn erasure(&self, ty: &Ty) -> Ty;

    /// Capture conversion outside of inference.
    fn capture(&self, ty: &Ty) -> Ty;

    /// Allocates a fresh capture variable. Ids are never reused, so a
    /// long-lived oracle grows with every capture it hands out.
    fn new_capture(&self, hint: &str) -> CaptureId;

    /// Sets the bounds of a fresh capture. Returns false if they are not
    /// well-formed, in which case the capture keeps no bounds.
    fn set_capture_bounds(&self, id: CaptureId, lower: Option<Ty>, upper: Vec<Ty>) -> bool;

    fn capture_bounds(&self, id: CaptureId) -> (Option<Ty>, Vec<Ty>);

    /// Function type of a functional interface parameterization without
    /// wildcards.
    fn function_type(&self, ty: &Ty) -> Option<FunctionType>;

    fn is_functional_interface(&self, ty: &Ty) -> bool {
        self.function_type(ty).is_some()
    }

    fn boxed(&self, prim: PrimTy) -> Ty;

    fn unboxed(&self, ty: &Ty) -> Option<PrimTy>;

    fn object(&self) -> Ty;

    fn runtime_exception(&self) -> Ty;

    fn exception(&self) -> Ty;

    fn throwable(&self) -> Ty;

    fn is_checked_exception(&self, ty: &Ty) -> bool;
}
