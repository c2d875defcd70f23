use std::{fmt, rc::Rc};

use crate::{
    span::Span,
    typing::{
        oracle::{InvocationMode, TyParamDecl},
        subst::{ApplySubst, Subst},
        ty::{Ty, TyParam},
    },
    utils::join,
};

/// Signature of a method or constructor entering inference. For
/// constructors (including diamond allocations) `ret` is the constructed
/// type and `type_params` includes the class type parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSig {
    pub name: String,
    pub type_params: Vec<TyParamDecl>,
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub thrown: Vec<Ty>,
    pub varargs: bool,
    pub is_constructor: bool,
}

impl MethodSig {
    pub fn new<S: Into<String>>(name: S) -> MethodSig {
        MethodSig {
            name: name.into(),
            type_params: vec![],
            params: vec![],
            ret: Ty::Void,
            thrown: vec![],
            varargs: false,
            is_constructor: false,
        }
    }

    pub fn constructor(class: Ty) -> MethodSig {
        let name = class.class_name().unwrap_or("<init>").to_string();
        MethodSig {
            ret: class,
            is_constructor: true,
            ..MethodSig::new(name)
        }
    }

    pub fn type_param(mut self, decl: TyParamDecl) -> MethodSig {
        self.type_params.push(decl);
        self
    }

    pub fn param(mut self, ty: Ty) -> MethodSig {
        self.params.push(ty);
        self
    }

    pub fn returns(mut self, ty: Ty) -> MethodSig {
        self.ret = ty;
        self
    }

    pub fn throws(mut self, ty: Ty) -> MethodSig {
        self.thrown.push(ty);
        self
    }

    pub fn variable_arity(mut self) -> MethodSig {
        self.varargs = true;
        self
    }

    /// `P` of this method's own type parameters, as a type.
    pub fn p(&self, name: &str) -> Ty {
        Ty::Param(TyParam::new(self.name.as_str(), name))
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn declares(&self, param: &TyParam) -> bool {
        self.type_params.iter().any(|d| d.param == *param)
    }

    pub fn is_own_type_param(&self, ty: &Ty) -> bool {
        matches!(ty, Ty::Param(p) if self.declares(p))
    }

    /// Return type mentions one of the method's own type parameters.
    pub fn return_mentions_type_params(&self) -> bool {
        self.type_params.iter().any(|d| self.ret.mentions_param(&d.param))
    }

    /// Formal parameter types for `n` arguments; in variable-arity mode
    /// the trailing array parameter is spread over the remaining positions.
    pub fn formals(&self, n: usize, mode: InvocationMode) -> Option<Vec<Ty>> {
        let k = self.params.len();
        if mode != InvocationMode::Varargs || !self.varargs {
            return if n == k { Some(self.params.clone()) } else { None };
        }
        if k == 0 || n + 1 < k {
            return None;
        }
        let elem = match &self.params[k - 1] {
            Ty::Array(elem) => (**elem).clone(),
            _ => return None,
        };
        let mut formals = self.params[..k - 1].to_vec();
        while formals.len() < n {
            formals.push(elem.clone());
        }
        Some(formals)
    }

    /// Return type after explicit type arguments, if any, are applied.
    pub fn instantiated_return(&self, type_args: &[Ty]) -> Ty {
        let theta: Subst<TyParam> = Subst::zip(
            self.type_params.iter().map(|d| d.param.clone()),
            type_args.iter().cloned(),
        );
        self.ret.clone().apply_subst(&theta)
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.type_params.is_empty() {
            write!(f, "<{}> ", join(&self.type_params, ", "))?;
        }
        if !self.is_constructor {
            write!(f, "{} ", self.ret)?;
        }
        write!(f, "{}({})", self.name, join(&self.params, ", "))
    }
}

/// The lambda body as the engine needs to see it. Implementations
/// re-resolve the body against a given parameterization.
pub trait LambdaBody: fmt::Debug {
    fn is_void_compatible(&self) -> bool;

    fn is_value_compatible(&self) -> bool;

    /// Result expressions when the parameters have the given types.
    fn result_expressions(&self, params: &[Ty]) -> Vec<Expr>;

    /// Exceptions the body may throw when the parameters have the given types.
    fn thrown(&self, params: &[Ty]) -> Vec<Ty>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyShape {
    /// `x -> expr`. Void-compatible only for statement expressions,
    /// value-compatible unless the expression is `void`.
    Expression { statement: bool, value: bool },
    Block { void: bool, value: bool },
}

/// A lambda body whose result expressions do not depend on the
/// parameter types.
#[derive(Clone, Debug)]
pub struct FixedBody {
    pub shape: BodyShape,
    pub results: Vec<Expr>,
    pub thrown: Vec<Ty>,
}

impl FixedBody {
    pub fn expression(e: Expr) -> FixedBody {
        let void = e.resolved_type() == Some(Ty::Void);
        let statement = void || matches!(e, Expr::Invocation(_));
        FixedBody {
            shape: BodyShape::Expression {
                statement,
                value: !void,
            },
            results: vec![e],
            thrown: vec![],
        }
    }

    pub fn void_block() -> FixedBody {
        FixedBody {
            shape: BodyShape::Block {
                void: true,
                value: false,
            },
            results: vec![],
            thrown: vec![],
        }
    }

    pub fn value_block(results: Vec<Expr>) -> FixedBody {
        FixedBody {
            shape: BodyShape::Block {
                void: false,
                value: true,
            },
            results,
            thrown: vec![],
        }
    }

    pub fn throwing(mut self, ty: Ty) -> FixedBody {
        self.thrown.push(ty);
        self
    }
}

fn shape_void(shape: BodyShape) -> bool {
    match shape {
        BodyShape::Expression { statement, .. } => statement,
        BodyShape::Block { void, .. } => void,
    }
}

fn shape_value(shape: BodyShape) -> bool {
    match shape {
        BodyShape::Expression { value, .. } => value,
        BodyShape::Block { value, .. } => value,
    }
}

impl LambdaBody for FixedBody {
    fn is_void_compatible(&self) -> bool {
        shape_void(self.shape)
    }

    fn is_value_compatible(&self) -> bool {
        shape_value(self.shape)
    }

    fn result_expressions(&self, _: &[Ty]) -> Vec<Expr> {
        self.results.clone()
    }

    fn thrown(&self, _: &[Ty]) -> Vec<Ty> {
        self.thrown.clone()
    }
}

/// A lambda body whose result expressions are computed from the
/// parameter types, e.g. `x -> x`.
#[derive(Clone)]
pub struct DependentBody {
    pub shape: BodyShape,
    pub results: Rc<dyn Fn(&[Ty]) -> Vec<Expr>>,
    pub thrown: Vec<Ty>,
}

impl DependentBody {
    pub fn expression<F>(f: F) -> DependentBody
    where
        F: Fn(&[Ty]) -> Vec<Expr> + 'static,
    {
        DependentBody {
            shape: BodyShape::Expression {
                statement: false,
                value: true,
            },
            results: Rc::new(f),
            thrown: vec![],
        }
    }
}

impl fmt::Debug for DependentBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentBody")
            .field("shape", &self.shape)
            .field("thrown", &self.thrown)
            .finish()
    }
}

impl LambdaBody for DependentBody {
    fn is_void_compatible(&self) -> bool {
        shape_void(self.shape)
    }

    fn is_value_compatible(&self) -> bool {
        shape_value(self.shape)
    }

    fn result_expressions(&self, params: &[Ty]) -> Vec<Expr> {
        (self.results)(params)
    }

    fn thrown(&self, _: &[Ty]) -> Vec<Ty> {
        self.thrown.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LambdaParams {
    Explicit(Vec<Ty>),
    Implicit(usize),
}

impl LambdaParams {
    pub fn arity(&self) -> usize {
        match self {
            LambdaParams::Explicit(tys) => tys.len(),
            LambdaParams::Implicit(n) => *n,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, LambdaParams::Implicit(n) if *n > 0)
    }

    pub fn explicit(&self) -> Option<&[Ty]> {
        match self {
            LambdaParams::Explicit(tys) => Some(tys),
            LambdaParams::Implicit(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct Lambda {
    pub span: Span,
    pub params: LambdaParams,
    pub body: Rc<dyn LambdaBody>,
}

/// Finds the compile-time declaration of an inexact method reference for
/// the given function-type parameters.
pub trait RefResolver: fmt::Debug {
    fn resolve(&self, params: &[Ty]) -> Option<MethodSig>;
}

#[derive(Clone, Debug)]
pub enum RefTarget {
    Exact(Rc<MethodSig>),
    Inexact(Rc<dyn RefResolver>),
}

#[derive(Debug)]
pub struct MethodRef {
    pub span: Span,
    pub target: RefTarget,
    /// `ReferenceType` of a `ReferenceType::name` reference.
    pub qualifier: Option<Ty>,
}

impl MethodRef {
    pub fn is_exact(&self) -> bool {
        matches!(self.target, RefTarget::Exact(_))
    }

    pub fn exact(&self) -> Option<&MethodSig> {
        match &self.target {
            RefTarget::Exact(sig) => Some(sig),
            RefTarget::Inexact(_) => None,
        }
    }

    /// Compile-time declaration for the given function-type parameters.
    pub fn declaration(&self, params: &[Ty]) -> Option<MethodSig> {
        match &self.target {
            RefTarget::Exact(sig) => Some((**sig).clone()),
            RefTarget::Inexact(resolver) => resolver.resolve(params),
        }
    }
}

#[derive(Debug)]
pub struct Conditional {
    pub span: Span,
    pub then: Expr,
    pub otherwise: Expr,
}

#[derive(Debug)]
pub struct Invocation {
    pub span: Span,
    pub method: Rc<MethodSig>,
    pub args: Vec<Expr>,
    pub type_args: Option<Vec<Ty>>,
}

impl Invocation {
    /// A generic invocation whose type arguments are left to inference
    /// and whose return type depends on them.
    pub fn is_poly(&self) -> bool {
        self.type_args.is_none() && self.method.is_generic() && self.method.return_mentions_type_params()
    }

    pub fn needs_inference(&self) -> bool {
        self.type_args.is_none() && self.method.is_generic()
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    Standalone(Span, Ty),
    Lambda(Rc<Lambda>),
    MethodRef(Rc<MethodRef>),
    Conditional(Rc<Conditional>),
    Invocation(Rc<Invocation>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Standalone(span, ty) => write!(f, "expr `{}`@{}", ty, span),
            Expr::Lambda(l) => write!(f, "lambda/{}@{}", l.params.arity(), l.span),
            Expr::MethodRef(m) => match m.exact() {
                Some(sig) => write!(f, "::{}@{}", sig.name, m.span),
                None => write!(f, "::<inexact>@{}", m.span),
            },
            Expr::Conditional(c) => write!(f, "conditional@{}", c.span),
            Expr::Invocation(i) => write!(f, "{}(..)@{}", i.method.name, i.span),
        }
    }
}

impl Expr {
    pub fn standalone(span: Span, ty: Ty) -> Expr {
        Expr::Standalone(span, ty)
    }

    pub fn lambda<B: LambdaBody + 'static>(span: Span, params: LambdaParams, body: B) -> Expr {
        Expr::Lambda(Rc::new(Lambda {
            span,
            params,
            body: Rc::new(body),
        }))
    }

    pub fn exact_ref(span: Span, sig: MethodSig, qualifier: Option<Ty>) -> Expr {
        Expr::MethodRef(Rc::new(MethodRef {
            span,
            target: RefTarget::Exact(Rc::new(sig)),
            qualifier,
        }))
    }

    pub fn inexact_ref<R: RefResolver + 'static>(span: Span, resolver: R, qualifier: Option<Ty>) -> Expr {
        Expr::MethodRef(Rc::new(MethodRef {
            span,
            target: RefTarget::Inexact(Rc::new(resolver)),
            qualifier,
        }))
    }

    pub fn conditional(span: Span, then: Expr, otherwise: Expr) -> Expr {
        Expr::Conditional(Rc::new(Conditional {
            span,
            then,
            otherwise,
        }))
    }

    pub fn invocation(span: Span, method: MethodSig, args: Vec<Expr>) -> Expr {
        Expr::Invocation(Rc::new(Invocation {
            span,
            method: Rc::new(method),
            args,
            type_args: None,
        }))
    }

    pub fn explicit_invocation(span: Span, method: MethodSig, type_args: Vec<Ty>, args: Vec<Expr>) -> Expr {
        Expr::Invocation(Rc::new(Invocation {
            span,
            method: Rc::new(method),
            args,
            type_args: Some(type_args),
        }))
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Standalone(span, _) => *span,
            Expr::Lambda(l) => l.span,
            Expr::MethodRef(m) => m.span,
            Expr::Conditional(c) => c.span,
            Expr::Invocation(i) => i.span,
        }
    }

    /// Same syntactic site.
    pub fn same_site(&self, other: &Expr) -> bool {
        self.span() == other.span() && std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Type of the expression if it can be typed without a target.
    pub fn resolved_type(&self) -> Option<Ty> {
        match self {
            Expr::Standalone(_, ty) => Some(ty.clone()),
            Expr::Invocation(i) if !i.needs_inference() => {
                let args = i.type_args.clone().unwrap_or_default();
                Some(i.method.instantiated_return(&args))
            }
            Expr::Conditional(c) if !self.is_poly() => c.then.resolved_type(),
            _ => None,
        }
    }

    pub fn is_poly(&self) -> bool {
        match self {
            Expr::Standalone(..) => false,
            Expr::Lambda(_) | Expr::MethodRef(_) => true,
            Expr::Invocation(i) => i.is_poly(),
            Expr::Conditional(c) => {
                let primitive = |e: &Expr| e.resolved_type().map_or(false, |t| t.is_primitive());
                !(primitive(&c.then) && primitive(&c.otherwise))
            }
        }
    }

    pub fn is_functional(&self) -> bool {
        matches!(self, Expr::Lambda(_) | Expr::MethodRef(_))
    }

    /// Whether the argument takes part in applicability inference for a
    /// candidate `method` with formal parameter type `formal`.
    pub fn is_pertinent_to_applicability(&self, formal: &Ty, method: &MethodSig, explicit_type_args: bool) -> bool {
        let targets_own_param = !explicit_type_args && method.is_generic() && method.is_own_type_param(formal);
        match self {
            Expr::Lambda(l) => match l.params.explicit() {
                None if l.params.arity() > 0 => false,
                params => {
                    if targets_own_param {
                        return false;
                    }
                    let params = params.unwrap_or(&[]);
                    l.body
                        .result_expressions(params)
                        .iter()
                        .all(|r| r.is_pertinent_to_applicability(&Ty::Void, method, explicit_type_args))
                }
            },
            Expr::MethodRef(m) => m.is_exact() && !targets_own_param,
            Expr::Conditional(c) => {
                c.then.is_pertinent_to_applicability(formal, method, explicit_type_args)
                    && c.otherwise.is_pertinent_to_applicability(formal, method, explicit_type_args)
            }
            Expr::Standalone(..) | Expr::Invocation(_) => true,
        }
    }
}
