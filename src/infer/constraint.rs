use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    expr::Expr,
    infer::{Relation, TypeBound},
    options::InferenceOptions,
    typing::{
        oracle::{InvocationMode, TypeOracle},
        subst::{ApplySubst, Subst},
        ty::{Ty, WildcardTy},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeRelation {
    /// `S → T`, loose invocation compatibility.
    Compatible,
    /// `S <: T`
    Subtype,
    /// `S = T`
    Same,
    /// `S <= T`, type argument containment.
    Contained,
}

impl fmt::Display for TypeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRelation::Compatible => write!(f, "→"),
            TypeRelation::Subtype => write!(f, "<:"),
            TypeRelation::Same => write!(f, "="),
            TypeRelation::Contained => write!(f, "<="),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExprRelation {
    Compatible,
    /// Shape-only check used for arguments that are not pertinent to
    /// applicability.
    PotentiallyCompatible,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeConstraint {
    pub left: Ty,
    pub right: Ty,
    pub relation: TypeRelation,
    pub soft: bool,
}

#[derive(Clone, Debug)]
pub struct ExprConstraint {
    pub expr: Expr,
    pub target: Ty,
    pub relation: ExprRelation,
}

/// `‹LambdaExpression →throws T›` or `‹MethodReference →throws T›`.
#[derive(Clone, Debug)]
pub struct ExceptionConstraint {
    pub expr: Expr,
    pub target: Ty,
}

#[derive(Clone, Debug)]
pub enum ConstraintFormula {
    Type(TypeConstraint),
    Expression(ExprConstraint),
    Exception(ExceptionConstraint),
}

impl PartialEq for ConstraintFormula {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstraintFormula::Type(a), ConstraintFormula::Type(b)) => a == b,
            (ConstraintFormula::Expression(a), ConstraintFormula::Expression(b)) => {
                a.relation == b.relation && a.target == b.target && a.expr.same_site(&b.expr)
            }
            (ConstraintFormula::Exception(a), ConstraintFormula::Exception(b)) => {
                a.target == b.target && a.expr.same_site(&b.expr)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ConstraintFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintFormula::Type(c) => write!(f, "‹{} {} {}›", c.left, c.relation, c.right),
            ConstraintFormula::Expression(c) => match c.relation {
                ExprRelation::Compatible => write!(f, "‹{} → {}›", c.expr, c.target),
                ExprRelation::PotentiallyCompatible => write!(f, "‹{} →? {}›", c.expr, c.target),
            },
            ConstraintFormula::Exception(c) => write!(f, "‹{} →throws {}›", c.expr, c.target),
        }
    }
}

impl ConstraintFormula {
    pub fn ty(left: Ty, relation: TypeRelation, right: Ty) -> ConstraintFormula {
        ConstraintFormula::Type(TypeConstraint {
            left,
            right,
            relation,
            soft: false,
        })
    }

    pub fn compatible(left: Ty, right: Ty) -> ConstraintFormula {
        ConstraintFormula::ty(left, TypeRelation::Compatible, right)
    }

    pub fn subtype(left: Ty, right: Ty) -> ConstraintFormula {
        ConstraintFormula::ty(left, TypeRelation::Subtype, right)
    }

    pub fn same(left: Ty, right: Ty) -> ConstraintFormula {
        ConstraintFormula::ty(left, TypeRelation::Same, right)
    }

    pub fn contained(left: Ty, right: Ty) -> ConstraintFormula {
        ConstraintFormula::ty(left, TypeRelation::Contained, right)
    }

    pub fn expression(expr: Expr, target: Ty) -> ConstraintFormula {
        ConstraintFormula::Expression(ExprConstraint {
            expr,
            target,
            relation: ExprRelation::Compatible,
        })
    }

    pub fn potentially_compatible(expr: Expr, target: Ty) -> ConstraintFormula {
        ConstraintFormula::Expression(ExprConstraint {
            expr,
            target,
            relation: ExprRelation::PotentiallyCompatible,
        })
    }

    pub fn exception(expr: Expr, target: Ty) -> ConstraintFormula {
        ConstraintFormula::Exception(ExceptionConstraint { expr, target })
    }

    /// Marks a type formula soft. Other formulas are returned unchanged.
    pub fn soft(self, soft: bool) -> ConstraintFormula {
        match self {
            ConstraintFormula::Type(mut c) => {
                c.soft = soft;
                ConstraintFormula::Type(c)
            }
            c => c,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, ConstraintFormula::Expression(_))
    }

    pub fn expr(&self) -> Option<&Expr> {
        match self {
            ConstraintFormula::Type(_) => None,
            ConstraintFormula::Expression(c) => Some(&c.expr),
            ConstraintFormula::Exception(c) => Some(&c.expr),
        }
    }

    pub fn target(&self) -> &Ty {
        match self {
            ConstraintFormula::Type(c) => &c.right,
            ConstraintFormula::Expression(c) => &c.target,
            ConstraintFormula::Exception(c) => &c.target,
        }
    }
}

impl ApplySubst for ConstraintFormula {
    fn apply_subst(self, subst: &Subst) -> ConstraintFormula {
        match self {
            ConstraintFormula::Type(c) => ConstraintFormula::Type(TypeConstraint {
                left: c.left.apply_subst(subst),
                right: c.right.apply_subst(subst),
                ..c
            }),
            ConstraintFormula::Expression(c) => ConstraintFormula::Expression(ExprConstraint {
                target: c.target.apply_subst(subst),
                ..c
            }),
            ConstraintFormula::Exception(c) => ConstraintFormula::Exception(ExceptionConstraint {
                target: c.target.apply_subst(subst),
                ..c
            }),
        }
    }
}

/// Outcome of reducing one formula.
#[derive(Clone, Debug, PartialEq)]
pub enum Reduction {
    True,
    False(String),
    Formula(ConstraintFormula),
    Formulas(Vec<ConstraintFormula>),
    Bound(TypeBound),
}

impl Reduction {
    pub(crate) fn check(ok: bool, reason: &str) -> Reduction {
        if ok {
            Reduction::True
        } else {
            Reduction::False(reason.to_string())
        }
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Reduction::False(_))
    }
}

/// `S → G<..>` holds only by unchecked conversion: the `G` supertype of `S`
/// is raw.
pub fn needs_unchecked_conversion(s: &Ty, t: &Ty, oracle: &dyn TypeOracle) -> bool {
    let g = match t {
        Ty::Class(c) if !c.args.is_empty() => c,
        _ => return false,
    };
    if s.is_primitive() || s.as_infer().is_some() {
        return false;
    }
    let generic = oracle
        .type_params(&g.name)
        .map_or(false, |params| !params.is_empty());
    generic
        && matches!(oracle.as_super(s, &g.name), Some(Ty::Class(sup)) if sup.args.is_empty())
}

impl TypeConstraint {
    pub fn reduce(&self, oracle: &dyn TypeOracle, options: &InferenceOptions) -> Reduction {
        let (s, t) = (&self.left, &self.right);
        match self.relation {
            TypeRelation::Compatible => self.reduce_compatible(s, t, oracle),
            TypeRelation::Subtype => self.reduce_subtype(s, t, oracle, options),
            TypeRelation::Same => reduce_same(s, t, oracle),
            TypeRelation::Contained => reduce_contained(s, t),
        }
    }

    fn derived(&self, left: Ty, relation: TypeRelation, right: Ty) -> ConstraintFormula {
        ConstraintFormula::ty(left, relation, right).soft(self.soft)
    }

    fn reduce_compatible(&self, s: &Ty, t: &Ty, oracle: &dyn TypeOracle) -> Reduction {
        if s.is_proper() && t.is_proper() {
            return Reduction::check(
                oracle.is_compatible(s, t, InvocationMode::Loose),
                "not compatible in a loose invocation context",
            );
        }
        if let Ty::Prim(p) = s {
            return Reduction::Formula(self.derived(oracle.boxed(*p), TypeRelation::Compatible, t.clone()));
        }
        if let Ty::Prim(p) = t {
            return Reduction::Formula(self.derived(s.clone(), TypeRelation::Same, oracle.boxed(*p)));
        }
        if needs_unchecked_conversion(s, t, oracle) {
            return Reduction::True;
        }
        Reduction::Formula(self.derived(s.clone(), TypeRelation::Subtype, t.clone()))
    }

    fn reduce_subtype(
        &self,
        s: &Ty,
        t: &Ty,
        oracle: &dyn TypeOracle,
        options: &InferenceOptions,
    ) -> Reduction {
        if s.is_wildcard() || t.is_wildcard() || *s == Ty::Void || *t == Ty::Void {
            panic!("no reduction rule for `{} <: {}`", s, t);
        }
        if s.is_proper() && t.is_proper() {
            return Reduction::check(oracle.is_subtype(s, t), "not a subtype");
        }
        if *s == Ty::Null {
            return Reduction::True;
        }
        if *t == Ty::Null {
            return Reduction::False(str!("only the null type is a subtype of null"));
        }
        if let Ty::Infer(alpha) = s {
            return Reduction::Bound(TypeBound::new(*alpha, Relation::Subtype, t.clone()).soft(self.soft));
        }
        if let Ty::Infer(alpha) = t {
            return Reduction::Bound(
                TypeBound::new(*alpha, Relation::Supertype, s.clone()).soft(self.soft),
            );
        }

        match t {
            Ty::Class(g) if !g.args.is_empty() => match oracle.as_super(s, &g.name) {
                None => Reduction::False(format!("`{}` is not a supertype", g.name)),
                Some(Ty::Class(sup)) if sup.args.is_empty() => Reduction::check(
                    self.soft || options.tolerate_raw_supertypes,
                    "only the raw supertype exists",
                ),
                Some(Ty::Class(sup)) => Reduction::Formulas(
                    sup.args
                        .iter()
                        .zip(g.args.iter())
                        .map(|(b, a)| self.derived(b.clone(), TypeRelation::Contained, a.clone()))
                        .collect(),
                ),
                Some(_) => Reduction::False(format!("`{}` is not a supertype", g.name)),
            },
            Ty::Class(g) => Reduction::check(oracle.as_super(s, &g.name).is_some(), "not a subclass"),
            Ty::Array(te) => match s {
                Ty::Array(se) if se.is_primitive() || te.is_primitive() => {
                    Reduction::check(se == te, "primitive array components differ")
                }
                Ty::Array(se) => Reduction::Formula(self.derived(
                    (**se).clone(),
                    TypeRelation::Subtype,
                    (**te).clone(),
                )),
                _ => Reduction::False(str!("not an array type")),
            },
            Ty::Capture(id) => match oracle.capture_bounds(*id) {
                (Some(lower), _) => {
                    Reduction::Formula(self.derived(s.clone(), TypeRelation::Subtype, lower))
                }
                _ => Reduction::False(str!("type variable without a lower bound")),
            },
            Ty::Intersection(tys) => Reduction::Formulas(
                tys.iter()
                    .map(|c| self.derived(s.clone(), TypeRelation::Subtype, c.clone()))
                    .collect(),
            ),
            _ => Reduction::False(format!("`{}` has no subtypes of this form", t)),
        }
    }
}

fn reduce_same(s: &Ty, t: &Ty, oracle: &dyn TypeOracle) -> Reduction {
    if s.is_proper() && t.is_proper() {
        return Reduction::check(oracle.is_same(s, t), "types differ");
    }
    if *s == Ty::Null || *t == Ty::Null {
        return Reduction::False(str!("the null type is not a type argument"));
    }
    match (s, t) {
        (Ty::Wildcard(a), Ty::Wildcard(b)) => match (a, b) {
            (WildcardTy::Unbounded, WildcardTy::Unbounded) => Reduction::True,
            (WildcardTy::Extends(x), WildcardTy::Extends(y))
            | (WildcardTy::Super(x), WildcardTy::Super(y)) => {
                Reduction::Formula(ConstraintFormula::same((**x).clone(), (**y).clone()))
            }
            (WildcardTy::Unbounded, WildcardTy::Extends(x))
            | (WildcardTy::Extends(x), WildcardTy::Unbounded) => {
                Reduction::Formula(ConstraintFormula::same(oracle.object(), (**x).clone()))
            }
            _ => Reduction::False(str!("wildcards differ")),
        },
        (Ty::Wildcard(_), _) | (_, Ty::Wildcard(_)) => {
            Reduction::False(str!("a wildcard is not a type"))
        }
        (Ty::Infer(_), Ty::Prim(_)) | (Ty::Prim(_), Ty::Infer(_)) => {
            Reduction::False(str!("a primitive type is not a type argument"))
        }
        (Ty::Infer(alpha), _) => Reduction::Bound(TypeBound::new(*alpha, Relation::Same, t.clone())),
        (_, Ty::Infer(alpha)) => Reduction::Bound(TypeBound::new(*alpha, Relation::Same, s.clone())),
        (Ty::Class(a), Ty::Class(b)) if a.name == b.name && a.args.len() == b.args.len() => {
            Reduction::Formulas(
                a.args
                    .iter()
                    .zip(b.args.iter())
                    .map(|(x, y)| ConstraintFormula::same(x.clone(), y.clone()))
                    .collect(),
            )
        }
        (Ty::Array(a), Ty::Array(b)) => {
            Reduction::Formula(ConstraintFormula::same((**a).clone(), (**b).clone()))
        }
        (Ty::Intersection(a), Ty::Intersection(b)) if a.len() == b.len() => Reduction::Formulas(
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| ConstraintFormula::same(x.clone(), y.clone()))
                .collect(),
        ),
        _ => Reduction::False(str!("types differ")),
    }
}

fn reduce_contained(s: &Ty, t: &Ty) -> Reduction {
    let wildcard = match t {
        Ty::Wildcard(w) => w,
        _ if s.is_wildcard() => return Reduction::False(str!("a wildcard is not contained by a type")),
        _ => return Reduction::Formula(ConstraintFormula::same(s.clone(), t.clone())),
    };
    match (wildcard, s) {
        (WildcardTy::Unbounded, _) => Reduction::True,
        (WildcardTy::Extends(u), Ty::Wildcard(WildcardTy::Unbounded)) => Reduction::Formula(
            ConstraintFormula::subtype(Ty::class("Object", vec![]), (**u).clone()),
        ),
        (WildcardTy::Extends(u), Ty::Wildcard(WildcardTy::Extends(v))) => {
            Reduction::Formula(ConstraintFormula::subtype((**v).clone(), (**u).clone()))
        }
        (WildcardTy::Extends(u), Ty::Wildcard(WildcardTy::Super(_))) => Reduction::Formula(
            ConstraintFormula::same(Ty::class("Object", vec![]), (**u).clone()),
        ),
        (WildcardTy::Extends(u), s) => {
            Reduction::Formula(ConstraintFormula::subtype(s.clone(), (**u).clone()))
        }
        (WildcardTy::Super(l), Ty::Wildcard(WildcardTy::Super(v))) => {
            Reduction::Formula(ConstraintFormula::subtype((**l).clone(), (**v).clone()))
        }
        (WildcardTy::Super(_), Ty::Wildcard(_)) => {
            Reduction::False(str!("wildcard is not contained by `? super`"))
        }
        (WildcardTy::Super(l), s) => {
            Reduction::Formula(ConstraintFormula::subtype((**l).clone(), s.clone()))
        }
    }
}
