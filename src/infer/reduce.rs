use std::{collections::BTreeSet, rc::Rc};

use crate::{
    errors::InferResult,
    expr::{Expr, Invocation, Lambda, MethodRef, RefTarget},
    infer::{
        needs_unchecked_conversion, BoundSet, ConstraintFormula, ExceptionConstraint,
        ExprConstraint, ExprRelation, InferenceContext, NullHints, Reduction, TypeRelation,
    },
    span::Span,
    typing::{
        oracle::TypeOracle,
        subst::ApplySubst,
        ty::{InferVar, Ty, WildcardTy},
    },
    utils::join,
};

impl<'o> InferenceContext<'o> {
    /// Reduces one formula. Expression formulas may enter nested generic
    /// invocations, which is why reduction goes through the context.
    pub fn reduce(&mut self, formula: &ConstraintFormula) -> InferResult<Reduction> {
        let reduction = match formula {
            ConstraintFormula::Type(tc) => {
                if tc.relation == TypeRelation::Compatible
                    && needs_unchecked_conversion(&tc.left, &tc.right, self.oracle)
                {
                    log::debug!("[reduce] unchecked conversion in {}", formula);
                    self.unchecked = true;
                }
                tc.reduce(self.oracle, &self.options)
            }
            ConstraintFormula::Expression(ec) => self.reduce_expression(ec)?,
            ConstraintFormula::Exception(xc) => self.reduce_exception(xc)?,
        };
        log::trace!("[reduce] {} ~> {:?}", formula, reduction);
        Ok(reduction)
    }

    fn reduce_expression(&mut self, c: &ExprConstraint) -> InferResult<Reduction> {
        let target = &c.target;
        if c.relation == ExprRelation::PotentiallyCompatible {
            return Ok(self.potentially_compatible(&c.expr, target));
        }

        if !c.expr.is_poly() {
            let ty = match standalone_type(&c.expr) {
                Some(ty) => ty,
                None => return Ok(Reduction::False(format!("{} has no type", c.expr))),
            };
            if ty == Ty::Void && *target != Ty::Void {
                return Ok(Reduction::False(format!("{} has no value", c.expr)));
            }
            if target.is_proper() {
                return Ok(Reduction::check(
                    self.oracle.is_compatible(&ty, target, self.mode),
                    "argument is not compatible with its target",
                ));
            }
            return Ok(Reduction::Formula(
                ConstraintFormula::compatible(ty, target.clone())
                    .soft(self.options.soft_argument_constraints),
            ));
        }

        match &c.expr {
            Expr::Standalone(_, ty) => Ok(Reduction::Formula(ConstraintFormula::compatible(
                ty.clone(),
                target.clone(),
            ))),
            Expr::Conditional(cond) => Ok(Reduction::Formulas(vec![
                ConstraintFormula::expression(cond.then.clone(), target.clone()),
                ConstraintFormula::expression(cond.otherwise.clone(), target.clone()),
            ])),
            Expr::Lambda(lambda) => self.reduce_lambda(lambda, target),
            Expr::MethodRef(mref) => self.reduce_method_ref(mref, target),
            Expr::Invocation(inv) => self.reduce_invocation(inv, target),
        }
    }

    /// Shape check for arguments that are not pertinent to applicability.
    pub(crate) fn potentially_compatible(&self, expr: &Expr, target: &Ty) -> Reduction {
        match expr {
            Expr::Lambda(lambda) => {
                if target.as_infer().is_some() {
                    return Reduction::True;
                }
                let ft = unless!(self.oracle.function_type(target), else {
                    return Reduction::False(format!("`{}` is not a functional interface", target))
                });
                if ft.params.len() != lambda.params.arity() {
                    return Reduction::False(format!(
                        "lambda takes {} parameters, `{}` expects {}",
                        lambda.params.arity(),
                        target,
                        ft.params.len()
                    ));
                }
                if ft.is_void() {
                    Reduction::check(lambda.body.is_void_compatible(), "lambda body is not void-compatible")
                } else {
                    Reduction::check(lambda.body.is_value_compatible(), "lambda body is not value-compatible")
                }
            }
            Expr::MethodRef(mref) => {
                if target.as_infer().is_some() {
                    return Reduction::True;
                }
                let ft = unless!(self.oracle.function_type(target), else {
                    return Reduction::False(format!("`{}` is not a functional interface", target))
                });
                match mref.exact() {
                    Some(sig) => {
                        let (n, k) = (ft.params.len(), sig.params.len());
                        Reduction::check(
                            n == k || (mref.qualifier.is_some() && n == k + 1),
                            "method reference arity does not match",
                        )
                    }
                    None => Reduction::True,
                }
            }
            Expr::Conditional(cond) => Reduction::Formulas(vec![
                ConstraintFormula::potentially_compatible(cond.then.clone(), target.clone()),
                ConstraintFormula::potentially_compatible(cond.otherwise.clone(), target.clone()),
            ]),
            _ => Reduction::True,
        }
    }

    fn reduce_lambda(&mut self, lambda: &Rc<Lambda>, target: &Ty) -> InferResult<Reduction> {
        if target.as_infer().is_some() {
            return Ok(Reduction::False(format!(
                "lambda target `{}` is an inference variable",
                target
            )));
        }
        let ground = unless!(self.ground_lambda_target(lambda, target)?, else {
            return Ok(Reduction::False(format!("`{}` has no ground target type", target)))
        });
        let ft = unless!(self.oracle.function_type(&ground), else {
            return Ok(Reduction::False(format!("`{}` is not a functional interface", target)))
        });

        if ft.params.len() != lambda.params.arity() {
            return Ok(Reduction::False(format!(
                "lambda takes {} parameters, `{}` expects {}",
                lambda.params.arity(),
                ground,
                ft.params.len()
            )));
        }
        if ft.is_void() && !lambda.body.is_void_compatible() {
            return Ok(Reduction::False(str!("lambda body is not void-compatible")));
        }
        if !ft.is_void() && !lambda.body.is_value_compatible() {
            return Ok(Reduction::False(str!("lambda body is not value-compatible")));
        }

        let mut formulas = vec![];
        if let Some(explicit) = lambda.params.explicit() {
            for (f, g) in explicit.iter().zip(ft.params.iter()) {
                formulas.push(ConstraintFormula::same(f.clone(), g.clone()));
            }
            if ground != *target {
                formulas.push(ConstraintFormula::subtype(ground.clone(), target.clone()));
            }
        }

        if !ft.is_void() {
            let params = match lambda.params.explicit() {
                Some(ps) => ps.to_vec(),
                None => ft.params.clone().apply_subst(&self.current_subst()),
            };
            for result in lambda.body.result_expressions(&params) {
                formulas.push(ConstraintFormula::expression(result, ft.ret.clone()));
            }
        }
        Ok(Reduction::Formulas(formulas))
    }

    /// Ground target type of a lambda. Explicitly typed lambdas infer the
    /// wildcard-free parameterization from their parameter types.
    fn ground_lambda_target(&mut self, lambda: &Lambda, target: &Ty) -> InferResult<Option<Ty>> {
        if !target.is_wildcard_parameterized() {
            return Ok(Some(target.clone()));
        }
        match lambda.params.explicit() {
            Some(ps) if !ps.is_empty() => Ok(self.functional_parameterization(lambda.span, target, ps)),
            _ => Ok(non_wildcard_parameterization(target, self.oracle)),
        }
    }

    /// Infers `F<A'1..A'm>` from the explicit parameter types of a lambda
    /// targeting the wildcard-parameterized `F<A1..Am>`.
    fn functional_parameterization(&mut self, site: Span, target: &Ty, params: &[Ty]) -> Option<Ty> {
        let class = target.as_class()?;
        let decls = self.oracle.type_params(&class.name)?;
        let betas = {
            let mut vf = self.vars.borrow_mut();
            decls
                .iter()
                .enumerate()
                .map(|(i, d)| vf.intern(d.param.clone(), site, i, NullHints::empty()))
                .collect::<Vec<_>>()
        };
        let fresh = Ty::class(
            class.name.as_str(),
            betas.iter().map(|b| Ty::Infer(*b)).collect(),
        );
        let ft = self.oracle.function_type(&fresh)?;
        if ft.params.len() != params.len() {
            return None;
        }

        let mut scratch = BoundSet::new();
        let formulas = params
            .iter()
            .zip(ft.params.iter())
            .map(|(p, q)| ConstraintFormula::same(p.clone(), q.clone()))
            .collect();
        if scratch
            .reduce_and_incorporate(formulas, self.oracle, &self.options)
            .is_err()
        {
            return None;
        }

        let args = class
            .args
            .iter()
            .zip(betas.iter())
            .map(|(a, b)| match scratch.instantiation(*b) {
                Some(inst) if a.is_wildcard() => inst.clone(),
                _ => a.clone(),
            })
            .collect();
        let candidate = non_wildcard_parameterization(&Ty::class(class.name.as_str(), args), self.oracle)?;
        if candidate.is_proper() && target.is_proper() && !self.oracle.is_subtype(&candidate, target) {
            log::debug!("[reduce] `{}` is not a subtype of `{}`", candidate, target);
            return None;
        }
        Some(candidate)
    }

    fn reduce_method_ref(&mut self, mref: &Rc<MethodRef>, target: &Ty) -> InferResult<Reduction> {
        if target.as_infer().is_some() {
            return Ok(Reduction::False(format!(
                "method reference target `{}` is an inference variable",
                target
            )));
        }
        let ground = unless!(non_wildcard_parameterization(target, self.oracle), else {
            return Ok(Reduction::False(format!("`{}` has no ground target type", target)))
        });
        let ft = unless!(self.oracle.function_type(&ground), else {
            return Ok(Reduction::False(format!("`{}` is not a functional interface", target)))
        });

        match &mref.target {
            RefTarget::Exact(sig) => {
                let (n, k) = (ft.params.len(), sig.params.len());
                let mut formulas = vec![];
                let params = if n == k + 1 {
                    let q = unless!(&mref.qualifier, else {
                        return Ok(Reduction::False(str!("method reference has no receiver type")))
                    });
                    formulas.push(ConstraintFormula::subtype(ft.params[0].clone(), q.clone()));
                    &ft.params[1..]
                } else if n == k {
                    &ft.params[..]
                } else {
                    return Ok(Reduction::False(format!(
                        "`{}` takes {} parameters, `{}` expects {}",
                        sig.name, k, ground, n
                    )));
                };
                for (p, f) in params.iter().zip(sig.params.iter()) {
                    formulas.push(ConstraintFormula::same(p.clone(), f.clone()));
                }
                if !ft.is_void() {
                    if sig.ret == Ty::Void {
                        return Ok(Reduction::False(format!("`{}` returns void", sig.name)));
                    }
                    let ret = if sig.ret.is_proper() {
                        self.oracle.capture(&sig.ret)
                    } else {
                        sig.ret.clone()
                    };
                    formulas.push(ConstraintFormula::compatible(ret, ft.ret.clone()));
                }
                Ok(Reduction::Formulas(formulas))
            }
            RefTarget::Inexact(_) => {
                let params = ft.params.clone().apply_subst(&self.current_subst());
                if params.iter().any(|p| !p.is_proper()) {
                    return Ok(Reduction::False(format!(
                        "parameter types ({}) are not known yet",
                        join(&params, ", ")
                    )));
                }
                let decl = unless!(mref.declaration(&params), else {
                    return Ok(Reduction::False(format!(
                        "no compile-time declaration for ({})",
                        join(&params, ", ")
                    )))
                });
                if ft.is_void() {
                    return Ok(Reduction::True);
                }
                if decl.ret == Ty::Void {
                    return Ok(Reduction::False(format!("`{}` returns void", decl.name)));
                }

                if decl.is_generic() && decl.return_mentions_type_params() {
                    let receiver = mref.qualifier.is_some() && params.len() == decl.params.len() + 1;
                    let args = params
                        .iter()
                        .skip(if receiver { 1 } else { 0 })
                        .map(|p| Expr::standalone(mref.span, p.clone()))
                        .collect();
                    let inv = Invocation {
                        span: mref.span,
                        method: Rc::new(decl),
                        args,
                        type_args: None,
                    };
                    return self.reduce_invocation(&inv, &ft.ret);
                }

                let ret = if decl.ret.is_proper() {
                    self.oracle.capture(&decl.ret)
                } else {
                    decl.ret.clone()
                };
                Ok(Reduction::Formula(ConstraintFormula::compatible(ret, ft.ret.clone())))
            }
        }
    }

    /// A nested generic invocation contributes its applicability bounds
    /// and its return constraint to this episode's bound set.
    fn reduce_invocation(&mut self, inv: &Invocation, target: &Ty) -> InferResult<Reduction> {
        self.enter_poly_invocation(inv)?;
        let result = self.compute_b3(target);
        self.resume_suspended();
        result.map(|_| Reduction::True)
    }

    fn reduce_exception(&mut self, c: &ExceptionConstraint) -> InferResult<Reduction> {
        let target = &c.target;
        if target.as_infer().is_some() {
            return Ok(Reduction::False(format!(
                "`{}` is an inference variable, not a functional interface",
                target
            )));
        }

        let (ground, implicit) = match &c.expr {
            Expr::Lambda(lambda) => (
                self.ground_lambda_target(lambda, target)?,
                lambda.params.is_implicit(),
            ),
            Expr::MethodRef(mref) => (non_wildcard_parameterization(target, self.oracle), !mref.is_exact()),
            _ => return Ok(Reduction::True),
        };
        let ground = unless!(ground, else {
            return Ok(Reduction::False(format!("`{}` has no ground target type", target)))
        });
        let ft = unless!(self.oracle.function_type(&ground), else {
            return Ok(Reduction::False(format!("`{}` is not a functional interface", target)))
        });

        let subst = self.current_subst();
        let params = ft.params.clone().apply_subst(&subst);
        let ret = ft.ret.clone().apply_subst(&subst);
        if implicit && params.iter().any(|p| !p.is_proper()) {
            return Ok(Reduction::False(str!("parameter types are not known yet")));
        }
        if ret != Ty::Void && !ret.is_proper() {
            return Ok(Reduction::False(str!("return type is not known yet")));
        }

        let (declared, open): (Vec<Ty>, Vec<Ty>) = ft
            .thrown
            .clone()
            .apply_subst(&subst)
            .into_iter()
            .partition(Ty::is_proper);

        let thrown = match &c.expr {
            Expr::Lambda(lambda) => {
                let ps = lambda
                    .params
                    .explicit()
                    .map_or_else(|| params.clone(), |ps| ps.to_vec());
                lambda.body.thrown(&ps)
            }
            Expr::MethodRef(mref) => mref
                .declaration(&params)
                .map(|d| d.thrown)
                .unwrap_or_default(),
            _ => vec![],
        };
        let uncovered = thrown
            .into_iter()
            .filter(|x| x.is_proper() && self.oracle.is_checked_exception(x))
            .filter(|x| !declared.iter().any(|d| self.oracle.is_subtype(x, d)))
            .collect::<Vec<_>>();

        if open.is_empty() {
            return Ok(Reduction::check(uncovered.is_empty(), "unreported checked exception"));
        }

        let mut formulas = vec![];
        for e in open.iter() {
            if let Some(var) = e.as_infer() {
                self.bounds.mark_throws(var);
            }
            for x in uncovered.iter() {
                formulas.push(ConstraintFormula::subtype(x.clone(), e.clone()));
            }
        }
        Ok(Reduction::Formulas(formulas))
    }
}

/// Type of a standalone expression. Generic invocations that are not poly
/// expressions use their declared return type.
fn standalone_type(expr: &Expr) -> Option<Ty> {
    match expr {
        Expr::Invocation(inv) if inv.needs_inference() => Some(inv.method.ret.clone()),
        e => e.resolved_type(),
    }
}

/// `F<A'1..A'm>` for a wildcard-parameterized functional interface
/// type: `?` becomes the declared bound, `? extends U` becomes `U` and
/// `? super L` becomes `L`. Types without wildcards come back unchanged.
pub fn non_wildcard_parameterization(target: &Ty, oracle: &dyn TypeOracle) -> Option<Ty> {
    let class = match target {
        Ty::Class(c) => c,
        Ty::Intersection(_) | Ty::Infer(_) => return None,
        t => return Some(t.clone()),
    };
    if !target.is_wildcard_parameterized() {
        return Some(target.clone());
    }

    let decls = oracle.type_params(&class.name)?;
    let object = oracle.object();
    let args = class
        .args
        .iter()
        .enumerate()
        .map(|(i, arg)| {
            let declared = decls.get(i).map(|d| d.bounds.clone()).unwrap_or_default();
            let self_referential = declared
                .iter()
                .any(|b| decls.iter().any(|d| b.mentions_param(&d.param)));
            let declared = if self_referential || declared.is_empty() {
                object.clone()
            } else {
                Ty::intersection(declared)
            };
            match arg {
                Ty::Wildcard(WildcardTy::Unbounded) => declared,
                Ty::Wildcard(WildcardTy::Extends(u)) => {
                    if declared == object || !u.is_proper() {
                        (**u).clone()
                    } else {
                        oracle
                            .glb(&[(**u).clone(), declared])
                            .map_or_else(|| (**u).clone(), Ty::intersection)
                    }
                }
                Ty::Wildcard(WildcardTy::Super(l)) => (**l).clone(),
                t => t.clone(),
            }
        })
        .collect();
    Some(Ty::class(class.name.as_str(), args))
}

/// Input variables of a formula: what must be resolved before it can be
/// reduced.
pub fn input_variables(c: &ConstraintFormula, oracle: &dyn TypeOracle) -> BTreeSet<InferVar> {
    match c {
        ConstraintFormula::Expression(ec) => expr_inputs(&ec.expr, &ec.target, oracle, true),
        ConstraintFormula::Exception(xc) => expr_inputs(&xc.expr, &xc.target, oracle, false),
        ConstraintFormula::Type(_) => BTreeSet::new(),
    }
}

/// Variables of the formula's target that are not input variables.
pub fn output_variables(c: &ConstraintFormula, oracle: &dyn TypeOracle) -> BTreeSet<InferVar> {
    let inputs = input_variables(c, oracle);
    c.target()
        .infer_vars()
        .into_iter()
        .filter(|v| !inputs.contains(v))
        .collect()
}

/// Expression formulas look into result expressions. Exception formulas
/// wait for the return type instead.
fn expr_inputs(expr: &Expr, target: &Ty, oracle: &dyn TypeOracle, with_results: bool) -> BTreeSet<InferVar> {
    let mut vars = BTreeSet::new();
    match expr {
        Expr::Lambda(lambda) => {
            if let Some(v) = target.as_infer() {
                vars.insert(v);
                return vars;
            }
            let ft = non_wildcard_parameterization(target, oracle).and_then(|g| oracle.function_type(&g));
            if let Some(ft) = ft {
                if lambda.params.is_implicit() {
                    for p in ft.params.iter() {
                        p.collect_infer_vars(&mut vars);
                    }
                }
                if !with_results && !ft.is_void() {
                    ft.ret.collect_infer_vars(&mut vars);
                }
                if with_results && !ft.is_void() {
                    let params = lambda
                        .params
                        .explicit()
                        .map_or_else(|| ft.params.clone(), |ps| ps.to_vec());
                    for result in lambda.body.result_expressions(&params) {
                        vars.extend(expr_inputs(&result, &ft.ret, oracle, true));
                    }
                }
            }
        }
        Expr::MethodRef(mref) => {
            if let Some(v) = target.as_infer() {
                vars.insert(v);
            } else if !mref.is_exact() {
                let ft = non_wildcard_parameterization(target, oracle).and_then(|g| oracle.function_type(&g));
                if let Some(ft) = ft {
                    for p in ft.params.iter() {
                        p.collect_infer_vars(&mut vars);
                    }
                    if !with_results && !ft.is_void() {
                        ft.ret.collect_infer_vars(&mut vars);
                    }
                }
            }
        }
        Expr::Conditional(cond) => {
            vars.extend(expr_inputs(&cond.then, target, oracle, with_results));
            vars.extend(expr_inputs(&cond.otherwise, target, oracle, with_results));
        }
        _ => {}
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::{input_variables, non_wildcard_parameterization, output_variables};
    use crate::{
        expr::{Expr, FixedBody, LambdaParams, MethodSig},
        infer::{ConstraintFormula, InferenceContext, Reduction},
        options::InferenceOptions,
        span::Span,
        typing::{
            hierarchy::ClassTable,
            ty::{InferVar, Ty},
        },
    };

    fn function(t: Ty, r: Ty) -> Ty {
        class!("Function", t, r)
    }

    fn empty_context(table: &ClassTable) -> InferenceContext<'_> {
        InferenceContext::for_call(
            table,
            Span::at(0, 0, 1),
            MethodSig::new("noop"),
            vec![],
            InferenceOptions::default(),
        )
    }

    #[test]
    fn test_non_wildcard_parameterization() {
        let table = ClassTable::with_builtins();
        let t = function(Ty::super_of(class!("String")), Ty::extends(class!("Number")));
        assert_eq!(
            non_wildcard_parameterization(&t, &table),
            Some(function(class!("String"), class!("Number")))
        );
        let u = function(Ty::wildcard(), Ty::wildcard());
        assert_eq!(
            non_wildcard_parameterization(&u, &table),
            Some(function(class!("Object"), class!("Object")))
        );
    }

    #[test]
    fn test_implicit_lambda_inputs() {
        let table = ClassTable::with_builtins();
        let lambda = Expr::lambda(
            Span::at(1, 0, 8),
            LambdaParams::Implicit(1),
            FixedBody::expression(Expr::standalone(Span::at(1, 5, 8), class!("String"))),
        );
        let c = ConstraintFormula::expression(lambda, function(ivar!(0), ivar!(1)));
        let inputs = input_variables(&c, &table);
        assert_eq!(inputs.into_iter().collect::<Vec<_>>(), vec![InferVar(0)]);
        let outputs = output_variables(&c, &table);
        assert_eq!(outputs.into_iter().collect::<Vec<_>>(), vec![InferVar(1)]);
    }

    #[test]
    fn test_exception_inputs_include_the_return_type() {
        let table = ClassTable::with_builtins();
        let lambda = Expr::lambda(
            Span::at(1, 0, 8),
            LambdaParams::Implicit(1),
            FixedBody::expression(Expr::standalone(Span::at(1, 5, 8), class!("String"))),
        );
        let c = ConstraintFormula::exception(lambda, function(ivar!(0), ivar!(1)));
        let inputs = input_variables(&c, &table);
        assert_eq!(inputs.into_iter().collect::<Vec<_>>(), vec![InferVar(0), InferVar(1)]);
        assert!(output_variables(&c, &table).is_empty());
    }

    #[test]
    fn test_void_has_no_value() {
        let table = ClassTable::with_builtins();
        let mut ctx = empty_context(&table);
        let call = Expr::standalone(Span::at(1, 0, 6), Ty::Void);
        let formula = ConstraintFormula::expression(call.clone(), ivar!(0));
        assert!(ctx.reduce(&formula).unwrap().is_false());
        let formula = ConstraintFormula::expression(call, Ty::Void);
        assert!(!ctx.reduce(&formula).unwrap().is_false());
    }

    #[test]
    fn test_explicit_lambda_has_no_inputs() {
        let table = ClassTable::with_builtins();
        let lambda = Expr::lambda(
            Span::at(1, 0, 8),
            LambdaParams::Explicit(vec![class!("String")]),
            FixedBody::expression(Expr::standalone(Span::at(1, 5, 8), class!("String"))),
        );
        let c = ConstraintFormula::expression(lambda, function(ivar!(0), ivar!(1)));
        assert!(input_variables(&c, &table).is_empty());
    }

    #[test]
    fn test_exact_constructor_ref_needs_no_variables() {
        let table = ClassTable::with_builtins();
        let mut ctx = empty_context(&table);
        let ctor = MethodSig::constructor(class!("ArrayList", class!("String")));
        let mref = Expr::exact_ref(Span::at(2, 0, 14), ctor, None);
        let before = ctx.variable_count();
        let formula = ConstraintFormula::expression(mref, class!("Supplier", class!("List", class!("String"))));
        ctx.reduce_and_incorporate(vec![formula]).unwrap();
        assert_eq!(ctx.variable_count(), before);
    }

    #[test]
    fn test_lambda_arity_mismatch_is_false() {
        let table = ClassTable::with_builtins();
        let mut ctx = empty_context(&table);
        let lambda = Expr::lambda(
            Span::at(3, 0, 10),
            LambdaParams::Implicit(2),
            FixedBody::expression(Expr::standalone(Span::at(3, 8, 10), class!("String"))),
        );
        let formula = ConstraintFormula::expression(lambda, function(class!("String"), class!("String")));
        assert!(ctx.reduce(&formula).unwrap().is_false());
    }

    #[test]
    fn test_checked_exception_must_be_declared() {
        let table = ClassTable::with_builtins();
        let mut ctx = empty_context(&table);
        let body = FixedBody::void_block().throwing(class!("IOException"));
        let lambda = Expr::lambda(Span::at(4, 0, 12), LambdaParams::Implicit(0), body);
        let formula = ConstraintFormula::exception(lambda.clone(), class!("Runnable"));
        assert!(ctx.reduce(&formula).unwrap().is_false());

        let body = FixedBody::value_block(vec![Expr::standalone(Span::at(5, 8, 9), class!("String"))])
            .throwing(class!("IOException"));
        let lambda = Expr::lambda(Span::at(5, 0, 12), LambdaParams::Implicit(0), body);
        let formula = ConstraintFormula::exception(lambda, class!("Callable", class!("String")));
        assert_eq!(ctx.reduce(&formula).unwrap(), Reduction::True);
    }
}
