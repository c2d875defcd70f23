use std::collections::VecDeque;

use crate::{
    errors::{InferError, InferResult},
    infer::{BoundSet, ConstraintFormula, Reduction, Relation, TypeBound},
    options::InferenceOptions,
    typing::{
        oracle::TypeOracle,
        subst::{ApplySubst, Subst},
        ty::{Ty, TyParam, WildcardTy},
    },
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IncorporationStats {
    pub passes: usize,
    /// Bound pairs combined during this call.
    pub pairs: usize,
}

impl BoundSet {
    /// Closes the bound set under the incorporation rules. Each pair of
    /// bounds is combined once over the lifetime of the set.
    pub fn incorporate(
        &mut self,
        oracle: &dyn TypeOracle,
        options: &InferenceOptions,
    ) -> InferResult<IncorporationStats> {
        let mut stats = IncorporationStats::default();
        loop {
            stats.passes += 1;
            if stats.passes > options.pass_limit {
                panic!(
                    "incorporation did not reach a fixed point within {} passes",
                    options.pass_limit
                );
            }

            let before = self.len();
            let folded = self.fold_captures(oracle);
            let mut derived = self.combine_new_pairs(oracle, &mut stats);
            derived.extend(self.capture_implications(oracle)?);
            self.reduce_types(derived, oracle, options)?;
            if self.len() == before && !folded {
                break;
            }
        }
        log::trace!(
            "[incorporate] {} passes, {} pairs, {} bounds",
            stats.passes,
            stats.pairs,
            self.len()
        );
        Ok(stats)
    }

    /// Reduces type formulas straight into this bound set and incorporates.
    pub fn reduce_and_incorporate(
        &mut self,
        formulas: Vec<ConstraintFormula>,
        oracle: &dyn TypeOracle,
        options: &InferenceOptions,
    ) -> InferResult<IncorporationStats> {
        self.reduce_types(formulas, oracle, options)?;
        self.incorporate(oracle, options)
    }

    pub(crate) fn reduce_types(
        &mut self,
        formulas: Vec<ConstraintFormula>,
        oracle: &dyn TypeOracle,
        options: &InferenceOptions,
    ) -> InferResult<()> {
        let mut work = VecDeque::from(formulas);
        while let Some(formula) = work.pop_front() {
            let reduction = match &formula {
                ConstraintFormula::Type(tc) => tc.reduce(oracle, options),
                other => panic!("`{}` is not a type formula", other),
            };
            match reduction {
                Reduction::True => {}
                Reduction::False(reason) => {
                    log::debug!("[incorporate] {} is false: {}", formula, reason);
                    return Err(InferError::contradiction(&formula));
                }
                Reduction::Formula(f) => work.push_back(f),
                Reduction::Formulas(fs) => work.extend(fs),
                Reduction::Bound(b) => {
                    self.add_bound(b);
                }
            }
        }
        Ok(())
    }

    fn combine_new_pairs(
        &mut self,
        oracle: &dyn TypeOracle,
        stats: &mut IncorporationStats,
    ) -> Vec<ConstraintFormula> {
        let n = self.flat.len();
        let mut derived = vec![];
        for j in self.watermark..n {
            for i in 0..j {
                if !self.pair_memo.insert((i as u32, j as u32)) {
                    continue;
                }
                stats.pairs += 1;
                derived.extend(combine(&self.flat[i], &self.flat[j], oracle));
            }
        }
        self.watermark = n;
        derived
    }

    /// Turns each new capture obligation into bounds on its fresh variables.
    fn fold_captures(&mut self, oracle: &dyn TypeOracle) -> bool {
        let mut bounds = vec![];
        let mut folded = false;
        for capture in self.captures.iter_mut().filter(|c| !c.folded) {
            capture.folded = true;
            folded = true;
            log::trace!("[incorporate] fold {}", capture);

            let (lhs, source) = unless!(capture_args(&capture.captured, &capture.source), else continue);
            let (params, theta) = declared_params(&capture.captured, lhs, oracle);
            for (i, (arg, var)) in source.iter().zip(lhs.iter()).enumerate() {
                let alpha = unless!(var.as_infer(), else continue);
                let declared = params.get(i).cloned().unwrap_or_default();
                if declared.is_empty() {
                    bounds.push(TypeBound::new(alpha, Relation::Subtype, oracle.object()));
                }
                for b in declared {
                    bounds.push(TypeBound::new(alpha, Relation::Subtype, b.apply_subst(&theta)));
                }
                // improper wildcard bounds only arrive through `capture_implications`
                match arg {
                    Ty::Wildcard(WildcardTy::Extends(n)) if n.is_proper() => {
                        bounds.push(TypeBound::new(alpha, Relation::Subtype, (**n).clone()));
                    }
                    Ty::Wildcard(_) => {}
                    t => bounds.push(TypeBound::new(alpha, Relation::Same, t.clone())),
                }
            }
        }
        self.add_bounds(bounds);
        folded
    }

    /// Formulas implied by the bounds of variables standing for wildcards.
    fn capture_implications(&self, oracle: &dyn TypeOracle) -> InferResult<Vec<ConstraintFormula>> {
        let object = oracle.object();
        let mut derived = vec![];
        for capture in self.captures.iter() {
            let (lhs, source) = unless!(capture_args(&capture.captured, &capture.source), else continue);
            let (params, theta) = declared_params(&capture.captured, lhs, oracle);
            for (i, (arg, var)) in source.iter().zip(lhs.iter()).enumerate() {
                let wildcard = variant!(arg, if Ty::Wildcard(w), else { continue });
                let alpha = unless!(var.as_infer(), else continue);
                let declared = params.get(i).cloned().unwrap_or_default();
                let b = if declared.is_empty() {
                    object.clone()
                } else {
                    Ty::intersection(declared.apply_subst(&theta))
                };

                for bound in self.bounds_of(alpha) {
                    if bound.right.as_infer().is_some() {
                        continue;
                    }
                    let r = &bound.right;
                    match (wildcard, bound.relation) {
                        (_, Relation::Same) => {
                            log::debug!("[incorporate] {} conflicts with {}", bound, capture);
                            return Err(InferError::reason(format!(
                                "`{}` stands for a wildcard and cannot equal `{}`",
                                alpha, r
                            )));
                        }
                        (WildcardTy::Unbounded, Relation::Supertype)
                        | (WildcardTy::Extends(_), Relation::Supertype) => {
                            log::debug!("[incorporate] {} conflicts with {}", bound, capture);
                            return Err(InferError::reason(format!(
                                "`{}` stands for `{}` and cannot have lower bound `{}`",
                                alpha, arg, r
                            )));
                        }
                        (WildcardTy::Unbounded, Relation::Subtype)
                        | (WildcardTy::Super(_), Relation::Subtype) => {
                            derived.push(ConstraintFormula::subtype(b.clone(), r.clone()))
                        }
                        (WildcardTy::Extends(t), Relation::Subtype) => {
                            if b == object {
                                derived.push(ConstraintFormula::subtype((**t).clone(), r.clone()));
                            }
                            if **t == object {
                                derived.push(ConstraintFormula::subtype(b.clone(), r.clone()));
                            }
                        }
                        (WildcardTy::Super(t), Relation::Supertype) => {
                            derived.push(ConstraintFormula::subtype(r.clone(), (**t).clone()))
                        }
                    }
                }
            }
        }
        Ok(derived)
    }
}

fn capture_args<'a>(captured: &'a Ty, source: &'a Ty) -> Option<(&'a [Ty], &'a [Ty])> {
    let lhs = captured.as_class()?;
    let src = source.as_class()?;
    if lhs.name != src.name || lhs.args.len() != src.args.len() {
        return None;
    }
    Some((&lhs.args, &src.args))
}

/// Declared bounds of the captured class's parameters and the substitution
/// from those parameters to the capture variables.
fn declared_params(captured: &Ty, lhs: &[Ty], oracle: &dyn TypeOracle) -> (Vec<Vec<Ty>>, Subst<TyParam>) {
    let decls = captured
        .class_name()
        .and_then(|name| oracle.type_params(name))
        .unwrap_or_default();
    let theta = Subst::zip(decls.iter().map(|d| d.param.clone()), lhs.iter().cloned());
    let bounds = decls
        .into_iter()
        .map(|d| {
            d.bounds
                .into_iter()
                .filter(|b| !matches!(b, Ty::Class(c) if c.name == "Object" && c.args.is_empty()))
                .collect()
        })
        .collect();
    (bounds, theta)
}

/// The incorporation rules for one pair of bounds.
fn combine(first: &TypeBound, second: &TypeBound, oracle: &dyn TypeOracle) -> Vec<ConstraintFormula> {
    let soft = first.soft || second.soft;
    let derived = if first.left == second.left {
        let (s, t) = (first.right.clone(), second.right.clone());
        match (first.relation, second.relation) {
            (Relation::Same, Relation::Same) => vec![ConstraintFormula::same(s, t)],
            (Relation::Same, Relation::Subtype) | (Relation::Supertype, Relation::Same) => {
                vec![ConstraintFormula::subtype(s, t)]
            }
            (Relation::Subtype, Relation::Same) | (Relation::Same, Relation::Supertype) => {
                vec![ConstraintFormula::subtype(t, s)]
            }
            (Relation::Supertype, Relation::Subtype) => vec![ConstraintFormula::subtype(s, t)],
            (Relation::Subtype, Relation::Supertype) => vec![ConstraintFormula::subtype(t, s)],
            (Relation::Subtype, Relation::Subtype) => common_parameterizations(&s, &t, oracle),
            (Relation::Supertype, Relation::Supertype) => vec![],
        }
    } else {
        substitute(first, second)
            .into_iter()
            .chain(substitute(second, first))
            .collect()
    };
    derived.into_iter().map(|f| f.soft(soft)).collect()
}

/// `α = U` with `U` proper and `β REL T` where `T` mentions `α`.
fn substitute(eq: &TypeBound, other: &TypeBound) -> Option<ConstraintFormula> {
    if eq.relation != Relation::Same || !eq.is_proper() || !other.right.mentions(eq.left) {
        return None;
    }
    let subst = subst! { eq.left => eq.right.clone() };
    let lhs = Ty::Infer(other.left);
    let rhs = other.right.clone().apply_subst(&subst);
    Some(match other.relation {
        Relation::Same => ConstraintFormula::same(lhs, rhs),
        Relation::Subtype => ConstraintFormula::subtype(lhs, rhs),
        Relation::Supertype => ConstraintFormula::subtype(rhs, lhs),
    })
}

/// `α <: S` and `α <: T`: where `S` and `T` share a generic supertype, its
/// non-wildcard arguments must agree.
fn common_parameterizations(s: &Ty, t: &Ty, oracle: &dyn TypeOracle) -> Vec<ConstraintFormula> {
    if s.as_infer().is_some() || t.as_infer().is_some() {
        return vec![];
    }
    let t_sups = oracle.supertypes(t);
    let mut derived = vec![];
    for sup in oracle.supertypes(s) {
        let gs = unless!(sup.as_class().filter(|c| !c.args.is_empty()), else continue);
        let gt = t_sups
            .iter()
            .filter_map(Ty::as_class)
            .find(|c| c.name == gs.name && c.args.len() == gs.args.len());
        let gt = unless!(gt, else continue);
        for (a, b) in gs.args.iter().zip(gt.args.iter()) {
            if !a.is_wildcard() && !b.is_wildcard() {
                derived.push(ConstraintFormula::same(a.clone(), b.clone()));
            }
        }
    }
    derived
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::InferError,
        infer::{BoundSet, Relation, TypeBound},
        options::InferenceOptions,
        typing::{
            hierarchy::ClassTable,
            ty::{InferVar, Ty},
        },
    };

    fn bound(v: u32, rel: Relation, ty: Ty) -> TypeBound {
        TypeBound::new(InferVar(v), rel, ty)
    }

    #[test]
    fn test_transitivity_contradiction() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(bound(0, Relation::Supertype, class!("String")));
        bs.add_bound(bound(0, Relation::Subtype, class!("Integer")));
        assert!(bs.incorporate(&table, &InferenceOptions::default()).is_err());
    }

    #[test]
    fn test_substitutes_instantiation() -> Result<(), InferError> {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(bound(0, Relation::Same, class!("String")));
        bs.add_bound(bound(1, Relation::Subtype, class!("Comparable", ivar!(0))));
        bs.incorporate(&table, &InferenceOptions::default())?;
        assert!(bs.contains(&bound(1, Relation::Subtype, class!("Comparable", class!("String")))));
        Ok(())
    }

    #[test]
    fn test_variable_chain() -> Result<(), InferError> {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(bound(0, Relation::Supertype, class!("Integer")));
        bs.add_bound(bound(0, Relation::Subtype, ivar!(1)));
        bs.add_bound(bound(1, Relation::Subtype, class!("Number")));
        bs.incorporate(&table, &InferenceOptions::default())?;
        assert!(bs.proper_lower_bounds(InferVar(1)).contains(&class!("Integer")));
        Ok(())
    }

    #[test]
    fn test_common_supertype_arguments() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(bound(0, Relation::Subtype, class!("List", class!("String"))));
        bs.add_bound(bound(0, Relation::Subtype, class!("Collection", class!("Integer"))));
        assert!(bs.incorporate(&table, &InferenceOptions::default()).is_err());
    }

    #[test]
    fn test_capture_fold() -> Result<(), InferError> {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_capture(
            class!("List", ivar!(0)),
            class!("List", Ty::extends(class!("Number"))),
        );
        bs.incorporate(&table, &InferenceOptions::default())?;
        assert!(bs.pending_captures().is_empty());
        let upper = bs.upper_bounds(InferVar(0));
        assert!(upper.contains(&&class!("Object")));
        assert!(upper.contains(&&class!("Number")));

        let mut unfolded = BoundSet::new();
        unfolded.add_capture(class!("List", ivar!(0)), class!("List", Ty::extends(ivar!(1))));
        unfolded.incorporate(&table, &InferenceOptions::default())?;
        assert_eq!(unfolded.upper_bounds(InferVar(0)), vec![&class!("Object")]);

        let mut narrowed = bs.clone();
        narrowed.add_bound(bound(0, Relation::Subtype, class!("Integer")));
        assert!(narrowed.incorporate(&table, &InferenceOptions::default()).is_err());

        let mut widened = bs.clone();
        widened.add_bound(bound(0, Relation::Subtype, class!("Number")));
        widened.incorporate(&table, &InferenceOptions::default())?;

        bs.add_bound(bound(0, Relation::Same, class!("Integer")));
        assert!(bs.incorporate(&table, &InferenceOptions::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_second_call_changes_nothing() -> Result<(), InferError> {
        let table = ClassTable::with_builtins();
        let options = InferenceOptions::default();
        let mut bs = BoundSet::new();
        bs.add_bound(bound(0, Relation::Supertype, class!("String")));
        bs.add_bound(bound(0, Relation::Subtype, ivar!(1)));
        bs.add_bound(bound(1, Relation::Subtype, class!("Comparable", ivar!(0))));
        bs.incorporate(&table, &options)?;
        let snapshot = bs.clone();
        let stats = bs.incorporate(&table, &options)?;
        assert_eq!(stats.pairs, 0);
        assert_eq!(stats.passes, 1);
        assert_eq!(bs, snapshot);
        Ok(())
    }

    #[test]
    #[should_panic]
    fn test_pass_limit() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(bound(0, Relation::Same, class!("String")));
        bs.add_bound(bound(1, Relation::Subtype, class!("List", ivar!(0))));
        let _ = bs.incorporate(&table, &InferenceOptions::default().with_pass_limit(1));
    }
}
