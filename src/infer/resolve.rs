use std::collections::BTreeSet;

use crate::{
    errors::{InferError, InferResult},
    infer::{BoundSet, Relation, TypeBound, VarFactory},
    options::InferenceOptions,
    typing::{
        oracle::TypeOracle,
        subst::{ApplySubst, Subst},
        ty::{InferVar, Ty},
    },
    utils::join,
};

/// Instantiates every variable in `targets`, together with whatever they
/// depend on, one cluster at a time.
pub fn resolve(
    bounds: &mut BoundSet,
    targets: &BTreeSet<InferVar>,
    oracle: &dyn TypeOracle,
    options: &InferenceOptions,
    vars: &VarFactory,
) -> InferResult<()> {
    for v in targets {
        bounds.declare(*v);
    }

    loop {
        let pending = targets
            .iter()
            .copied()
            .filter(|v| !bounds.is_instantiated(*v))
            .collect::<BTreeSet<_>>();
        if pending.is_empty() {
            return Ok(());
        }

        let cluster = smallest_cluster(bounds, &pending);
        log::debug!("[resolve] cluster {{{}}}", join(&cluster, ", "));

        let candidate = if bounds.has_capture_bound(&cluster) {
            None
        } else {
            let mut copy = bounds.clone();
            match instantiate(&mut copy, &cluster, oracle, options) {
                Ok(()) => Some(copy),
                Err(e) => {
                    log::debug!("[resolve] candidate instantiation failed: {}", e.message());
                    None
                }
            }
        };

        match candidate {
            Some(copy) => *bounds = copy,
            None => fresh_placeholders(bounds, &cluster, oracle, options, vars)?,
        }

        if cluster.iter().all(|v| !bounds.is_instantiated(*v)) {
            return Err(InferError::no_progress(cluster.into_iter().collect()));
        }
    }
}

/// The smallest dependency closure among the pending variables and
/// everything they depend on; ties go to the lowest variable.
fn smallest_cluster(bounds: &BoundSet, pending: &BTreeSet<InferVar>) -> BTreeSet<InferVar> {
    let open = bounds
        .variables()
        .into_iter()
        .chain(pending.iter().copied())
        .filter(|v| !bounds.is_instantiated(*v))
        .collect::<BTreeSet<_>>();
    let graph = bounds.dependency_graph(&open);
    let wanted = pending
        .iter()
        .flat_map(|v| bounds.dependency_closure(&graph, *v))
        .collect::<BTreeSet<_>>();

    let mut best: Option<BTreeSet<InferVar>> = None;
    for v in wanted {
        let closure = bounds.dependency_closure(&graph, v);
        if best.as_ref().map_or(true, |b| closure.len() < b.len()) {
            best = Some(closure);
        }
    }
    best.unwrap_or_default()
}

fn instantiate(
    bounds: &mut BoundSet,
    cluster: &BTreeSet<InferVar>,
    oracle: &dyn TypeOracle,
    options: &InferenceOptions,
) -> InferResult<()> {
    for alpha in cluster.iter().copied() {
        if bounds.is_instantiated(alpha) {
            continue;
        }

        let lower = bounds.proper_lower_bounds(alpha);
        let ty = if !lower.is_empty() {
            oracle.lub(&lower).ok_or_else(|| {
                InferError::malformed(alpha, format!("no least upper bound of {}", join(&lower, ", ")))
            })?
        } else if bounds.in_throws(alpha) && bounds.has_only_trivial_exception_bounds(alpha, oracle) {
            oracle.runtime_exception()
        } else {
            glb_of(alpha, bounds.proper_upper_bounds(alpha), oracle)?
        };

        log::trace!("[resolve] candidate {} := {}", alpha, ty);
        bounds.add_bound(TypeBound::new(alpha, Relation::Same, ty));
    }
    bounds.incorporate(oracle, options)?;
    Ok(())
}

fn glb_of(alpha: InferVar, upper: Vec<Ty>, oracle: &dyn TypeOracle) -> InferResult<Ty> {
    let object = oracle.object();
    let mut upper = upper.into_iter().filter(|t| *t != object).collect::<Vec<_>>();
    upper.dedup();
    match upper.len() {
        0 => Ok(object),
        1 => Ok(upper.remove(0)),
        _ => {
            let parts = oracle.glb(&upper).ok_or_else(|| {
                InferError::malformed(alpha, format!("no greatest lower bound of {}", join(&upper, ", ")))
            })?;
            if parts.len() > 1 && !oracle.is_consistent_intersection(&parts) {
                return Err(InferError::malformed(
                    alpha,
                    format!("`{}` is not a consistent intersection", join(&parts, " & ")),
                ));
            }
            Ok(Ty::intersection(parts))
        }
    }
}

/// Instantiates the cluster with fresh placeholder type variables, bounded
/// by the cluster's bounds rewritten in terms of the placeholders.
fn fresh_placeholders(
    bounds: &mut BoundSet,
    cluster: &BTreeSet<InferVar>,
    oracle: &dyn TypeOracle,
    options: &InferenceOptions,
    vars: &VarFactory,
) -> InferResult<()> {
    let ids = cluster
        .iter()
        .map(|alpha| {
            let hint = vars
                .get(*alpha)
                .map_or_else(|| alpha.to_string(), |v| v.param.name.clone());
            (*alpha, oracle.new_capture(&hint))
        })
        .collect::<Vec<_>>();

    let solved: Subst = bounds.solution_subst(&bounds.variables());
    let mut theta = solved.clone();
    for (alpha, id) in ids.iter() {
        theta.insert(*alpha, Ty::Capture(*id));
    }

    // lower bounds only count when proper before the placeholders exist
    let mut planned = vec![];
    for (alpha, id) in ids.iter() {
        let lower = bounds
            .lower_bounds(*alpha)
            .into_iter()
            .map(|t| t.clone().apply_subst(&solved))
            .filter(Ty::is_proper)
            .collect::<Vec<_>>();
        let lower = if lower.is_empty() {
            None
        } else {
            Some(oracle.lub(&lower).ok_or_else(|| {
                InferError::malformed(*alpha, format!("no least upper bound of {}", join(&lower, ", ")))
            })?)
        };

        let object = oracle.object();
        let mut upper = bounds
            .upper_bounds(*alpha)
            .into_iter()
            .map(|t| t.clone().apply_subst(&theta))
            .filter(|t| t.is_proper() && *t != object)
            .collect::<Vec<_>>();
        upper.dedup();
        if upper.len() > 1 {
            upper = oracle.glb(&upper).ok_or_else(|| {
                InferError::malformed(*alpha, format!("no greatest lower bound of {}", join(&upper, ", ")))
            })?;
        }
        planned.push((*alpha, *id, lower, upper));
    }

    // every upper bound is in place before any lower bound is checked against one
    for (alpha, id, _, upper) in planned.iter() {
        if !oracle.set_capture_bounds(*id, None, upper.clone()) {
            return Err(InferError::malformed(*alpha, "placeholder bounds are not well-formed"));
        }
    }
    for (alpha, id, lower, upper) in planned {
        log::debug!(
            "[resolve] {} := {} with lower {} and upper {}",
            alpha,
            id,
            lower.as_ref().map_or_else(|| str!("none"), |t| t.to_string()),
            join(&upper, " & ")
        );
        if !oracle.set_capture_bounds(id, lower, upper) {
            return Err(InferError::malformed(alpha, "placeholder bounds are not well-formed"));
        }
    }

    bounds.remove_captures_mentioning(cluster);
    for (alpha, id) in ids {
        bounds.add_bound(TypeBound::new(alpha, Relation::Same, Ty::Capture(id)));
    }
    bounds.incorporate(oracle, options)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::resolve;
    use crate::{
        errors::InferErrorKind,
        infer::{BoundSet, Relation, TypeBound, VarFactory},
        options::InferenceOptions,
        typing::{hierarchy::ClassTable, oracle::TypeOracle, ty::{InferVar, Ty}},
    };

    fn targets(vars: &[u32]) -> BTreeSet<InferVar> {
        vars.iter().map(|v| InferVar(*v)).collect()
    }

    #[test]
    fn test_lower_bounds_win() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Supertype, class!("Integer")));
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Supertype, class!("Long")));
        resolve(&mut bs, &targets(&[0]), &table, &InferenceOptions::default(), &VarFactory::new()).unwrap();
        let inst = bs.instantiation(InferVar(0)).unwrap().clone();
        assert!(table.is_subtype(&class!("Integer"), &inst));
        assert!(table.is_subtype(&class!("Long"), &inst));
    }

    #[test]
    fn test_upper_bounds_and_object() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Subtype, class!("Number")));
        bs.declare(InferVar(1));
        resolve(&mut bs, &targets(&[0, 1]), &table, &InferenceOptions::default(), &VarFactory::new()).unwrap();
        assert_eq!(bs.instantiation(InferVar(0)), Some(&class!("Number")));
        assert_eq!(bs.instantiation(InferVar(1)), Some(&class!("Object")));
    }

    #[test]
    fn test_throws_variables_prefer_runtime_exception() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Subtype, class!("Exception")));
        bs.mark_throws(InferVar(0));
        resolve(&mut bs, &targets(&[0]), &table, &InferenceOptions::default(), &VarFactory::new()).unwrap();
        assert_eq!(bs.instantiation(InferVar(0)), Some(&class!("RuntimeException")));
    }

    #[test]
    fn test_dependencies_resolve_first() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(TypeBound::new(InferVar(1), Relation::Supertype, class!("String")));
        bs.add_bound(TypeBound::new(
            InferVar(0),
            Relation::Same,
            class!("List", Ty::Infer(InferVar(1))),
        ));
        resolve(&mut bs, &targets(&[0]), &table, &InferenceOptions::default(), &VarFactory::new()).unwrap();
        assert_eq!(bs.instantiation(InferVar(1)), Some(&class!("String")));
        assert_eq!(bs.instantiation(InferVar(0)), Some(&class!("List", class!("String"))));
    }

    #[test]
    fn test_contradictory_candidates_fail() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Subtype, class!("Integer")));
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Subtype, class!("String")));
        let err = resolve(&mut bs, &targets(&[0]), &table, &InferenceOptions::default(), &VarFactory::new())
            .unwrap_err();
        assert!(matches!(err.kind, InferErrorKind::Malformed(..)));
    }

    #[test]
    fn test_capture_cluster_gets_placeholder() {
        let table = ClassTable::with_builtins();
        let mut bs = BoundSet::new();
        bs.add_capture(
            class!("List", Ty::Infer(InferVar(0))),
            class!("List", Ty::extends(class!("Number"))),
        );
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Subtype, class!("Number")));
        bs.incorporate(&table, &InferenceOptions::default()).unwrap();
        resolve(&mut bs, &targets(&[0]), &table, &InferenceOptions::default(), &VarFactory::new()).unwrap();
        let inst = bs.instantiation(InferVar(0)).unwrap().clone();
        assert!(matches!(inst, Ty::Capture(_)));
        assert!(table.is_subtype(&inst, &class!("Number")));
        assert!(bs.captures().is_empty());
    }

    #[test]
    fn test_placeholder_lower_bounds_ignore_the_cluster() {
        let table = ClassTable::with_builtins();
        let options = InferenceOptions::default();
        let mut bs = BoundSet::new();
        bs.add_capture(
            class!("List", Ty::Infer(InferVar(1))),
            class!("List", Ty::extends(Ty::Infer(InferVar(0)))),
        );
        bs.add_bound(TypeBound::new(InferVar(1), Relation::Subtype, Ty::Infer(InferVar(0))));
        bs.add_bound(TypeBound::new(InferVar(0), Relation::Supertype, class!("Integer")));
        bs.add_bound(TypeBound::new(InferVar(1), Relation::Subtype, class!("Number")));
        bs.incorporate(&table, &options).unwrap();
        resolve(&mut bs, &targets(&[0, 1]), &table, &options, &VarFactory::new()).unwrap();

        let id = match bs.instantiation(InferVar(0)) {
            Some(Ty::Capture(id)) => *id,
            other => panic!("expected a placeholder, got {:?}", other),
        };
        assert_eq!(table.capture_bounds(id).0, Some(class!("Integer")));
        let beta = bs.instantiation(InferVar(1)).unwrap().clone();
        assert!(table.is_subtype(&beta, &class!("Number")));
    }
}
