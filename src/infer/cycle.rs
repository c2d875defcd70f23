use std::collections::{BTreeMap, BTreeSet};

use petgraph::{algo::tarjan_scc, graph::DiGraph, graphmap::DiGraphMap};

use crate::{
    infer::{input_variables, output_variables, BoundSet, ConstraintFormula},
    span::Span,
    typing::{oracle::TypeOracle, ty::InferVar},
};

/// Input and output variables of one pending constraint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VarIo {
    pub inputs: BTreeSet<InferVar>,
    pub outputs: BTreeSet<InferVar>,
}

impl VarIo {
    pub fn of(c: &ConstraintFormula, oracle: &dyn TypeOracle) -> VarIo {
        VarIo {
            inputs: input_variables(c, oracle),
            outputs: output_variables(c, oracle),
        }
    }

    fn uninstantiated(&self, bounds: &BoundSet) -> VarIo {
        let keep = |vars: &BTreeSet<InferVar>| {
            vars.iter()
                .copied()
                .filter(|v| !bounds.is_instantiated(*v))
                .collect()
        };
        VarIo {
            inputs: keep(&self.inputs),
            outputs: keep(&self.outputs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleCandidate {
    pub index: usize,
    pub in_cycle: bool,
    /// Depends on a constraint outside its own cycle.
    pub outside_dependency: bool,
    pub is_expression: bool,
    pub span: Option<Span>,
}

/// Variables that influence one another end up in the same component.
fn influence_components(bounds: &BoundSet, vars: &BTreeSet<InferVar>) -> BTreeMap<InferVar, usize> {
    let mut graph = DiGraphMap::<InferVar, ()>::new();
    for v in vars {
        graph.add_node(*v);
    }
    for a in vars {
        for b in vars.range(*a..).skip(1) {
            if bounds.depends_on(*a, *b) || bounds.depends_on(*b, *a) {
                graph.add_edge(*a, *b, ());
                graph.add_edge(*b, *a, ());
            }
        }
    }

    let mut components = BTreeMap::new();
    for (i, scc) in tarjan_scc(&graph).into_iter().enumerate() {
        for v in scc {
            components.insert(v, i);
        }
    }
    components
}

/// `deps[i]` lists the constraints whose output variables influence an
/// input variable of constraint `i`.
fn constraint_dependencies(io: &[VarIo], bounds: &BoundSet) -> Vec<Vec<usize>> {
    let io = io.iter().map(|x| x.uninstantiated(bounds)).collect::<Vec<_>>();
    let vars = io
        .iter()
        .flat_map(|x| x.inputs.iter().chain(x.outputs.iter()).copied())
        .collect::<BTreeSet<_>>();
    let components = influence_components(bounds, &vars);
    let same = |a: &InferVar, b: &InferVar| a == b || components.get(a) == components.get(b);

    (0..io.len())
        .map(|i| {
            (0..io.len())
                .filter(|j| *j != i)
                .filter(|j| {
                    io[i]
                        .inputs
                        .iter()
                        .any(|a| io[*j].outputs.iter().any(|b| same(a, b)))
                })
                .collect()
        })
        .collect()
}

/// Chooses the next constraints to solve from `constraints`: every
/// constraint with no dependency on another, or when the dependencies
/// form a cycle, a single constraint picked from it. Indices come back
/// ascending.
pub fn select(
    constraints: &[ConstraintFormula],
    io: &[VarIo],
    bounds: &BoundSet,
) -> Vec<usize> {
    let deps = constraint_dependencies(io, bounds);
    let bottom = (0..constraints.len())
        .filter(|i| deps[*i].is_empty())
        .collect::<Vec<_>>();
    if !bottom.is_empty() {
        return bottom;
    }

    let mut graph = DiGraph::<usize, ()>::new();
    let nodes = (0..constraints.len())
        .map(|i| graph.add_node(i))
        .collect::<Vec<_>>();
    for (i, ds) in deps.iter().enumerate() {
        for j in ds {
            graph.add_edge(nodes[i], nodes[*j], ());
        }
    }

    let mut scc_of = vec![0; constraints.len()];
    let mut scc_len = vec![];
    for (k, scc) in tarjan_scc(&graph).into_iter().enumerate() {
        scc_len.push(scc.len());
        for n in scc {
            scc_of[graph[n]] = k;
        }
    }

    let candidates = constraints
        .iter()
        .enumerate()
        .map(|(i, c)| CycleCandidate {
            index: i,
            in_cycle: scc_len[scc_of[i]] > 1,
            outside_dependency: deps[i].iter().any(|j| scc_of[*j] != scc_of[i]),
            is_expression: c.is_expression(),
            span: c.expr().map(|e| e.span()),
        })
        .collect::<Vec<_>>();
    let picked = pick_from_cycle(&candidates).unwrap_or(0);
    log::debug!(
        "[cycle] {} constraints depend on one another, picking {}",
        constraints.len(),
        constraints[picked]
    );
    vec![picked]
}

/// Picks one constraint out of a dependency cycle. Candidates that are
/// part of a cycle and depend on nothing outside it are considered first.
/// Among those an expression constraint wins over an exception
/// constraint, then the expression that contains the most other
/// candidates, then the leftmost one.
pub fn pick_from_cycle(candidates: &[CycleCandidate]) -> Option<usize> {
    let mut considered = candidates
        .iter()
        .filter(|c| c.in_cycle && !c.outside_dependency)
        .collect::<Vec<_>>();
    if considered.is_empty() {
        considered = candidates.iter().filter(|c| c.in_cycle).collect();
    }
    if considered.is_empty() {
        considered = candidates.iter().collect();
    }

    let contains = |c: &CycleCandidate| -> usize {
        let outer = unless!(c.span, else return 0);
        considered
            .iter()
            .filter(|o| o.index != c.index)
            .filter_map(|o| o.span)
            .filter(|inner| *inner != outer && outer.contains(inner))
            .count()
    };

    considered
        .iter()
        .min_by_key(|c| {
            (
                !c.is_expression,
                std::cmp::Reverse(contains(*c)),
                c.span.map(|s| s.start),
                c.index,
            )
        })
        .map(|c| c.index)
}
