use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use fnv::FnvHashSet;
use petgraph::{graphmap::DiGraphMap, visit::Dfs};

use crate::{
    infer::{Relation, TypeBound},
    typing::{
        oracle::TypeOracle,
        subst::{ApplySubst, Subst},
        ty::{InferVar, Ty},
    },
    utils::indent,
};

/// Bounds of one variable, split by relation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreeSets {
    /// `α :> S`
    pub lower: BTreeSet<TypeBound>,
    /// `α = S`
    pub same: BTreeSet<TypeBound>,
    /// `α <: S`
    pub upper: BTreeSet<TypeBound>,
    pub instantiation: Option<Ty>,
}

impl ThreeSets {
    fn insert(&mut self, bound: TypeBound) -> bool {
        match bound.relation {
            Relation::Supertype => self.lower.insert(bound),
            Relation::Same => self.same.insert(bound),
            Relation::Subtype => self.upper.insert(bound),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeBound> {
        self.same.iter().chain(self.lower.iter()).chain(self.upper.iter())
    }
}

/// `G<α1..αn> = capture(G<A1..An>)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureObligation {
    pub captured: Ty,
    pub source: Ty,
    /// Declared and argument bounds have been derived; the record is kept
    /// for dependencies and the wildcard implications.
    pub folded: bool,
}

impl CaptureObligation {
    pub fn lhs_vars(&self) -> Vec<Option<InferVar>> {
        self.captured
            .as_class()
            .map(|c| c.args.iter().map(Ty::as_infer).collect())
            .unwrap_or_default()
    }

    pub fn mentions_any(&self, vars: &BTreeSet<InferVar>) -> bool {
        self.captured.mentions_any(vars) || self.source.mentions_any(vars)
    }
}

impl fmt::Display for CaptureObligation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = capture({})", self.captured, self.source)
    }
}

/// The accumulated knowledge of one inference episode. Cloning is the
/// speculation mechanism: resolution works on a copy and keeps it only
/// on success.
#[derive(Clone, Debug, Default)]
pub struct BoundSet {
    vars: BTreeMap<InferVar, ThreeSets>,
    /// Every bound in insertion order. Incorporation pairs bounds by index.
    pub(crate) flat: Vec<TypeBound>,
    pub(crate) captures: Vec<CaptureObligation>,
    throws: BTreeSet<InferVar>,
    pub(crate) pair_memo: FnvHashSet<(u32, u32)>,
    pub(crate) watermark: usize,
}

impl PartialEq for BoundSet {
    fn eq(&self, other: &Self) -> bool {
        self.vars == other.vars && self.captures == other.captures && self.throws == other.throws
    }
}

impl Eq for BoundSet {}

impl BoundSet {
    pub fn new() -> BoundSet {
        BoundSet::default()
    }

    /// Inserts `bound` and, for a variable on the right, its inverse.
    /// Returns whether anything was new.
    pub fn add_bound(&mut self, bound: TypeBound) -> bool {
        if bound.right == Ty::Infer(bound.left) {
            return false;
        }
        let inverse = bound.inverse();
        let added = self.insert(bound);
        if let Some(inv) = inverse {
            self.insert(inv);
        }
        added
    }

    fn insert(&mut self, bound: TypeBound) -> bool {
        let sets = self.vars.entry(bound.left).or_default();
        if !sets.insert(bound.clone()) {
            return false;
        }
        if bound.relation == Relation::Same && bound.is_proper() && sets.instantiation.is_none() {
            log::trace!("[add_bound] instantiate {} := {}", bound.left, bound.right);
            sets.instantiation = Some(bound.right.clone());
        }
        log::trace!("[add_bound] {}", bound);
        self.flat.push(bound);
        true
    }

    pub fn add_bounds<I: IntoIterator<Item = TypeBound>>(&mut self, bounds: I) -> bool {
        let mut changed = false;
        for b in bounds {
            changed |= self.add_bound(b);
        }
        changed
    }

    /// Merges everything `other` knows into `self`.
    pub fn merge(&mut self, other: &BoundSet) {
        for b in other.flat.iter() {
            self.add_bound(b.clone());
        }
        for c in other.captures.iter() {
            if !self.captures.iter().any(|k| k.captured == c.captured) {
                self.captures.push(c.clone());
            }
        }
        self.throws.extend(other.throws.iter().copied());
    }

    /// Registers a variable that has no bounds yet.
    pub fn declare(&mut self, var: InferVar) {
        self.vars.entry(var).or_default();
    }

    pub fn add_capture(&mut self, captured: Ty, source: Ty) {
        if self.captures.iter().any(|c| c.captured == captured) {
            return;
        }
        log::debug!("[add_capture] {} = capture({})", captured, source);
        self.captures.push(CaptureObligation {
            captured,
            source,
            folded: false,
        });
    }

    pub fn captures(&self) -> &[CaptureObligation] {
        &self.captures
    }

    pub fn pending_captures(&self) -> Vec<&CaptureObligation> {
        self.captures.iter().filter(|c| !c.folded).collect()
    }

    pub fn has_capture_bound(&self, vars: &BTreeSet<InferVar>) -> bool {
        self.captures
            .iter()
            .any(|c| c.lhs_vars().iter().flatten().any(|v| vars.contains(v)))
    }

    pub fn remove_captures_mentioning(&mut self, vars: &BTreeSet<InferVar>) {
        self.captures.retain(|c| !c.mentions_any(vars));
    }

    pub fn mark_throws(&mut self, var: InferVar) {
        self.throws.insert(var);
    }

    pub fn in_throws(&self, var: InferVar) -> bool {
        self.throws.contains(&var)
    }

    pub fn flat(&self) -> &[TypeBound] {
        &self.flat
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    pub fn contains(&self, bound: &TypeBound) -> bool {
        self.vars.get(&bound.left).map_or(false, |s| match bound.relation {
            Relation::Supertype => s.lower.contains(bound),
            Relation::Same => s.same.contains(bound),
            Relation::Subtype => s.upper.contains(bound),
        })
    }

    pub fn sets(&self, var: InferVar) -> Option<&ThreeSets> {
        self.vars.get(&var)
    }

    pub fn variables(&self) -> BTreeSet<InferVar> {
        self.vars.keys().copied().collect()
    }

    pub fn bounds_of(&self, var: InferVar) -> Vec<&TypeBound> {
        self.vars.get(&var).map(|s| s.iter().collect()).unwrap_or_default()
    }

    pub fn is_instantiated(&self, var: InferVar) -> bool {
        self.instantiation(var).is_some()
    }

    pub fn instantiation(&self, var: InferVar) -> Option<&Ty> {
        self.vars.get(&var).and_then(|s| s.instantiation.as_ref())
    }

    pub fn num_uninstantiated(&self, vars: &BTreeSet<InferVar>) -> usize {
        vars.iter().filter(|v| !self.is_instantiated(**v)).count()
    }

    pub fn lower_bounds(&self, var: InferVar) -> Vec<&Ty> {
        self.vars
            .get(&var)
            .map(|s| s.lower.iter().map(|b| &b.right).collect())
            .unwrap_or_default()
    }

    pub fn upper_bounds(&self, var: InferVar) -> Vec<&Ty> {
        self.vars
            .get(&var)
            .map(|s| s.upper.iter().map(|b| &b.right).collect())
            .unwrap_or_default()
    }

    pub fn same_bounds(&self, var: InferVar) -> Vec<&Ty> {
        self.vars
            .get(&var)
            .map(|s| s.same.iter().map(|b| &b.right).collect())
            .unwrap_or_default()
    }

    pub fn proper_lower_bounds(&self, var: InferVar) -> Vec<Ty> {
        self.lower_bounds(var)
            .into_iter()
            .filter(|t| t.is_proper())
            .cloned()
            .collect()
    }

    pub fn proper_upper_bounds(&self, var: InferVar) -> Vec<Ty> {
        self.upper_bounds(var)
            .into_iter()
            .filter(|t| t.is_proper())
            .cloned()
            .collect()
    }

    /// Every proper upper bound is `Exception`, `Throwable` or `Object`.
    pub fn has_only_trivial_exception_bounds(&self, var: InferVar, oracle: &dyn TypeOracle) -> bool {
        let trivial = [oracle.exception(), oracle.throwable(), oracle.object()];
        self.upper_bounds(var)
            .into_iter()
            .filter(|t| t.is_proper())
            .all(|t| trivial.contains(t))
    }

    /// Instantiations of the given variables as a substitution.
    pub fn solution_subst(&self, vars: &BTreeSet<InferVar>) -> Subst {
        vars.iter()
            .filter_map(|v| self.instantiation(*v).map(|t| (*v, t.clone())))
            .collect()
    }

    fn has_dependency(&self, alpha: InferVar, beta: InferVar) -> bool {
        self.vars
            .get(&alpha)
            .map_or(false, |s| s.iter().any(|b| b.right.mentions(beta)))
    }

    /// Whether resolving `alpha` needs `beta` resolved first.
    pub fn depends_on(&self, alpha: InferVar, beta: InferVar) -> bool {
        if alpha == beta {
            return true;
        }
        let mut beta_in_capture_lhs = false;
        for capture in self.captures.iter() {
            let lhs = capture.lhs_vars();
            for (i, v) in lhs.iter().enumerate() {
                if *v == Some(alpha) {
                    if capture.source.mentions(beta) {
                        return true;
                    }
                    if lhs.iter().enumerate().any(|(j, w)| j != i && *w == Some(beta)) {
                        return true;
                    }
                } else if *v == Some(beta) {
                    beta_in_capture_lhs = true;
                }
            }
        }
        if beta_in_capture_lhs {
            self.has_dependency(beta, alpha)
        } else {
            self.has_dependency(alpha, beta)
        }
    }

    /// Directed dependency graph over `vars`: an edge `α -> β` means `α`
    /// depends on the resolution of `β`.
    pub fn dependency_graph(&self, vars: &BTreeSet<InferVar>) -> DiGraphMap<InferVar, ()> {
        let mut graph = DiGraphMap::new();
        for v in vars.iter() {
            graph.add_node(*v);
        }
        for a in vars.iter() {
            for b in vars.iter() {
                if a != b && self.depends_on(*a, *b) {
                    graph.add_edge(*a, *b, ());
                }
            }
        }
        graph
    }

    /// `var` and every variable of `among` it transitively depends on.
    pub fn dependency_closure(
        &self,
        graph: &DiGraphMap<InferVar, ()>,
        var: InferVar,
    ) -> BTreeSet<InferVar> {
        let mut closure = BTreeSet::new();
        if !graph.contains_node(var) {
            closure.insert(var);
            return closure;
        }
        let mut dfs = Dfs::new(graph, var);
        while let Some(v) = dfs.next(graph) {
            closure.insert(v);
        }
        closure
    }

    /// Copy of this bound set with `subst` applied to every right side.
    pub fn substituted(&self, subst: &Subst) -> BoundSet {
        let mut out = BoundSet::new();
        for b in self.flat.iter() {
            out.add_bound(b.clone().apply_subst(subst));
        }
        for c in self.captures.iter() {
            out.captures.push(CaptureObligation {
                captured: c.captured.clone().apply_subst(subst),
                source: c.source.clone().apply_subst(subst),
                folded: c.folded,
            });
        }
        out.throws = self.throws.clone();
        out
    }
}

impl fmt::Display for BoundSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        let mut body = String::new();
        for (var, sets) in self.vars.iter() {
            for b in sets.iter() {
                body.push_str(&format!("{}\n", b));
            }
            if let Some(inst) = &sets.instantiation {
                body.push_str(&format!("{} := {}\n", var, inst));
            }
        }
        for c in self.captures.iter() {
            body.push_str(&format!("{}\n", c));
        }
        if !self.throws.is_empty() {
            body.push_str(&format!(
                "throws {}\n",
                crate::utils::join(self.throws.iter(), ", ")
            ));
        }
        if !body.is_empty() {
            writeln!(f, "{}", indent(body, 1))?;
        }
        write!(f, "}}")
    }
}
