use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
    mem,
    rc::Rc,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{InferError, InferResult},
    expr::{Expr, Invocation, MethodSig},
    infer::{
        cycle::{self, VarIo},
        input_variables, needs_unchecked_conversion, non_wildcard_parameterization, BoundSet,
        ConstraintFormula, ExprRelation, NullHints, Reduction, Relation, TypeBound, VarFactory,
    },
    options::InferenceOptions,
    span::Span,
    typing::{
        oracle::{InvocationMode, TypeOracle},
        subst::{ApplySubst, Subst},
        ty::{InferVar, Ty, TyParam, WildcardTy},
    },
    utils::{indent, join},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InferenceState {
    NotStarted,
    ApplicabilityInferred,
    TypeInferred,
    BindingsPropagated,
}

impl fmt::Display for InferenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceState::NotStarted => write!(f, "not started"),
            InferenceState::ApplicabilityInferred => write!(f, "applicability inferred"),
            InferenceState::TypeInferred => write!(f, "type inferred"),
            InferenceState::BindingsPropagated => write!(f, "bindings propagated"),
        }
    }
}

/// A variable's solution together with the nullness hints it picked up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instantiation {
    pub ty: Ty,
    pub hints: NullHints,
}

impl fmt::Display for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.hints, self.ty)
    }
}

/// Inferred type arguments per invocation site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindings(BTreeMap<Span, Vec<Ty>>);

impl Bindings {
    pub fn new() -> Bindings {
        Bindings(BTreeMap::new())
    }

    pub fn insert(&mut self, site: Span, tys: Vec<Ty>) {
        self.0.insert(site, tys);
    }

    pub fn get(&self, site: Span) -> Option<&[Ty]> {
        self.0.get(&site).map(|tys| tys.as_slice())
    }

    pub fn sites(&self) -> impl Iterator<Item = &Span> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Span, &Vec<Ty>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (site, tys) in self.0.iter() {
            writeln!(f, "{}: <{}>", site, join(tys, ", "))?;
        }
        Ok(())
    }
}

/// The outer episode's own view, parked while a nested generic
/// invocation is being worked on inside the same bound set.
#[derive(Debug)]
struct SuspendedEpisode {
    site: Span,
    method: Rc<MethodSig>,
    args: Vec<Expr>,
    type_args: Option<Vec<Ty>>,
    theta: Subst<TyParam>,
    site_vars: Vec<InferVar>,
    variables: Vec<InferVar>,
    mode: InvocationMode,
    unchecked: bool,
}

/// One inference episode: a single generic method or constructor
/// invocation, from applicability through binding propagation. Nested
/// poly invocations get their own contexts that share the variable
/// factory, so their variables stay distinct.
pub struct InferenceContext<'o> {
    pub(crate) oracle: &'o dyn TypeOracle,
    pub(crate) options: InferenceOptions,
    pub(crate) vars: Rc<RefCell<VarFactory>>,
    pub(crate) site: Span,
    pub(crate) method: Rc<MethodSig>,
    pub(crate) args: Vec<Expr>,
    type_args: Option<Vec<Ty>>,
    pub(crate) theta: Subst<TyParam>,
    site_vars: Vec<InferVar>,
    /// Variables this episode is responsible for resolving.
    pub(crate) variables: Vec<InferVar>,
    pub(crate) bounds: BoundSet,
    b2: Option<(BoundSet, Vec<InferVar>)>,
    pub(crate) mode: InvocationMode,
    state: InferenceState,
    pub(crate) unchecked: bool,
    suspended: Vec<SuspendedEpisode>,
    inner: BTreeMap<Span, InferenceContext<'o>>,
    solutions: BTreeMap<Option<Ty>, (BoundSet, Vec<InferVar>)>,
}

impl<'o> fmt::Debug for InferenceContext<'o> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceContext")
            .field("site", &self.site)
            .field("method", &self.method.to_string())
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("variables", &self.variables)
            .finish()
    }
}

impl<'o> fmt::Display for InferenceContext<'o> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} @ {} ({}, {})", self.method, self.site, self.state, self.mode)?;
        write!(f, "{}", indent(self.bounds.to_string(), 1))
    }
}

impl<'o> InferenceContext<'o> {
    pub fn new(oracle: &'o dyn TypeOracle, invocation: &Invocation, options: InferenceOptions) -> Self {
        Self::with_factory(
            oracle,
            invocation.span,
            invocation.method.clone(),
            invocation.args.clone(),
            invocation.type_args.clone(),
            options,
            Rc::new(RefCell::new(VarFactory::new())),
        )
    }

    /// Episode for calling `method` on `args` at `site`.
    pub fn for_call(
        oracle: &'o dyn TypeOracle,
        site: Span,
        method: MethodSig,
        args: Vec<Expr>,
        options: InferenceOptions,
    ) -> Self {
        Self::with_factory(
            oracle,
            site,
            Rc::new(method),
            args,
            None,
            options,
            Rc::new(RefCell::new(VarFactory::new())),
        )
    }

    fn with_factory(
        oracle: &'o dyn TypeOracle,
        site: Span,
        method: Rc<MethodSig>,
        args: Vec<Expr>,
        type_args: Option<Vec<Ty>>,
        options: InferenceOptions,
        vars: Rc<RefCell<VarFactory>>,
    ) -> Self {
        InferenceContext {
            oracle,
            options,
            vars,
            site,
            method,
            args,
            type_args,
            theta: Subst::new(),
            site_vars: vec![],
            variables: vec![],
            bounds: BoundSet::new(),
            b2: None,
            mode: InvocationMode::Strict,
            state: InferenceState::NotStarted,
            unchecked: false,
            suspended: vec![],
            inner: BTreeMap::new(),
            solutions: BTreeMap::new(),
        }
    }

    fn nested(&self, invocation: &Invocation) -> Self {
        Self::with_factory(
            self.oracle,
            invocation.span,
            invocation.method.clone(),
            invocation.args.clone(),
            invocation.type_args.clone(),
            self.options.clone(),
            self.vars.clone(),
        )
    }

    pub fn state(&self) -> InferenceState {
        self.state
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    pub fn site(&self) -> Span {
        self.site
    }

    pub fn method(&self) -> &MethodSig {
        &self.method
    }

    pub fn bounds(&self) -> &BoundSet {
        &self.bounds
    }

    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    /// Applicability was only shown by unchecked conversion.
    pub fn is_unchecked(&self) -> bool {
        self.unchecked
    }

    /// The variables standing for this invocation's own type parameters.
    pub fn site_variables(&self) -> &[InferVar] {
        &self.site_vars
    }

    pub fn variables(&self) -> &[InferVar] {
        &self.variables
    }

    /// How many variables the shared factory has handed out so far.
    pub fn variable_count(&self) -> usize {
        self.vars.borrow().len()
    }

    pub fn variable_name(&self, var: InferVar) -> Option<String> {
        self.vars.borrow().get(var).map(|v| v.to_string())
    }

    fn check_not_propagated(&self) -> InferResult<()> {
        if self.state == InferenceState::BindingsPropagated {
            return Err(InferError::aborted(format!(
                "inference for `{}` has already propagated its bindings",
                self.method.name
            ))
            .at(self.site));
        }
        Ok(())
    }

    /// Substitution of every instantiated variable.
    pub(crate) fn current_subst(&self) -> Subst {
        self.bounds.solution_subst(&self.bounds.variables())
    }

    /// Tries strict, loose, then variable-arity invocation and keeps the
    /// first mode that works.
    pub fn infer_applicability(&mut self) -> InferResult<InvocationMode> {
        self.check_not_propagated()?;
        if self.state >= InferenceState::ApplicabilityInferred {
            return Ok(self.mode);
        }

        let mut modes = vec![InvocationMode::Strict, InvocationMode::Loose];
        if self.method.varargs {
            modes.push(InvocationMode::Varargs);
        }

        let mut last = None;
        for mode in modes {
            match self.infer_applicability_in(mode) {
                Ok(()) => return Ok(mode),
                Err(e) if e.is_recoverable() => {
                    log::debug!(
                        "[applicability] {} is not applicable by {} invocation: {}",
                        self.method,
                        mode,
                        e.message()
                    );
                    last = Some(e);
                }
                Err(e) => {
                    log::warn!("[applicability] {}: {}", self.method, e.message());
                    return Err(e.at(self.site));
                }
            }
        }

        let err = last.unwrap_or_else(|| InferError::not_applicable(self.method.to_string()));
        Err(err.at(self.site))
    }

    /// Applicability inference in one invocation mode. Each attempt starts
    /// from an empty bound set.
    pub fn infer_applicability_in(&mut self, mode: InvocationMode) -> InferResult<()> {
        self.check_not_propagated()?;
        if mode == InvocationMode::Varargs && !self.method.varargs {
            return Err(InferError::not_applicable(format!(
                "{} by variable-arity invocation",
                self.method
            )));
        }
        let formals = unless!(self.method.formals(self.args.len(), mode), else {
            return Err(InferError::not_applicable(format!(
                "{} for {} arguments",
                self.method,
                self.args.len()
            )))
        });

        self.mode = mode;
        self.unchecked = false;
        self.bounds = BoundSet::new();
        self.b2 = None;
        self.solutions.clear();
        self.state = InferenceState::NotStarted;

        self.fresh_variables();
        self.add_initial_bounds();

        let explicit = self.type_args.is_some();
        if mode == InvocationMode::Strict {
            self.strict_precheck(&formals, explicit)?;
        }
        if let Some(type_args) = self.type_args.clone() {
            if type_args.len() != self.site_vars.len() {
                return Err(InferError::not_applicable(format!(
                    "{} with {} type arguments",
                    self.method,
                    type_args.len()
                )));
            }
            for (var, arg) in self.site_vars.clone().into_iter().zip(type_args) {
                self.bounds.add_bound(TypeBound::new(var, Relation::Same, arg));
            }
        }

        let mut initial = vec![];
        for (arg, formal) in self.args.iter().zip(formals.iter()) {
            let target = formal.clone().apply_subst(&self.theta);
            if arg.is_pertinent_to_applicability(formal, &self.method, explicit) {
                initial.push(ConstraintFormula::expression(arg.clone(), target));
            } else if !self.method.is_own_type_param(formal) {
                initial.push(ConstraintFormula::potentially_compatible(arg.clone(), target));
            }
        }
        log::debug!(
            "[applicability] {} by {} invocation: {} initial constraints",
            self.method,
            mode,
            initial.len()
        );

        self.reduce_and_incorporate(initial.clone())?;
        self.b2 = Some((self.bounds.clone(), self.variables.clone()));

        let all = self.variables.iter().copied().collect();
        self.resolve(&all)?;
        self.check_final_constraints(&initial)?;

        self.state = InferenceState::ApplicabilityInferred;
        log::debug!("[applicability] {} is applicable by {} invocation", self.method, mode);
        Ok(())
    }

    fn fresh_variables(&mut self) {
        let site_vars = {
            let mut vf = self.vars.borrow_mut();
            self.method
                .type_params
                .iter()
                .enumerate()
                .map(|(i, decl)| vf.intern(decl.param.clone(), self.site, i, decl.hints))
                .collect::<Vec<_>>()
        };
        self.theta = Subst::zip(
            self.method.type_params.iter().map(|d| d.param.clone()),
            site_vars.iter().map(|v| Ty::Infer(*v)),
        );
        for v in site_vars.iter() {
            self.bounds.declare(*v);
        }
        self.variables = site_vars.clone();
        self.site_vars = site_vars;
    }

    /// `α <: Bθ` for every declared bound, `α <: Object` when there is
    /// none, and `throws α` for type parameters in the throws clause.
    fn add_initial_bounds(&mut self) {
        let object = self.oracle.object();
        for (decl, var) in self.method.type_params.iter().zip(self.site_vars.iter()) {
            let declared = decl
                .bounds
                .iter()
                .filter(|b| **b != object)
                .collect::<Vec<_>>();
            if declared.is_empty() {
                self.bounds
                    .add_bound(TypeBound::new(*var, Relation::Subtype, object.clone()));
            }
            for b in declared {
                let b = b.clone().apply_subst(&self.theta);
                self.bounds.add_bound(TypeBound::new(*var, Relation::Subtype, b));
            }
            if self.method.thrown.contains(&decl.ty()) {
                self.bounds.mark_throws(*var);
            }
        }
    }

    /// Strict invocation allows neither boxing nor unboxing.
    fn strict_precheck(&self, formals: &[Ty], explicit: bool) -> InferResult<()> {
        for (arg, formal) in self.args.iter().zip(formals.iter()) {
            if !arg.is_pertinent_to_applicability(formal, &self.method, explicit) {
                continue;
            }
            let arg_primitive = matches!(arg, Expr::Standalone(_, ty) if ty.is_primitive());
            if arg_primitive != formal.is_primitive() {
                return Err(InferError::not_applicable(format!(
                    "{} by strict invocation",
                    self.method
                )));
            }
        }
        Ok(())
    }

    /// Re-checks the argument constraints against the instantiations just
    /// computed.
    fn check_final_constraints(&mut self, initial: &[ConstraintFormula]) -> InferResult<()> {
        let subst = self.current_subst();
        for formula in initial {
            let formula = formula.clone().apply_subst(&subst);
            let ok = match &formula {
                ConstraintFormula::Expression(c)
                    if c.relation == ExprRelation::Compatible && !c.expr.is_poly() && c.target.is_proper() =>
                {
                    match c.expr.resolved_type() {
                        Some(ty) => self.oracle.is_compatible(&ty, &c.target, self.mode),
                        None => true,
                    }
                }
                ConstraintFormula::Expression(c) if c.relation == ExprRelation::PotentiallyCompatible => {
                    !self.potentially_compatible(&c.expr, &c.target).is_false()
                }
                _ => true,
            };
            if !ok {
                log::debug!("[applicability] {} fails after resolution", formula);
                return Err(InferError::contradiction(&formula).at(self.site));
            }
        }
        Ok(())
    }

    /// Reduces `formulas` into the bound set and incorporates the result.
    pub fn reduce_and_incorporate(&mut self, formulas: Vec<ConstraintFormula>) -> InferResult<()> {
        let mut work = VecDeque::from(formulas);
        while let Some(formula) = work.pop_front() {
            match self.reduce(&formula)? {
                Reduction::True => {}
                Reduction::False(reason) => {
                    log::debug!("[reduce] {} is false: {}", formula, reason);
                    let span = formula.expr().map_or(self.site, |e| e.span());
                    return Err(InferError::contradiction(&formula).at(span));
                }
                Reduction::Formula(f) => work.push_back(f),
                Reduction::Formulas(fs) => work.extend(fs),
                Reduction::Bound(b) => {
                    self.bounds.add_bound(b);
                }
            }
        }
        self.bounds.incorporate(self.oracle, &self.options)?;
        Ok(())
    }

    /// Resolves `vars` and whatever they depend on.
    pub fn resolve(&mut self, vars: &BTreeSet<InferVar>) -> InferResult<()> {
        let factory = self.vars.borrow();
        crate::infer::resolve::resolve(&mut self.bounds, vars, self.oracle, &self.options, &factory)
    }

    /// Invocation type inference against `target`, or without a target
    /// type when the invocation is not in an assignment or invocation
    /// context. Returns the instantiations of the invocation's own type
    /// parameters. Results are cached per target type.
    pub fn infer_invocation_type(&mut self, target: Option<&Ty>) -> InferResult<Vec<Ty>> {
        self.check_not_propagated()?;
        if self.state == InferenceState::NotStarted {
            self.infer_applicability()?;
        }

        let key = target.cloned();
        if let Some((bounds, vars)) = self.solutions.get(&key) {
            log::trace!("[invocation] reusing solution for {}", self.method.name);
            self.bounds = bounds.clone();
            self.variables = vars.clone();
            self.state = InferenceState::TypeInferred;
            return self.site_solutions();
        }

        let (b2, vars) = self.b2.clone().ok_or_else(|| {
            InferError::aborted(format!("no applicability bounds for `{}`", self.method.name))
        })?;
        self.bounds = b2;
        self.variables = vars;

        if let Err(e) = self.invocation_type_from_b2(target) {
            log::debug!(
                "[invocation] {} against {}: {}",
                self.method,
                target.map_or_else(|| str!("no target"), |t| t.to_string()),
                e.message()
            );
            return Err(e.at(self.site));
        }

        self.solutions
            .insert(key, (self.bounds.clone(), self.variables.clone()));
        self.state = InferenceState::TypeInferred;
        self.site_solutions()
    }

    fn invocation_type_from_b2(&mut self, target: Option<&Ty>) -> InferResult<()> {
        if let Some(t) = target {
            if self.method.ret == Ty::Void || self.method.return_mentions_type_params() {
                self.compute_b3(t)?;
            }
        }

        let formals = unless!(self.method.formals(self.args.len(), self.mode), else {
            return Err(InferError::not_applicable(self.method.to_string()))
        });
        let explicit = self.type_args.is_some();
        let args = self.args.clone();
        let method = self.method.clone();
        let theta = self.theta.clone();

        let early = if self.options.early_functional_constraints {
            self.reduce_early_functional(&args, &formals, explicit)?
        } else {
            BTreeSet::new()
        };

        let mut c = vec![];
        for (arg, formal) in args.iter().zip(formals.iter()) {
            let pertinent = arg.is_pertinent_to_applicability(formal, &method, explicit);
            let target = formal.clone().apply_subst(&theta);
            self.collect_c(arg, target, pertinent || early.contains(&arg.span()), &mut c)?;
        }
        self.solve_c(c)?;

        let all = self.variables.iter().copied().collect();
        self.resolve(&all)
    }

    /// Reduces functional arguments that have no input variables before
    /// the rest of the constraint set is assembled.
    fn reduce_early_functional(
        &mut self,
        args: &[Expr],
        formals: &[Ty],
        explicit: bool,
    ) -> InferResult<BTreeSet<Span>> {
        let mut done = BTreeSet::new();
        for (arg, formal) in args.iter().zip(formals.iter()) {
            if !arg.is_functional() || arg.is_pertinent_to_applicability(formal, &self.method, explicit) {
                continue;
            }
            let formula =
                ConstraintFormula::expression(arg.clone(), formal.clone().apply_subst(&self.theta));
            if input_variables(&formula, self.oracle).is_empty() {
                log::trace!("[invocation] early {}", formula);
                self.reduce_and_incorporate(vec![formula])?;
                done.insert(arg.span());
            }
        }
        Ok(done)
    }

    /// The constraint set `C` for one argument: the compatibility
    /// constraint unless it was already reduced, plus what its lambda
    /// bodies, method references and nested generic invocations add.
    fn collect_c(
        &mut self,
        arg: &Expr,
        target: Ty,
        reduced: bool,
        out: &mut Vec<ConstraintFormula>,
    ) -> InferResult<()> {
        if !reduced {
            out.push(ConstraintFormula::expression(arg.clone(), target.clone()));
        }
        self.collect_derived(arg, &target, out)
    }

    fn collect_derived(
        &mut self,
        expr: &Expr,
        target: &Ty,
        out: &mut Vec<ConstraintFormula>,
    ) -> InferResult<()> {
        match expr {
            Expr::Lambda(lambda) => {
                out.push(ConstraintFormula::exception(expr.clone(), target.clone()));
                let ft = non_wildcard_parameterization(target, self.oracle)
                    .and_then(|g| self.oracle.function_type(&g));
                if let Some(ft) = ft {
                    if !ft.is_void() {
                        let params = match lambda.params.explicit() {
                            Some(ps) => ps.to_vec(),
                            None => ft.params.clone().apply_subst(&self.current_subst()),
                        };
                        for result in lambda.body.result_expressions(&params) {
                            self.collect_derived(&result, &ft.ret, out)?;
                        }
                    }
                }
            }
            Expr::MethodRef(_) => {
                out.push(ConstraintFormula::exception(expr.clone(), target.clone()));
            }
            Expr::Conditional(cond) => {
                self.collect_derived(&cond.then, target, out)?;
                self.collect_derived(&cond.otherwise, target, out)?;
            }
            Expr::Invocation(inv) if inv.needs_inference() => {
                self.enter_poly_invocation(inv)?;
                let result = self.collect_inner(out);
                self.resume_suspended();
                result?;
            }
            _ => {}
        }
        Ok(())
    }

    fn collect_inner(&mut self, out: &mut Vec<ConstraintFormula>) -> InferResult<()> {
        let formals = unless!(self.method.formals(self.args.len(), self.mode), else {
            return Err(InferError::not_applicable(self.method.to_string()).at(self.site))
        });
        let args = self.args.clone();
        let method = self.method.clone();
        let theta = self.theta.clone();
        for (arg, formal) in args.iter().zip(formals.iter()) {
            let pertinent = arg.is_pertinent_to_applicability(formal, &method, false);
            self.collect_c(arg, formal.clone().apply_subst(&theta), pertinent, out)?;
        }
        Ok(())
    }

    /// Solves `C` a batch at a time: pick constraints whose input
    /// variables nothing else still produces, resolve those inputs,
    /// then reduce the batch.
    fn solve_c(&mut self, mut c: Vec<ConstraintFormula>) -> InferResult<()> {
        while !c.is_empty() {
            let io = c
                .iter()
                .map(|f| VarIo::of(f, self.oracle))
                .collect::<Vec<_>>();
            let picked = cycle::select(&c, &io, &self.bounds);

            let inputs = picked
                .iter()
                .flat_map(|i| io[*i].inputs.iter().copied())
                .filter(|v| !self.bounds.is_instantiated(*v))
                .collect::<BTreeSet<_>>();
            if !inputs.is_empty() {
                log::debug!("[invocation] resolving inputs {{{}}}", join(&inputs, ", "));
                self.resolve(&inputs)?;
            }

            let subst = self.current_subst();
            let mut selected = vec![];
            for i in picked.into_iter().rev() {
                selected.push(c.remove(i).apply_subst(&subst));
            }
            selected.reverse();
            log::trace!("[invocation] reducing {}", join(&selected, ", "));
            self.reduce_and_incorporate(selected)?;
        }
        Ok(())
    }

    /// Adds the return-compatibility constraint of this invocation against
    /// `target` to the bound set.
    pub(crate) fn compute_b3(&mut self, target: &Ty) -> InferResult<()> {
        let ret = self.method.ret.clone();
        if ret == Ty::Void {
            let err = InferError::aborted(format!(
                "`{}` returns void where a value of type `{}` is expected",
                self.method.name, target
            ))
            .at(self.site);
            log::warn!("[invocation] {}", err.message());
            return Err(err);
        }

        let r_theta = ret.clone().apply_subst(&self.theta);
        let formula = if self.unchecked {
            ConstraintFormula::compatible(self.oracle.erasure(&ret), target.clone())
        } else if r_theta.is_wildcard_parameterized() {
            self.capture_return(&r_theta, target)
        } else if let Some(alpha) = r_theta.leaf().as_infer() {
            if self.needs_captured_instantiation(alpha, target) {
                let mut single = BTreeSet::new();
                single.insert(alpha);
                self.resolve(&single)?;
                let inst = self
                    .bounds
                    .instantiation(alpha)
                    .cloned()
                    .ok_or_else(|| InferError::unresolved(alpha).at(self.site))?;
                let captured = self.oracle.capture(&inst).with_dims(r_theta.dims());
                ConstraintFormula::compatible(captured, target.clone())
            } else {
                ConstraintFormula::compatible(r_theta, target.clone())
            }
        } else {
            ConstraintFormula::compatible(r_theta, target.clone())
        };

        log::debug!("[invocation] return constraint {}", formula);
        self.reduce_and_incorporate(vec![formula])
    }

    /// `G<β1..βn> = capture(G<A1..An>)` for a wildcard-parameterized
    /// return type, returning `‹G<β1..βn> → T›`.
    fn capture_return(&mut self, r_theta: &Ty, target: &Ty) -> ConstraintFormula {
        let class = match r_theta {
            Ty::Class(c) => c.clone(),
            other => return ConstraintFormula::compatible(other.clone(), target.clone()),
        };
        let decls = self.oracle.type_params(&class.name).unwrap_or_default();
        let betas = {
            let mut vf = self.vars.borrow_mut();
            class
                .args
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let param = decls.get(i).map_or_else(
                        || TyParam::new(class.name.as_str(), format!("CAP#{}", i)),
                        |d| d.param.clone(),
                    );
                    vf.intern(param, self.site, i, NullHints::empty())
                })
                .collect::<Vec<_>>()
        };

        let captured = Ty::class(
            class.name.as_str(),
            betas.iter().map(|b| Ty::Infer(*b)).collect(),
        );
        for beta in betas.iter() {
            self.bounds.declare(*beta);
            if !self.variables.contains(beta) {
                self.variables.push(*beta);
            }
        }
        self.bounds.add_capture(captured.clone(), r_theta.clone());

        if self.options.eager_wildcard_bounds {
            for (arg, beta) in class.args.iter().zip(betas.iter()) {
                let bound = match arg {
                    Ty::Wildcard(WildcardTy::Unbounded) => continue,
                    Ty::Wildcard(WildcardTy::Extends(u)) => {
                        TypeBound::new(*beta, Relation::Subtype, (**u).clone())
                    }
                    Ty::Wildcard(WildcardTy::Super(l)) => {
                        TypeBound::new(*beta, Relation::Supertype, (**l).clone())
                    }
                    t => TypeBound::new(*beta, Relation::Same, t.clone()),
                };
                self.bounds.add_bound(bound);
            }
        }

        ConstraintFormula::compatible(captured, target.clone())
    }

    /// Whether `α`, the return type's variable, has to be resolved and
    /// captured before the return constraint is reduced.
    fn needs_captured_instantiation(&self, alpha: InferVar, target: &Ty) -> bool {
        let bounds = &self.bounds;
        let mut eq_or_lower = bounds.same_bounds(alpha);
        eq_or_lower.extend(bounds.lower_bounds(alpha));
        let lower = bounds.lower_bounds(alpha);

        if target.is_reference() && target.as_infer().is_none() && !target.is_wildcard_parameterized() {
            if eq_or_lower.iter().any(|t| t.is_wildcard_parameterized()) {
                return true;
            }
        }

        for (i, s1) in lower.iter().enumerate() {
            for s2 in lower.iter().skip(i + 1) {
                if self.distinct_parameterizations(s1, s2) {
                    return true;
                }
            }
        }

        if target.is_parameterized()
            && eq_or_lower
                .iter()
                .any(|s| needs_unchecked_conversion(s, target, self.oracle))
        {
            return true;
        }

        if target.is_primitive() {
            let mut all = eq_or_lower;
            all.extend(bounds.upper_bounds(alpha));
            if all.iter().any(|t| self.oracle.unboxed(t).is_some()) {
                return true;
            }
        }
        false
    }

    fn distinct_parameterizations(&self, s1: &Ty, s2: &Ty) -> bool {
        let sup1 = self.oracle.supertypes(s1);
        let sup2 = self.oracle.supertypes(s2);
        sup1.iter().filter(|t| t.is_parameterized()).any(|a| {
            sup2.iter()
                .filter(|t| t.is_parameterized())
                .any(|b| a.class_name() == b.class_name() && a != b)
        })
    }

    /// Parks this episode's view and switches to the nested invocation
    /// `inv`, merging its applicability bounds into the shared bound set.
    pub(crate) fn enter_poly_invocation(&mut self, inv: &Invocation) -> InferResult<()> {
        self.ensure_inner(inv)?;
        let (method, theta, site_vars, mode, unchecked, b2) = {
            let inner = &self.inner[&inv.span];
            (
                inner.method.clone(),
                inner.theta.clone(),
                inner.site_vars.clone(),
                inner.mode,
                inner.unchecked,
                inner.b2.clone(),
            )
        };

        log::debug!("[invocation] suspending {} for {}", self.site, inv.span);
        let variables = match &b2 {
            Some((bounds, vars)) => {
                self.bounds.merge(bounds);
                vars.clone()
            }
            None => site_vars.clone(),
        };
        self.suspended.push(SuspendedEpisode {
            site: mem::replace(&mut self.site, inv.span),
            method: mem::replace(&mut self.method, method),
            args: mem::replace(&mut self.args, inv.args.clone()),
            type_args: mem::replace(&mut self.type_args, inv.type_args.clone()),
            theta: mem::replace(&mut self.theta, theta),
            site_vars: mem::replace(&mut self.site_vars, site_vars),
            variables: mem::replace(&mut self.variables, variables),
            mode: mem::replace(&mut self.mode, mode),
            unchecked: mem::replace(&mut self.unchecked, unchecked),
        });
        Ok(())
    }

    /// Restores the view parked by the matching `enter_poly_invocation`.
    /// The nested variables stay behind as this episode's responsibility.
    pub(crate) fn resume_suspended(&mut self) {
        let outer = match self.suspended.pop() {
            Some(s) => s,
            None => panic!("no suspended inference episode to resume"),
        };
        log::debug!("[invocation] resuming {} after {}", outer.site, self.site);

        let nested = mem::replace(&mut self.variables, outer.variables);
        for v in nested {
            if !self.variables.contains(&v) {
                self.variables.push(v);
            }
        }
        self.site = outer.site;
        self.method = outer.method;
        self.args = outer.args;
        self.type_args = outer.type_args;
        self.theta = outer.theta;
        self.site_vars = outer.site_vars;
        self.mode = outer.mode;
        self.unchecked = outer.unchecked;
    }

    /// Runs applicability inference for a nested invocation once and
    /// keeps the context around for later phases.
    fn ensure_inner(&mut self, inv: &Invocation) -> InferResult<()> {
        if self.inner.contains_key(&inv.span) {
            return Ok(());
        }
        let mut ctx = self.nested(inv);
        ctx.infer_applicability().map_err(|e| e.at(inv.span))?;
        self.inner.insert(inv.span, ctx);
        Ok(())
    }

    fn site_solutions(&self) -> InferResult<Vec<Ty>> {
        self.site_vars
            .iter()
            .map(|v| {
                self.bounds
                    .instantiation(*v)
                    .cloned()
                    .ok_or_else(|| InferError::unresolved(*v).at(self.site))
            })
            .collect()
    }

    /// Pushes the solution down to every nested generic invocation and
    /// returns the type arguments chosen at each site. No inference query
    /// is answered afterwards.
    pub fn propagate(&mut self) -> InferResult<Bindings> {
        self.check_not_propagated()?;
        if self.state != InferenceState::TypeInferred {
            self.infer_invocation_type(None)?;
        }
        let mut bindings = Bindings::new();
        self.collect_bindings(&mut bindings)?;
        self.state = InferenceState::BindingsPropagated;
        log::debug!("[propagate] {} sites from {}", bindings.len(), self.site);
        Ok(bindings)
    }

    fn collect_bindings(&mut self, bindings: &mut Bindings) -> InferResult<()> {
        bindings.insert(self.site, self.site_solutions()?);
        let formals = unless!(self.method.formals(self.args.len(), self.mode), else return Ok(()));
        let subst = self.current_subst();
        let args = self.args.clone();
        for (arg, formal) in args.iter().zip(formals.into_iter()) {
            let param_ty = formal.apply_subst(&self.theta).apply_subst(&subst);
            self.propagate_into(arg, &param_ty, bindings)?;
        }
        Ok(())
    }

    fn propagate_into(&mut self, expr: &Expr, param_ty: &Ty, bindings: &mut Bindings) -> InferResult<()> {
        match expr {
            Expr::Invocation(inv) if inv.needs_inference() => {
                self.ensure_inner(inv)?;
                let (inner_vars, inner_theta, inner_mode, inner_method) = {
                    let inner = &self.inner[&inv.span];
                    (inner.site_vars.clone(), inner.theta.clone(), inner.mode, inner.method.clone())
                };
                let known = inner_vars
                    .iter()
                    .map(|v| self.bounds.instantiation(*v).cloned())
                    .collect::<Option<Vec<_>>>();
                match known {
                    Some(tys) => {
                        log::trace!("[propagate] {} <{}>", inv.span, join(&tys, ", "));
                        bindings.insert(inv.span, tys);
                        let formals = unless!(inner_method.formals(inv.args.len(), inner_mode), else return Ok(()));
                        let subst = self.current_subst();
                        for (arg, formal) in inv.args.iter().zip(formals.into_iter()) {
                            let ty = formal.apply_subst(&inner_theta).apply_subst(&subst);
                            self.propagate_into(arg, &ty, bindings)?;
                        }
                    }
                    None => {
                        let mut inner = match self.inner.remove(&inv.span) {
                            Some(ctx) => ctx,
                            None => return Ok(()),
                        };
                        let target = if param_ty.is_proper() { Some(param_ty) } else { None };
                        let result = inner
                            .infer_invocation_type(target)
                            .and_then(|_| inner.collect_bindings(bindings));
                        self.inner.insert(inv.span, inner);
                        result?;
                    }
                }
            }
            Expr::Conditional(cond) => {
                self.propagate_into(&cond.then, param_ty, bindings)?;
                self.propagate_into(&cond.otherwise, param_ty, bindings)?;
            }
            Expr::Lambda(lambda) => {
                let ft = non_wildcard_parameterization(param_ty, self.oracle)
                    .and_then(|g| self.oracle.function_type(&g));
                if let Some(ft) = ft {
                    if !ft.is_void() {
                        let params = lambda
                            .params
                            .explicit()
                            .map_or_else(|| ft.params.clone(), |ps| ps.to_vec());
                        for result in lambda.body.result_expressions(&params) {
                            self.propagate_into(&result, &ft.ret, bindings)?;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_instantiated(&self, var: InferVar) -> bool {
        self.bounds.is_instantiated(var)
    }

    /// The solution of `var` with the nullness hints of its declaration
    /// and of the variables it was equated with.
    pub fn instantiation(&self, var: InferVar) -> Option<Instantiation> {
        let ty = self.bounds.instantiation(var)?.clone();
        let vf = self.vars.borrow();
        let declared = |v: InferVar| vf.get(v).map_or_else(NullHints::empty, |v| v.hints);
        let mut hints = declared(var);
        if let Some(sets) = self.bounds.sets(var) {
            for beta in sets.same.iter().filter_map(|b| b.right.as_infer()) {
                hints |= declared(beta);
            }
        }
        Some(Instantiation {
            ty,
            hints: hints.resolved(),
        })
    }

    /// Solutions for `params` as declared at `site`, if all are known.
    pub fn solutions(&self, params: &[TyParam], site: Span) -> Option<Vec<Ty>> {
        let vf = self.vars.borrow();
        params
            .iter()
            .map(|p| {
                vf.lookup(p, site)
                    .and_then(|v| self.bounds.instantiation(v).cloned())
            })
            .collect()
    }

    /// The erased return type, for callers that tolerate raw results when
    /// inference against `target` failed.
    pub fn fallback_return_type(&self, target: Option<&Ty>) -> Option<Ty> {
        if !self.options.tolerate_raw_supertypes {
            return None;
        }
        let raw = self.oracle.erasure(&self.method.ret);
        match target {
            Some(t) if !self.oracle.is_compatible(&raw, t, InvocationMode::Loose) => None,
            _ => Some(raw),
        }
    }
}
