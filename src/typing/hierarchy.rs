use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, VecDeque},
};

use itertools::Itertools;

use crate::typing::{
    oracle::{FunctionType, InvocationMode, TyParamDecl, TypeOracle},
    subst::{ApplySubst, Subst},
    ty::{CaptureId, ClassTy, PrimTy, Ty, TyParam, WildcardTy},
};

lazy_static! {
    static ref OBJECT: Ty = Ty::class("Object", vec![]);
    static ref THROWABLE: Ty = Ty::class("Throwable", vec![]);
    static ref EXCEPTION: Ty = Ty::class("Exception", vec![]);
    static ref RUNTIME_EXCEPTION: Ty = Ty::class("RuntimeException", vec![]);
    static ref ERROR: Ty = Ty::class("Error", vec![]);
}

/// How deep `lub` recurses into type arguments before giving up with `?`.
const LUB_DEPTH: usize = 2;

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<TyParamDecl>,
    pub supertypes: Vec<Ty>,
    pub is_interface: bool,
    pub sam: Option<FunctionType>,
}

impl ClassDecl {
    pub fn class<S: Into<String>>(name: S) -> ClassDecl {
        ClassDecl {
            name: name.into(),
            type_params: vec![],
            supertypes: vec![],
            is_interface: false,
            sam: None,
        }
    }

    pub fn interface<S: Into<String>>(name: S) -> ClassDecl {
        ClassDecl {
            is_interface: true,
            ..ClassDecl::class(name)
        }
    }

    /// Adds a type parameter named `name`, bounded by `bounds`.
    pub fn param(mut self, name: &str, bounds: Vec<Ty>) -> ClassDecl {
        let mut decl = TyParamDecl::new(self.name.as_str(), name);
        decl.bounds = bounds;
        self.type_params.push(decl);
        self
    }

    pub fn extends(mut self, sup: Ty) -> ClassDecl {
        self.supertypes.push(sup);
        self
    }

    pub fn sam(mut self, params: Vec<Ty>, ret: Ty, thrown: Vec<Ty>) -> ClassDecl {
        self.sam = Some(FunctionType { params, ret, thrown });
        self
    }

    /// `P` of this declaration as a type, for writing supertypes and SAMs.
    pub fn p(&self, name: &str) -> Ty {
        Ty::Param(TyParam::new(self.name.as_str(), name))
    }

    fn theta(&self, args: &[Ty]) -> Subst<TyParam> {
        Subst::zip(
            self.type_params.iter().map(|p| p.param.clone()),
            args.iter().cloned(),
        )
    }
}

#[derive(Clone, Debug, Default)]
struct CaptureVar {
    hint: String,
    lower: Option<Ty>,
    upper: Vec<Ty>,
}

/// A `TypeOracle` over an explicit class table.
#[derive(Debug, Default)]
pub struct ClassTable {
    classes: BTreeMap<String, ClassDecl>,
    params: BTreeMap<TyParam, Vec<Ty>>,
    /// Append-only. A `CaptureId` stays valid for as long as the table
    /// lives, including ids handed out to episodes that later failed.
    captures: RefCell<Vec<CaptureVar>>,
}

impl ClassTable {
    pub fn new() -> ClassTable {
        let mut table = ClassTable::default();
        table.declare(ClassDecl::class("Object"));
        table
    }

    pub fn with_builtins() -> ClassTable {
        let mut t = ClassTable::new();
        let object = OBJECT.clone();
        let serializable = class!("Serializable");

        t.declare(ClassDecl::interface("Serializable"));
        t.declare(ClassDecl::interface("CharSequence"));
        let cmp = ClassDecl::interface("Comparable").param("T", vec![]);
        let cmp_t = cmp.p("T");
        t.declare(cmp.sam(vec![cmp_t], Ty::Prim(PrimTy::Int), vec![]));

        t.declare(
            ClassDecl::class("String")
                .extends(object.clone())
                .extends(serializable.clone())
                .extends(class!("Comparable", class!("String")))
                .extends(class!("CharSequence")),
        );
        t.declare(
            ClassDecl::class("Number")
                .extends(object.clone())
                .extends(serializable.clone()),
        );
        for prim in PrimTy::all().iter() {
            let name = prim.box_name();
            let mut decl = ClassDecl::class(name);
            decl = match prim {
                PrimTy::Boolean | PrimTy::Char => decl.extends(object.clone()).extends(serializable.clone()),
                _ => decl.extends(class!("Number")),
            };
            t.declare(decl.extends(class!("Comparable", class!(name))));
        }

        let iterable = ClassDecl::interface("Iterable").param("T", vec![]);
        t.declare(iterable);
        let coll = ClassDecl::interface("Collection").param("E", vec![]);
        let coll_e = coll.p("E");
        t.declare(coll.extends(class!("Iterable", coll_e)));
        let list = ClassDecl::interface("List").param("E", vec![]);
        let list_e = list.p("E");
        t.declare(list.extends(class!("Collection", list_e)));
        let array_list = ClassDecl::class("ArrayList").param("E", vec![]);
        let array_list_e = array_list.p("E");
        t.declare(
            array_list
                .extends(object.clone())
                .extends(class!("List", array_list_e))
                .extends(serializable.clone()),
        );

        t.declare(ClassDecl::interface("Runnable").sam(vec![], Ty::Void, vec![]));
        let supplier = ClassDecl::interface("Supplier").param("T", vec![]);
        let supplier_t = supplier.p("T");
        t.declare(supplier.sam(vec![], supplier_t, vec![]));
        let function = ClassDecl::interface("Function")
            .param("T", vec![])
            .param("R", vec![]);
        let (fn_t, fn_r) = (function.p("T"), function.p("R"));
        t.declare(function.sam(vec![fn_t], fn_r, vec![]));
        let consumer = ClassDecl::interface("Consumer").param("T", vec![]);
        let consumer_t = consumer.p("T");
        t.declare(consumer.sam(vec![consumer_t], Ty::Void, vec![]));
        let callable = ClassDecl::interface("Callable").param("V", vec![]);
        let callable_v = callable.p("V");
        t.declare(callable.sam(vec![], callable_v, vec![EXCEPTION.clone()]));
        let comparator = ClassDecl::interface("Comparator").param("T", vec![]);
        let comparator_t = comparator.p("T");
        t.declare(comparator.sam(
            vec![comparator_t.clone(), comparator_t],
            Ty::Prim(PrimTy::Int),
            vec![],
        ));

        t.declare(
            ClassDecl::class("Throwable")
                .extends(object)
                .extends(serializable),
        );
        t.declare(ClassDecl::class("Exception").extends(THROWABLE.clone()));
        t.declare(ClassDecl::class("Error").extends(THROWABLE.clone()));
        t.declare(ClassDecl::class("RuntimeException").extends(EXCEPTION.clone()));
        t.declare(ClassDecl::class("IOException").extends(EXCEPTION.clone()));
        t.declare(ClassDecl::class("IllegalStateException").extends(RUNTIME_EXCEPTION.clone()));
        t
    }

    pub fn declare(&mut self, decl: ClassDecl) {
        for p in decl.type_params.iter() {
            self.params.insert(p.param.clone(), p.bounds.clone());
        }
        self.classes.insert(decl.name.clone(), decl);
    }

    /// Registers the bounds of a method-level type parameter so that
    /// subtyping can see through it.
    pub fn declare_param(&mut self, decl: &TyParamDecl) {
        self.params.insert(decl.param.clone(), decl.bounds.clone());
    }

    pub fn get(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    pub fn is_interface(&self, ty: &Ty) -> bool {
        ty.class_name()
            .and_then(|n| self.classes.get(n))
            .map_or(false, |d| d.is_interface)
    }

    pub fn capture_hint(&self, id: CaptureId) -> String {
        self.captures
            .borrow()
            .get(id.0 as usize)
            .map(|c| c.hint.clone())
            .unwrap_or_default()
    }

    /// Captures allocated so far. Never decreases; drop the table to
    /// reclaim them.
    pub fn capture_count(&self) -> usize {
        self.captures.borrow().len()
    }

    fn param_bounds(&self, p: &TyParam) -> Vec<Ty> {
        self.params.get(p).cloned().unwrap_or_default()
    }

    /// Replaces wildcard arguments of a parameterized type by the types a
    /// member lookup would see.
    fn ground_args(&self, c: &ClassTy) -> Vec<Ty> {
        let decl = self.classes.get(&c.name);
        c.args
            .iter()
            .enumerate()
            .map(|(i, a)| match a {
                Ty::Wildcard(WildcardTy::Unbounded) => decl
                    .and_then(|d| d.type_params.get(i))
                    .and_then(|p| p.bounds.first().cloned())
                    .filter(Ty::is_proper)
                    .filter(|b| !matches!(b, Ty::Param(_)))
                    .unwrap_or_else(|| OBJECT.clone()),
                Ty::Wildcard(WildcardTy::Extends(u)) => (**u).clone(),
                Ty::Wildcard(WildcardTy::Super(l)) => (**l).clone(),
                t => t.clone(),
            })
            .collect()
    }

    fn direct_supertypes(&self, ty: &Ty) -> Vec<Ty> {
        match ty {
            Ty::Class(c) if c.name == "Object" => vec![],
            Ty::Class(c) => {
                let decl = unless!(self.classes.get(&c.name), else return vec![OBJECT.clone()]);
                let mut sups = if !decl.type_params.is_empty() && c.args.is_empty() {
                    decl.supertypes.iter().map(|s| self.erasure(s)).collect::<Vec<_>>()
                } else {
                    let theta = decl.theta(&c.args);
                    decl.supertypes
                        .iter()
                        .map(|s| s.clone().apply_subst(&theta))
                        .collect::<Vec<_>>()
                };
                if sups.is_empty() {
                    sups.push(OBJECT.clone());
                }
                sups
            }
            Ty::Array(_) => vec![OBJECT.clone()],
            Ty::Param(p) => {
                let bounds = self.param_bounds(p);
                if bounds.is_empty() {
                    vec![OBJECT.clone()]
                } else {
                    bounds
                }
            }
            Ty::Capture(id) => {
                let (_, upper) = self.capture_bounds(*id);
                if upper.is_empty() {
                    vec![OBJECT.clone()]
                } else {
                    upper
                }
            }
            Ty::Intersection(tys) => tys.clone(),
            _ => vec![],
        }
    }

    /// Every class type among the supertypes of `ty`, breadth first,
    /// starting with `ty` itself.
    fn class_supertypes(&self, ty: &Ty) -> Vec<Ty> {
        let mut seen = BTreeSet::new();
        let mut out = vec![];
        let mut queue = VecDeque::new();
        queue.push_back(ty.clone());
        while let Some(t) = queue.pop_front() {
            if !seen.insert(t.clone()) {
                continue;
            }
            if let Ty::Class(_) = t {
                out.push(t.clone());
            }
            queue.extend(self.direct_supertypes(&t));
        }
        out
    }

    fn contains(&self, t_arg: &Ty, s_arg: &Ty) -> bool {
        match t_arg {
            Ty::Wildcard(WildcardTy::Unbounded) => true,
            Ty::Wildcard(WildcardTy::Extends(u)) => match s_arg {
                Ty::Wildcard(WildcardTy::Extends(s)) => self.is_subtype(s, u),
                Ty::Wildcard(_) => **u == *OBJECT,
                s => self.is_subtype(s, u),
            },
            Ty::Wildcard(WildcardTy::Super(l)) => match s_arg {
                Ty::Wildcard(WildcardTy::Super(s)) => self.is_subtype(l, s),
                Ty::Wildcard(_) => false,
                s => self.is_subtype(l, s),
            },
            t => !s_arg.is_wildcard() && self.is_same(s_arg, t),
        }
    }

    fn unchecked_convertible(&self, from: &Ty, to: &Ty) -> bool {
        match to {
            Ty::Class(c) if !c.args.is_empty() => self
                .as_super(from, &c.name)
                .map_or(false, |s| matches!(s, Ty::Class(sc) if sc.args.is_empty())),
            _ => false,
        }
    }

    fn erased_candidates(&self, ty: &Ty) -> BTreeSet<String> {
        self.class_supertypes(ty)
            .into_iter()
            .filter_map(|t| t.class_name().map(String::from))
            .collect()
    }

    fn lub_depth(&self, tys: &[Ty], depth: usize) -> Option<Ty> {
        let tys = tys
            .iter()
            .filter(|t| **t != Ty::Null)
            .map(|t| match t {
                Ty::Prim(p) => self.boxed(*p),
                t => t.clone(),
            })
            .unique()
            .collect::<Vec<_>>();
        if tys.is_empty() {
            return Some(Ty::Null);
        }
        if tys.iter().any(|t| !t.is_proper() || t.is_wildcard() || *t == Ty::Void) {
            return None;
        }
        if tys.len() == 1 {
            return tys.into_iter().next();
        }
        if let Some(top) = tys.iter().find(|t| tys.iter().all(|u| self.is_subtype(u, t))) {
            return Some(top.clone());
        }
        if tys.iter().all(|t| matches!(t, Ty::Array(e) if e.is_reference())) {
            let elems = tys
                .iter()
                .filter_map(|t| match t {
                    Ty::Array(e) => Some((**e).clone()),
                    _ => None,
                })
                .collect::<Vec<_>>();
            return self.lub_depth(&elems, depth).map(Ty::array);
        }

        let mut ec: Option<BTreeSet<String>> = None;
        for t in tys.iter() {
            let est = self.erased_candidates(t);
            ec = Some(match ec {
                None => est,
                Some(acc) => acc.intersection(&est).cloned().collect(),
            });
        }
        let ec = ec.unwrap_or_default();
        let mec = ec
            .iter()
            .filter(|v| {
                !ec.iter().any(|w| {
                    w != *v && self.is_subtype(&self.erasure(&class!(w.as_str())), &class!(v.as_str()))
                })
            })
            .cloned()
            .collect::<Vec<_>>();

        let mut candidates = vec![];
        for name in mec {
            let sups = tys
                .iter()
                .filter_map(|t| self.as_super(t, &name))
                .collect::<Vec<_>>();
            let first = unless!(sups.first().cloned(), else continue);
            if sups.iter().all(|s| *s == first) {
                candidates.push(first);
            } else if sups.iter().any(|s| !s.is_parameterized()) {
                candidates.push(Ty::class(name.as_str(), vec![]));
            } else {
                let arity = first.as_class().map_or(0, |c| c.args.len());
                let mut args = vec![];
                for k in 0..arity {
                    let column = sups
                        .iter()
                        .filter_map(|s| s.as_class().and_then(|c| c.args.get(k)).cloned())
                        .collect::<Vec<_>>();
                    args.push(self.lcta(&column, depth));
                }
                candidates.push(Ty::class(name.as_str(), args));
            }
        }

        if candidates.len() > 1 {
            candidates.retain(|c| *c != *OBJECT);
        }
        candidates.sort_by_key(|c| (self.is_interface(c), c.to_string()));
        match candidates.len() {
            0 => Some(OBJECT.clone()),
            1 => candidates.pop(),
            _ => Some(Ty::Intersection(candidates)),
        }
    }

    /// Least containing type argument of a column of arguments.
    fn lcta(&self, column: &[Ty], depth: usize) -> Ty {
        if column.iter().all(|a| !a.is_wildcard() && *a == column[0]) {
            return column[0].clone();
        }
        if depth + 1 >= LUB_DEPTH || column.iter().any(|a| matches!(a, Ty::Wildcard(WildcardTy::Super(_)))) {
            return Ty::wildcard();
        }
        let uppers = column
            .iter()
            .map(|a| match a {
                Ty::Wildcard(WildcardTy::Extends(u)) => (**u).clone(),
                Ty::Wildcard(_) => OBJECT.clone(),
                t => t.clone(),
            })
            .collect::<Vec<_>>();
        match self.lub_depth(&uppers, depth + 1) {
            Some(u) if u != *OBJECT => Ty::extends(u),
            _ => Ty::wildcard(),
        }
    }
}

impl TypeOracle for ClassTable {
    fn is_subtype(&self, s: &Ty, t: &Ty) -> bool {
        if s == t {
            return true;
        }
        match (s, t) {
            (Ty::Infer(_), _) | (_, Ty::Infer(_)) => return false,
            (Ty::Prim(a), Ty::Prim(b)) => return a.widens_to(*b),
            (Ty::Prim(_), _) | (_, Ty::Prim(_)) => return false,
            (Ty::Void, _) | (_, Ty::Void) => return false,
            (Ty::Wildcard(_), _) | (_, Ty::Wildcard(_)) => return false,
            (Ty::Null, _) => return t.is_reference(),
            (_, Ty::Null) => return false,
            (_, Ty::Intersection(ts)) => return ts.iter().all(|u| self.is_subtype(s, u)),
            _ => {}
        }

        if let Ty::Capture(id) = t {
            if let (Some(lower), _) = self.capture_bounds(*id) {
                if self.is_subtype(s, &lower) {
                    return true;
                }
            }
        }

        match (s, t) {
            (_, Ty::Class(c)) if c.name == "Object" => true,
            (Ty::Array(se), Ty::Array(te)) => {
                if se.is_primitive() || te.is_primitive() {
                    se == te
                } else {
                    self.is_subtype(se, te)
                }
            }
            (_, Ty::Class(c)) => match self.as_super(s, &c.name) {
                None => false,
                Some(_) if c.args.is_empty() => true,
                Some(Ty::Class(sc)) if sc.args.is_empty() => false,
                Some(Ty::Class(sc)) => c
                    .args
                    .iter()
                    .zip(sc.args.iter())
                    .all(|(ta, sa)| self.contains(ta, sa)),
                Some(_) => false,
            },
            (Ty::Param(_), _) | (Ty::Capture(_), _) | (Ty::Intersection(_), _) => self
                .direct_supertypes(s)
                .iter()
                .any(|u| self.is_subtype(u, t)),
            _ => false,
        }
    }

    fn is_compatible(&self, from: &Ty, to: &Ty, mode: InvocationMode) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (Ty::Void, _) | (_, Ty::Void) => false,
            (Ty::Prim(a), Ty::Prim(b)) => a.widens_to(*b),
            (Ty::Prim(a), _) => mode.allows_boxing() && self.is_subtype(&self.boxed(*a), to),
            (_, Ty::Prim(b)) => {
                mode.allows_boxing() && self.unboxed(from).map_or(false, |p| p.widens_to(*b))
            }
            _ => self.is_subtype(from, to) || self.unchecked_convertible(from, to),
        }
    }

    fn lub(&self, tys: &[Ty]) -> Option<Ty> {
        self.lub_depth(tys, 0)
    }

    fn glb(&self, tys: &[Ty]) -> Option<Vec<Ty>> {
        let mut out: Vec<Ty> = vec![];
        for t in tys.iter().flat_map(|t| t.components()) {
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
        let reduced = out
            .iter()
            .filter(|t| !out.iter().any(|u| u != *t && self.is_subtype(u, t)))
            .cloned()
            .collect::<Vec<_>>();
        let classes = reduced
            .iter()
            .filter(|t| matches!(t, Ty::Class(_) | Ty::Array(_)) && !self.is_interface(t))
            .count();
        if classes > 1 {
            return None;
        }
        let mut reduced = reduced;
        reduced.sort_by_key(|t| self.is_interface(t) || t.is_type_variable());
        Some(reduced)
    }

    fn is_consistent_intersection(&self, tys: &[Ty]) -> bool {
        let glb = unless!(self.glb(tys), else return false);
        let parameterized = glb
            .iter()
            .flat_map(|t| self.class_supertypes(t))
            .filter(Ty::is_parameterized)
            .unique()
            .collect::<Vec<_>>();
        parameterized
            .iter()
            .tuple_combinations()
            .all(|(a, b)| a.class_name() != b.class_name())
    }

    fn as_super(&self, ty: &Ty, class: &str) -> Option<Ty> {
        self.class_supertypes(ty)
            .into_iter()
            .find(|t| t.class_name() == Some(class))
    }

    fn supertypes(&self, ty: &Ty) -> Vec<Ty> {
        self.class_supertypes(ty)
    }

    fn type_params(&self, class: &str) -> Option<Vec<TyParamDecl>> {
        self.classes.get(class).map(|d| d.type_params.clone())
    }

    fn erasure(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::Class(c) => Ty::class(c.name.as_str(), vec![]),
            Ty::Array(e) => Ty::array(self.erasure(e)),
            Ty::Param(p) => self
                .param_bounds(p)
                .first()
                .map(|b| self.erasure(b))
                .unwrap_or_else(|| OBJECT.clone()),
            Ty::Capture(id) => self
                .capture_bounds(*id)
                .1
                .first()
                .map(|b| self.erasure(b))
                .unwrap_or_else(|| OBJECT.clone()),
            Ty::Intersection(tys) => tys
                .first()
                .map(|b| self.erasure(b))
                .unwrap_or_else(|| OBJECT.clone()),
            t => t.clone(),
        }
    }

    fn capture(&self, ty: &Ty) -> Ty {
        let c = match ty {
            Ty::Class(c) if c.args.iter().any(Ty::is_wildcard) => c,
            t => return t.clone(),
        };
        let decl = unless!(self.classes.get(&c.name), else return ty.clone());
        let args = c
            .args
            .iter()
            .map(|a| {
                if a.is_wildcard() {
                    Ty::Capture(self.new_capture(&a.to_string()))
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>();
        let theta = decl.theta(&args);
        for (i, (orig, new)) in c.args.iter().zip(args.iter()).enumerate() {
            let id = match new {
                Ty::Capture(id) if orig.is_wildcard() => *id,
                _ => continue,
            };
            let declared = decl
                .type_params
                .get(i)
                .map(|p| p.bounds.clone().apply_subst(&theta))
                .unwrap_or_default();
            let (lower, upper) = match orig {
                Ty::Wildcard(WildcardTy::Extends(u)) => {
                    let mut upper = vec![(**u).clone()];
                    upper.extend(declared.into_iter().filter(|b| *b != *OBJECT));
                    (None, self.glb(&upper).unwrap_or(upper))
                }
                Ty::Wildcard(WildcardTy::Super(l)) => (Some((**l).clone()), declared),
                _ => (None, declared),
            };
            let mut caps = self.captures.borrow_mut();
            if let Some(cap) = caps.get_mut(id.0 as usize) {
                cap.lower = lower;
                cap.upper = upper;
            }
        }
        Ty::class(c.name.as_str(), args)
    }

    fn new_capture(&self, hint: &str) -> CaptureId {
        let mut caps = self.captures.borrow_mut();
        caps.push(CaptureVar {
            hint: hint.to_string(),
            ..Default::default()
        });
        CaptureId((caps.len() - 1) as u32)
    }

    fn set_capture_bounds(&self, id: CaptureId, lower: Option<Ty>, upper: Vec<Ty>) -> bool {
        let upper = upper
            .into_iter()
            .filter(|u| *u != Ty::Capture(id))
            .collect::<Vec<_>>();
        let mut well_formed = upper.is_empty() || self.is_consistent_intersection(&upper);
        if well_formed {
            // store first so that recursive bounds can see the capture's own bounds
            self.set_bounds_unchecked(id, lower.clone(), upper.clone());
            if let Some(l) = &lower {
                if l.is_proper() {
                    well_formed = upper.iter().filter(|u| u.is_proper()).all(|u| self.is_subtype(l, u));
                }
            }
        }
        if !well_formed {
            self.set_bounds_unchecked(id, None, vec![]);
        }
        well_formed
    }

    fn capture_bounds(&self, id: CaptureId) -> (Option<Ty>, Vec<Ty>) {
        self.captures
            .borrow()
            .get(id.0 as usize)
            .map(|c| (c.lower.clone(), c.upper.clone()))
            .unwrap_or_default()
    }

    fn function_type(&self, ty: &Ty) -> Option<FunctionType> {
        let c = ty.as_class()?;
        let decl = self.classes.get(&c.name)?;
        if !decl.is_interface {
            return None;
        }
        if let Some(sam) = &decl.sam {
            if !decl.type_params.is_empty() && c.args.is_empty() {
                return Some(FunctionType {
                    params: sam.params.iter().map(|p| self.erasure(p)).collect(),
                    ret: self.erasure(&sam.ret),
                    thrown: sam.thrown.iter().map(|p| self.erasure(p)).collect(),
                });
            }
            let theta = decl.theta(&self.ground_args(c));
            return Some(FunctionType {
                params: sam.params.clone().apply_subst(&theta),
                ret: sam.ret.clone().apply_subst(&theta),
                thrown: sam.thrown.clone().apply_subst(&theta),
            });
        }
        let grounded = Ty::class(c.name.as_str(), self.ground_args(c));
        self.direct_supertypes(&grounded)
            .iter()
            .filter(|s| self.is_interface(s))
            .find_map(|s| self.function_type(s))
    }

    fn boxed(&self, prim: PrimTy) -> Ty {
        Ty::class(prim.box_name(), vec![])
    }

    fn unboxed(&self, ty: &Ty) -> Option<PrimTy> {
        let name = ty.as_class().filter(|c| c.args.is_empty())?.name.as_str();
        PrimTy::all().iter().copied().find(|p| p.box_name() == name)
    }

    fn object(&self) -> Ty {
        OBJECT.clone()
    }

    fn runtime_exception(&self) -> Ty {
        RUNTIME_EXCEPTION.clone()
    }

    fn exception(&self) -> Ty {
        EXCEPTION.clone()
    }

    fn throwable(&self) -> Ty {
        THROWABLE.clone()
    }

    fn is_checked_exception(&self, ty: &Ty) -> bool {
        self.is_subtype(ty, &THROWABLE)
            && !self.is_subtype(ty, &RUNTIME_EXCEPTION)
            && !self.is_subtype(ty, &ERROR)
    }
}

impl ClassTable {
    fn set_bounds_unchecked(&self, id: CaptureId, lower: Option<Ty>, upper: Vec<Ty>) {
        let mut caps = self.captures.borrow_mut();
        if let Some(cap) = caps.get_mut(id.0 as usize) {
            cap.lower = lower;
            cap.upper = upper;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassDecl, ClassTable};
    use crate::typing::{
        oracle::{InvocationMode, TypeOracle},
        ty::{PrimTy, Ty},
    };

    #[test]
    fn test_subtyping() {
        let t = ClassTable::with_builtins();
        assert!(t.is_subtype(&class!("String"), &class!("Object")));
        assert!(t.is_subtype(&class!("Integer"), &class!("Number")));
        assert!(t.is_subtype(
            &class!("ArrayList", class!("String")),
            &class!("Collection", class!("String"))
        ));
        assert!(!t.is_subtype(
            &class!("ArrayList", class!("String")),
            &class!("List", class!("Object"))
        ));
        assert!(t.is_subtype(
            &class!("ArrayList", class!("String")),
            &class!("List", Ty::extends(class!("CharSequence")))
        ));
        assert!(t.is_subtype(
            &class!("List", class!("Object")),
            &class!("List", Ty::super_of(class!("String")))
        ));
        assert!(t.is_subtype(&Ty::Null, &class!("String")));
        assert!(!t.is_subtype(&class!("String"), &class!("Integer")));
        assert!(t.is_subtype(
            &Ty::array(class!("String")),
            &Ty::array(class!("Object"))
        ));
        assert!(t.is_subtype(&class!("ArrayList"), &class!("List")));
        assert!(!t.is_subtype(&class!("ArrayList"), &class!("List", class!("String"))));
    }

    #[test]
    fn test_compatibility_modes() {
        let t = ClassTable::with_builtins();
        let int = Ty::Prim(PrimTy::Int);
        assert!(!t.is_compatible(&int, &class!("Integer"), InvocationMode::Strict));
        assert!(t.is_compatible(&int, &class!("Integer"), InvocationMode::Loose));
        assert!(t.is_compatible(&int, &class!("Comparable", class!("Integer")), InvocationMode::Loose));
        assert!(t.is_compatible(&class!("Integer"), &Ty::Prim(PrimTy::Long), InvocationMode::Loose));
        assert!(t.is_compatible(&class!("ArrayList"), &class!("List", class!("String")), InvocationMode::Strict));
    }

    #[test]
    fn test_lub() {
        let t = ClassTable::with_builtins();
        let l = t.lub(&[class!("Integer"), class!("Long")]).unwrap();
        assert!(t.is_subtype(&class!("Integer"), &l));
        assert!(t.is_subtype(&class!("Long"), &l));
        assert_eq!(l.components()[0], &class!("Number"));

        assert_eq!(
            t.lub(&[class!("ArrayList", class!("String")), class!("List", class!("String"))]),
            Some(class!("List", class!("String")))
        );
        assert_eq!(
            t.lub(&[class!("String"), Ty::Null]),
            Some(class!("String"))
        );
        let sl = t.lub(&[class!("String"), class!("Integer")]).unwrap();
        assert!(t.is_subtype(&class!("String"), &sl));
        assert!(t.is_subtype(&class!("Integer"), &sl));
    }

    #[test]
    fn test_glb() {
        let t = ClassTable::with_builtins();
        assert_eq!(
            t.glb(&[class!("Object"), class!("Number")]),
            Some(vec![class!("Number")])
        );
        assert_eq!(t.glb(&[class!("String"), class!("Integer")]), None);
        assert_eq!(
            t.glb(&[class!("Serializable"), class!("Number")]),
            Some(vec![class!("Number")])
        );
        assert_eq!(
            t.glb(&[class!("Runnable"), class!("Serializable")]).map(|g| g.len()),
            Some(2)
        );
        assert!(!t.is_consistent_intersection(&[
            class!("Comparable", class!("String")),
            class!("Comparable", class!("Integer"))
        ]));
    }

    #[test]
    fn test_capture_and_function_types() {
        let t = ClassTable::with_builtins();
        let captured = t.capture(&class!("List", Ty::extends(class!("Number"))));
        let arg = captured.as_class().unwrap().args[0].clone();
        match arg {
            Ty::Capture(id) => {
                assert_eq!(t.capture_bounds(id), (None, vec![class!("Number")]));
                assert!(t.is_subtype(&Ty::Capture(id), &class!("Number")));
            }
            other => panic!("expected a capture, found {}", other),
        }

        let ft = t
            .function_type(&class!("Function", class!("String"), class!("Integer")))
            .unwrap();
        assert_eq!(ft.params, vec![class!("String")]);
        assert_eq!(ft.ret, class!("Integer"));
        assert!(t.function_type(&class!("String")).is_none());

        let wild = t
            .function_type(&class!("Function", Ty::super_of(class!("String")), Ty::wildcard()))
            .unwrap();
        assert_eq!(wild.params, vec![class!("String")]);
        assert_eq!(wild.ret, class!("Object"));
    }

    #[test]
    fn test_capture_ids_are_never_reused() {
        let t = ClassTable::with_builtins();
        let first = t.new_capture("T");
        assert!(!t.set_capture_bounds(first, Some(class!("String")), vec![class!("Integer")]));
        let second = t.new_capture("T");
        assert_ne!(first, second);
        assert_eq!(t.capture_count(), 2);
        assert_eq!(t.capture_bounds(first), (None, vec![]));
    }

    #[test]
    fn test_inherited_sam() {
        let mut t = ClassTable::with_builtins();
        t.declare(
            ClassDecl::interface("IntOp").extends(class!("Function", class!("Integer"), class!("Integer"))),
        );
        let ft = t.function_type(&class!("IntOp")).unwrap();
        assert_eq!(ft.params, vec![class!("Integer")]);
        assert!(t.is_checked_exception(&class!("IOException")));
        assert!(!t.is_checked_exception(&class!("IllegalStateException")));
    }
}
