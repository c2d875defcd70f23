use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::utils::join;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimTy {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimTy {
    pub fn all() -> [PrimTy; 8] {
        [
            PrimTy::Boolean,
            PrimTy::Byte,
            PrimTy::Short,
            PrimTy::Char,
            PrimTy::Int,
            PrimTy::Long,
            PrimTy::Float,
            PrimTy::Double,
        ]
    }

    /// Identity or widening primitive conversion.
    pub fn widens_to(self, other: PrimTy) -> bool {
        use PrimTy::*;
        if self == other {
            return true;
        }
        match self {
            Byte => matches!(other, Short | Int | Long | Float | Double),
            Short | Char => matches!(other, Int | Long | Float | Double),
            Int => matches!(other, Long | Float | Double),
            Long => matches!(other, Float | Double),
            Float => other == Double,
            Boolean | Double => false,
        }
    }

    pub fn box_name(self) -> &'static str {
        match self {
            PrimTy::Boolean => "Boolean",
            PrimTy::Byte => "Byte",
            PrimTy::Short => "Short",
            PrimTy::Char => "Character",
            PrimTy::Int => "Integer",
            PrimTy::Long => "Long",
            PrimTy::Float => "Float",
            PrimTy::Double => "Double",
        }
    }
}

impl fmt::Display for PrimTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimTy::Boolean => "boolean",
            PrimTy::Byte => "byte",
            PrimTy::Short => "short",
            PrimTy::Char => "char",
            PrimTy::Int => "int",
            PrimTy::Long => "long",
            PrimTy::Float => "float",
            PrimTy::Double => "double",
        };
        write!(f, "{}", s)
    }
}

/// An inference variable. The index is allocated by the variable factory
/// and is never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InferVar(pub u32);

impl fmt::Display for InferVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?t{}", self.0)
    }
}

/// A fresh type variable owned by the oracle (capture conversion or a
/// placeholder synthesized by resolution).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub u32);

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture#{}", self.0)
    }
}

/// A declared type variable: `E` of `List<E>`, or `T` of `<T> T id(T)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TyParam {
    pub owner: String,
    pub name: String,
}

impl TyParam {
    pub fn new<O: Into<String>, N: Into<String>>(owner: O, name: N) -> TyParam {
        TyParam {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}::{}", self.owner, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassTy {
    pub name: String,
    pub args: Vec<Ty>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WildcardTy {
    Unbounded,
    Extends(Box<Ty>),
    Super(Box<Ty>),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ty {
    Prim(PrimTy),
    Void,
    Null,
    Class(ClassTy),
    Array(Box<Ty>),
    Param(TyParam),
    Capture(CaptureId),
    Infer(InferVar),
    Intersection(Vec<Ty>),
    Wildcard(WildcardTy),
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Prim(p) => write!(f, "{}", p),
            Ty::Void => write!(f, "void"),
            Ty::Null => write!(f, "null"),
            Ty::Class(c) => {
                if c.args.is_empty() {
                    write!(f, "{}", c.name)
                } else {
                    write!(f, "{}<{}>", c.name, join(&c.args, ", "))
                }
            }
            Ty::Array(elem) => write!(f, "{}[]", elem),
            Ty::Param(p) => write!(f, "{}", p),
            Ty::Capture(c) => write!(f, "{}", c),
            Ty::Infer(v) => write!(f, "{}", v),
            Ty::Intersection(tys) => write!(f, "{}", join(tys, " & ")),
            Ty::Wildcard(WildcardTy::Unbounded) => write!(f, "?"),
            Ty::Wildcard(WildcardTy::Extends(t)) => write!(f, "? extends {}", t),
            Ty::Wildcard(WildcardTy::Super(t)) => write!(f, "? super {}", t),
        }
    }
}

impl From<PrimTy> for Ty {
    fn from(p: PrimTy) -> Ty {
        Ty::Prim(p)
    }
}

impl From<InferVar> for Ty {
    fn from(v: InferVar) -> Ty {
        Ty::Infer(v)
    }
}

impl From<CaptureId> for Ty {
    fn from(c: CaptureId) -> Ty {
        Ty::Capture(c)
    }
}

impl Ty {
    pub fn class<S: Into<String>>(name: S, args: Vec<Ty>) -> Ty {
        Ty::Class(ClassTy {
            name: name.into(),
            args,
        })
    }

    pub fn array(elem: Ty) -> Ty {
        Ty::Array(Box::new(elem))
    }

    pub fn wildcard() -> Ty {
        Ty::Wildcard(WildcardTy::Unbounded)
    }

    pub fn extends(bound: Ty) -> Ty {
        Ty::Wildcard(WildcardTy::Extends(Box::new(bound)))
    }

    pub fn super_of(bound: Ty) -> Ty {
        Ty::Wildcard(WildcardTy::Super(Box::new(bound)))
    }

    /// Builds an intersection, flattening nested intersections and dropping
    /// duplicates. A single component is returned as is.
    pub fn intersection(tys: Vec<Ty>) -> Ty {
        let mut flat = vec![];
        for ty in tys {
            match ty {
                Ty::Intersection(inner) => {
                    for t in inner {
                        if !flat.contains(&t) {
                            flat.push(t);
                        }
                    }
                }
                t => {
                    if !flat.contains(&t) {
                        flat.push(t);
                    }
                }
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(Ty::Void)
        } else {
            Ty::Intersection(flat)
        }
    }

    /// A type is proper when it mentions no inference variable.
    pub fn is_proper(&self) -> bool {
        match self {
            Ty::Infer(_) => false,
            Ty::Prim(_) | Ty::Void | Ty::Null | Ty::Param(_) | Ty::Capture(_) => true,
            Ty::Class(c) => c.args.iter().all(Ty::is_proper),
            Ty::Array(elem) => elem.is_proper(),
            Ty::Intersection(tys) => tys.iter().all(Ty::is_proper),
            Ty::Wildcard(WildcardTy::Unbounded) => true,
            Ty::Wildcard(WildcardTy::Extends(t)) | Ty::Wildcard(WildcardTy::Super(t)) => {
                t.is_proper()
            }
        }
    }

    pub fn mentions(&self, var: InferVar) -> bool {
        match self {
            Ty::Infer(v) => *v == var,
            Ty::Prim(_) | Ty::Void | Ty::Null | Ty::Param(_) | Ty::Capture(_) => false,
            Ty::Class(c) => c.args.iter().any(|t| t.mentions(var)),
            Ty::Array(elem) => elem.mentions(var),
            Ty::Intersection(tys) => tys.iter().any(|t| t.mentions(var)),
            Ty::Wildcard(WildcardTy::Unbounded) => false,
            Ty::Wildcard(WildcardTy::Extends(t)) | Ty::Wildcard(WildcardTy::Super(t)) => {
                t.mentions(var)
            }
        }
    }

    pub fn mentions_any(&self, vars: &BTreeSet<InferVar>) -> bool {
        let mut found = false;
        self.walk(&mut |ty| {
            if let Ty::Infer(v) = ty {
                found |= vars.contains(v);
            }
        });
        found
    }

    pub fn mentions_param(&self, param: &TyParam) -> bool {
        let mut found = false;
        self.walk(&mut |ty| {
            if let Ty::Param(p) = ty {
                found |= p == param;
            }
        });
        found
    }

    pub fn infer_vars(&self) -> BTreeSet<InferVar> {
        let mut vars = BTreeSet::new();
        self.collect_infer_vars(&mut vars);
        vars
    }

    pub fn collect_infer_vars(&self, vars: &mut BTreeSet<InferVar>) {
        self.walk(&mut |ty| {
            if let Ty::Infer(v) = ty {
                vars.insert(*v);
            }
        });
    }

    /// Pre-order visit of this type and every type nested in it.
    pub fn walk<F: FnMut(&Ty)>(&self, f: &mut F) {
        f(self);
        match self {
            Ty::Class(c) => {
                for t in c.args.iter() {
                    t.walk(f);
                }
            }
            Ty::Array(elem) => elem.walk(f),
            Ty::Intersection(tys) => {
                for t in tys.iter() {
                    t.walk(f);
                }
            }
            Ty::Wildcard(WildcardTy::Extends(t)) | Ty::Wildcard(WildcardTy::Super(t)) => t.walk(f),
            _ => {}
        }
    }

    pub fn as_infer(&self) -> Option<InferVar> {
        match self {
            Ty::Infer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassTy> {
        match self {
            Ty::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        self.as_class().map(|c| c.name.as_str())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Ty::Prim(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Ty::Class(_)
                | Ty::Array(_)
                | Ty::Param(_)
                | Ty::Capture(_)
                | Ty::Infer(_)
                | Ty::Intersection(_)
                | Ty::Null
        )
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Ty::Wildcard(_))
    }

    pub fn is_parameterized(&self) -> bool {
        matches!(self, Ty::Class(c) if !c.args.is_empty())
    }

    pub fn is_wildcard_parameterized(&self) -> bool {
        matches!(self, Ty::Class(c) if c.args.iter().any(Ty::is_wildcard))
    }

    pub fn is_type_variable(&self) -> bool {
        matches!(self, Ty::Param(_) | Ty::Capture(_))
    }

    /// Innermost component type of an array, or the type itself.
    pub fn leaf(&self) -> &Ty {
        match self {
            Ty::Array(elem) => elem.leaf(),
            ty => ty,
        }
    }

    pub fn dims(&self) -> usize {
        match self {
            Ty::Array(elem) => 1 + elem.dims(),
            _ => 0,
        }
    }

    /// Wraps `self` in `dims` array levels.
    pub fn with_dims(self, dims: usize) -> Ty {
        (0..dims).fold(self, |ty, _| Ty::array(ty))
    }

    pub fn components(&self) -> Vec<&Ty> {
        match self {
            Ty::Intersection(tys) => tys.iter().collect(),
            ty => vec![ty],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InferVar, PrimTy, Ty, TyParam};

    #[test]
    fn test_proper_and_mentions() {
        let list_t = class!("List", ivar!(0));
        assert!(!list_t.is_proper());
        assert!(list_t.mentions(InferVar(0)));
        assert!(!list_t.mentions(InferVar(1)));

        let nested = class!("Map", class!("String"), Ty::extends(ivar!(3)));
        assert_eq!(
            nested.infer_vars().into_iter().collect::<Vec<_>>(),
            vec![InferVar(3)]
        );
        assert!(class!("List", param!("List", "E")).is_proper());
        assert!(class!("List", param!("List", "E")).mentions_param(&TyParam::new("List", "E")));
    }

    #[test]
    fn test_display() {
        let ty = class!(
            "Map",
            class!("String"),
            Ty::extends(class!("List", Ty::super_of(ivar!(2))))
        );
        assert_eq!(ty.to_string(), "Map<String, ? extends List<? super ?t2>>");
        assert_eq!(Ty::array(Ty::Prim(PrimTy::Int)).to_string(), "int[]");
        assert_eq!(
            Ty::intersection(vec![class!("Number"), class!("Comparable", ivar!(0))]).to_string(),
            "Number & Comparable<?t0>"
        );
    }

    #[test]
    fn test_intersection_flattens() {
        let a = class!("A");
        let b = class!("B");
        let nested = Ty::intersection(vec![a.clone(), Ty::intersection(vec![b.clone(), a.clone()])]);
        assert_eq!(nested, Ty::Intersection(vec![a.clone(), b]));
        assert_eq!(Ty::intersection(vec![a.clone(), a.clone()]), a);
    }

    #[test]
    fn test_primitive_widening() {
        assert!(PrimTy::Byte.widens_to(PrimTy::Long));
        assert!(PrimTy::Char.widens_to(PrimTy::Int));
        assert!(!PrimTy::Char.widens_to(PrimTy::Short));
        assert!(!PrimTy::Boolean.widens_to(PrimTy::Int));
        assert!(PrimTy::Int.widens_to(PrimTy::Int));
    }
}
