use std::{
    collections::{BTreeMap, VecDeque},
    iter::FromIterator,
    ops::{Deref, DerefMut},
};

use crate::typing::ty::{ClassTy, InferVar, Ty, TyParam, WildcardTy};

/// Anything a substitution can be keyed by: a variable that occurs as a
/// leaf of `Ty`.
pub trait SubstKey: Ord + Clone + std::fmt::Display {
    fn key_of(ty: &Ty) -> Option<&Self>;
}

impl SubstKey for InferVar {
    fn key_of(ty: &Ty) -> Option<&Self> {
        match ty {
            Ty::Infer(v) => Some(v),
            _ => None,
        }
    }
}

impl SubstKey for TyParam {
    fn key_of(ty: &Ty) -> Option<&Self> {
        match ty {
            Ty::Param(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Subst<K: SubstKey = InferVar>(BTreeMap<K, Ty>);

impl<K: SubstKey> Default for Subst<K> {
    fn default() -> Self {
        Subst(BTreeMap::new())
    }
}

impl<K: SubstKey> Deref for Subst<K> {
    type Target = BTreeMap<K, Ty>;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K: SubstKey> DerefMut for Subst<K> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: SubstKey> IntoIterator for Subst<K> {
    type Item = (K, Ty);

    type IntoIter = std::collections::btree_map::IntoIter<K, Ty>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: SubstKey> FromIterator<(K, Ty)> for Subst<K> {
    fn from_iter<T: IntoIterator<Item = (K, Ty)>>(iter: T) -> Self {
        Subst(iter.into_iter().collect())
    }
}

impl<K: SubstKey> std::fmt::Debug for Subst<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .finish()
    }
}

impl<K: SubstKey> std::fmt::Display for Subst<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl<K: SubstKey> Subst<K> {
    pub fn new() -> Subst<K> {
        Subst(BTreeMap::new())
    }

    /// Pairs `keys[i]` with `tys[i]`; extra entries on either side are ignored.
    pub fn zip<I, J>(keys: I, tys: J) -> Subst<K>
    where
        I: IntoIterator<Item = K>,
        J: IntoIterator<Item = Ty>,
    {
        keys.into_iter().zip(tys.into_iter()).collect()
    }

    /// Composes `other` after `self`: applies `other` to every image of
    /// `self`, then adds the entries of `other` not already bound.
    pub fn union_inplace(&mut self, other: &Subst<K>) {
        for (_, ty) in self.0.iter_mut() {
            *ty = ty.clone().apply_subst(other);
        }

        for (k, v) in other.iter() {
            if !self.0.contains_key(k) {
                log::trace!("union_inplace: {} => {}", k, v);
                self.0.insert(k.clone(), v.clone());
            }
        }
    }
}

pub trait ApplySubst<K: SubstKey = InferVar> {
    fn apply_subst(self, subst: &Subst<K>) -> Self;
}

impl<K: SubstKey> ApplySubst<K> for Ty {
    fn apply_subst(self, subst: &Subst<K>) -> Ty {
        if subst.is_empty() {
            return self;
        }

        if let Some(k) = K::key_of(&self) {
            if let Some(t) = subst.get(k) {
                return t.clone();
            }
        }

        match self {
            Ty::Class(ClassTy { name, args }) => Ty::Class(ClassTy {
                name,
                args: args.apply_subst(subst),
            }),
            Ty::Array(elem) => Ty::Array(elem.apply_subst(subst)),
            Ty::Intersection(tys) => Ty::intersection(tys.apply_subst(subst)),
            Ty::Wildcard(WildcardTy::Extends(t)) => {
                Ty::Wildcard(WildcardTy::Extends(t.apply_subst(subst)))
            }
            Ty::Wildcard(WildcardTy::Super(t)) => Ty::Wildcard(WildcardTy::Super(t.apply_subst(subst))),
            t => t,
        }
    }
}

impl<K: SubstKey, T: ApplySubst<K>> ApplySubst<K> for Box<T> {
    fn apply_subst(self, subst: &Subst<K>) -> Box<T> {
        Box::new((*self).apply_subst(subst))
    }
}

impl<K: SubstKey, T: ApplySubst<K>> ApplySubst<K> for Option<T> {
    fn apply_subst(self, subst: &Subst<K>) -> Option<T> {
        self.map(|t| t.apply_subst(subst))
    }
}

impl<K: SubstKey, T: ApplySubst<K>> ApplySubst<K> for Vec<T> {
    fn apply_subst(self, subst: &Subst<K>) -> Vec<T> {
        self.into_iter().map(|t| t.apply_subst(subst)).collect()
    }
}

impl<K: SubstKey, T: ApplySubst<K>> ApplySubst<K> for VecDeque<T> {
    fn apply_subst(self, subst: &Subst<K>) -> VecDeque<T> {
        self.into_iter().map(|t| t.apply_subst(subst)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplySubst, Subst};
    use crate::typing::ty::{InferVar, Ty, TyParam};

    #[test]
    fn test_apply_infer_subst() {
        let s: Subst = subst! { InferVar(0) => class!("String") };
        let ty = class!("Map", ivar!(0), Ty::extends(class!("List", ivar!(0))));
        assert_eq!(
            ty.apply_subst(&s),
            class!("Map", class!("String"), Ty::extends(class!("List", class!("String"))))
        );
        assert_eq!(ivar!(1).apply_subst(&s), ivar!(1));
    }

    #[test]
    fn test_apply_param_subst() {
        let e = TyParam::new("List", "E");
        let theta: Subst<TyParam> = subst! { e => ivar!(4) };
        let ty = class!("Collection", param!("List", "E"));
        assert_eq!(ty.apply_subst(&theta), class!("Collection", ivar!(4)));
        assert_eq!(param!("Map", "K").apply_subst(&theta), param!("Map", "K"));
    }

    #[test]
    fn test_union_inplace() {
        let mut a: Subst = subst! { InferVar(0) => class!("List", ivar!(1)) };
        let b: Subst = subst! { InferVar(1) => class!("String"), InferVar(0) => class!("Object") };
        a.union_inplace(&b);
        assert_eq!(a[&InferVar(0)], class!("List", class!("String")));
        assert_eq!(a[&InferVar(1)], class!("String"));
    }

    #[test]
    fn test_zip() {
        let s: Subst = Subst::zip(vec![InferVar(0), InferVar(1)], vec![class!("A")]);
        assert_eq!(s.len(), 1);
    }
}
