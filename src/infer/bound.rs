use std::{cmp::Ordering, fmt, hash};

use serde::{Deserialize, Serialize};

use crate::typing::{
    subst::{ApplySubst, Subst},
    ty::{InferVar, Ty},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Relation {
    Subtype,
    Same,
    Supertype,
}

impl Relation {
    pub fn inverse(self) -> Relation {
        match self {
            Relation::Subtype => Relation::Supertype,
            Relation::Same => Relation::Same,
            Relation::Supertype => Relation::Subtype,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Subtype => write!(f, "<:"),
            Relation::Same => write!(f, "="),
            Relation::Supertype => write!(f, ":>"),
        }
    }
}

/// `left REL right`. Equality and ordering only look at the relation
/// itself; the soft flag rides along.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeBound {
    pub left: InferVar,
    pub right: Ty,
    pub relation: Relation,
    pub soft: bool,
}

impl TypeBound {
    pub fn new(left: InferVar, relation: Relation, right: Ty) -> TypeBound {
        TypeBound {
            left,
            right,
            relation,
            soft: false,
        }
    }

    pub fn soft(mut self, soft: bool) -> TypeBound {
        self.soft = soft;
        self
    }

    pub fn is_proper(&self) -> bool {
        self.right.is_proper()
    }

    /// The same fact seen from the variable on the right, when the right
    /// side is itself a variable.
    pub fn inverse(&self) -> Option<TypeBound> {
        let right = self.right.as_infer()?;
        Some(TypeBound {
            left: right,
            right: Ty::Infer(self.left),
            relation: self.relation.inverse(),
            soft: self.soft,
        })
    }

    pub fn mentions(&self, var: InferVar) -> bool {
        self.left == var || self.right.mentions(var)
    }

    fn key(&self) -> (InferVar, Relation, &Ty) {
        (self.left, self.relation, &self.right)
    }
}

impl PartialEq for TypeBound {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TypeBound {}

impl PartialOrd for TypeBound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeBound {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl hash::Hash for TypeBound {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl fmt::Display for TypeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.relation, self.right)?;
        if self.soft {
            write!(f, " (soft)")?;
        }
        Ok(())
    }
}

impl ApplySubst for TypeBound {
    fn apply_subst(self, subst: &Subst) -> TypeBound {
        TypeBound {
            right: self.right.apply_subst(subst),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{Relation, TypeBound};
    use crate::typing::ty::InferVar;

    #[test]
    fn test_structural_equality_ignores_soft() {
        let a = TypeBound::new(InferVar(0), Relation::Subtype, class!("String"));
        let b = a.clone().soft(true);
        assert_eq!(a, b);
        let set = vec![a, b].into_iter().collect::<BTreeSet<_>>();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_inverse() {
        let b = TypeBound::new(InferVar(0), Relation::Subtype, ivar!(1));
        let inv = b.inverse().unwrap();
        assert_eq!(inv.to_string(), "?t1 :> ?t0");
        assert!(TypeBound::new(InferVar(0), Relation::Same, class!("A")).inverse().is_none());
    }
}
