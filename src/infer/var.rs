use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    span::Span,
    typing::ty::{InferVar, TyParam},
};

bitflags::bitflags! {
    #[derive(Default, Serialize, Deserialize)]
    pub struct NullHints: u8 {
        const NON_NULL = 1 << 0;
        const NULLABLE = 1 << 1;
    }
}

impl NullHints {
    /// Conflicting hints cancel out.
    pub fn resolved(self) -> NullHints {
        if self.is_all() {
            NullHints::empty()
        } else {
            self
        }
    }
}

impl fmt::Display for NullHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved() {
            h if h == NullHints::NON_NULL => write!(f, "@NonNull "),
            h if h == NullHints::NULLABLE => write!(f, "@Nullable "),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceVariable {
    pub var: InferVar,
    /// Declaring type parameter, or a synthetic one for capture variables.
    pub param: TyParam,
    pub site: Span,
    /// Position among the variables created together for one site.
    pub ordinal: usize,
    pub hints: NullHints,
}

impl fmt::Display for InferenceVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.param.name, self.var.0)
    }
}

/// Arena of inference variables. One factory is shared by an episode and
/// all of its nested episodes, so an index is never reused.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VarFactory {
    vars: Vec<InferenceVariable>,
}

impl VarFactory {
    pub fn new() -> VarFactory {
        VarFactory { vars: vec![] }
    }

    pub fn next(&mut self, param: TyParam, site: Span, ordinal: usize, hints: NullHints) -> InferVar {
        let var = InferVar(self.vars.len() as u32);
        self.vars.push(InferenceVariable {
            var,
            param,
            site,
            ordinal,
            hints,
        });
        log::trace!("[var] new {} at {}", self.vars[var.0 as usize], site);
        var
    }

    /// The variable for `param` at `site`, created on first request. Every
    /// episode looking at the same site sees the same variable.
    pub fn intern(&mut self, param: TyParam, site: Span, ordinal: usize, hints: NullHints) -> InferVar {
        match self.lookup(&param, site) {
            Some(var) => var,
            None => self.next(param, site, ordinal, hints),
        }
    }

    pub fn get(&self, var: InferVar) -> Option<&InferenceVariable> {
        self.vars.get(var.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variable created for `param` at `site`, if any.
    pub fn lookup(&self, param: &TyParam, site: Span) -> Option<InferVar> {
        self.vars
            .iter()
            .rev()
            .find(|v| v.site == site && v.param == *param)
            .map(|v| v.var)
    }
}

#[cfg(test)]
mod tests {
    use super::{NullHints, VarFactory};
    use crate::{
        span::Span,
        typing::ty::{InferVar, TyParam},
    };

    #[test]
    fn test_factory_never_reuses() {
        let mut vf = VarFactory::new();
        let site = Span::at(0, 0, 10);
        let t = TyParam::new("choose", "T");
        let a = vf.next(t.clone(), site, 0, NullHints::empty());
        let b = vf.next(TyParam::new("choose", "R"), site, 1, NullHints::empty());
        assert_eq!((a, b), (InferVar(0), InferVar(1)));
        assert_eq!(vf.lookup(&t, site), Some(a));
        assert_eq!(vf.lookup(&t, Span::at(3, 0, 1)), None);
        assert_eq!(vf.get(b).map(|v| v.to_string()), Some(String::from("R#1")));

        assert_eq!(vf.intern(t, site, 0, NullHints::empty()), a);
        assert_eq!(vf.len(), 2);
    }

    #[test]
    fn test_hints() {
        let mut vf = VarFactory::new();
        let v = vf.next(TyParam::new("m", "T"), Span::new(), 0, NullHints::NON_NULL);
        assert_eq!(vf.get(v).map(|v| v.hints.resolved()), Some(NullHints::NON_NULL));
        assert_eq!((NullHints::NON_NULL | NullHints::NULLABLE).resolved(), NullHints::empty());
        assert_eq!(NullHints::NON_NULL.to_string(), "@NonNull ");
    }
}
