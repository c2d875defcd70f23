use std::fmt;

use colored::*;

use crate::{infer::ConstraintFormula, span::Span, typing::ty::InferVar, utils::join};

pub type InferResult<T = ()> = Result<T, InferError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InferErrorKind {
    /// A constraint reduced to the impossible proposition.
    Contradiction(String),
    /// A synthesized intersection or placeholder is ill-formed.
    Malformed(InferVar, String),
    /// A resolution pass made no progress on its cluster.
    NoProgress(Vec<InferVar>),
    NotApplicable(String),
    Unresolved(InferVar),
    /// Hard compile error that ends the episode without trying other modes.
    Aborted(String),
}

impl fmt::Display for InferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                InferErrorKind::Contradiction(_) => "inference error",
                InferErrorKind::Malformed(..) => "malformed bound",
                InferErrorKind::NoProgress(_) => "inference error",
                InferErrorKind::NotApplicable(_) => "inapplicable method",
                InferErrorKind::Unresolved(_) => "inference error",
                InferErrorKind::Aborted(_) => "compile error",
            }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferError {
    pub kind: InferErrorKind,
    pub src: Vec<Span>,
}

impl InferError {
    pub fn new(kind: InferErrorKind) -> InferError {
        InferError { kind, src: vec![] }
    }

    pub fn contradiction(c: &ConstraintFormula) -> InferError {
        InferError::new(InferErrorKind::Contradiction(c.to_string()))
    }

    pub fn reason<S: Into<String>>(msg: S) -> InferError {
        InferError::new(InferErrorKind::Contradiction(msg.into()))
    }

    pub fn malformed<S: Into<String>>(var: InferVar, detail: S) -> InferError {
        InferError::new(InferErrorKind::Malformed(var, detail.into()))
    }

    pub fn no_progress(vars: Vec<InferVar>) -> InferError {
        InferError::new(InferErrorKind::NoProgress(vars))
    }

    pub fn not_applicable<S: Into<String>>(method: S) -> InferError {
        InferError::new(InferErrorKind::NotApplicable(method.into()))
    }

    pub fn unresolved(var: InferVar) -> InferError {
        InferError::new(InferErrorKind::Unresolved(var))
    }

    pub fn aborted<S: Into<String>>(msg: S) -> InferError {
        InferError::new(InferErrorKind::Aborted(msg.into()))
    }

    pub fn at(mut self, span: Span) -> InferError {
        if !self.src.contains(&span) {
            self.src.push(span);
        }
        self
    }

    /// Failures that an episode boundary may absorb by trying the next
    /// invocation mode or candidate.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind, InferErrorKind::Aborted(_))
    }

    pub fn message(&self) -> String {
        match &self.kind {
            InferErrorKind::Contradiction(c) => format!("constraint `{}` cannot be satisfied", c),
            InferErrorKind::Malformed(v, detail) => {
                format!("no well-formed instantiation for `{}`: {}", v, detail)
            }
            InferErrorKind::NoProgress(vars) => format!(
                "resolution made no progress on {{{}}}",
                join(vars.iter(), ", ")
            ),
            InferErrorKind::NotApplicable(m) => format!("method `{}` is not applicable", m),
            InferErrorKind::Unresolved(v) => format!("inference variable `{}` cannot be solved", v),
            InferErrorKind::Aborted(msg) => msg.clone(),
        }
    }

    pub fn emit(&self) {
        let kind = format!("{}:", self.kind);
        eprintln!("{} {}", kind.bold().red(), self.message().bold());
        let mut spans = self.src.clone();
        spans.sort();
        spans.dedup();
        for span in spans {
            let arrow = "-->".bold();
            eprintln!(" {} {}", arrow, span);
        }
        eprintln!()
    }
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message())
    }
}

impl std::error::Error for InferError {}

#[cfg(test)]
mod tests {
    use super::{InferError, InferErrorKind};
    use crate::{span::Span, typing::ty::InferVar};

    #[test]
    fn test_messages() {
        let err = InferError::no_progress(vec![InferVar(0), InferVar(3)]);
        assert_eq!(err.message(), "resolution made no progress on {?t0, ?t3}");
        assert!(err.is_recoverable());

        let err = InferError::aborted("expression has no value").at(Span::at(2, 0, 4));
        assert!(!err.is_recoverable());
        assert_eq!(err.src.len(), 1);
        assert_eq!(err.to_string(), "compile error: expression has no value");
        assert!(matches!(err.kind, InferErrorKind::Aborted(_)));
    }
}
