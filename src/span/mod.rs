use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub lineno: usize,
    pub col: usize,
    pub offset: usize,
}

/// A source range. Two expressions with the same span are the same
/// syntactic site, which is how nested invocations are told apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new() -> Span {
        Span {
            start: Pos::new(),
            end: Pos::new(),
        }
    }

    /// Single-line span covering `[start, end)` on line `lineno`.
    pub fn at(lineno: usize, start: usize, end: usize) -> Span {
        Span {
            start: Pos {
                lineno,
                col: start,
                offset: start,
            },
            end: Pos {
                lineno,
                col: end,
                offset: end,
            },
        }
    }

    pub fn lines(&self) -> usize {
        (self.end.lineno - self.start.lineno) + 1
    }

    pub fn len(&self) -> usize {
        self.end.offset - self.start.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start.offset <= other.start.offset && other.end.offset <= self.end.offset
    }

    /// Create a new span with the start of this one and end of another one
    pub fn extend_to(&self, other: &Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

impl From<Pos> for Span {
    fn from(p: Pos) -> Span {
        Span { start: p, end: p }
    }
}

impl Pos {
    pub fn new() -> Pos {
        Pos {
            lineno: 0,
            col: 0,
            offset: 0,
        }
    }

    pub fn empty(&self) -> bool {
        self.lineno == 0 && self.col == 0 && self.offset == 0
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.lineno + 1, self.col + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::Span;

    #[test]
    fn test_containment() {
        let outer = Span::at(0, 4, 30);
        let inner = Span::at(0, 10, 12);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
        assert_eq!(outer.extend_to(&Span::at(0, 31, 40)).len(), 36);
        assert_eq!(inner.to_string(), "1:11");
    }
}
