use std::fmt;

/// Kind of transform a stage performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Element-wise transform, preserves order and length
    Map,

    /// Keeps the ordered sub-sequence matching a predicate
    Filter,

    /// Folds the sequence into a single accumulator
    Reduce,

    /// Arbitrary whole-value transform (sorting, regrouping, ...)
    Apply,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Map => "map",
            StageKind::Filter => "filter",
            StageKind::Reduce => "reduce",
            StageKind::Apply => "apply",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor of a registered stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub kind: StageKind,
    pub name: String,
}

impl StageInfo {
    pub fn new(kind: StageKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Renders as `kind(name)`, e.g. `filter(unresolved_only)`
impl fmt::Display for StageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.name)
    }
}
