use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Scope identity ───────────────────────────────────────────

/// Reporting entity identifier. In the Postgres store this is the physical
/// table holding that entity's calculation rows (e.g. `cal_320193`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(pub String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GroupKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One independent unit of work: a single hierarchy category of one group in
/// one fiscal year.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub group: GroupKey,
    pub year: i32,
    pub category: String,
}

impl Scope {
    pub fn new(group: impl Into<GroupKey>, year: i32, category: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            year,
            category: category.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.year, self.category)
    }
}

// ─── Input rows ───────────────────────────────────────────────

/// A stored `concept → sub_concept` relationship. Labels are kept exactly as
/// stored; normalization happens when the hierarchy is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationEdge {
    pub group_key: GroupKey,
    pub year: i32,
    pub category: String,
    pub concept: String,
    pub sub_concept: String,
    /// Calculation-linkbase multiplier, usually `1.0` or `-1.0`.
    pub weight: Option<f64>,
}

impl CalculationEdge {
    pub fn new(
        scope: &Scope,
        concept: impl Into<String>,
        sub_concept: impl Into<String>,
        weight: Option<f64>,
    ) -> Self {
        Self {
            group_key: scope.group.clone(),
            year: scope.year,
            category: scope.category.clone(),
            concept: concept.into(),
            sub_concept: sub_concept.into(),
            weight,
        }
    }

    pub fn scope(&self) -> Scope {
        Scope {
            group: self.group_key.clone(),
            year: self.year,
            category: self.category.clone(),
        }
    }
}

// ─── Output rows ──────────────────────────────────────────────

/// Ordered concept lineage: every transitive predecessor, root-most first,
/// followed by the concept itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AncestorPath(pub Vec<String>);

impl AncestorPath {
    /// The concept this lineage terminates in.
    pub fn target(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Delimiter-joined form for stores without an array type.
    ///
    /// Lossy when a concept contains `delimiter`; prefer the array form.
    pub fn join(&self, delimiter: &str) -> String {
        self.0.join(delimiter)
    }
}

/// Annotation for one stored edge. The natural key
/// (`concept, sub_concept, category, year`) carries the labels as stored so
/// the write-back hits the source row; `level` and `ancestor_path` describe
/// the normalized `sub_concept`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    pub concept: String,
    pub sub_concept: String,
    pub category: String,
    pub year: i32,
    pub level: Option<u32>,
    pub ancestor_path: AncestorPath,
}

/// Result of persisting one batch of annotations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub written: usize,
    /// Rows the store could not match or rejected as conflicting.
    pub skipped: usize,
}

impl std::ops::AddAssign for WriteOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.written += rhs.written;
        self.skipped += rhs.skipped;
    }
}
