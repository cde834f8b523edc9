// domain.rs: Port-count abstract domain
//
// A `PortVector` is the net element count (pushes minus pulls) on each of
// the N hardware ports. An `AssignmentSet` is the set of vectors that may
// reach a program point; join is union.
//
// Invariants:
//   - Shift-invariant normal form: after `normalize` the minimum known count
//     is 0. Vectors with no known count are left as-is.
//   - `AssignmentSet` equality is full value equality of its members.
//   - Arithmetic overflow degrades the affected count to `Unknown`.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::config::Normalization;

/// Net element count on one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum PortCount {
    Known(i64),
    /// Derived from a non-constant operand. Serializes as `null`.
    Unknown,
}

impl PortCount {
    pub fn known(self) -> Option<i64> {
        match self {
            PortCount::Known(v) => Some(v),
            PortCount::Unknown => None,
        }
    }
}

impl fmt::Display for PortCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortCount::Known(v) => write!(f, "{v}"),
            PortCount::Unknown => f.write_str("?"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PortVector(Vec<PortCount>);

impl PortVector {
    /// All ports at zero.
    pub fn zero(port_count: usize) -> Self {
        PortVector(vec![PortCount::Known(0); port_count])
    }

    pub fn all_unknown(port_count: usize) -> Self {
        PortVector(vec![PortCount::Unknown; port_count])
    }

    /// Build from raw counts without normalizing.
    pub fn from_counts(counts: impl IntoIterator<Item = PortCount>) -> Self {
        PortVector(counts.into_iter().collect())
    }

    /// Build from known counts without normalizing.
    pub fn from_known(counts: &[i64]) -> Self {
        Self::from_counts(counts.iter().map(|&c| PortCount::Known(c)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn counts(&self) -> &[PortCount] {
        &self.0
    }

    pub fn get(&self, port: usize) -> Option<PortCount> {
        self.0.get(port).copied()
    }

    pub fn min_known(&self) -> Option<i64> {
        self.0.iter().filter_map(|c| c.known()).min()
    }

    /// Subtract the minimum known count from every known count. Idempotent.
    pub fn normalize(mut self) -> Self {
        let Some(min) = self.min_known() else {
            return self;
        };
        if min == 0 {
            return self;
        }
        for count in &mut self.0 {
            if let PortCount::Known(v) = *count {
                *count = v.checked_sub(min).map_or(PortCount::Unknown, PortCount::Known);
            }
        }
        self
    }

    /// Add `delta` at `port` and normalize.
    pub fn add_at_port(&self, port: usize, delta: i64) -> Self {
        self.adjusted(port, delta, Normalization::ShiftInvariant)
    }

    /// Add `delta` at `port`, normalizing according to `mode`. An unknown
    /// count stays unknown; an out-of-range `port` leaves the vector as-is.
    pub fn adjusted(&self, port: usize, delta: i64, mode: Normalization) -> Self {
        let mut next = self.clone();
        if let Some(count) = next.0.get_mut(port) {
            if let PortCount::Known(v) = *count {
                *count = v.checked_add(delta).map_or(PortCount::Unknown, PortCount::Known);
            }
        }
        next.finish(mode)
    }

    /// Forget the count at `port`.
    pub fn mark_unknown(&self, port: usize, mode: Normalization) -> Self {
        let mut next = self.clone();
        if let Some(count) = next.0.get_mut(port) {
            *count = PortCount::Unknown;
        }
        next.finish(mode)
    }

    /// Every port known and zero.
    pub fn is_balanced(&self) -> bool {
        self.0.iter().all(|c| *c == PortCount::Known(0))
    }

    pub fn has_unknown(&self) -> bool {
        self.0.contains(&PortCount::Unknown)
    }

    fn finish(self, mode: Normalization) -> Self {
        match mode {
            Normalization::ShiftInvariant => self.normalize(),
            Normalization::Absolute => self,
        }
    }
}

impl fmt::Display for PortVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, count) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{count}")?;
        }
        f.write_str("]")
    }
}

/// Port vectors that may reach a program point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AssignmentSet(BTreeSet<PortVector>);

impl AssignmentSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn singleton(v: PortVector) -> Self {
        AssignmentSet(BTreeSet::from([v]))
    }

    pub fn insert(&mut self, v: PortVector) -> bool {
        self.0.insert(v)
    }

    /// Union.
    pub fn join(&self, other: &AssignmentSet) -> AssignmentSet {
        AssignmentSet(self.0.union(&other.0).cloned().collect())
    }

    /// Union `other` into `self`; returns whether `self` grew.
    pub fn join_into(&mut self, other: &AssignmentSet) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().cloned());
        self.0.len() != before
    }

    /// Apply `f` to every member, deduplicating the results.
    pub fn map(&self, f: impl FnMut(&PortVector) -> PortVector) -> AssignmentSet {
        AssignmentSet(self.0.iter().map(f).collect())
    }

    /// At least one member is balanced.
    pub fn any_balanced(&self) -> bool {
        self.0.iter().any(PortVector::is_balanced)
    }

    /// Exactly one member, and it is balanced.
    pub fn always_balanced(&self) -> bool {
        self.0.len() == 1 && self.any_balanced()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, v: &PortVector) -> bool {
        self.0.contains(v)
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &PortVector> {
        self.0.iter()
    }
}

impl FromIterator<PortVector> for AssignmentSet {
    fn from_iter<I: IntoIterator<Item = PortVector>>(iter: I) -> Self {
        AssignmentSet(iter.into_iter().collect())
    }
}

impl fmt::Display for AssignmentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("}")
    }
}

/// Dataflow state of the port-balance analysis.
///
/// `unconfigured` is kept apart from the assignments: with an empty entry
/// state, a path that has not passed `SB_CONFIG()` yet and an unreachable
/// point both carry no assignments, but only the former may still be
/// configured later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceState {
    pub assignments: AssignmentSet,
    /// Some path reaches this point without passing an `SB_CONFIG()`.
    pub unconfigured: bool,
}

impl BalanceState {
    /// Nothing reaches the point.
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn configured(assignments: AssignmentSet) -> Self {
        BalanceState {
            assignments,
            unconfigured: false,
        }
    }

    pub fn join_into(&mut self, other: &BalanceState) -> bool {
        let grew = self.assignments.join_into(&other.assignments);
        let flagged = other.unconfigured && !self.unconfigured;
        self.unconfigured |= other.unconfigured;
        grew || flagged
    }
}

/// Only the assignments are shown.
impl fmt::Display for BalanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.assignments)
    }
}
