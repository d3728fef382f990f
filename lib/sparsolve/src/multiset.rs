use crate::context::Deadline;
use crate::error::QueryEvaluationError;
use crate::solution::{Solution, is_temporary_variable};
use oxrdf::{Term, Variable};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::slice;
use std::sync::LazyLock;
use std::sync::atomic::{self, AtomicBool};
use tracing::debug;

static EMPTY_SOLUTION: LazyLock<Solution> = LazyLock::new(Solution::new);

/// The result of the evaluation of an algebra node.
///
/// [`Identity`](Self::Identity) and [`Null`](Self::Null) are kept apart from ordinary multisets:
/// an empty basic graph pattern evaluates to `Identity` while a pattern that matched nothing
/// evaluates to `Null`.
#[derive(Clone, Debug)]
pub enum SolutionSequence {
    /// A single solution without any binding, neutral for [`join`](Self::join)
    Identity,
    /// No solution, absorbing for [`join`](Self::join)
    Null,
    /// Zero or more concrete solutions
    Multiset(Multiset),
}

impl SolutionSequence {
    /// An ordinary sequence without any solution
    #[inline]
    pub fn empty() -> Self {
        Self::Multiset(Multiset::new())
    }

    /// Wraps the multiset, replacing it with [`Null`](Self::Null) if it is empty.
    #[inline]
    pub fn non_empty_or_null(multiset: Multiset) -> Self {
        if multiset.is_empty() {
            Self::Null
        } else {
            Self::Multiset(multiset)
        }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Identity => false,
            Self::Null => true,
            Self::Multiset(multiset) => multiset.is_empty(),
        }
    }

    /// The number of solutions
    pub fn count(&self) -> usize {
        match self {
            Self::Identity => 1,
            Self::Null => 0,
            Self::Multiset(multiset) => multiset.len(),
        }
    }

    /// Returns `true` if the solutions are tagged as sorted by an `ORDER BY`.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Multiset(multiset) if multiset.ordered)
    }

    /// Adds a solution. The sequence becomes an ordinary multiset.
    pub fn add(&mut self, solution: Solution) {
        match self {
            Self::Multiset(multiset) => multiset.add(solution),
            Self::Identity => {
                let mut multiset = Multiset::new();
                multiset.add(Solution::new());
                multiset.add(solution);
                *self = Self::Multiset(multiset);
            }
            Self::Null => {
                let mut multiset = Multiset::new();
                multiset.add(solution);
                *self = Self::Multiset(multiset);
            }
        }
    }

    /// Returns `true` if one of the solutions may bind the variable.
    pub fn contains_variable(&self, variable: &Variable) -> bool {
        self.variables().contains(variable)
    }

    /// The variables that may be bound by the solutions
    pub fn variables(&self) -> &[Variable] {
        match self {
            Self::Identity | Self::Null => &[],
            Self::Multiset(multiset) => &multiset.variables,
        }
    }

    /// Returns `true` if the two sequences do not share any variable.
    pub fn is_disjoint_with(&self, other: &Self) -> bool {
        !self.variables().iter().any(|v| other.contains_variable(v))
    }

    /// The solutions in order. [`Identity`](Self::Identity) yields a single empty solution.
    pub fn iter(&self) -> slice::Iter<'_, Solution> {
        match self {
            Self::Identity => slice::from_ref(&*EMPTY_SOLUTION).iter(),
            Self::Null => [].iter(),
            Self::Multiset(multiset) => multiset.solutions.iter(),
        }
    }

    /// Converts into an ordinary multiset, materializing the degenerate sequences.
    pub fn into_multiset(self) -> Multiset {
        match self {
            Self::Identity => Multiset {
                solutions: vec![Solution::new()],
                ..Multiset::default()
            },
            Self::Null => Multiset::new(),
            Self::Multiset(multiset) => multiset,
        }
    }

    /// The list of the solutions, see [`into_multiset`](Self::into_multiset)
    pub fn into_solutions(self) -> Vec<Solution> {
        self.into_multiset().solutions
    }

    /// Joins all the pairs of compatible solutions.
    ///
    /// The output lists, for each solution of `self` in order, its compatible solutions of `other`
    /// in order.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => Self::Null,
            (Self::Identity, other) | (other, Self::Identity) => other,
            (Self::Multiset(left), Self::Multiset(right)) => {
                Self::non_empty_or_null(left.join(&right))
            }
        }
    }

    /// Cross product of two sequences that do not share variables.
    ///
    /// Compatibility is not checked.
    #[must_use]
    pub fn product(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => Self::Null,
            (Self::Identity, other) | (other, Self::Identity) => other,
            (Self::Multiset(left), Self::Multiset(right)) => {
                Self::non_empty_or_null(left.product(&right))
            }
        }
    }

    /// Same as [`product`](Self::product) but stops once the deadline is reached.
    ///
    /// The deadline is polled before each row of the outer side, not for each output row.
    /// On expiry the rows computed so far are returned: the result is then a subset of the full
    /// product and the caller is expected to check the deadline itself.
    ///
    /// With `parallel` set, the larger side is split into partitions evaluated on the `rayon`
    /// pool and concatenated in partition order.
    #[must_use]
    pub fn product_with_timeout(self, other: Self, deadline: &Deadline, parallel: bool) -> Self {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => Self::Null,
            (Self::Identity, other) | (other, Self::Identity) => other,
            (Self::Multiset(left), Self::Multiset(right)) => {
                Self::non_empty_or_null(if parallel && left.len().max(right.len()) > 1 {
                    left.parallel_product_until(&right, deadline)
                } else {
                    left.product_until(&right, deadline)
                })
            }
        }
    }

    /// Concatenation of the two sequences. Duplicates are kept.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, other) | (other, Self::Null) => other,
            (left, right) => {
                let mut multiset = left.into_multiset();
                multiset.append(right.into_multiset());
                Self::Multiset(multiset)
            }
        }
    }

    /// The solutions of `self` that are not minus-compatible with any solution of `other`.
    #[must_use]
    pub fn minus(self, other: &Self) -> Self {
        match (self, other) {
            (Self::Null, _) => Self::Null,
            (left, Self::Null | Self::Identity) => left,
            // An empty solution shares no variable with anything
            (Self::Identity, Self::Multiset(_)) => Self::Identity,
            (Self::Multiset(left), Self::Multiset(right)) => {
                Self::non_empty_or_null(left.minus(right))
            }
        }
    }

    /// Left outer join.
    ///
    /// Each solution of `self` is extended with the compatible solutions of `other` for which
    /// `filter`
    /// holds on the merged solution. Solutions of `self` without any such extension are kept as is.
    #[must_use]
    pub fn left_join(self, other: Self, filter: impl FnMut(&Solution) -> bool) -> Self {
        match (self, other) {
            (Self::Null, _) => Self::Null,
            (left, Self::Null | Self::Identity) => left,
            (left, Self::Multiset(right)) => {
                Self::Multiset(left.into_multiset().left_join(&right, filter))
            }
        }
    }

    /// Keeps the solutions for which the predicate holds.
    #[must_use]
    pub fn filter(self, mut predicate: impl FnMut(&Solution) -> bool) -> Self {
        match self {
            Self::Identity => {
                if predicate(&EMPTY_SOLUTION) {
                    Self::Identity
                } else {
                    Self::Null
                }
            }
            Self::Null => Self::Null,
            Self::Multiset(mut multiset) => {
                multiset.solutions.retain(|s| predicate(s));
                Self::non_empty_or_null(multiset)
            }
        }
    }

    /// Binds `variable` in each solution to the computed value.
    ///
    /// Fails with [`QueryEvaluationError::DuplicateBinding`] if a solution already binds it and
    /// propagates the errors of `value`.
    pub fn extend(
        self,
        variable: &Variable,
        mut value: impl FnMut(&Solution) -> Result<Term, QueryEvaluationError>,
    ) -> Result<Self, QueryEvaluationError> {
        let mut multiset = self.into_multiset();
        for solution in &mut multiset.solutions {
            let new = value(solution)?;
            if let Some(existing) = solution.get(variable) {
                return Err(QueryEvaluationError::DuplicateBinding {
                    variable: variable.clone(),
                    existing,
                    new,
                });
            }
            solution.set(variable.clone(), new)?;
        }
        multiset.add_variable(variable);
        Ok(Self::non_empty_or_null(multiset))
    }

    /// Binds `variable` in each solution to the computed value if it is unbound.
    ///
    /// Solutions for which `value` returns `None` or where the variable is already bound to another
    /// value are dropped.
    #[must_use]
    pub fn assign(
        self,
        variable: &Variable,
        mut value: impl FnMut(&Solution) -> Option<Term>,
    ) -> Self {
        let mut multiset = self.into_multiset();
        multiset.solutions.retain_mut(|solution| {
            value(solution).is_some_and(|term| solution.set(variable.clone(), term).is_ok())
        });
        multiset.add_variable(variable);
        Self::non_empty_or_null(multiset)
    }

    /// Removes the bindings of the temporary variables.
    #[must_use]
    pub fn trim(self) -> Self {
        match self {
            Self::Multiset(multiset) => Self::Multiset(multiset.trim()),
            other => other,
        }
    }

    /// Restricts the solutions to the given variables.
    #[must_use]
    pub fn project(self, variables: &[Variable]) -> Self {
        match self {
            Self::Multiset(multiset) => Self::Multiset(multiset.project(variables)),
            other => other,
        }
    }

    /// Removes duplicated solutions, keeping the first occurrence.
    #[must_use]
    pub fn distinct(self) -> Self {
        match self {
            Self::Multiset(multiset) => Self::Multiset(multiset.distinct()),
            other => other,
        }
    }

    /// Removes consecutive duplicated solutions.
    #[must_use]
    pub fn reduced(self) -> Self {
        match self {
            Self::Multiset(mut multiset) => {
                multiset.solutions.dedup();
                Self::Multiset(multiset)
            }
            other => other,
        }
    }

    /// Skips the `start` first solutions and keeps at most `length` of the remaining ones.
    #[must_use]
    pub fn slice(self, start: usize, length: Option<usize>) -> Self {
        match self {
            Self::Identity => {
                if start == 0 && length != Some(0) {
                    Self::Identity
                } else {
                    Self::Null
                }
            }
            Self::Null => Self::Null,
            Self::Multiset(mut multiset) => {
                let solutions = multiset.solutions.into_iter().skip(start);
                multiset.solutions = if let Some(length) = length {
                    solutions.take(length).collect()
                } else {
                    solutions.collect()
                };
                Self::Multiset(multiset)
            }
        }
    }

    /// Stable sort of the solutions on a key computed once per solution.
    ///
    /// The result is tagged as ordered.
    #[must_use]
    pub fn sort_by_key<K>(
        self,
        mut key: impl FnMut(&Solution) -> K,
        mut compare: impl FnMut(&K, &K) -> Ordering,
    ) -> Self {
        match self {
            Self::Multiset(mut multiset) => {
                let mut keyed = multiset
                    .solutions
                    .into_iter()
                    .map(|solution| (key(&solution), solution))
                    .collect::<Vec<_>>();
                keyed.sort_by(|(a, _), (b, _)| compare(a, b));
                multiset.solutions = keyed.into_iter().map(|(_, solution)| solution).collect();
                multiset.ordered = true;
                Self::Multiset(multiset)
            }
            other => other,
        }
    }
}

impl From<Multiset> for SolutionSequence {
    #[inline]
    fn from(multiset: Multiset) -> Self {
        Self::Multiset(multiset)
    }
}

impl FromIterator<Solution> for SolutionSequence {
    fn from_iter<I: IntoIterator<Item = Solution>>(iter: I) -> Self {
        Self::Multiset(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SolutionSequence {
    type Item = &'a Solution;
    type IntoIter = slice::Iter<'a, Solution>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An ordinary collection of solutions.
///
/// It tracks the variables its solutions may bind, in first seen order.
#[derive(Clone, Debug, Default)]
pub struct Multiset {
    solutions: Vec<Solution>,
    variables: Vec<Variable>,
    ordered: bool,
}

impl Multiset {
    /// A multiset without any solution nor variable
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(solutions: Vec<Solution>, variables: Vec<Variable>) -> Self {
        Self {
            solutions,
            variables,
            ordered: false,
        }
    }

    /// The number of solutions, duplicates included
    #[inline]
    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    #[inline]
    pub fn solutions(&self) -> &[Solution] {
        &self.solutions
    }

    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Appends a solution and records its variables. The multiset is no longer tagged as ordered.
    pub fn add(&mut self, solution: Solution) {
        for variable in solution.variables() {
            self.add_variable(&variable);
        }
        self.solutions.push(solution);
        self.ordered = false;
    }

    /// The solutions in insertion order, or in sort order after an `ORDER BY`
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Solution> {
        self.solutions.iter()
    }

    fn add_variable(&mut self, variable: &Variable) {
        if !self.variables.contains(variable) {
            self.variables.push(variable.clone());
        }
    }

    fn append(&mut self, other: Self) {
        for variable in &other.variables {
            self.add_variable(variable);
        }
        self.solutions.extend(other.solutions);
        self.ordered = false;
    }

    fn shared_variables(&self, other: &Self) -> Vec<Variable> {
        self.variables
            .iter()
            .filter(|v| other.variables.contains(v))
            .cloned()
            .collect()
    }

    fn merged_variables(&self, other: &Self) -> Vec<Variable> {
        let mut variables = self.variables.clone();
        for variable in &other.variables {
            if !variables.contains(variable) {
                variables.push(variable.clone());
            }
        }
        variables
    }

    fn join(&self, other: &Self) -> Self {
        let shared = self.shared_variables(other);
        if shared.is_empty() {
            return self.product(other);
        }
        let index = JoinIndex::new(other, &shared);
        let mut solutions = Vec::new();
        let mut candidates = Vec::new();
        for left in &self.solutions {
            index.candidates(left, &mut candidates);
            for right in candidates.iter().filter_map(|i| other.solutions.get(*i)) {
                if left.is_compatible_with(right, &shared) {
                    solutions.push(left.join(right));
                }
            }
        }
        Self::from_parts(solutions, self.merged_variables(other))
    }

    fn product(&self, other: &Self) -> Self {
        let mut solutions = Vec::with_capacity(self.len().saturating_mul(other.len()));
        for left in &self.solutions {
            solutions.extend(other.solutions.iter().map(|right| left.join(right)));
        }
        Self::from_parts(solutions, self.merged_variables(other))
    }

    fn product_until(&self, other: &Self, deadline: &Deadline) -> Self {
        let mut solutions = Vec::new();
        for (i, left) in self.solutions.iter().enumerate() {
            if deadline.is_reached() {
                debug!(
                    computed_rows = i,
                    total_rows = self.len(),
                    "product stopped on the evaluation deadline"
                );
                break;
            }
            solutions.extend(other.solutions.iter().map(|right| left.join(right)));
        }
        Self::from_parts(solutions, self.merged_variables(other))
    }

    fn parallel_product_until(&self, other: &Self, deadline: &Deadline) -> Self {
        let partition_left = self.len() >= other.len();
        let (partitioned, rest) = if partition_left {
            (&self.solutions, &other.solutions)
        } else {
            (&other.solutions, &self.solutions)
        };
        let partition_size = partitioned
            .len()
            .div_ceil(rayon::current_num_threads())
            .max(1);
        let stop = AtomicBool::new(false);
        let partitions = partitioned
            .par_chunks(partition_size)
            .map(|partition| {
                let mut output = Vec::new();
                for row in partition {
                    if stop.load(atomic::Ordering::Relaxed) {
                        break;
                    }
                    if deadline.is_reached() {
                        stop.store(true, atomic::Ordering::Relaxed);
                        break;
                    }
                    output.extend(rest.iter().map(|other| {
                        if partition_left {
                            row.join(other)
                        } else {
                            other.join(row)
                        }
                    }));
                }
                output
            })
            .collect::<Vec<_>>();
        if stop.into_inner() {
            debug!(
                partitions = partitions.len(),
                "parallel product stopped on the evaluation deadline"
            );
        }
        Self::from_parts(
            partitions.into_iter().flatten().collect(),
            self.merged_variables(other),
        )
    }

    fn minus(mut self, other: &Self) -> Self {
        let shared = self.shared_variables(other);
        if shared.is_empty() {
            return self;
        }
        let mut excluded = FxHashSet::<(usize, Term)>::default();
        for solution in &other.solutions {
            for (i, variable) in shared.iter().enumerate() {
                if let Some(value) = solution.get(variable) {
                    excluded.insert((i, value));
                }
            }
        }
        self.solutions.retain(|solution| {
            !shared.iter().enumerate().any(|(i, variable)| {
                solution
                    .get(variable)
                    .is_some_and(|value| excluded.contains(&(i, value)))
            })
        });
        self
    }

    fn left_join(&self, other: &Self, mut filter: impl FnMut(&Solution) -> bool) -> Self {
        let shared = self.shared_variables(other);
        let index = JoinIndex::new(other, &shared);
        let mut solutions = Vec::new();
        let mut candidates = Vec::new();
        for left in &self.solutions {
            index.candidates(left, &mut candidates);
            let mut extended = false;
            for right in candidates.iter().filter_map(|i| other.solutions.get(*i)) {
                if left.is_compatible_with(right, &shared) {
                    let merged = left.join(right);
                    if filter(&merged) {
                        solutions.push(merged);
                        extended = true;
                    }
                }
            }
            if !extended {
                solutions.push(left.clone());
            }
        }
        Self::from_parts(solutions, self.merged_variables(other))
    }

    fn trim(mut self) -> Self {
        let temporary = self
            .variables
            .iter()
            .filter(|v| is_temporary_variable(v))
            .cloned()
            .collect::<Vec<_>>();
        if temporary.is_empty() {
            return self;
        }
        for solution in &mut self.solutions {
            for variable in &temporary {
                solution.remove(variable);
            }
        }
        self.variables.retain(|v| !is_temporary_variable(v));
        self
    }

    fn project(mut self, variables: &[Variable]) -> Self {
        for solution in &mut self.solutions {
            *solution = variables
                .iter()
                .filter_map(|v| Some((v.clone(), solution.get(v)?)))
                .collect();
        }
        self.variables = variables.to_vec();
        self
    }

    fn distinct(mut self) -> Self {
        let mut seen = FxHashSet::<Vec<Option<Term>>>::default();
        let variables = &self.variables;
        self.solutions
            .retain(|solution| seen.insert(variables.iter().map(|v| solution.get(v)).collect()));
        self
    }
}

impl FromIterator<Solution> for Multiset {
    fn from_iter<I: IntoIterator<Item = Solution>>(iter: I) -> Self {
        let mut multiset = Self::new();
        for solution in iter {
            multiset.add(solution);
        }
        multiset
    }
}

impl<'a> IntoIterator for &'a Multiset {
    type Item = &'a Solution;
    type IntoIter = slice::Iter<'a, Solution>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Multiset {
    type Item = Solution;
    type IntoIter = std::vec::IntoIter<Solution>;

    fn into_iter(self) -> Self::IntoIter {
        self.solutions.into_iter()
    }
}

/// Hash index of the right side of a join on the shared variables.
///
/// Solutions that do not bind all the shared variables are kept apart and are candidates for
/// every lookup.
struct JoinIndex {
    by_key: FxHashMap<Vec<Term>, Vec<usize>>,
    partial: Vec<usize>,
    shared: Vec<Variable>,
    len: usize,
}

impl JoinIndex {
    fn new(multiset: &Multiset, shared: &[Variable]) -> Self {
        let mut by_key = FxHashMap::<Vec<Term>, Vec<usize>>::default();
        let mut partial = Vec::new();
        for (i, solution) in multiset.solutions.iter().enumerate() {
            let key: Option<Vec<Term>> = shared.iter().map(|v| solution.get(v)).collect();
            if let Some(key) = key {
                by_key.entry(key).or_default().push(i);
            } else {
                partial.push(i);
            }
        }
        Self {
            by_key,
            partial,
            shared: shared.to_vec(),
            len: multiset.len(),
        }
    }

    /// Writes the candidate positions for `solution`, in increasing order.
    fn candidates(&self, solution: &Solution, output: &mut Vec<usize>) {
        output.clear();
        let key: Option<Vec<Term>> = self.shared.iter().map(|v| solution.get(v)).collect();
        if let Some(key) = key {
            if let Some(positions) = self.by_key.get(&key) {
                output.extend_from_slice(positions);
            }
            if !self.partial.is_empty() {
                output.extend_from_slice(&self.partial);
                output.sort_unstable();
            }
        } else {
            output.extend(0..self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancellationToken;
    use crate::solution::temporary_variable;
    use oxrdf::Literal;

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn row(bindings: &[(&str, i64)]) -> Solution {
        bindings
            .iter()
            .map(|(name, value)| (var(name), Literal::from(*value).into()))
            .collect()
    }

    fn sequence(rows: &[&[(&str, i64)]]) -> SolutionSequence {
        rows.iter().map(|r| row(r)).collect()
    }

    fn sorted(sequence: &SolutionSequence) -> Vec<String> {
        let mut rows = sequence
            .iter()
            .map(|s| {
                let mut bindings = s.iter().map(|(v, t)| format!("{v}={t}")).collect::<Vec<_>>();
                bindings.sort();
                bindings.join(" ")
            })
            .collect::<Vec<_>>();
        rows.sort();
        rows
    }

    #[test]
    fn join_with_degenerate_sequences() {
        let s = sequence(&[&[("x", 1)], &[("x", 2)]]);
        let joined = s.clone().join(SolutionSequence::Identity);
        assert_eq!(sorted(&joined), sorted(&s));
        let joined = SolutionSequence::Identity.join(s.clone());
        assert_eq!(sorted(&joined), sorted(&s));
        assert!(s.clone().join(SolutionSequence::Null).is_null());
        assert!(SolutionSequence::Null.join(s).is_null());
        assert!(
            SolutionSequence::Identity
                .join(SolutionSequence::Identity)
                .is_identity()
        );
    }

    #[test]
    fn join_keeps_compatible_pairs() {
        let left = sequence(&[&[("x", 1), ("y", 1)], &[("x", 2), ("y", 2)]]);
        let right = sequence(&[&[("x", 1), ("z", 1)], &[("x", 3), ("z", 3)], &[("z", 4)]]);
        let joined = left.join(right);
        let int = |value: i32| Literal::from(value).to_string();
        assert_eq!(
            sorted(&joined),
            [
                format!("?x={} ?y={} ?z={}", int(1), int(1), int(1)),
                format!("?x={} ?y={} ?z={}", int(1), int(1), int(4)),
                format!("?x={} ?y={} ?z={}", int(2), int(2), int(4)),
            ]
        );
    }

    #[test]
    fn join_order_is_nested_loop_order() {
        let left = sequence(&[&[("x", 2)], &[("x", 1)]]);
        let right = sequence(&[&[("x", 1), ("y", 1)], &[("y", 2)], &[("x", 2), ("y", 3)]]);
        let joined = left.join(right);
        let ys = joined
            .iter()
            .filter_map(|s| s.get(&var("y")))
            .collect::<Vec<_>>();
        assert_eq!(
            ys,
            [2, 3, 1, 2].map(|i| Term::from(Literal::from(i))).to_vec()
        );
    }

    #[test]
    fn join_without_pair_is_null() {
        let left = sequence(&[&[("x", 1)]]);
        let right = sequence(&[&[("x", 2)]]);
        assert!(left.join(right).is_null());
    }

    #[test]
    fn join_is_commutative_up_to_order() {
        let a = sequence(&[&[("x", 1)], &[("x", 2), ("y", 5)], &[("y", 6)]]);
        let b = sequence(&[&[("x", 2)], &[("y", 6), ("z", 1)], &[("x", 1), ("z", 2)]]);
        assert_eq!(
            sorted(&a.clone().join(b.clone())),
            sorted(&b.join(a))
        );
    }

    #[test]
    fn product_equals_join_on_disjoint_inputs() {
        let a = sequence(&[&[("x", 1)], &[("x", 2)]]);
        let b = sequence(&[&[("y", 1)], &[("y", 2)], &[("y", 3)]]);
        assert!(a.is_disjoint_with(&b));
        let product = a.clone().product(b.clone());
        assert_eq!(product.count(), 6);
        assert_eq!(sorted(&product), sorted(&a.join(b)));
    }

    #[test]
    fn parallel_product_equals_sequential() {
        let a: SolutionSequence = (0..37).map(|i| row(&[("x", i)])).collect();
        let b: SolutionSequence = (0..11).map(|i| row(&[("y", i)])).collect();
        let deadline = Deadline::never();
        let sequential = a.clone().product_with_timeout(b.clone(), &deadline, false);
        let parallel = a.clone().product_with_timeout(b.clone(), &deadline, true);
        assert_eq!(sequential.count(), 37 * 11);
        assert_eq!(sorted(&sequential), sorted(&parallel));
        let reversed = b.product_with_timeout(a, &deadline, true);
        assert_eq!(sorted(&sequential), sorted(&reversed));
    }

    #[test]
    fn product_stops_on_reached_deadline() {
        let token = CancellationToken::new();
        token.cancel();
        let deadline = Deadline::never().with_cancellation_token(token);
        let a = sequence(&[&[("x", 1)], &[("x", 2)]]);
        let b = sequence(&[&[("y", 1)]]);
        assert!(
            a.clone()
                .product_with_timeout(b.clone(), &deadline, false)
                .is_null()
        );
        assert!(a.product_with_timeout(b, &deadline, true).is_null());
    }

    #[test]
    fn product_with_timeout_fast_paths() {
        let deadline = Deadline::never();
        let a = sequence(&[&[("x", 1)]]);
        assert_eq!(
            a.clone()
                .product_with_timeout(SolutionSequence::Identity, &deadline, true)
                .count(),
            1
        );
        assert!(
            a.product_with_timeout(SolutionSequence::Null, &deadline, true)
                .is_null()
        );
    }

    #[test]
    fn union_keeps_duplicates() {
        let a = sequence(&[&[("x", 1)]]);
        let union = a.clone().union(a);
        assert_eq!(union.count(), 2);
        assert_eq!(
            SolutionSequence::Identity
                .union(SolutionSequence::Identity)
                .count(),
            2
        );
        assert!(
            SolutionSequence::Null
                .union(SolutionSequence::Null)
                .is_null()
        );
        assert!(
            SolutionSequence::Identity
                .union(SolutionSequence::Null)
                .is_identity()
        );
    }

    #[test]
    fn minus_excludes_on_shared_equal_values() {
        let a = sequence(&[&[("x", 1)]]);
        let b = sequence(&[&[("x", 1)], &[("y", 2)]]);
        assert!(a.clone().minus(&b).is_null());
        let b = sequence(&[&[("y", 2)]]);
        assert_eq!(a.clone().minus(&b).count(), 1);
        let b = sequence(&[&[("x", 2)]]);
        assert_eq!(a.clone().minus(&b).count(), 1);
        assert_eq!(a.minus(&SolutionSequence::Identity).count(), 1);
        assert!(
            SolutionSequence::Identity
                .minus(&sequence(&[&[("x", 1)]]))
                .is_identity()
        );
    }

    #[test]
    fn minus_requires_one_equal_shared_binding() {
        let a = sequence(&[&[("x", 1), ("y", 1)], &[("x", 2), ("y", 2)]]);
        let b = sequence(&[&[("x", 3), ("y", 2)]]);
        let result = a.minus(&b);
        assert_eq!(result.count(), 1);
        assert_eq!(
            result.iter().next().and_then(|s| s.get(&var("x"))),
            Some(Literal::from(1).into())
        );
    }

    #[test]
    fn left_join_retains_every_left_row() {
        let left = sequence(&[&[("x", 1)], &[("x", 2)], &[("x", 3)]]);
        let right = sequence(&[
            &[("x", 1), ("y", 1)],
            &[("x", 1), ("y", 2)],
            &[("x", 2), ("y", 3)],
        ]);
        let result = left.left_join(right, |s| s.get(&var("y")) != Some(Literal::from(3).into()));
        assert_eq!(result.count(), 4);
        let xs = result
            .iter()
            .filter_map(|s| s.get(&var("x")))
            .collect::<Vec<_>>();
        assert_eq!(xs, [1, 1, 2, 3].map(|i| Term::from(Literal::from(i))).to_vec());
        assert!(
            result
                .iter()
                .filter(|s| s.get(&var("x")) == Some(Literal::from(2).into()))
                .all(|s| s.get(&var("y")).is_none())
        );
    }

    #[test]
    fn left_join_of_identity() {
        let right = sequence(&[&[("y", 1)]]);
        let result = SolutionSequence::Identity.left_join(right, |_| true);
        assert_eq!(result.count(), 1);
        assert!(result.contains_variable(&var("y")));
        assert!(
            SolutionSequence::Null
                .left_join(sequence(&[&[("y", 1)]]), |_| true)
                .is_null()
        );
    }

    #[test]
    fn filter_drops_rows() {
        let s = sequence(&[&[("x", 1)], &[("x", -1)]]);
        let filtered = s.filter(|s| s.get(&var("x")) == Some(Literal::from(1).into()));
        assert_eq!(filtered.count(), 1);
        assert!(SolutionSequence::Identity.filter(|_| false).is_null());
        assert!(SolutionSequence::Identity.filter(|_| true).is_identity());
    }

    #[test]
    fn extend_rejects_bound_variables() -> Result<(), QueryEvaluationError> {
        let s = sequence(&[&[("x", 1)]]);
        let extended = s.clone().extend(&var("y"), |_| Ok(Literal::from(2).into()))?;
        assert!(extended.contains_variable(&var("y")));
        assert!(matches!(
            s.extend(&var("x"), |_| Ok(Literal::from(1).into())),
            Err(QueryEvaluationError::DuplicateBinding { .. })
        ));
        Ok(())
    }

    #[test]
    fn assign_keeps_equal_bindings() {
        let s = sequence(&[&[("x", 1)], &[("x", 2)]]);
        let assigned = s.assign(&var("x"), |_| Some(Literal::from(1).into()));
        assert_eq!(assigned.count(), 1);
        assert!(
            SolutionSequence::Identity
                .assign(&var("x"), |_| None)
                .is_null()
        );
    }

    #[test]
    fn trim_is_idempotent() {
        let temporary = temporary_variable("b0");
        let s: SolutionSequence = [[
            (var("x"), Term::from(Literal::from(1))),
            (temporary.clone(), Literal::from(2).into()),
        ]
        .into_iter()
        .collect::<Solution>()]
        .into_iter()
        .collect();
        let once = s.trim();
        assert!(!once.contains_variable(&temporary));
        assert!(once.iter().all(|s| s.get(&temporary).is_none()));
        let twice = once.clone().trim();
        assert_eq!(sorted(&once), sorted(&twice));
        assert_eq!(once.variables(), twice.variables());
    }

    #[test]
    fn solution_modifiers() {
        let s = sequence(&[&[("x", 2)], &[("x", 1)], &[("x", 1)], &[("x", 2)]]);
        assert_eq!(s.clone().distinct().count(), 2);
        assert_eq!(s.clone().reduced().count(), 3);
        assert_eq!(s.clone().slice(1, Some(2)).count(), 2);
        assert_eq!(s.clone().slice(3, None).count(), 1);
        assert!(SolutionSequence::Identity.slice(1, None).is_null());
        let mut computed = 0;
        let sorted_sequence = s.sort_by_key(
            |solution| {
                computed += 1;
                solution.get(&var("x")).map(|t| t.to_string())
            },
            Ord::cmp,
        );
        assert!(sorted_sequence.is_ordered());
        assert_eq!(computed, 4);
        assert_eq!(
            sorted_sequence.iter().next().and_then(|s| s.get(&var("x"))),
            Some(Literal::from(1).into())
        );
    }

    #[test]
    fn projection() {
        let s = sequence(&[&[("x", 1), ("y", 2)]]);
        let projected = s.project(&[var("y"), var("z")]);
        assert_eq!(projected.variables(), [var("y"), var("z")]);
        let solution = projected.iter().next().cloned().unwrap_or_default();
        assert_eq!(solution.variables(), [var("y")]);
    }

    #[test]
    fn add_to_degenerate_sequences() {
        let mut s = SolutionSequence::Identity;
        s.add(row(&[("x", 1)]));
        assert_eq!(s.count(), 2);
        let mut s = SolutionSequence::Null;
        s.add(row(&[("x", 1)]));
        assert_eq!(s.count(), 1);
        assert!(s.contains_variable(&var("x")));
    }
}
