use crate::error::QueryEvaluationError;
use oxrdf::{Term, Variable};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

const TEMPORARY_VARIABLE_PREFIX: &str = "_:";

/// Returns if the variable is an internal one introduced during algebra construction.
///
/// Such variables are removed by [`SolutionSequence::trim`](crate::SolutionSequence::trim).
#[inline]
pub fn is_temporary_variable(variable: &Variable) -> bool {
    variable.as_str().starts_with(TEMPORARY_VARIABLE_PREFIX)
}

/// Builds a temporary variable from an identifier, for example a blank node label.
#[inline]
pub fn temporary_variable(id: &str) -> Variable {
    Variable::new_unchecked(format!("{TEMPORARY_VARIABLE_PREFIX}{id}"))
}

/// A single SPARQL solution: a partial mapping from variables to RDF terms.
///
/// A solution is either owned, with its own binding list, or composed from other solutions by
/// [`join`](Self::join). Composed solutions keep their constituents behind shared pointers and
/// only cache the values that are looked up. Any mutation first flattens the solution into an
/// owned one so the constituents are never modified.
///
/// ```
/// use oxrdf::{Literal, Variable};
/// use sparsolve::Solution;
///
/// let x = Variable::new("x")?;
/// let y = Variable::new("y")?;
/// let mut left = Solution::new();
/// left.set(x.clone(), Literal::from(1).into())?;
/// let mut right = Solution::new();
/// right.set(y.clone(), Literal::from(2).into())?;
///
/// let joined = left.join(&right);
/// assert_eq!(joined.get(&x), Some(Literal::from(1).into()));
/// assert_eq!(joined.get(&y), Some(Literal::from(2).into()));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct Solution {
    inner: Arc<SolutionInner>,
}

#[derive(Default)]
struct SolutionInner {
    own: Vec<(Variable, Term)>,
    constituents: Box<[Solution]>,
    cache: Mutex<Vec<(Variable, Term)>>,
}

impl Clone for SolutionInner {
    fn clone(&self) -> Self {
        Self {
            own: self.own.clone(),
            constituents: self.constituents.clone(),
            cache: Mutex::new(
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            ),
        }
    }
}

impl Solution {
    /// Builds a solution without any binding
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_bindings(own: Vec<(Variable, Term)>) -> Self {
        Self {
            inner: Arc::new(SolutionInner {
                own,
                ..SolutionInner::default()
            }),
        }
    }

    /// Returns the value bound to the variable, if any.
    pub fn get(&self, variable: &Variable) -> Option<Term> {
        if let Some((_, value)) = self.inner.own.iter().find(|(v, _)| v == variable) {
            return Some(value.clone());
        }
        if self.inner.constituents.is_empty() {
            return None;
        }
        if let Some((_, value)) = self
            .lock_cache()
            .iter()
            .find(|(v, _)| v == variable)
        {
            return Some(value.clone());
        }
        let value = self
            .inner
            .constituents
            .iter()
            .find_map(|c| c.get(variable))?;
        self.lock_cache().push((variable.clone(), value.clone()));
        Some(value)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Vec<(Variable, Term)>> {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the variable is bound, without computing its value.
    pub fn contains_variable(&self, variable: &Variable) -> bool {
        self.inner.own.iter().any(|(v, _)| v == variable)
            || self
                .inner
                .constituents
                .iter()
                .any(|c| c.contains_variable(variable))
    }

    /// Binds the variable to the term.
    ///
    /// Binding a variable again to the same term is a no-op.
    /// Binding it to a different term fails with [`QueryEvaluationError::DuplicateBinding`].
    pub fn set(&mut self, variable: Variable, term: Term) -> Result<(), QueryEvaluationError> {
        if let Some(existing) = self.get(&variable) {
            return if existing == term {
                Ok(())
            } else {
                Err(QueryEvaluationError::DuplicateBinding {
                    variable,
                    existing,
                    new: term,
                })
            };
        }
        self.bindings_mut().push((variable, term));
        Ok(())
    }

    /// Unbinds the variable. A composed solution is flattened first.
    pub fn remove(&mut self, variable: &Variable) {
        if self.contains_variable(variable) {
            self.bindings_mut().retain(|(v, _)| v != variable);
        }
    }

    /// Flattens the solution if it is composed and returns its own binding list.
    fn bindings_mut(&mut self) -> &mut Vec<(Variable, Term)> {
        if !self.inner.constituents.is_empty() {
            self.inner = Arc::new(SolutionInner {
                own: self.bindings(),
                ..SolutionInner::default()
            });
        }
        &mut Arc::make_mut(&mut self.inner).own
    }

    /// All the bindings, the first value wins for a variable bound in multiple constituents.
    fn bindings(&self) -> Vec<(Variable, Term)> {
        let mut bindings = self.inner.own.clone();
        for constituent in self.inner.constituents.iter() {
            for (variable, value) in constituent.bindings() {
                if !bindings.iter().any(|(v, _)| *v == variable) {
                    bindings.push((variable, value));
                }
            }
        }
        bindings
    }

    /// The bound variables, in a stable order for this solution
    pub fn variables(&self) -> Vec<Variable> {
        self.bindings().into_iter().map(|(v, _)| v).collect()
    }

    /// The bound values, in the same order as [`variables`](Self::variables)
    pub fn values(&self) -> Vec<Term> {
        self.bindings().into_iter().map(|(_, t)| t).collect()
    }

    /// The bindings, in the order of [`variables`](Self::variables)
    pub fn iter(&self) -> impl Iterator<Item = (Variable, Term)> {
        self.bindings().into_iter()
    }

    /// The number of distinct bound variables
    pub fn len(&self) -> usize {
        self.bindings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.own.is_empty() && self.inner.constituents.iter().all(Self::is_empty)
    }

    /// Builds the union of the two solutions without copying their bindings.
    ///
    /// Compatibility is not checked: on a conflict the value from `self` is returned.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        Self {
            inner: Arc::new(SolutionInner {
                constituents: Box::new([self.clone(), other.clone()]),
                ..SolutionInner::default()
            }),
        }
    }

    /// Returns an owned solution that does not share anything with its constituents.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self::from_bindings(self.bindings())
    }

    /// Checks that the two solutions do not bind any of the given variables to different values.
    pub fn is_compatible_with(&self, other: &Self, variables: &[Variable]) -> bool {
        variables
            .iter()
            .all(|v| match (self.get(v), other.get(v)) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            })
    }

    /// Checks that one of the given variables is bound to the same value in both solutions.
    pub fn is_minus_compatible_with(&self, other: &Self, variables: &[Variable]) -> bool {
        variables
            .iter()
            .any(|v| matches!((self.get(v), other.get(v)), (Some(a), Some(b)) if a == b))
    }
}

impl PartialEq for Solution {
    fn eq(&self, other: &Self) -> bool {
        let mut left = self.bindings();
        let mut right = other.bindings();
        if left.len() != right.len() {
            return false;
        }
        left.sort_unstable_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        right.sort_unstable_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        left == right
    }
}

impl Eq for Solution {}

impl FromIterator<(Variable, Term)> for Solution {
    /// Later bindings of an already bound variable are ignored.
    fn from_iter<I: IntoIterator<Item = (Variable, Term)>>(iter: I) -> Self {
        let mut bindings: Vec<(Variable, Term)> = Vec::new();
        for (variable, value) in iter {
            if !bindings.iter().any(|(v, _)| *v == variable) {
                bindings.push((variable, value));
            }
        }
        Self::from_bindings(bindings)
    }
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.bindings().iter().map(|(v, t)| (v.as_str(), t)))
            .finish()
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (variable, value)) in self.bindings().iter().enumerate() {
            if i > 0 {
                f.write_str(" , ")?;
            }
            write!(f, "{variable} = {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode};
    use std::error::Error;

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn single(name: &str, value: impl Into<Term>) -> Solution {
        [(var(name), value.into())].into_iter().collect()
    }

    #[test]
    fn join_exposes_both_sides() {
        let x = single("x", NamedNode::new_unchecked("http://example.com/x"));
        let y = single("y", NamedNode::new_unchecked("http://example.com/y"));
        let z = x.join(&y);
        assert_eq!(
            z.get(&var("x")),
            Some(NamedNode::new_unchecked("http://example.com/x").into())
        );
        assert_eq!(
            z.get(&var("y")),
            Some(NamedNode::new_unchecked("http://example.com/y").into())
        );
        assert_eq!(z.variables().len(), 2);
    }

    #[test]
    fn join_with_empty_side() {
        let x = single("var", Literal::from(1));
        let z = x.join(&Solution::new());
        assert_eq!(z.get(&var("var")), Some(Literal::from(1).into()));
        assert_eq!(z.variables().len(), 1);
        let z = Solution::new().join(&x);
        assert_eq!(z.get(&var("var")), Some(Literal::from(1).into()));
        assert_eq!(z.variables().len(), 1);
    }

    #[test]
    fn mutation_does_not_leak_into_constituents() -> Result<(), Box<dyn Error>> {
        let x = single("x", Literal::from(1));
        let y = single("y", Literal::from(2));
        let mut z1 = x.join(&y);
        let z2 = x.join(&y);

        z1.set(var("z"), Literal::from(3).into())?;
        assert_eq!(z1.get(&var("z")), Some(Literal::from(3).into()));
        assert_eq!(z1.variables().len(), 3);
        assert_eq!(z2.get(&var("z")), None);
        assert_eq!(z2.variables().len(), 2);
        assert_eq!(x.variables().len(), 1);
        assert_eq!(y.variables().len(), 1);
        Ok(())
    }

    #[test]
    fn removal_does_not_leak_into_constituents() {
        let x = single("x", Literal::from(1));
        let y = single("y", Literal::from(2));
        let mut z1 = x.join(&y);
        let z2 = x.join(&y);

        z1.remove(&var("y"));
        assert_eq!(z1.get(&var("y")), None);
        assert_eq!(z1.variables().len(), 1);
        assert_eq!(z2.get(&var("y")), Some(Literal::from(2).into()));
        assert_eq!(y.get(&var("y")), Some(Literal::from(2).into()));
    }

    #[test]
    fn copy_is_materialized() {
        let z = single("x", Literal::from(1)).join(&single("y", Literal::from(2)));
        let copy = z.copy();
        assert!(copy.inner.constituents.is_empty());
        assert_eq!(copy, z);
        assert_eq!(copy.variables().len(), 2);
    }

    fn nested(count: usize) {
        let mut current = Solution::new();
        for i in 0..count {
            let i = i64::try_from(i).unwrap();
            current = current.join(&single(&format!("var{i}"), Literal::from(i)));
        }
        assert_eq!(current.variables().len(), count);
        assert_eq!(current.values().len(), count);
        for i in 0..count {
            let i = i64::try_from(i).unwrap();
            assert_eq!(
                current.get(&var(&format!("var{i}"))),
                Some(Literal::from(i).into()),
                "Bad value for ?var{i}"
            );
        }
    }

    #[test]
    fn nested_joins() {
        nested(3);
        nested(5);
        nested(10);
        nested(50);
    }

    #[test]
    fn lookups_are_cached() {
        let z = single("x", Literal::from(1)).join(&single("y", Literal::from(2)));
        assert_eq!(z.get(&var("y")), Some(Literal::from(2).into()));
        assert_eq!(z.lock_cache().len(), 1);
        assert_eq!(z.get(&var("y")), Some(Literal::from(2).into()));
        assert_eq!(z.lock_cache().len(), 1);
        assert_eq!(z.get(&var("w")), None);
        assert_eq!(z.lock_cache().len(), 1);
    }

    #[test]
    fn duplicate_binding() -> Result<(), Box<dyn Error>> {
        let mut s = single("x", Literal::from(1));
        s.set(var("x"), Literal::from(1).into())?;
        assert_eq!(s.len(), 1);
        assert!(matches!(
            s.set(var("x"), Literal::from(2).into()),
            Err(QueryEvaluationError::DuplicateBinding { .. })
        ));
        assert_eq!(s.get(&var("x")), Some(Literal::from(1).into()));
        Ok(())
    }

    #[test]
    fn compatibility() {
        let x = single("x", Literal::from(1));
        let y = single("x", Literal::from(1));
        let z = x.join(&y);
        assert_eq!(z.variables().len(), 1);
        assert!(z.is_compatible_with(&x, &[var("x")]));
        assert!(z.is_compatible_with(&y, &[var("x")]));
        assert!(z.is_compatible_with(&single("y", Literal::from(3)), &[var("x"), var("y")]));
        assert!(!z.is_compatible_with(&single("x", Literal::from(2)), &[var("x")]));
    }

    #[test]
    fn minus_compatibility() {
        let a = single("x", Literal::from(1)).join(&single("y", Literal::from(2)));
        assert!(a.is_minus_compatible_with(&single("x", Literal::from(1)), &[var("x")]));
        assert!(!a.is_minus_compatible_with(&single("x", Literal::from(2)), &[var("x")]));
        assert!(!a.is_minus_compatible_with(&single("z", Literal::from(1)), &[var("z")]));
        assert!(!a.is_minus_compatible_with(&Solution::new(), &[var("x"), var("y")]));
    }

    #[test]
    fn temporary_variables() {
        assert!(is_temporary_variable(&temporary_variable("b0")));
        assert!(!is_temporary_variable(&var("b0")));
    }

    #[test]
    fn display() {
        let s = single("x", NamedNode::new_unchecked("http://example.com/a"))
            .join(&single("y", Literal::from("1")));
        assert_eq!(s.to_string(), "?x = <http://example.com/a> , ?y = \"1\"");
    }
}
